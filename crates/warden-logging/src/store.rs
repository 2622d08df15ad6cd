//! Log querying from `SQLite`.
//!
//! [`LogStore`] reads rows written by [`crate::SqliteTransport`].

use rusqlite::Connection;

use crate::types::{LogEntry, LogLevel, LogQueryOptions};

const COLUMNS: &str = "id, timestamp, level, level_num, component, message, \
                       community_id, member_id, message_id, data, error_message";

/// Read-only log querying interface.
pub struct LogStore<'a> {
    conn: &'a Connection,
}

impl<'a> LogStore<'a> {
    /// Create a new log store backed by the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Query logs with filters.
    pub fn query(&self, opts: &LogQueryOptions) -> rusqlite::Result<Vec<LogEntry>> {
        let (filter, mut params) = where_clause(opts);
        let order = if opts.newest_first { "DESC" } else { "ASC" };
        let mut sql = format!("SELECT {COLUMNS} FROM logs{filter} ORDER BY timestamp {order}, id {order}");
        if let Some(limit) = opts.limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), row_to_entry)?;
        rows.collect()
    }

    /// Number of rows matching the filters (limit and order are ignored).
    pub fn count(&self, opts: &LogQueryOptions) -> rusqlite::Result<u64> {
        let (filter, params) = where_clause(opts);
        let sql = format!("SELECT COUNT(*) FROM logs{filter}");
        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(AsRef::as_ref).collect();
        let n: i64 = self.conn.query_row(&sql, param_refs.as_slice(), |r| r.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    /// All rows about one member of one community, oldest first.
    pub fn member_history(&self, community_id: &str, member_id: &str) -> rusqlite::Result<Vec<LogEntry>> {
        self.query(&LogQueryOptions {
            community_id: Some(community_id.to_string()),
            member_id: Some(member_id.to_string()),
            ..Default::default()
        })
    }

    /// Most recent errors.
    pub fn recent_errors(&self, limit: usize) -> rusqlite::Result<Vec<LogEntry>> {
        self.query(&LogQueryOptions {
            min_level: Some(LogLevel::Error),
            limit: Some(limit),
            newest_first: true,
            ..Default::default()
        })
    }

    /// Delete rows older than `older_than` (RFC 3339). Returns rows removed.
    pub fn prune_older_than(&self, older_than: &str) -> rusqlite::Result<usize> {
        self.conn
            .execute("DELETE FROM logs WHERE timestamp < ?1", [older_than])
    }
}

type Params = Vec<Box<dyn rusqlite::types::ToSql>>;

fn where_clause(opts: &LogQueryOptions) -> (String, Params) {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Params = Vec::new();

    if let Some(level) = opts.min_level {
        clauses.push("level_num >= ?");
        params.push(Box::new(level.as_num()));
    }
    if let Some(ref c) = opts.community_id {
        clauses.push("community_id = ?");
        params.push(Box::new(c.clone()));
    }
    if let Some(ref m) = opts.member_id {
        clauses.push("member_id = ?");
        params.push(Box::new(m.clone()));
    }
    if let Some(ref component) = opts.component {
        clauses.push("component = ?");
        params.push(Box::new(component.clone()));
    }
    if let Some(ref since) = opts.since {
        clauses.push("timestamp >= ?");
        params.push(Box::new(since.clone()));
    }
    if let Some(ref needle) = opts.search {
        clauses.push("message LIKE ? ESCAPE '\\'");
        params.push(Box::new(format!("%{}%", escape_like(needle))));
    }

    if clauses.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), params)
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    let level: String = row.get(2)?;
    let data: Option<String> = row.get(9)?;
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        level: LogLevel::from_str_lossy(&level),
        level_num: row.get(3)?,
        component: row.get(4)?,
        message: row.get(5)?,
        community_id: row.get(6)?,
        member_id: row.get(7)?,
        message_id: row.get(8)?,
        data: data.and_then(|s| serde_json::from_str(&s).ok()),
        error_message: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ensure_schema;

    fn db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        insert(&conn, "2025-01-01T00:00:00.000Z", LogLevel::Info, "ledger", "ledger ready", None, None);
        insert(&conn, "2025-01-01T00:01:00.000Z", LogLevel::Warn, "enforcement", "delete failed", Some("g1"), Some("u1"));
        insert(&conn, "2025-01-01T00:02:00.000Z", LogLevel::Info, "enforcement", "violation recorded", Some("g1"), Some("u1"));
        insert(&conn, "2025-01-01T00:03:00.000Z", LogLevel::Error, "ledger", "persist failed", None, None);
        insert(&conn, "2025-01-01T00:04:00.000Z", LogLevel::Info, "enforcement", "violation recorded", Some("g2"), Some("u1"));
        conn
    }

    fn insert(
        conn: &Connection,
        ts: &str,
        level: LogLevel,
        component: &str,
        msg: &str,
        community: Option<&str>,
        member: Option<&str>,
    ) {
        let _ = conn
            .execute(
                "INSERT INTO logs (timestamp, level, level_num, component, message, community_id, member_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![ts, level.to_string(), level.as_num(), component, msg, community, member],
            )
            .unwrap();
    }

    #[test]
    fn query_all_oldest_first() {
        let conn = db();
        let rows = LogStore::new(&conn).query(&LogQueryOptions::default()).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].message, "ledger ready");
    }

    #[test]
    fn filter_by_min_level() {
        let conn = db();
        let rows = LogStore::new(&conn)
            .query(&LogQueryOptions {
                min_level: Some(LogLevel::Warn),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.level >= LogLevel::Warn));
    }

    #[test]
    fn member_history_is_scoped_by_community() {
        let conn = db();
        let rows = LogStore::new(&conn).member_history("g1", "u1").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.community_id.as_deref() == Some("g1")));
    }

    #[test]
    fn since_and_search() {
        let conn = db();
        let store = LogStore::new(&conn);
        let opts = LogQueryOptions {
            since: Some("2025-01-01T00:02:00.000Z".into()),
            search: Some("violation".into()),
            ..Default::default()
        };
        assert_eq!(store.count(&opts).unwrap(), 2);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let conn = db();
        let opts = LogQueryOptions {
            search: Some("%".into()),
            ..Default::default()
        };
        assert_eq!(LogStore::new(&conn).count(&opts).unwrap(), 0);
    }

    #[test]
    fn recent_errors_newest_first_with_limit() {
        let conn = db();
        let rows = LogStore::new(&conn).recent_errors(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "persist failed");

        let newest = LogStore::new(&conn)
            .query(&LogQueryOptions {
                newest_first: true,
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(newest[0].community_id.as_deref(), Some("g2"));
    }

    #[test]
    fn prune_removes_old_rows() {
        let conn = db();
        let store = LogStore::new(&conn);
        assert_eq!(store.prune_older_than("2025-01-01T00:02:00.000Z").unwrap(), 2);
        assert_eq!(store.count(&LogQueryOptions::default()).unwrap(), 3);
    }
}
