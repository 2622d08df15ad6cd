//! Durable snapshot storage.
//!
//! [`JsonFileStore`] keeps the ledger as one JSON document on disk and is the
//! only writer of that file.
//!
//! # Write discipline
//!
//! Every save writes the full snapshot to a temporary file in the target's
//! directory, fsyncs it, and renames it over the target. A reader sees either
//! the previous document or the new one, never a partial write.
//!
//! # Load and recovery
//!
//! | on disk                      | result                                     |
//! |------------------------------|--------------------------------------------|
//! | nothing                      | empty snapshot, persisted immediately      |
//! | valid document               | that snapshot                              |
//! | unreadable / invalid schema  | backup copy, empty snapshot persisted      |
//!
//! Recovery discards the previous ledger state. The unreadable file is copied
//! to `<file>.corrupt-<timestamp>` first so an operator can inspect it.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, warn};
use warden_core::Snapshot;

use crate::error::StoreError;

/// How a snapshot was obtained at load time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOrigin {
    /// Read from an existing, valid document.
    Existing,
    /// No document existed; a fresh one was created.
    Created,
    /// The document was unreadable and replaced with an empty one.
    Recovered {
        /// Where the unreadable document was copied, if the copy succeeded.
        backup: Option<PathBuf>,
    },
}

/// Result of [`SnapshotStore::load`].
#[derive(Clone, Debug)]
pub struct Loaded {
    /// The snapshot to start from.
    pub snapshot: Snapshot,
    /// Where it came from.
    pub origin: LoadOrigin,
}

/// Persistence backend for the ledger snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the persisted snapshot. Never fails; see the module docs.
    async fn load(&self) -> Loaded;

    /// Replace the persisted snapshot with `snapshot`.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// JSON document on the local filesystem.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    backup_corrupt: bool,
}

impl JsonFileStore {
    /// Store backed by the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_corrupt: true,
        }
    }

    /// Skip the backup copy when recovering from a corrupt document.
    #[must_use]
    pub fn without_corrupt_backup(mut self) -> Self {
        self.backup_corrupt = false;
        self
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn recover(&self, reason: &str) -> Loaded {
        error!(path = %self.path.display(), reason, "ledger document unreadable, starting from empty state");

        let backup = if self.backup_corrupt {
            self.backup_unreadable().await
        } else {
            None
        };

        let snapshot = Snapshot::default();
        if let Err(e) = self.save(&snapshot).await {
            error!(path = %self.path.display(), error = %e, "failed to persist recovered ledger");
        }

        Loaded {
            snapshot,
            origin: LoadOrigin::Recovered { backup },
        }
    }

    async fn backup_unreadable(&self) -> Option<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".corrupt-{stamp}"));
        let backup = PathBuf::from(name);

        match tokio::fs::copy(&self.path, &backup).await {
            Ok(_) => {
                warn!(backup = %backup.display(), "copied unreadable ledger document");
                Some(backup)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not back up unreadable ledger document");
                None
            }
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Loaded {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let snapshot = Snapshot::default();
                match self.save(&snapshot).await {
                    Ok(()) => info!(path = %self.path.display(), "created new ledger document"),
                    Err(e) => {
                        error!(path = %self.path.display(), error = %e, "failed to create ledger document");
                    }
                }
                return Loaded {
                    snapshot,
                    origin: LoadOrigin::Created,
                };
            }
            Err(e) => return self.recover(&e.to_string()).await,
        };

        match Snapshot::from_json(&text) {
            Ok(snapshot) => {
                info!(
                    path = %self.path.display(),
                    communities = snapshot.enabled.len(),
                    audit_entries = snapshot.audit.len(),
                    "ledger document loaded"
                );
                Loaded {
                    snapshot,
                    origin: LoadOrigin::Existing,
                }
            }
            Err(e) => self.recover(&e.to_string()).await,
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let bytes = snapshot.to_json_pretty()?.into_bytes();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Write `bytes` to a sibling temp file, fsync, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    let _ = tmp.persist(path).map_err(|e| StoreError::Replace {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use warden_core::{CommunityId, MemberId};

    fn store_in(dir: &tempfile::TempDir) -> JsonFileStore {
        JsonFileStore::new(dir.path().join("moderation_data.json"))
    }

    fn populated() -> Snapshot {
        let mut snap = Snapshot::default();
        let _ = snap.enabled.insert(CommunityId::from("g1"), true);
        let _ = snap
            .warnings
            .entry(CommunityId::from("g1"))
            .or_default()
            .insert(MemberId::from("u1"), 3);
        snap
    }

    #[tokio::test]
    async fn missing_document_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let loaded = store.load().await;
        assert_eq!(loaded.origin, LoadOrigin::Created);
        assert!(loaded.snapshot.is_empty());
        assert!(store.path().exists());

        let again = store.load().await;
        assert_eq!(again.origin, LoadOrigin::Existing);
        assert_eq!(again.snapshot, Snapshot::default());
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let snap = populated();

        store.save(&snap).await.unwrap();
        let loaded = store.load().await;
        assert_eq!(loaded.origin, LoadOrigin::Existing);
        assert_eq!(loaded.snapshot, snap);
    }

    #[tokio::test]
    async fn save_replaces_prior_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.save(&populated()).await.unwrap();
        store.save(&Snapshot::default()).await.unwrap();
        assert!(store.load().await.snapshot.is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_recovers_to_empty_and_stays_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ this is not json").unwrap();

        let loaded = store.load().await;
        assert!(loaded.snapshot.is_empty());
        let backup = assert_matches!(loaded.origin, LoadOrigin::Recovered { backup: Some(b) } => b);
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "{ this is not json");

        let again = store.load().await;
        assert_eq!(again.origin, LoadOrigin::Existing);
        assert_eq!(again.snapshot, loaded.snapshot);
    }

    #[tokio::test]
    async fn structurally_invalid_document_is_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).without_corrupt_backup();
        std::fs::write(store.path(), r#"{"user_warnings": [1, 2, 3]}"#).unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.origin, LoadOrigin::Recovered { backup: None });
        assert!(loaded.snapshot.is_empty());

        // Recovery discards prior content: the file now holds the empty default.
        let on_disk = Snapshot::from_json(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert!(on_disk.is_empty());
    }

    #[tokio::test]
    async fn partial_document_is_not_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"enabled_servers": {"g1": true}}"#).unwrap();

        let loaded = store.load().await;
        assert_eq!(loaded.origin, LoadOrigin::Existing);
        assert_eq!(loaded.snapshot.enabled_count(), 1);
    }

    #[tokio::test]
    async fn save_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/deeper/ledger.json"));
        store.save(&populated()).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        for _ in 0..5 {
            store.save(&populated()).await.unwrap();
        }
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn save_into_unwritable_location_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let store = JsonFileStore::new(blocker.join("ledger.json"));

        let err = store.save(&populated()).await.unwrap_err();
        assert_matches!(err, StoreError::Io(_));
    }
}
