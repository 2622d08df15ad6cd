//! Enforcement log rows carry the component and the member in scope.

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use warden_core::Snapshot;
use warden_enforcement::testutil::{MockClassifier, RecordingPlatform, image, message};
use warden_enforcement::{EnforcementPipeline, Outcome, PipelineConfig};
use warden_ledger::{JsonFileStore, ViolationLedger};
use warden_logging::{LogQueryOptions, LogStore, SqliteTransport, TransportConfig};

#[tokio::test]
async fn violation_rows_are_tagged_with_enforcement_component() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("logs.db");
    let transport =
        SqliteTransport::new(rusqlite::Connection::open(&db).unwrap(), TransportConfig::default()).unwrap();
    let handle = transport.handle();
    let _subscriber = tracing::subscriber::set_default(tracing_subscriber::registry().with(transport));

    let store = Arc::new(JsonFileStore::new(dir.path().join("ledger.json")));
    let ledger = Arc::new(ViolationLedger::with_snapshot(Snapshot::default(), store));
    ledger.set_enabled(&"g1".into(), true);
    let pipeline = EnforcementPipeline::new(
        ledger,
        Arc::new(MockClassifier::new().with_score("img", 0.9)),
        Arc::new(RecordingPlatform::new()),
        PipelineConfig::default(),
    );

    let outcome = pipeline.handle(&message("g1", "u1", vec![image("img")])).await;
    assert!(matches!(outcome, Outcome::Violation(_)));
    handle.flush();

    let conn = rusqlite::Connection::open(&db).unwrap();
    let rows = LogStore::new(&conn)
        .query(&LogQueryOptions {
            component: Some("enforcement".into()),
            search: Some("violation enforced".into()),
            ..LogQueryOptions::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].community_id.as_deref(), Some("g1"));
    assert_eq!(rows[0].member_id.as_deref(), Some("u1"));
    assert_eq!(rows[0].message_id.as_deref(), Some("m1"));
}
