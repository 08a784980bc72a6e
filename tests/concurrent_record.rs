//! Concurrency tests for the event store
//!
//! The central correctness property: concurrent record() calls for the
//! same subject must all persist, and the counter must equal the event
//! log length, with no updates lost to read-increment-write races.

use linkhub::analytics::models::{ClickEvent, Device, GeoLocation};
use linkhub::storage::{SqliteStorage, Storage};
use std::sync::Arc;

async fn setup() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn event(timestamp: i64) -> ClickEvent {
    ClickEvent {
        timestamp,
        device: Device::Mobile,
        os: "iOS".to_string(),
        browser: "Safari".to_string(),
        location: GeoLocation::unknown(),
        referrer: None,
        source_ip: Some("203.0.113.1".parse().unwrap()),
    }
}

#[tokio::test]
async fn test_fifty_concurrent_records_against_one_subject() {
    let storage = setup().await;

    let mut handles = Vec::new();
    for i in 0..50_i64 {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            storage
                .record_click(1, &event(1_700_000_000 + i), &format!("fp-{i}"))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let record = storage.get_record(1).await.unwrap();
    assert_eq!(record.total_clicks, 50);
    assert_eq!(record.events.len(), 50);
    assert_eq!(record.unique_visitors, 50);
}

#[tokio::test]
async fn test_concurrent_records_with_one_shared_fingerprint() {
    let storage = setup().await;

    let mut handles = Vec::new();
    for i in 0..20_i64 {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            storage
                .record_click(1, &event(1_700_000_000 + i), "same-visitor")
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let record = storage.get_record(1).await.unwrap();
    assert_eq!(record.total_clicks, 20);
    // Twenty racing clicks, one visitor
    assert_eq!(record.unique_visitors, 1);
}

#[tokio::test]
async fn test_concurrent_records_across_subjects_stay_independent() {
    let storage = setup().await;

    let mut handles = Vec::new();
    for i in 0..40_i64 {
        let storage = Arc::clone(&storage);
        let link_id = 1 + (i % 2);
        handles.push(tokio::spawn(async move {
            storage
                .record_click(link_id, &event(1_700_000_000 + i), &format!("fp-{i}"))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for link_id in [1, 2] {
        let record = storage.get_record(link_id).await.unwrap();
        assert_eq!(record.total_clicks, 20);
        assert_eq!(record.events.len(), 20);
    }
}
