//! Durability tests for the SQLite checkpoint saver

use futures::TryStreamExt;
use serde_json::json;
use stategraph_checkpoint::{
    Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSaver, CheckpointSource,
    CheckpointWrites, Interrupt, ListOptions, PendingWrite, SqliteCheckpointSaver, StateValues,
};
use std::collections::BTreeMap;

fn checkpoint(counter: i64, pending: &[&str]) -> Checkpoint {
    let mut values = StateValues::new();
    values.insert("counter".to_string(), json!(counter));
    let mut schema = BTreeMap::new();
    schema.insert("counter".to_string(), "replace".to_string());
    Checkpoint::new(values, pending.iter().map(|s| s.to_string()).collect())
        .with_schema(schema)
        .with_metadata(
            CheckpointMetadata::new()
                .with_source(CheckpointSource::Loop)
                .with_step(counter as i32),
        )
}

#[tokio::test]
async fn test_append_assigns_sequential_ids() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteCheckpointSaver::connect(dir.path().join("cp.db"))
        .await
        .unwrap();

    assert_eq!(saver.append("t1", checkpoint(0, &["a"])).await.unwrap(), 1);
    assert_eq!(saver.append("t1", checkpoint(1, &["b"])).await.unwrap(), 2);
    assert_eq!(saver.append("t2", checkpoint(0, &["a"])).await.unwrap(), 1);

    let latest = saver.latest("t1").await.unwrap().unwrap();
    assert_eq!(latest.id, 2);
    assert_eq!(latest.parent_id, Some(1));
    assert_eq!(latest.pending_nodes, vec!["b".to_string()]);
    assert_eq!(latest.values.get("counter"), Some(&json!(1)));
    assert_eq!(latest.metadata.source, Some(CheckpointSource::Loop));
    assert_eq!(latest.schema.get("counter").map(String::as_str), Some("replace"));

    let first = saver.get("t1", 1).await.unwrap().unwrap();
    assert_eq!(first.parent_id, None);
    assert!(saver.get("t1", 3).await.unwrap().is_none());
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cp.db");
    let payload = json!({"ask": "approve?", "options": ["yes", "no"], "amount": 12.5});

    {
        let saver = SqliteCheckpointSaver::connect(&path).await.unwrap();
        let id = saver.append("t1", checkpoint(3, &["review"])).await.unwrap();
        saver
            .put_writes(
                "t1",
                id,
                CheckpointWrites {
                    pending_writes: vec![PendingWrite::update("audit", json!({"audited": true}))],
                    interrupt: Some(
                        Interrupt::new("review", payload.clone())
                            .with_resume_values(vec![json!("earlier")]),
                    ),
                },
            )
            .await
            .unwrap();
        saver.pool().close().await;
    }

    let reopened = SqliteCheckpointSaver::connect(&path).await.unwrap();
    let latest = reopened.latest("t1").await.unwrap().unwrap();
    let interrupt = latest.interrupt.unwrap();

    assert_eq!(interrupt.node, "review");
    assert_eq!(interrupt.payload, payload);
    assert_eq!(
        serde_json::to_string(&interrupt.payload).unwrap(),
        serde_json::to_string(&payload).unwrap()
    );
    assert_eq!(interrupt.resume_values, vec![json!("earlier")]);
    assert_eq!(latest.pending_writes.len(), 1);
    assert_eq!(latest.pending_writes[0].node, "audit");
}

#[tokio::test]
async fn test_put_writes_unknown_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteCheckpointSaver::connect(dir.path().join("cp.db"))
        .await
        .unwrap();

    let result = saver.put_writes("t1", 7, CheckpointWrites::default()).await;
    assert!(matches!(result, Err(CheckpointError::NotFound(_))));
}

#[tokio::test]
async fn test_history_is_paged_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteCheckpointSaver::connect(dir.path().join("cp.db"))
        .await
        .unwrap();

    for counter in 0..7 {
        saver.append("t1", checkpoint(counter, &["step"])).await.unwrap();
    }

    let all: Vec<Checkpoint> = saver
        .list("t1", ListOptions::new().with_page_size(3))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let ids: Vec<_> = all.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![7, 6, 5, 4, 3, 2, 1]);

    let limited: Vec<Checkpoint> = saver
        .list(
            "t1",
            ListOptions::new().with_page_size(2).with_limit(3).with_before(6),
        )
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let ids: Vec<_> = limited.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![5, 4, 3]);

    let empty: Vec<Checkpoint> = saver
        .history("missing")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_list_threads_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteCheckpointSaver::connect(dir.path().join("cp.db"))
        .await
        .unwrap();

    saver.append("t1", checkpoint(0, &[])).await.unwrap();
    saver.append("t2", checkpoint(0, &["a"])).await.unwrap();
    saver.append("t2", checkpoint(1, &[])).await.unwrap();

    let mut threads = saver.list_threads().await.unwrap();
    threads.sort_by(|a, b| a.thread_id.cmp(&b.thread_id));
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].thread_id, "t1");
    assert_eq!(threads[0].checkpoint_count, 1);
    assert_eq!(threads[1].checkpoint_count, 2);
    assert_eq!(threads[1].latest_checkpoint_id, 2);

    saver.delete_thread("t2").await.unwrap();
    assert!(saver.latest("t2").await.unwrap().is_none());
    assert_eq!(saver.list_threads().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_appends_on_distinct_threads() {
    let dir = tempfile::tempdir().unwrap();
    let saver = SqliteCheckpointSaver::connect(dir.path().join("cp.db"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for thread in 0..4 {
        let saver = saver.clone();
        handles.push(tokio::spawn(async move {
            let thread_id = format!("thread-{thread}");
            for counter in 0..5 {
                saver.append(&thread_id, checkpoint(counter, &["x"])).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for thread in 0..4 {
        let latest = saver.latest(&format!("thread-{thread}")).await.unwrap().unwrap();
        assert_eq!(latest.id, 5);
        assert_eq!(latest.values.get("counter"), Some(&json!(4)));
    }
}
