//! Integration tests for ptstream.

#![allow(clippy::expect_used)]

use ptstream::cli::{Cli, Commands, execute};
use ptstream::core::{Chunk, StreamBody, StreamId, StreamRecord, StreamStatus};
use ptstream::error::{Error, Result, StorageError};
use ptstream::storage::{ChunkStore, SqliteStore, StorageStats};
use ptstream::streaming::{
    Admission, ChannelSink, ChunkAppender, CoordinatorConfig, NullSink, Reclaimer,
    StreamCoordinator,
};
use ptstream::http::ResponseStatus;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tempfile::TempDir;
use test_case::test_case;

/// Helper to create a file-backed store.
fn create_test_store() -> (Arc<SqliteStore>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("streams.db");
    let store = SqliteStore::open(&db_path).expect("Failed to open store");
    store.init().expect("Failed to init store");
    (Arc::new(store), temp_dir)
}

async fn speak(words: Vec<&'static str>, append: ChunkAppender) -> anyhow::Result<()> {
    for word in words {
        append.append(word).await?;
    }
    Ok(())
}

/// Store whose chunk writes start failing after a number of successes.
/// A gated store also parks every chunk write until it is released.
struct FailingStore {
    inner: SqliteStore,
    appends_left: AtomicUsize,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    entered: AtomicBool,
    status_reads_fail: AtomicBool,
}

impl FailingStore {
    fn new(appends_allowed: usize) -> Self {
        let inner = SqliteStore::in_memory().expect("Failed to open store");
        inner.init().expect("Failed to init store");
        Self {
            inner,
            appends_left: AtomicUsize::new(appends_allowed),
            gate: None,
            entered: AtomicBool::new(false),
            status_reads_fail: AtomicBool::new(false),
        }
    }

    fn gated(release: mpsc::Receiver<()>) -> Self {
        Self {
            gate: Some(Mutex::new(release)),
            ..Self::new(usize::MAX)
        }
    }
}

impl ChunkStore for FailingStore {
    fn create_stream(&self) -> Result<StreamId> {
        self.inner.create_stream()
    }

    fn append_chunk(&self, id: &StreamId, text: &str, is_final: bool) -> Result<()> {
        if let Some(gate) = &self.gate {
            self.entered.store(true, Ordering::SeqCst);
            let _ = gate.lock().recv_timeout(Duration::from_secs(2));
        }
        let left = self.appends_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StorageError::Database("disk full".to_string()).into());
        }
        self.appends_left.store(left - 1, Ordering::SeqCst);
        self.inner.append_chunk(id, text, is_final)
    }

    fn set_status(&self, id: &StreamId, status: StreamStatus) -> Result<()> {
        self.inner.set_status(id, status)
    }

    fn fail_if_active(&self, id: &StreamId) -> Result<bool> {
        self.inner.fail_if_active(id)
    }

    fn get_status(&self, id: &StreamId) -> Result<StreamStatus> {
        if self.status_reads_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Database("database is locked".to_string()).into());
        }
        self.inner.get_status(id)
    }

    fn get_body(&self, id: &StreamId) -> Result<StreamBody> {
        self.inner.get_body(id)
    }

    fn try_begin(&self, id: &StreamId) -> Result<bool> {
        self.inner.try_begin(id)
    }

    fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<StreamId>> {
        self.inner.reclaim_stale(older_than)
    }

    fn get_chunks(&self, id: &StreamId) -> Result<Vec<Chunk>> {
        self.inner.get_chunks(id)
    }

    fn list_streams(&self, status: Option<StreamStatus>) -> Result<Vec<StreamRecord>> {
        self.inner.list_streams(status)
    }

    fn stats(&self) -> Result<StorageStats> {
        self.inner.stats()
    }
}

// ==================== Coordinator scenarios ====================

#[tokio::test]
async fn test_hello_world_streams_and_persists() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    let (sink, body) = ChannelSink::channel();
    let task = coordinator
        .begin_stream(&id, |a| speak(vec!["Hello ", "World."], a), sink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted");

    assert_eq!(body.read_to_string().await, "Hello World.");
    task.wait().await.expect("run failed");

    let stored = store.get_body(&id).expect("get_body failed");
    assert_eq!(stored.text, "Hello World.");
    assert_eq!(stored.status, StreamStatus::Done);
}

#[tokio::test]
async fn test_text_survives_reopen() {
    let (store, temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    coordinator
        .begin_stream(&id, |a| speak(vec!["Kept. ", "Also kept."], a), NullSink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await
        .expect("run failed");
    drop(coordinator);
    drop(store);

    let reopened = SqliteStore::open(temp.path().join("streams.db")).expect("reopen failed");
    let body = reopened.get_body(&id).expect("get_body failed");
    assert_eq!(body.text, "Kept. Also kept.");
    assert_eq!(body.status, StreamStatus::Done);
}

#[tokio::test]
async fn test_producer_error_after_one_fragment() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    let err = coordinator
        .begin_stream(
            &id,
            |append| async move {
                append.append("A").await?;
                anyhow::bail!("upstream closed")
            },
            NullSink,
        )
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await
        .expect_err("run should fail");
    assert!(matches!(err, Error::Producer(_)));

    let body = store.get_body(&id).expect("get_body failed");
    assert_eq!(body.status, StreamStatus::Error);
    assert_eq!(body.text, "A");
}

#[test_case(StreamStatus::Streaming ; "streaming")]
#[test_case(StreamStatus::Done ; "done")]
#[test_case(StreamStatus::Error ; "error")]
#[test_case(StreamStatus::Timeout ; "timeout")]
#[tokio::test]
async fn test_non_pending_stream_is_refused(status: StreamStatus) {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");
    store.set_status(&id, status).expect("set_status failed");

    let calls = Arc::new(AtomicUsize::new(0));
    let producer_calls = Arc::clone(&calls);
    let admission = coordinator
        .begin_stream(
            &id,
            move |append| async move {
                producer_calls.fetch_add(1, Ordering::SeqCst);
                append.append("must not appear.").await?;
                Ok(())
            },
            NullSink,
        )
        .expect("begin failed");

    assert!(matches!(admission, Admission::AlreadyStarted));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.get_status(&id).expect("get_status failed"), status);
    assert!(store.get_chunks(&id).expect("get_chunks failed").is_empty());
}

#[tokio::test]
async fn test_concurrent_begins_admit_exactly_one() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    let mut handles = Vec::new();
    for i in 0..8 {
        let coordinator = coordinator.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let words = vec![if i % 2 == 0 { "even." } else { "odd." }];
            coordinator
                .begin_stream(&id, move |a| speak(words, a), NullSink)
                .expect("begin failed")
                .into_task()
        }));
    }

    let mut started = Vec::new();
    for handle in handles {
        if let Some(task) = handle.await.expect("join failed") {
            started.push(task);
        }
    }
    assert_eq!(started.len(), 1);
    for task in started {
        task.wait().await.expect("run failed");
    }

    let body = store.get_body(&id).expect("get_body failed");
    assert!(body.text == "even." || body.text == "odd.");
}

#[tokio::test]
async fn test_store_failure_marks_error() {
    let store = Arc::new(FailingStore::new(0));
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    let (sink, body) = ChannelSink::channel();
    let err = coordinator
        .begin_stream(&id, |a| speak(vec!["First. ", "Second."], a), sink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await
        .expect_err("run should fail");
    assert!(matches!(err, Error::Storage(StorageError::Database(_))));

    // The live consumer saw the first fragment, then the body ended.
    assert_eq!(body.read_to_string().await, "First. ");
    assert_eq!(
        store.get_status(&id).expect("get_status failed"),
        StreamStatus::Error
    );
}

#[tokio::test]
async fn test_final_write_failure_marks_error() {
    // One chunk may be written; the final (empty) one fails.
    let store = Arc::new(FailingStore::new(1));
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    let result = coordinator
        .begin_stream(&id, |a| speak(vec!["Only."], a), NullSink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await;
    assert!(result.is_err());

    let body = store.get_body(&id).expect("get_body failed");
    assert_eq!(body.status, StreamStatus::Error);
    assert_eq!(body.text, "Only.");
}

#[tokio::test]
async fn test_slow_store_write_does_not_block_runtime() {
    let (release, gate) = mpsc::channel();
    let store = Arc::new(FailingStore::gated(gate));
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    let task = coordinator
        .begin_stream(&id, |a| speak(vec!["Parked."], a), NullSink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted");

    // This test runs on a single-threaded runtime: it only gets to run
    // again while the write is parked if the write is off the runtime.
    while !store.entered.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!task.is_finished());

    // One release for the sentence chunk, one for the final chunk.
    release.send(()).expect("gate closed");
    release.send(()).expect("gate closed");
    task.wait().await.expect("run failed");

    let body = store.get_body(&id).expect("get_body failed");
    assert_eq!(body.text, "Parked.");
    assert_eq!(body.status, StreamStatus::Done);
}

#[tokio::test]
async fn test_unreadable_final_status_publishes_done() {
    let store = Arc::new(FailingStore::new(usize::MAX));
    store.status_reads_fail.store(true, Ordering::SeqCst);
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");
    let mut updates = coordinator.subscribe(id.clone());

    coordinator
        .begin_stream(&id, |a| speak(vec!["Fine."], a), NullSink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await
        .expect("run failed");

    let mut last = None;
    while let Some(Some(update)) = updates.changed().await {
        let terminal = update.status.is_terminal();
        last = Some(update.status);
        if terminal {
            break;
        }
    }
    assert_eq!(last, Some(StreamStatus::Done));
    let body = store.get_body(&id).expect("get_body failed");
    assert_eq!(body.status, StreamStatus::Done);
}

#[tokio::test]
async fn test_sweep_mid_run_survives_producer_failure() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");
    let reclaimer = Reclaimer::new(store.clone())
        .stale_after(Duration::ZERO)
        .with_hub(coordinator.hub().clone());

    let err = coordinator
        .begin_stream(
            &id,
            move |append| async move {
                append.append("Said. ").await?;
                append.append("half").await?;
                reclaimer.sweep()?;
                anyhow::bail!("connection reset")
            },
            NullSink,
        )
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await
        .expect_err("run should fail");
    assert!(matches!(err, Error::Producer(_)));

    let body = store.get_body(&id).expect("get_body failed");
    assert_eq!(body.status, StreamStatus::Timeout);
    assert_eq!(body.text, "Said. half");
}

#[tokio::test]
async fn test_dropped_client_does_not_lose_text() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");

    let (sink, body) = ChannelSink::channel();
    drop(body);

    let summary = coordinator
        .begin_stream(&id, |a| speak(vec!["Nobody ", "listens."], a), sink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await
        .expect("run failed");
    assert!(summary.sink_failed);

    let body = store.get_body(&id).expect("get_body failed");
    assert_eq!(body.text, "Nobody listens.");
    assert_eq!(body.status, StreamStatus::Done);
}

#[tokio::test]
async fn test_readers_see_prefixes_mid_flight() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store.clone());
    let id = coordinator.create_stream().expect("create failed");
    let full = "One. Two. Three. Four.";

    let (step_tx, mut step_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let (ack_tx, mut ack_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    let task = coordinator
        .begin_stream(
            &id,
            move |append| async move {
                for word in ["One. ", "Two. ", "Three. ", "Four."] {
                    append.append(word).await?;
                    ack_tx.send(())?;
                    if step_rx.recv().await.is_none() {
                        break;
                    }
                }
                Ok(())
            },
            NullSink,
        )
        .expect("begin failed")
        .into_task()
        .expect("should be admitted");

    let mut previous = String::new();
    for _ in 0..4 {
        ack_rx.recv().await.expect("producer stopped early");
        let body = coordinator.read_body(Some(&id)).expect("read failed");
        assert!(full.starts_with(&body.text));
        assert!(body.text.starts_with(&previous));
        assert!(!body.is_final());
        previous = body.text;
        step_tx.send(()).expect("producer gone");
    }

    task.wait().await.expect("run failed");
    assert_eq!(
        coordinator.read_body(Some(&id)).expect("read failed").text,
        full
    );
}

#[tokio::test]
async fn test_byte_threshold_policy_batches() {
    let (store, _temp) = create_test_store();
    let config = CoordinatorConfig::from_policy_spec("bytes:4").expect("bad policy");
    let coordinator = StreamCoordinator::with_config(store.clone(), config);
    let id = coordinator.create_stream().expect("create failed");

    coordinator
        .begin_stream(&id, |a| speak(vec!["ab", "cd", "ef"], a), NullSink)
        .expect("begin failed")
        .into_task()
        .expect("should be admitted")
        .wait()
        .await
        .expect("run failed");

    let chunks: Vec<String> = store
        .get_chunks(&id)
        .expect("get_chunks failed")
        .into_iter()
        .map(|c| c.text)
        .collect();
    assert_eq!(chunks, vec!["abcd", "ef"]);
}

#[tokio::test]
async fn test_second_http_request_gets_205() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store);
    let id = coordinator.create_stream().expect("create failed");

    let first = coordinator
        .stream_response(&id, vec!["Hi."], speak)
        .expect("first request failed");
    let second = coordinator
        .stream_response(&id, vec!["Again."], speak)
        .expect("second request failed");

    assert_eq!(first.status, ResponseStatus::Ok);
    assert_eq!(second.code(), 205);
    assert_eq!(second.body.read_to_string().await, "");
    assert_eq!(first.body.read_to_string().await, "Hi.");
}

#[tokio::test]
async fn test_unknown_stream_request() {
    let (store, _temp) = create_test_store();
    let coordinator = StreamCoordinator::new(store);
    let err = coordinator
        .stream_response(&StreamId::new("missing"), vec!["x"], speak)
        .expect_err("should not be found");
    assert!(err.is_not_found());
}

#[test]
fn test_ui_read_without_stream() {
    let (store, _temp) = create_test_store();
    let body = store.read_body(None).expect("read failed");
    assert_eq!(body, StreamBody::empty());
    assert_eq!(body.status, StreamStatus::Pending);
}

// ==================== CLI ====================

fn cli(db_path: &std::path::Path, command: Commands) -> Cli {
    Cli {
        db_path: Some(db_path.to_path_buf()),
        verbose: false,
        format: "json".to_string(),
        command,
    }
}

#[test]
fn test_cli_workflow() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("cli.db");
    let input = temp_dir.path().join("input.txt");
    std::fs::write(&input, "First line. Second line!").expect("write failed");

    execute(&cli(&db_path, Commands::Init { force: false })).expect("init failed");

    let created: serde_json::Value =
        serde_json::from_str(&execute(&cli(&db_path, Commands::Create)).expect("create failed"))
            .expect("invalid json");
    let id = created["id"].as_str().expect("missing id").to_string();
    assert_eq!(created["status"], "pending");

    let run = Commands::Run {
        id: id.clone(),
        file: Some(input.clone()),
        policy: "sentence".to_string(),
        delay_ms: 0,
    };
    execute(&cli(&db_path, run)).expect("run failed");

    // A stream runs once.
    let rerun = Commands::Run {
        id: id.clone(),
        file: Some(input),
        policy: "sentence".to_string(),
        delay_ms: 0,
    };
    let err = execute(&cli(&db_path, rerun)).expect_err("second run should fail");
    assert!(err.to_string().contains("already started"));

    let shown: serde_json::Value = serde_json::from_str(
        &execute(&cli(
            &db_path,
            Commands::Show {
                id: id.clone(),
                chunks: true,
            },
        ))
        .expect("show failed"),
    )
    .expect("invalid json");
    assert_eq!(shown["text"], "First line. Second line!");
    assert_eq!(shown["status"], "done");
    assert!(shown["chunks"].as_array().expect("missing chunks").len() >= 2);

    let listed: serde_json::Value = serde_json::from_str(
        &execute(&cli(
            &db_path,
            Commands::List {
                status: Some("done".to_string()),
            },
        ))
        .expect("list failed"),
    )
    .expect("invalid json");
    assert_eq!(listed.as_array().expect("not an array").len(), 1);

    let stats: serde_json::Value =
        serde_json::from_str(&execute(&cli(&db_path, Commands::Stats)).expect("stats failed"))
            .expect("invalid json");
    assert_eq!(stats["stream_count"], 1);
    assert_eq!(stats["done"], 1);
}

#[test]
fn test_cli_watch_finished_stream() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("watch.db");
    execute(&cli(&db_path, Commands::Init { force: false })).expect("init failed");

    let store = SqliteStore::open(&db_path).expect("open failed");
    let id = store.create_stream().expect("create failed");
    store.append_chunk(&id, "Finished.", true).expect("append failed");

    let out = execute(&cli(
        &db_path,
        Commands::Watch {
            id: id.to_string(),
            interval_ms: 10,
        },
    ))
    .expect("watch failed");
    let json: serde_json::Value = serde_json::from_str(&out).expect("invalid json");
    assert_eq!(json["text"], "Finished.");
    assert_eq!(json["status"], "done");
}

// ==================== Property tests ====================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// The persisted text is the concatenation of every fragment, in
        /// order, whatever the policy.
        #[test]
        fn prop_persisted_text_is_concatenation(
            fragments in prop::collection::vec("[a-z .!?\n]{0,8}", 0..20),
            policy in prop::sample::select(vec!["sentence", "bytes:5", "every", "sentence+bytes:3"]),
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            let store = SqliteStore::in_memory().expect("store");
            store.init().expect("init");
            let store = Arc::new(store);
            let config = CoordinatorConfig::from_policy_spec(policy).expect("policy");
            let coordinator = StreamCoordinator::with_config(store.clone(), config);
            let id = coordinator.create_stream().expect("create");
            let expected = fragments.concat();

            runtime.block_on(async {
                let (sink, body) = ChannelSink::channel();
                let task = coordinator
                    .begin_stream(
                        &id,
                        move |append| async move {
                            for fragment in fragments {
                                append.append(fragment).await?;
                            }
                            Ok(())
                        },
                        sink,
                    )
                    .expect("begin")
                    .into_task()
                    .expect("admitted");
                let live = body.read_to_string().await;
                task.wait().await.expect("run");
                assert_eq!(live, expected);
            });

            let stored = store.get_body(&id).expect("get_body");
            prop_assert_eq!(stored.text, expected);
            prop_assert_eq!(stored.status, StreamStatus::Done);
        }
    }
}
