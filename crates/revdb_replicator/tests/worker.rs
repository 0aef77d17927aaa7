//! Integration tests for the database worker.

use bytes::Bytes;
use parking_lot::Mutex;
use revdb_replicator::{
    ChangeBatch, ChangesRequest, ChangesSink, CookieStore, DbWorker, GetChangesParams, Mode,
    Progress, ProposedChange, ReplError, ReplResult, ReplicatorOptions, Rev, RevRequest,
    RevToInsert, RevWant,
};
use revdb_storage::{
    BlobStore, InMemoryBlobStore, InMemoryRevisionStore, NewRevision, RevisionStore,
};
use std::sync::Arc;
use std::time::Duration;

const REMOTE: &str = "wss://sync.example.com:4984/db";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn options() -> ReplicatorOptions {
    ReplicatorOptions::new(REMOTE)
        .with_push(Mode::Continuous)
        .with_pull(Mode::Continuous)
}

fn spawn_with(store: &InMemoryRevisionStore, options: ReplicatorOptions) -> DbWorker {
    init_tracing();
    DbWorker::spawn(
        store.clone(),
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(CookieStore::new()),
        options,
    )
    .unwrap()
}

fn spawn(store: &InMemoryRevisionStore) -> DbWorker {
    spawn_with(store, options())
}

fn rev(doc_id: &str, rev_id: &str) -> Rev {
    Rev {
        doc_id: doc_id.into(),
        rev_id: rev_id.into(),
        sequence: 0,
        deleted: false,
        remote_ancestor_rev_id: None,
        body_size: 0,
    }
}

/// Commits `1-a`, `2-b`, `3-c` of `doc_id` as one revision with history.
fn commit_history(store: &InMemoryRevisionStore, doc_id: &str) {
    store
        .commit_revisions(&[NewRevision {
            doc_id: doc_id.into(),
            rev_id: "3-c".into(),
            history: vec!["2-b".into(), "1-a".into()],
            body: Bytes::from_static(b"{\"v\":3}"),
            deleted: false,
            remote: None,
        }])
        .unwrap();
}

#[derive(Default)]
struct CollectingSink {
    batches: Mutex<Vec<ReplResult<ChangeBatch>>>,
}

impl CollectingSink {
    fn doc_ids(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .filter_map(|b| b.as_ref().ok())
            .flat_map(|b| b.revs.iter().map(|r| r.doc_id.clone()))
            .collect()
    }

    fn revs(&self) -> Vec<Rev> {
        self.batches
            .lock()
            .iter()
            .filter_map(|b| b.as_ref().ok())
            .flat_map(|b| b.revs.clone())
            .collect()
    }

    fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }
}

impl ChangesSink for CollectingSink {
    fn got_changes(&self, batch: ReplResult<ChangeBatch>) {
        self.batches.lock().push(batch);
    }
}

async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Checkpoints
// ============================================================================

#[tokio::test]
async fn checkpoint_round_trip() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn(&store);

    let checkpoint = worker.get_checkpoint().await.unwrap();
    assert!(checkpoint.db_is_empty);
    assert!(checkpoint.data.is_empty());
    assert!(checkpoint.checkpoint_id.starts_with("cp-"));

    worker.set_checkpoint(b"seq:17".to_vec()).await.unwrap();
    let checkpoint = worker.get_checkpoint().await.unwrap();
    assert!(!checkpoint.db_is_empty);
    assert_eq!(checkpoint.data, b"seq:17");

    worker.reset_checkpoint().await.unwrap();
    assert!(worker.get_checkpoint().await.unwrap().db_is_empty);
}

#[tokio::test]
async fn checkpoint_persists_across_connections() {
    let store = InMemoryRevisionStore::new();
    let first = spawn(&store);
    let id = first.get_checkpoint().await.unwrap().checkpoint_id;
    first.set_checkpoint(b"seq:5".to_vec()).await.unwrap();
    first.connection_closed().await.unwrap();

    let second = spawn(&store);
    let checkpoint = second.get_checkpoint().await.unwrap();
    assert_eq!(checkpoint.checkpoint_id, id);
    assert_eq!(checkpoint.data, b"seq:5");

    let other = spawn_with(&store, options().with_doc_ids(["only-this"]));
    let checkpoint = other.get_checkpoint().await.unwrap();
    assert_ne!(checkpoint.checkpoint_id, id);
    assert!(checkpoint.db_is_empty);
}

#[tokio::test]
async fn checkpoint_read_failure_is_surfaced() {
    let store = InMemoryRevisionStore::new();
    store.fail_raw_reads(true);
    let worker = spawn(&store);

    let err = worker.get_checkpoint().await.unwrap_err();
    assert!(matches!(err, ReplError::Storage { .. }));

    store.fail_raw_reads(false);
    assert_eq!(worker.get_checkpoint().await.unwrap_err(), err);
}

#[tokio::test]
async fn concurrent_checkpoint_requests_share_resolution() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn(&store);

    let pending: Vec<_> = (0..5).map(|_| worker.get_checkpoint()).collect();
    let mut ids = Vec::new();
    for p in pending {
        ids.push(p.await.unwrap().checkpoint_id);
    }
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.remote_id(REMOTE, false).unwrap(), Some(1));
    assert_eq!(store.remote_id("wss://other/db", true).unwrap(), Some(2));
}

// ============================================================================
// Change feed
// ============================================================================

#[tokio::test]
async fn one_shot_changes_one_batch_per_request() {
    let store = InMemoryRevisionStore::new();
    for doc in ["a", "b", "c"] {
        store.put_local(doc, doc.as_bytes().to_vec()).unwrap();
    }
    let worker = spawn(&store);
    let sink = Arc::new(CollectingSink::default());

    worker
        .get_changes(GetChangesParams::new(0, 2), sink.clone())
        .await
        .unwrap();
    assert_eq!(sink.doc_ids(), vec!["a", "b"]);
    assert_eq!(sink.batch_count(), 1);
    let first = sink.batches.lock()[0].clone().unwrap();
    assert_eq!(first.last_sequence, 2);

    worker
        .get_changes(GetChangesParams::new(first.last_sequence, 2), sink.clone())
        .await
        .unwrap();
    assert_eq!(sink.doc_ids(), vec!["a", "b", "c"]);
    assert_eq!(sink.batch_count(), 2);
    let last = sink.batches.lock().last().cloned().unwrap().unwrap();
    assert_eq!(last.last_sequence, 3);
}

#[tokio::test]
async fn filtered_changes_do_not_count_towards_limit() {
    let store = InMemoryRevisionStore::new();
    for doc in ["a", "b", "c", "d", "e"] {
        store.put_local(doc, b"{}".to_vec()).unwrap();
    }
    store.delete_local("b").unwrap();
    store.delete_local("c").unwrap();
    let worker = spawn(&store);
    let sink = Arc::new(CollectingSink::default());

    let params = GetChangesParams::new(0, 2).skip_deleted(true);
    worker.get_changes(params, sink.clone()).await.unwrap();
    assert_eq!(sink.doc_ids(), vec!["a", "d"]);
    assert_eq!(sink.batch_count(), 1);
}

#[tokio::test]
async fn zero_limit_uses_configured_batch_size() {
    let store = InMemoryRevisionStore::new();
    for doc in ["a", "b", "c"] {
        store.put_local(doc, b"{}".to_vec()).unwrap();
    }
    let worker = spawn_with(&store, options().with_changes_batch_size(2));
    let sink = Arc::new(CollectingSink::default());

    let params = GetChangesParams {
        since: 0,
        doc_ids: None,
        limit: 0,
        continuous: false,
        get_foreign_ancestors: false,
        skip_deleted: false,
        skip_foreign: false,
    };
    tokio::time::timeout(Duration::from_secs(5), worker.get_changes(params, sink.clone()))
        .await
        .expect("get_changes with a zero limit must complete")
        .unwrap();
    assert_eq!(sink.doc_ids(), vec!["a", "b"]);

    tokio::time::timeout(Duration::from_secs(5), worker.connection_closed())
        .await
        .expect("worker must stay responsive")
        .unwrap();
}

#[tokio::test]
async fn continuous_feed_waits_for_short_batch() {
    let store = InMemoryRevisionStore::new();
    store.put_local("a", b"{}".to_vec()).unwrap();
    store.put_local("b", b"{}".to_vec()).unwrap();
    let worker = spawn(&store);
    let sink = Arc::new(CollectingSink::default());

    let params = GetChangesParams::new(0, 2).continuous(true);
    worker.get_changes(params.clone(), sink.clone()).await.unwrap();
    assert_eq!(sink.doc_ids(), vec!["a", "b"]);
    assert_eq!(store.observer_count(), 0);

    let params = GetChangesParams { since: 2, ..params };
    worker.get_changes(params, sink.clone()).await.unwrap();
    assert_eq!(sink.batch_count(), 2);
    assert_eq!(store.observer_count(), 1);

    store.put_local("c", b"{}".to_vec()).unwrap();
    wait_for(|| sink.doc_ids().len() == 3).await;
    assert_eq!(sink.doc_ids(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn changes_filters() {
    let store = InMemoryRevisionStore::new();
    for doc in ["a", "b", "c"] {
        store.put_local(doc, b"{}".to_vec()).unwrap();
    }
    store.delete_local("b").unwrap();
    let worker = spawn(&store);

    let sink = Arc::new(CollectingSink::default());
    let params = GetChangesParams::new(0, 100).skip_deleted(true);
    worker.get_changes(params, sink.clone()).await.unwrap();
    assert_eq!(sink.doc_ids(), vec!["a", "c"]);

    let sink = Arc::new(CollectingSink::default());
    let params = GetChangesParams::new(0, 100).with_doc_ids(["b", "c"]);
    worker.get_changes(params, sink.clone()).await.unwrap();
    assert_eq!(sink.doc_ids(), vec!["c", "b"]);
    assert!(sink.revs()[1].deleted);

    let sink = Arc::new(CollectingSink::default());
    worker
        .get_changes(GetChangesParams::new(3, 100), sink.clone())
        .await
        .unwrap();
    assert_eq!(sink.doc_ids(), vec!["b"]);
}

#[tokio::test]
async fn foreign_revisions_skipped_and_reported() {
    let store = InMemoryRevisionStore::new();
    let a1 = store.put_local("a", b"1".to_vec()).unwrap();
    let b1 = store.put_local("b", b"1".to_vec()).unwrap();
    let b2 = store.put_local("b", b"2".to_vec()).unwrap();
    let worker = spawn(&store);

    worker
        .mark_revs_synced(vec![rev("a", &a1), rev("b", &b1), rev("missing", "1-x")])
        .await
        .unwrap();

    let sink = Arc::new(CollectingSink::default());
    let params = GetChangesParams::new(0, 100)
        .skip_foreign(true)
        .get_foreign_ancestors(true);
    worker.get_changes(params, sink.clone()).await.unwrap();

    let revs = sink.revs();
    assert_eq!(revs.len(), 1);
    assert_eq!(revs[0].doc_id, "b");
    assert_eq!(revs[0].rev_id, b2);
    assert_eq!(revs[0].remote_ancestor_rev_id.as_deref(), Some(b1.as_str()));
}

#[tokio::test]
async fn continuous_changes_follow_commits() {
    let store = InMemoryRevisionStore::new();
    store.put_local("a", b"{}".to_vec()).unwrap();
    let worker = spawn(&store);
    let sink = Arc::new(CollectingSink::default());

    let params = GetChangesParams::new(0, 10).continuous(true);
    worker.get_changes(params, sink.clone()).await.unwrap();
    assert_eq!(sink.doc_ids(), vec!["a"]);
    assert_eq!(store.observer_count(), 1);

    store.put_local("b", b"{}".to_vec()).unwrap();
    store.put_local("c", b"{}".to_vec()).unwrap();
    wait_for(|| sink.doc_ids().len() == 3).await;
    assert_eq!(sink.doc_ids(), vec!["a", "b", "c"]);

    // Pulled revisions are not pushed back.
    worker
        .insert_revision(RevToInsert::new("pulled", "1-p", Bytes::from_static(b"{}")))
        .await
        .unwrap();
    store.put_local("d", b"{}".to_vec()).unwrap();
    wait_for(|| sink.doc_ids().len() == 4).await;
    assert_eq!(sink.doc_ids(), vec!["a", "b", "c", "d"]);

    worker.connection_closed().await.unwrap();
    assert_eq!(store.observer_count(), 0);
    store.put_local("e", b"{}".to_vec()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.doc_ids().len(), 4);
}

#[tokio::test]
async fn continuous_changes_respect_limit() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn(&store);
    let sink = Arc::new(CollectingSink::default());

    let params = GetChangesParams::new(0, 2).continuous(true);
    worker.get_changes(params, sink.clone()).await.unwrap();

    for i in 0..5 {
        store.put_local(&format!("doc{}", i), b"{}".to_vec()).unwrap();
    }
    wait_for(|| sink.doc_ids().len() == 5).await;
    assert_eq!(sink.doc_ids(), vec!["doc0", "doc1", "doc2", "doc3", "doc4"]);
    assert!(sink
        .batches
        .lock()
        .iter()
        .all(|b| b.as_ref().map_or(true, |b| b.revs.len() <= 2)));
}

// ============================================================================
// Negotiation
// ============================================================================

#[tokio::test]
async fn proposed_changes_answered_in_order() {
    let store = InMemoryRevisionStore::new();
    commit_history(&store, "doc");
    let worker = spawn(&store);

    let request = ChangesRequest {
        changes: vec![
            ProposedChange::new("doc", "4-d").with_parent("3-c"),
            ProposedChange::new("doc", "2-b").with_parent("1-a"),
            ProposedChange::new("doc", "4-e").with_parent("9-x"),
            ProposedChange::new("", "1-a"),
            ProposedChange::new("doc", "not-a-rev"),
            ProposedChange::new("new", "1-n"),
        ],
        proposed: true,
    };
    let answers = worker.find_or_request_revs(request).await.unwrap();

    assert_eq!(answers.len(), 6);
    assert_eq!(
        answers[0],
        RevWant {
            wanted: true,
            conflict: false,
            known_ancestors: vec!["3-c".into(), "2-b".into(), "1-a".into()],
        }
    );
    assert_eq!(answers[1], RevWant::skip());
    assert!(answers[2].wanted);
    assert!(answers[2].conflict);
    assert_eq!(answers[3], RevWant::skip());
    assert_eq!(answers[4], RevWant::skip());
    assert!(answers[5].wanted);
    assert!(answers[5].known_ancestors.is_empty());
}

#[tokio::test]
async fn announced_changes_request_missing_revisions() {
    let store = InMemoryRevisionStore::new();
    commit_history(&store, "doc");
    let worker = spawn(&store);

    let request = ChangesRequest {
        changes: vec![
            ProposedChange::new("doc", "3-c"),
            ProposedChange::new("doc", "5-z"),
        ],
        proposed: false,
    };
    let answers = worker.find_or_request_revs(request).await.unwrap();
    assert!(!answers[0].wanted);
    assert!(answers[1].wanted);
    assert!(!answers[1].conflict);
    assert_eq!(answers[1].known_ancestors, vec!["3-c", "2-b", "1-a"]);
}

#[tokio::test]
async fn send_revision_trims_history() {
    let store = InMemoryRevisionStore::new();
    let r1 = store.put_local("doc", b"one".to_vec()).unwrap();
    let r2 = store.put_local("doc", b"two".to_vec()).unwrap();
    let r3 = store.put_local("doc", b"three".to_vec()).unwrap();
    let worker = spawn(&store);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&progress);
    let request = RevRequest {
        rev: rev("doc", &r3),
        max_history: 20,
        known_ancestors: vec![r2.clone()],
    };
    let message = worker
        .send_revision(
            request,
            Some(Box::new(move |p: Progress| recorder.lock().push(p))),
        )
        .await
        .unwrap();

    assert_eq!(message.rev_id, r3);
    assert_eq!(message.sequence, 3);
    assert_eq!(&message.body[..], b"three");
    assert_eq!(message.history, vec![r2.clone()]);
    assert_eq!(
        *progress.lock(),
        vec![
            Progress {
                bytes_loaded: 0,
                total_bytes: 5
            },
            Progress {
                bytes_loaded: 5,
                total_bytes: 5
            },
        ]
    );

    let request = RevRequest {
        rev: rev("doc", &r3),
        max_history: 20,
        known_ancestors: Vec::new(),
    };
    let message = worker.send_revision(request, None).await.unwrap();
    assert_eq!(message.history, vec![r2.clone(), r1]);

    let request = RevRequest {
        rev: rev("doc", &r3),
        max_history: 1,
        known_ancestors: Vec::new(),
    };
    let message = worker.send_revision(request, None).await.unwrap();
    assert_eq!(message.history, vec![r2]);
}

#[tokio::test]
async fn send_missing_revision_fails() {
    let store = InMemoryRevisionStore::new();
    commit_history(&store, "doc");
    let worker = spawn(&store);

    let request = RevRequest {
        rev: rev("doc", "9-nope"),
        max_history: 20,
        known_ancestors: Vec::new(),
    };
    let err = worker.send_revision(request, None).await.unwrap_err();
    assert!(err.is_not_found());

    // Ancestor stubs carry no body.
    let request = RevRequest {
        rev: rev("doc", "2-b"),
        max_history: 20,
        known_ancestors: Vec::new(),
    };
    assert!(worker.send_revision(request, None).await.unwrap_err().is_not_found());
}

// ============================================================================
// Batched inserts
// ============================================================================

#[tokio::test]
async fn inserts_commit_as_one_batch() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn_with(&store, options().with_insert_delay(Duration::from_millis(20)));

    let mut pending = Vec::new();
    for doc in ["a", "b", "c", "d"] {
        pending.push(worker.insert_revision(RevToInsert::new(doc, "1-x", Bytes::from_static(b"{}"))));
    }
    pending.push(worker.insert_revision(
        RevToInsert::new("a", "2-y", Bytes::from_static(b"{}")).with_history(["1-x"]),
    ));

    let mut sequences = Vec::new();
    for p in pending {
        sequences.push(p.await.unwrap());
    }
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

    let log = store.commit_log();
    assert_eq!(log.len(), 1);
    let ids: Vec<_> = log[0].iter().map(|(doc, rev)| format!("{}@{}", doc, rev)).collect();
    assert_eq!(ids, vec!["a@1-x", "b@1-x", "c@1-x", "d@1-x", "a@2-y"]);
    assert_eq!(store.get_document("a").unwrap().unwrap().rev_id, "2-y");
}

#[tokio::test]
async fn inserts_flush_at_batch_size() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn_with(
        &store,
        options()
            .with_insert_batch_size(3)
            .with_insert_delay(Duration::from_secs(60)),
    );

    let pending: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|doc| worker.insert_revision(RevToInsert::new(*doc, "1-x", Bytes::new())))
        .collect();
    for p in pending {
        tokio::time::timeout(Duration::from_secs(5), p)
            .await
            .expect("batch was not flushed")
            .unwrap();
    }
    assert_eq!(store.commit_log().len(), 1);
}

#[tokio::test]
async fn failed_batch_fails_every_entry() {
    let store = InMemoryRevisionStore::new();
    store.fail_commits(true);
    let worker = spawn_with(&store, options().with_insert_delay(Duration::from_millis(10)));

    let a = worker.insert_revision(RevToInsert::new("a", "1-x", Bytes::new()));
    let b = worker.insert_revision(RevToInsert::new("b", "1-x", Bytes::new()));
    assert!(matches!(a.await, Err(ReplError::Storage { .. })));
    assert!(matches!(b.await, Err(ReplError::Storage { .. })));
    assert!(store.get_document("a").unwrap().is_none());
}

#[tokio::test]
async fn rejected_revision_does_not_fail_batch() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn_with(&store, options().with_insert_delay(Duration::from_millis(10)));

    let bad = worker.insert_revision(RevToInsert::new("a", "garbage", Bytes::new()));
    let good = worker.insert_revision(RevToInsert::new("b", "1-x", Bytes::new()));
    assert!(matches!(bad.await, Err(ReplError::InvalidInput(_))));
    assert_eq!(good.await.unwrap(), 1);
}

#[tokio::test]
async fn foreign_inserts_record_remote_revision() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn_with(&store, options().with_insert_delay(Duration::from_millis(10)));

    worker
        .insert_revision(RevToInsert::new("pulled", "1-p", Bytes::new()))
        .await
        .unwrap();
    let remote = store.remote_id(REMOTE, false).unwrap().unwrap();
    assert_eq!(
        store.remote_revision("pulled", remote).unwrap().as_deref(),
        Some("1-p")
    );
}

struct ThreadSink {
    threads: Mutex<Vec<Option<String>>>,
}

impl ChangesSink for ThreadSink {
    fn got_changes(&self, _batch: ReplResult<ChangeBatch>) {
        let name = std::thread::current().name().map(str::to_string);
        self.threads.lock().push(name);
    }
}

#[tokio::test]
async fn storage_work_runs_off_the_runtime_thread() {
    let store = InMemoryRevisionStore::new();
    store.put_local("a", b"{}".to_vec()).unwrap();
    let worker = spawn(&store);
    let sink = Arc::new(ThreadSink {
        threads: Mutex::new(Vec::new()),
    });

    worker
        .get_changes(GetChangesParams::new(0, 10), sink.clone())
        .await
        .unwrap();
    let threads = sink.threads.lock().clone();
    assert_eq!(threads, vec![Some("revdb-worker".to_string())]);
    assert_ne!(std::thread::current().name(), Some("revdb-worker"));
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn pending_inserts_dropped_on_close() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn_with(&store, options().with_insert_delay(Duration::from_secs(60)));

    let pending = worker.insert_revision(RevToInsert::new("a", "1-x", Bytes::new()));
    worker.connection_closed().await.unwrap();

    assert_eq!(pending.await, Err(ReplError::ConnectionClosed));
    assert!(store.get_document("a").unwrap().is_none());
    assert!(store.commit_log().is_empty());
}

#[tokio::test]
async fn operations_after_close_rejected() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn(&store);
    let queued = worker.get_checkpoint();
    worker.connection_closed().await.unwrap();
    assert!(queued.await.is_ok());
    assert!(worker.is_closed());

    assert_eq!(
        worker
            .insert_revision(RevToInsert::new("a", "1-x", Bytes::new()))
            .await,
        Err(ReplError::ConnectionClosed)
    );
    assert_eq!(
        worker.get_checkpoint().await.unwrap_err(),
        ReplError::ConnectionClosed
    );
    assert_eq!(
        worker.set_cookie("a=1").await,
        Err(ReplError::ConnectionClosed)
    );
    assert_eq!(
        worker.connection_closed().await,
        Err(ReplError::ConnectionClosed)
    );
}

#[tokio::test]
async fn operations_queued_behind_close_rejected() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn(&store);
    let close = worker.connection_closed();
    let late = worker.get_checkpoint();

    close.await.unwrap();
    assert_eq!(late.await.unwrap_err(), ReplError::ConnectionClosed);
}

// ============================================================================
// Peer checkpoints, cookies and blobs
// ============================================================================

#[tokio::test]
async fn peer_checkpoints() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn(&store);

    assert!(worker
        .get_peer_checkpoint("client-1")
        .await
        .unwrap_err()
        .is_not_found());

    let rev1 = worker
        .set_peer_checkpoint("client-1", b"{\"local\":4}".to_vec(), None)
        .await
        .unwrap();
    assert_eq!(rev1, "1-cc");
    let rev2 = worker
        .set_peer_checkpoint("client-1", b"{\"local\":9}".to_vec(), Some(rev1.clone()))
        .await
        .unwrap();
    assert_eq!(rev2, "2-cc");

    let stale = worker
        .set_peer_checkpoint("client-1", b"{}".to_vec(), Some(rev1))
        .await;
    assert!(matches!(stale, Err(ReplError::Conflict(_))));

    let checkpoint = worker.get_peer_checkpoint("client-1").await.unwrap();
    assert_eq!(checkpoint.data, b"{\"local\":9}");
    assert_eq!(checkpoint.rev, "2-cc");
}

#[tokio::test]
async fn set_cookie_uses_remote_host() {
    let store = InMemoryRevisionStore::new();
    let worker = spawn(&store);

    assert!(worker.set_cookie("session=abc; Path=/db").await.unwrap());
    assert!(!worker.set_cookie("bogus").await.unwrap());
    assert!(!worker
        .set_cookie("evil=1; Domain=attacker.com")
        .await
        .unwrap());

    let cookies = worker.cookie_store();
    assert_eq!(cookies.cookies().len(), 1);
    assert_eq!(cookies.cookies()[0].domain, "sync.example.com");
    assert_eq!(cookies.cookies_for_request(worker.address()), "session=abc");
    assert!(cookies.changed());
}

#[tokio::test]
async fn blob_store_is_shared() {
    let blobs = Arc::new(InMemoryBlobStore::new());
    let store = InMemoryRevisionStore::new();
    let worker = DbWorker::spawn(
        store,
        blobs.clone(),
        Arc::new(CookieStore::new()),
        options(),
    )
    .unwrap();

    let key = worker.blob_store().put(b"attachment").unwrap();
    assert_eq!(blobs.get(&key).unwrap().len(), 10);
}

#[test]
fn spawn_requires_runtime_and_valid_url() {
    let store = InMemoryRevisionStore::new();
    let result = DbWorker::spawn(
        store.clone(),
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(CookieStore::new()),
        options(),
    );
    assert!(matches!(result, Err(ReplError::InvalidInput(_))));

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let result = DbWorker::spawn(
        store,
        Arc::new(InMemoryBlobStore::new()),
        Arc::new(CookieStore::new()),
        ReplicatorOptions::new("not a url"),
    );
    assert!(matches!(result, Err(ReplError::InvalidInput(_))));
}

#[test]
fn blocking_wait_from_sync_code() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryRevisionStore::new();
    let worker = {
        let _guard = runtime.enter();
        spawn(&store)
    };

    worker.set_checkpoint(b"sync".to_vec()).wait().unwrap();
    assert_eq!(worker.get_checkpoint().wait().unwrap().data, b"sync");
}
