//! The replication database worker.
//!
//! [`DbWorker`] is a handle to an actor that owns the local revision
//! store for one replicator connection. Every operation is turned into a
//! command on an unbounded mailbox and answered through a `oneshot`
//! channel, so callers never block on storage and handlers never overlap.
//! The actor runs on a dedicated thread; storage calls never stall the
//! tokio runtime.
//!
//! ```text
//! protocol layer ──► DbWorker ──► mailbox ──► Actor ──► RevisionStore
//!        ▲                                      │
//!        └──────── Pending<T> / ChangesSink ◄───┘
//! ```

use crate::address::Address;
use crate::checkpoint::{self, CheckpointManager};
use crate::config::ReplicatorOptions;
use crate::cookie::CookieStore;
use crate::error::{ReplError, ReplResult};
use crate::inserter::{FlushFn, PendingInsert, RevisionInserter};
use crate::negotiator::{Decision, RevisionNegotiator};
use crate::types::{
    ChangeBatch, ChangesRequest, ChangesSink, Checkpoint, GetChangesParams, PeerCheckpoint,
    Progress, ProgressCallback, Rev, RevRequest, RevToInsert, RevWant, RevisionMessage,
};
use revdb_storage::{
    generation, BlobStore, ChangeObserver, NewRevision, RemoteId, RevisionStore, Sequence,
    StorageError,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<ReplResult<T>>;

/// The eventual result of a worker operation.
///
/// Resolves to [`ReplError::ConnectionClosed`] if the worker shut down
/// before answering.
#[must_use = "a Pending does nothing unless awaited"]
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<ReplResult<T>>,
}

impl<T> Pending<T> {
    fn new(rx: oneshot::Receiver<ReplResult<T>>) -> Self {
        Self { rx }
    }

    /// Blocks the current thread until the result arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait(self) -> ReplResult<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(ReplError::ConnectionClosed))
    }
}

impl<T> Future for Pending<T> {
    type Output = ReplResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(ReplError::ConnectionClosed)))
    }
}

/// A message in the worker's mailbox.
enum Command {
    GetCheckpoint(Reply<Checkpoint>),
    SetCheckpoint {
        data: Vec<u8>,
        reply: Reply<()>,
    },
    ResetCheckpoint(Reply<()>),
    GetChanges {
        params: GetChangesParams,
        sink: Arc<dyn ChangesSink>,
        reply: Reply<()>,
    },
    FindOrRequestRevs {
        request: ChangesRequest,
        reply: Reply<Vec<RevWant>>,
    },
    SendRevision {
        request: RevRequest,
        on_progress: Option<ProgressCallback>,
        reply: Reply<RevisionMessage>,
    },
    MarkRevsSynced {
        revs: Vec<Rev>,
        reply: Reply<()>,
    },
    SetCookie {
        header: String,
        reply: Reply<bool>,
    },
    GetPeerCheckpoint {
        client_id: String,
        reply: Reply<PeerCheckpoint>,
    },
    SetPeerCheckpoint {
        client_id: String,
        data: Vec<u8>,
        rev: Option<String>,
        reply: Reply<String>,
    },
    InsertRevisionsNow,
    DbChanged,
    ConnectionClosed(Reply<()>),
}

fn respond<T>(reply: Reply<T>, result: ReplResult<T>) {
    // The caller may have dropped its Pending.
    let _ = reply.send(result);
}

/// Handle to a replication database worker.
///
/// Cloning the handle is cheap; all clones talk to the same worker. The
/// worker stops after [`DbWorker::connection_closed`], or once every handle
/// has been dropped.
///
/// # Example
///
/// ```rust
/// use revdb_replicator::{CookieStore, DbWorker, ReplicatorOptions};
/// use revdb_storage::{InMemoryBlobStore, InMemoryRevisionStore};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let worker = DbWorker::spawn(
///     InMemoryRevisionStore::new(),
///     Arc::new(InMemoryBlobStore::new()),
///     Arc::new(CookieStore::new()),
///     ReplicatorOptions::new("wss://sync.example.com/db"),
/// )?;
///
/// let checkpoint = worker.get_checkpoint().await?;
/// assert!(checkpoint.db_is_empty);
///
/// worker.set_checkpoint(b"seq:10".to_vec()).await?;
/// worker.connection_closed().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DbWorker {
    tx: mpsc::UnboundedSender<Command>,
    inserter: Arc<RevisionInserter>,
    cookies: Arc<CookieStore>,
    blobs: Arc<dyn BlobStore>,
    address: Address,
}

impl DbWorker {
    /// Starts a worker for one connection.
    ///
    /// The worker takes ownership of `store` and runs on its own thread. The
    /// current tokio runtime drives the insert debounce timer.
    ///
    /// # Errors
    ///
    /// Returns [`ReplError::InvalidInput`] if the remote URL does not parse or
    /// no tokio runtime is running, and a storage I/O error if the worker
    /// thread cannot be started.
    pub fn spawn<S>(
        store: S,
        blobs: Arc<dyn BlobStore>,
        cookies: Arc<CookieStore>,
        options: ReplicatorOptions,
    ) -> ReplResult<Self>
    where
        S: RevisionStore + 'static,
    {
        let runtime = Handle::try_current()
            .map_err(|e| ReplError::InvalidInput(format!("no tokio runtime: {}", e)))?;
        let address = Address::parse(&options.remote_url)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let weak_tx = tx.downgrade();
        let flush_tx = weak_tx.clone();
        let flush: FlushFn = Arc::new(move || {
            if let Some(tx) = flush_tx.upgrade() {
                let _ = tx.send(Command::InsertRevisionsNow);
            }
        });
        let inserter = Arc::new(RevisionInserter::new(
            runtime.clone(),
            options.insert_batch_size,
            options.insert_delay,
            flush,
        ));

        let actor = Actor {
            checkpoint: CheckpointManager::new(&store, &options),
            store,
            options,
            address: address.clone(),
            inserter: Arc::clone(&inserter),
            cookies: Arc::clone(&cookies),
            rx,
            weak_tx,
            feed: None,
        };
        thread::Builder::new()
            .name("revdb-worker".to_string())
            .spawn(move || actor.run())
            .map_err(|e| ReplError::from(StorageError::Io(e)))?;

        Ok(Self {
            tx,
            inserter,
            cookies,
            blobs,
            address,
        })
    }

    fn enqueue<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Pending<T> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(command(reply)).is_err() {
            debug!(remote = %self.address, "worker closed, operation rejected");
        }
        Pending::new(rx)
    }

    /// Reads the checkpoint for this connection.
    ///
    /// `db_is_empty` is set if no checkpoint was ever saved for the peer.
    /// Storage failures are errors, never a fresh start.
    pub fn get_checkpoint(&self) -> Pending<Checkpoint> {
        self.enqueue(Command::GetCheckpoint)
    }

    /// Saves checkpoint data. Completes once the write is durable.
    pub fn set_checkpoint(&self, data: Vec<u8>) -> Pending<()> {
        self.enqueue(|reply| Command::SetCheckpoint { data, reply })
    }

    /// Deletes the checkpoint so replication restarts from the beginning.
    pub fn reset_checkpoint(&self) -> Pending<()> {
        self.enqueue(Command::ResetCheckpoint)
    }

    /// Runs a change-feed query, delivering one batch of at most
    /// `params.limit` revisions to `sink`.
    ///
    /// A limit of zero means the configured `changes_batch_size`. A full
    /// batch means more changes may follow: ask again from its
    /// `last_sequence`. In continuous mode, once a batch comes back short,
    /// the sink keeps receiving later commits until the connection closes
    /// or another `get_changes` replaces the feed.
    pub fn get_changes(&self, params: GetChangesParams, sink: Arc<dyn ChangesSink>) -> Pending<()> {
        self.enqueue(|reply| Command::GetChanges {
            params,
            sink,
            reply,
        })
    }

    /// Decides which proposed revisions the peer should send.
    ///
    /// Answers come back in input order.
    pub fn find_or_request_revs(&self, request: ChangesRequest) -> Pending<Vec<RevWant>> {
        self.enqueue(|reply| Command::FindOrRequestRevs { request, reply })
    }

    /// Loads a local revision for sending to the peer.
    pub fn send_revision(
        &self,
        request: RevRequest,
        on_progress: Option<ProgressCallback>,
    ) -> Pending<RevisionMessage> {
        self.enqueue(|reply| Command::SendRevision {
            request,
            on_progress,
            reply,
        })
    }

    /// Queues an inbound revision for the next batch commit.
    ///
    /// Resolves to the committed local sequence.
    pub fn insert_revision(&self, rev: RevToInsert) -> Pending<Sequence> {
        Pending::new(self.inserter.queue(rev))
    }

    /// Records that the peer now has the given revisions.
    pub fn mark_revs_synced(&self, revs: Vec<Rev>) -> Pending<()> {
        self.enqueue(|reply| Command::MarkRevsSynced { revs, reply })
    }

    /// Stores a `Set-Cookie` header received from the remote.
    ///
    /// Resolves to false if the header was rejected.
    pub fn set_cookie(&self, header: impl Into<String>) -> Pending<bool> {
        let header = header.into();
        self.enqueue(|reply| Command::SetCookie { header, reply })
    }

    /// Reads the checkpoint a peer saved under `client_id`.
    pub fn get_peer_checkpoint(&self, client_id: impl Into<String>) -> Pending<PeerCheckpoint> {
        let client_id = client_id.into();
        self.enqueue(|reply| Command::GetPeerCheckpoint { client_id, reply })
    }

    /// Saves a peer's checkpoint, resolving to its new revision.
    pub fn set_peer_checkpoint(
        &self,
        client_id: impl Into<String>,
        data: Vec<u8>,
        rev: Option<String>,
    ) -> Pending<String> {
        let client_id = client_id.into();
        self.enqueue(|reply| Command::SetPeerCheckpoint {
            client_id,
            data,
            rev,
            reply,
        })
    }

    /// Tears the worker down.
    ///
    /// Pending revisions are dropped, the change feed stops, and every later
    /// operation fails with [`ReplError::ConnectionClosed`].
    pub fn connection_closed(&self) -> Pending<()> {
        self.enqueue(Command::ConnectionClosed)
    }

    /// Returns true once the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Returns the shared blob store.
    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Returns the shared cookie store.
    pub fn cookie_store(&self) -> &Arc<CookieStore> {
        &self.cookies
    }

    /// Returns the remote address.
    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// The active change feed.
struct Feed {
    params: GetChangesParams,
    sink: Arc<dyn ChangesSink>,
    remote_id: RemoteId,
    last_sequence: Sequence,
    notified: Arc<AtomicBool>,
    _observer: ChangeObserver,
}

/// One batch of the change feed.
struct Scan {
    revs: Vec<Rev>,
    last_sequence: Sequence,
    /// The store had fewer than `limit` matching revisions left.
    caught_up: bool,
}

/// Collects up to `params.limit` revisions after `since` that pass the
/// filters.
///
/// Filtered entries do not count towards the limit. `last_sequence` is the
/// last entry examined, so the next scan resumes right after it.
fn scan_changes<S: RevisionStore + ?Sized>(
    store: &S,
    since: Sequence,
    params: &GetChangesParams,
    remote_id: RemoteId,
    skip_foreign: bool,
) -> ReplResult<Scan> {
    let limit = params.limit.max(1);
    let mut revs = Vec::new();
    let mut last_sequence = since;

    loop {
        let infos = store.changes_since(last_sequence, limit)?;
        let exhausted = infos.len() < limit;
        for info in infos {
            last_sequence = info.sequence;
            if !params.allows(&info.doc_id) || (params.skip_deleted && info.deleted) {
                continue;
            }
            let remote_rev = if skip_foreign || params.get_foreign_ancestors {
                store.remote_revision(&info.doc_id, remote_id)?
            } else {
                None
            };
            if skip_foreign && remote_rev.as_deref() == Some(info.rev_id.as_str()) {
                continue;
            }
            revs.push(Rev {
                doc_id: info.doc_id,
                rev_id: info.rev_id,
                sequence: info.sequence,
                deleted: info.deleted,
                remote_ancestor_rev_id: remote_rev.filter(|_| params.get_foreign_ancestors),
                body_size: info.body_size,
            });
            if revs.len() == limit {
                return Ok(Scan {
                    revs,
                    last_sequence,
                    caught_up: false,
                });
            }
        }
        if exhausted {
            return Ok(Scan {
                revs,
                last_sequence,
                caught_up: true,
            });
        }
    }
}

struct Actor<S> {
    store: S,
    options: ReplicatorOptions,
    address: Address,
    checkpoint: CheckpointManager,
    inserter: Arc<RevisionInserter>,
    cookies: Arc<CookieStore>,
    rx: mpsc::UnboundedReceiver<Command>,
    weak_tx: mpsc::WeakUnboundedSender<Command>,
    feed: Option<Feed>,
}

impl<S: RevisionStore> Actor<S> {
    fn run(mut self) {
        info!(remote = %self.address, checkpoint_id = self.checkpoint.checkpoint_id(), "worker started");
        while let Some(command) = self.rx.blocking_recv() {
            if let Command::ConnectionClosed(reply) = command {
                self.shutdown();
                respond(reply, Ok(()));
                return;
            }
            self.handle(command);
        }
        self.shutdown();
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::GetCheckpoint(reply) => respond(reply, self.checkpoint.read(&self.store)),
            Command::SetCheckpoint { data, reply } => {
                respond(reply, self.checkpoint.write(&self.store, &data))
            }
            Command::ResetCheckpoint(reply) => respond(reply, self.checkpoint.reset(&self.store)),
            Command::GetChanges {
                params,
                sink,
                reply,
            } => respond(reply, self.get_changes(params, sink)),
            Command::FindOrRequestRevs { request, reply } => {
                respond(reply, self.find_or_request_revs(&request))
            }
            Command::SendRevision {
                request,
                on_progress,
                reply,
            } => respond(reply, self.send_revision(&request, on_progress)),
            Command::MarkRevsSynced { revs, reply } => {
                respond(reply, self.mark_revs_synced(&revs))
            }
            Command::SetCookie { header, reply } => respond(
                reply,
                Ok(self.cookies.set_cookie(&header, &self.address.hostname)),
            ),
            Command::GetPeerCheckpoint { client_id, reply } => respond(
                reply,
                checkpoint::get_peer_checkpoint(&self.store, &client_id),
            ),
            Command::SetPeerCheckpoint {
                client_id,
                data,
                rev,
                reply,
            } => respond(
                reply,
                checkpoint::set_peer_checkpoint(&self.store, &client_id, &data, rev.as_deref()),
            ),
            Command::InsertRevisionsNow => self.insert_revisions_now(),
            Command::DbChanged => self.db_changed(),
            Command::ConnectionClosed(reply) => respond(reply, Err(ReplError::ConnectionClosed)),
        }
    }

    fn get_changes(
        &mut self,
        mut params: GetChangesParams,
        sink: Arc<dyn ChangesSink>,
    ) -> ReplResult<()> {
        self.feed = None;
        if params.limit == 0 {
            params.limit = self.options.changes_batch_size.max(1);
        }
        let scan = match self.checkpoint.resolve(&self.store).and_then(|remote_id| {
            scan_changes(&self.store, params.since, &params, remote_id, params.skip_foreign)
        }) {
            Ok(scan) => scan,
            Err(err) => {
                warn!(error = %err, "change feed query failed");
                sink.got_changes(Err(err.clone()));
                return Err(err);
            }
        };

        let since = scan.last_sequence;
        debug!(
            count = scan.revs.len(),
            last_sequence = since,
            caught_up = scan.caught_up,
            "changes delivered"
        );
        sink.got_changes(Ok(ChangeBatch {
            revs: scan.revs,
            last_sequence: since,
        }));
        if params.continuous && scan.caught_up {
            self.start_feed(params, sink, since)?;
        }
        Ok(())
    }

    fn start_feed(
        &mut self,
        params: GetChangesParams,
        sink: Arc<dyn ChangesSink>,
        since: Sequence,
    ) -> ReplResult<()> {
        let remote_id = self.checkpoint.resolve(&self.store)?;
        let notified = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&notified);
        let weak_tx = self.weak_tx.clone();
        let observer = self.store.observe(Box::new(move |_: Sequence| {
            if !flag.swap(true, Ordering::SeqCst) {
                if let Some(tx) = weak_tx.upgrade() {
                    let _ = tx.send(Command::DbChanged);
                }
            }
        }));
        self.feed = Some(Feed {
            params,
            sink,
            remote_id,
            last_sequence: since,
            notified,
            _observer: observer,
        });
        info!(since, "change observer registered");

        // Commits between the last scan and registration were not observed.
        if self.store.last_sequence()? > since {
            self.db_changed();
        }
        Ok(())
    }

    fn db_changed(&mut self) {
        let Some(feed) = self.feed.as_mut() else {
            return;
        };
        feed.notified.store(false, Ordering::SeqCst);

        let failure = loop {
            // Revisions that came from this remote are never echoed back.
            match scan_changes(
                &self.store,
                feed.last_sequence,
                &feed.params,
                feed.remote_id,
                true,
            ) {
                Ok(scan) => {
                    feed.last_sequence = scan.last_sequence;
                    if !scan.revs.is_empty() {
                        debug!(
                            count = scan.revs.len(),
                            last_sequence = scan.last_sequence,
                            "new changes delivered"
                        );
                        feed.sink.got_changes(Ok(ChangeBatch {
                            revs: scan.revs,
                            last_sequence: scan.last_sequence,
                        }));
                    }
                    if scan.caught_up {
                        break None;
                    }
                }
                Err(err) => break Some(err),
            }
        };

        if let Some(err) = failure {
            warn!(error = %err, "continuous change feed stopped");
            feed.sink.got_changes(Err(err));
            self.feed = None;
        }
    }

    fn find_or_request_revs(&self, request: &ChangesRequest) -> ReplResult<Vec<RevWant>> {
        let negotiator = RevisionNegotiator::new(&self.store);
        let mut answers = Vec::with_capacity(request.changes.len());
        let mut requested = 0;

        for change in &request.changes {
            if change.doc_id.is_empty() || generation(&change.rev_id).is_none() {
                warn!(doc_id = %change.doc_id, rev_id = %change.rev_id, "invalid proposed change");
                answers.push(RevWant::skip());
                continue;
            }

            let decision = if request.proposed {
                negotiator.decide(
                    &change.doc_id,
                    &change.rev_id,
                    change.parent_rev_id.as_deref(),
                )?
            } else if negotiator.has_revision(&change.doc_id, &change.rev_id)? {
                Decision::Skip
            } else {
                Decision::Send
            };

            let answer = match decision {
                Decision::Skip => RevWant::skip(),
                Decision::Conflict => RevWant {
                    wanted: true,
                    conflict: true,
                    known_ancestors: Vec::new(),
                },
                Decision::Send => RevWant {
                    wanted: true,
                    conflict: false,
                    known_ancestors: negotiator.find_ancestors(&change.doc_id, &change.rev_id)?,
                },
            };
            if answer.wanted {
                requested += 1;
            }
            answers.push(answer);
        }

        debug!(
            proposed = request.changes.len(),
            requested,
            "negotiated revisions"
        );
        Ok(answers)
    }

    fn send_revision(
        &self,
        request: &RevRequest,
        on_progress: Option<ProgressCallback>,
    ) -> ReplResult<RevisionMessage> {
        let rev = &request.rev;
        let stored = self
            .store
            .get_revision(&rev.doc_id, &rev.rev_id)?
            .ok_or_else(|| ReplError::NotFound(format!("{} {}", rev.doc_id, rev.rev_id)))?;
        let body = stored
            .body
            .ok_or_else(|| ReplError::NotFound(format!("body of {} {}", rev.doc_id, rev.rev_id)))?;

        let total_bytes = body.len() as u64;
        let report = |bytes_loaded| {
            if let Some(callback) = &on_progress {
                callback(Progress {
                    bytes_loaded,
                    total_bytes,
                });
            }
        };
        report(0);

        let max_history = request.max_history.min(self.options.max_history);
        let mut history = Vec::new();
        for ancestor in self
            .store
            .ancestors(&rev.doc_id, &rev.rev_id, max_history)?
        {
            let known = request.known_ancestors.contains(&ancestor);
            history.push(ancestor);
            if known {
                break;
            }
        }

        report(total_bytes);
        debug!(
            doc_id = %rev.doc_id,
            rev_id = %rev.rev_id,
            history = history.len(),
            "revision loaded"
        );
        Ok(RevisionMessage {
            doc_id: stored.doc_id,
            rev_id: stored.rev_id,
            sequence: stored.sequence,
            deleted: stored.deleted,
            history,
            body,
        })
    }

    fn mark_revs_synced(&mut self, revs: &[Rev]) -> ReplResult<()> {
        let remote_id = self.checkpoint.resolve(&self.store)?;
        for rev in revs {
            match self
                .store
                .set_remote_revision(&rev.doc_id, remote_id, &rev.rev_id)
            {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    warn!(doc_id = %rev.doc_id, "synced revision of unknown document");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn insert_revisions_now(&mut self) {
        let batch = self.inserter.take_pending();
        if batch.is_empty() {
            return;
        }
        let remote_id = match self.checkpoint.resolve(&self.store) {
            Ok(id) => id,
            Err(err) => {
                fail_all(batch, &err);
                return;
            }
        };

        let revisions: Vec<NewRevision> = batch
            .iter()
            .map(|entry| to_new_revision(&entry.rev, remote_id))
            .collect();
        match self.store.commit_revisions(&revisions) {
            Ok(results) => {
                let mut results = results.into_iter();
                let mut failed = 0;
                for entry in batch {
                    let result = results.next().unwrap_or_else(|| {
                        Err(StorageError::Corrupted("missing commit result".into()))
                    });
                    if let Err(err) = &result {
                        failed += 1;
                        warn!(doc_id = %entry.rev.doc_id, rev_id = %entry.rev.rev_id, error = %err, "revision rejected");
                    }
                    entry.complete(result.map_err(ReplError::from));
                }
                debug!(count = revisions.len(), failed, "batch committed");
            }
            Err(err) => {
                let err = ReplError::from(err);
                warn!(count = revisions.len(), error = %err, "batch commit failed");
                fail_all(batch, &err);
            }
        }
    }

    fn shutdown(&mut self) {
        self.feed = None;
        let dropped = self.inserter.close();
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "dropping uncommitted revisions");
        }
        fail_all(dropped, &ReplError::ConnectionClosed);

        // Operations queued behind the close see their reply dropped.
        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            drop(command);
        }
        info!(remote = %self.address, "worker closed");
    }
}

fn to_new_revision(rev: &RevToInsert, remote_id: RemoteId) -> NewRevision {
    NewRevision {
        doc_id: rev.doc_id.clone(),
        rev_id: rev.rev_id.clone(),
        history: rev.history.clone(),
        body: rev.body.clone(),
        deleted: rev.deleted,
        remote: rev.foreign.then_some(remote_id),
    }
}

fn fail_all(entries: Vec<PendingInsert>, err: &ReplError) {
    for entry in entries {
        entry.complete(Err(err.clone()));
    }
}
