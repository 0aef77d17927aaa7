//! Records exchanged between the worker and the protocol layer.

use crate::error::ReplResult;
use bytes::Bytes;
use revdb_storage::Sequence;
use std::collections::BTreeSet;

/// A replication checkpoint as read from the local database.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Checkpoint {
    /// Deterministic checkpoint ID for this (peer, configuration).
    pub checkpoint_id: String,
    /// Opaque cursor payload.
    pub data: Vec<u8>,
    /// True if no checkpoint was ever stored for this peer.
    pub db_is_empty: bool,
}

/// Parameters of a change-feed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChangesParams {
    /// Only changes after this sequence.
    pub since: Sequence,
    /// Optional doc-ID allow-list.
    pub doc_ids: Option<BTreeSet<String>>,
    /// Maximum revisions delivered per request, counted after filtering.
    /// Zero means the worker's `changes_batch_size`.
    pub limit: usize,
    /// Keep delivering new changes after catching up.
    pub continuous: bool,
    /// Fill [`Rev::remote_ancestor_rev_id`].
    pub get_foreign_ancestors: bool,
    /// Omit deleted documents.
    pub skip_deleted: bool,
    /// Omit documents whose current revision the remote already has.
    pub skip_foreign: bool,
}

impl GetChangesParams {
    /// Creates one-shot parameters starting after `since`.
    pub fn new(since: Sequence, limit: usize) -> Self {
        Self {
            since,
            doc_ids: None,
            limit: limit.max(1),
            continuous: false,
            get_foreign_ancestors: false,
            skip_deleted: false,
            skip_foreign: false,
        }
    }

    /// Sets continuous mode.
    pub fn continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Restricts the feed to the given document IDs.
    pub fn with_doc_ids<I, T>(mut self, doc_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.doc_ids = Some(doc_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Sets whether deleted documents are omitted.
    pub fn skip_deleted(mut self, skip: bool) -> Self {
        self.skip_deleted = skip;
        self
    }

    /// Sets whether documents already on the remote are omitted.
    pub fn skip_foreign(mut self, skip: bool) -> Self {
        self.skip_foreign = skip;
        self
    }

    /// Sets whether remote ancestor revisions are reported.
    pub fn get_foreign_ancestors(mut self, get: bool) -> Self {
        self.get_foreign_ancestors = get;
        self
    }

    pub(crate) fn allows(&self, doc_id: &str) -> bool {
        self.doc_ids.as_ref().map_or(true, |ids| ids.contains(doc_id))
    }
}

/// One local change considered for pushing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rev {
    /// Document ID.
    pub doc_id: String,
    /// Current revision ID.
    pub rev_id: String,
    /// Local sequence of the change.
    pub sequence: Sequence,
    /// Whether the revision is a deletion.
    pub deleted: bool,
    /// Revision the remote is known to have, if requested and known.
    pub remote_ancestor_rev_id: Option<String>,
    /// Body size in bytes.
    pub body_size: usize,
}

/// One batch delivered to a [`ChangesSink`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeBatch {
    /// Changes in sequence order.
    pub revs: Vec<Rev>,
    /// Highest local sequence covered by this batch, including filtered-out
    /// documents.
    pub last_sequence: Sequence,
}

/// Receiver of change-feed batches (the change-pushing side of a
/// replicator).
///
/// The worker calls this from its own thread, so implementations must not
/// block on the worker.
pub trait ChangesSink: Send + Sync {
    /// Delivers one batch, or the error that ended the feed.
    ///
    /// Each `get_changes` delivers exactly one batch. A batch with fewer
    /// than `limit` revisions (possibly none) means the feed caught up; in
    /// continuous mode later batches then keep arriving until the
    /// connection closes.
    fn got_changes(&self, batch: ReplResult<ChangeBatch>);
}

/// An inbound revision waiting to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevToInsert {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID.
    pub rev_id: String,
    /// Ancestor revision IDs, newest first; `history[0]` is the parent.
    pub history: Vec<String>,
    /// The revision's sequence on the remote.
    pub remote_sequence: String,
    /// Encoded body.
    pub body: Bytes,
    /// Whether the revision is a deletion.
    pub deleted: bool,
    /// Whether the revision came from the remote (recorded as the remote's
    /// known revision).
    pub foreign: bool,
}

impl RevToInsert {
    /// Creates a foreign revision with no history.
    pub fn new(doc_id: impl Into<String>, rev_id: impl Into<String>, body: Bytes) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev_id: rev_id.into(),
            history: Vec::new(),
            remote_sequence: String::new(),
            body,
            deleted: false,
            foreign: true,
        }
    }

    /// Sets the ancestor history, newest first.
    pub fn with_history<I, T>(mut self, history: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.history = history.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the revision as a deletion.
    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    /// Returns the parent revision ID.
    pub fn parent_rev_id(&self) -> Option<&str> {
        self.history.first().map(String::as_str)
    }
}

/// One item of an inbound "changes" or "proposeChanges" message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProposedChange {
    /// Document ID.
    pub doc_id: String,
    /// Proposed revision ID.
    pub rev_id: String,
    /// Parent revision, when the peer includes linkage.
    pub parent_rev_id: Option<String>,
    /// The revision's sequence on the remote.
    pub remote_sequence: String,
    /// Whether the revision is a deletion.
    pub deleted: bool,
    /// Body size in bytes, as announced.
    pub body_size: usize,
}

impl ProposedChange {
    /// Creates a proposed change.
    pub fn new(doc_id: impl Into<String>, rev_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev_id: rev_id.into(),
            ..Self::default()
        }
    }

    /// Sets the parent revision.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_rev_id = Some(parent.into());
        self
    }
}

/// An inbound "changes" or "proposeChanges" message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangesRequest {
    /// Items in the order the peer sent them.
    pub changes: Vec<ProposedChange>,
    /// True when the peer includes parent linkage (proposeChanges).
    pub proposed: bool,
}

/// The worker's answer to one [`ProposedChange`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RevWant {
    /// "Send me this revision."
    pub wanted: bool,
    /// The revision conflicts with the local current revision.
    pub conflict: bool,
    /// Local ancestors the peer may trim from the history it sends.
    pub known_ancestors: Vec<String>,
}

impl RevWant {
    /// The local store already has the revision.
    pub fn skip() -> Self {
        Self::default()
    }
}

/// A request to send one local revision to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevRequest {
    /// The revision to send.
    pub rev: Rev,
    /// Maximum history entries to include.
    pub max_history: usize,
    /// Revision IDs the peer already has.
    pub known_ancestors: Vec<String>,
}

/// An outbound revision ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionMessage {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID.
    pub rev_id: String,
    /// Local sequence.
    pub sequence: Sequence,
    /// Whether the revision is a deletion.
    pub deleted: bool,
    /// Ancestor revision IDs, newest first.
    pub history: Vec<String>,
    /// Encoded body.
    pub body: Bytes,
}

/// Byte-level progress of a revision transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    /// Bytes read so far.
    pub bytes_loaded: u64,
    /// Total bytes to read.
    pub total_bytes: u64,
}

/// Callback receiving [`Progress`] updates.
pub type ProgressCallback = Box<dyn Fn(Progress) + Send>;

/// A checkpoint a passive peer stored in the local database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCheckpoint {
    /// Opaque checkpoint body.
    pub data: Vec<u8>,
    /// Current revision (`<gen>-cc`).
    pub rev: String,
}
