//! Revision store trait definition.

use crate::error::StorageResult;
use crate::revision::{DocumentInfo, NewRevision, RawDocument, RemoteId, Revision, Sequence};
use std::fmt;
use uuid::Uuid;

/// Callback invoked after a commit with the new last sequence.
pub type ChangeCallback = Box<dyn Fn(Sequence) + Send + Sync>;

/// The document store the replicator reads from and writes to.
///
/// Stores are **revision trees**: each document holds a set of revisions
/// linked to their parents, one of which is current. The replicator never
/// looks inside bodies.
///
/// # Invariants
///
/// - Sequences are assigned in commit order and never reused
/// - `changes_since` lists each document once, at its latest sequence
/// - `commit_revisions` applies all entries in one transaction; a failure of
///   the transaction fails every entry, a rejected entry does not fail others
/// - Observers are notified after the commit is visible to readers
pub trait RevisionStore: Send + Sync {
    /// Returns the database's private UUID (stable for its lifetime).
    fn private_uuid(&self) -> Uuid;

    /// Looks up the numeric ID of a remote database by its address,
    /// assigning one when `create` is true.
    fn remote_id(&self, address: &str, create: bool) -> StorageResult<Option<RemoteId>>;

    /// Reads a raw document; absent documents are `Ok(None)`.
    fn get_raw(&self, store: &str, key: &str) -> StorageResult<Option<RawDocument>>;

    /// Writes a raw document. Returns once the write is durable.
    fn put_raw(&self, store: &str, key: &str, meta: &[u8], body: &[u8]) -> StorageResult<()>;

    /// Deletes a raw document. Deleting an absent document succeeds.
    fn delete_raw(&self, store: &str, key: &str) -> StorageResult<()>;

    /// Returns the sequence of the most recent commit.
    fn last_sequence(&self) -> StorageResult<Sequence>;

    /// Lists documents changed after `since`, in sequence order.
    fn changes_since(&self, since: Sequence, limit: usize) -> StorageResult<Vec<DocumentInfo>>;

    /// Returns the current revision of a document.
    fn get_document(&self, doc_id: &str) -> StorageResult<Option<DocumentInfo>>;

    /// Returns a specific revision of a document.
    fn get_revision(&self, doc_id: &str, rev_id: &str) -> StorageResult<Option<Revision>>;

    /// Returns up to `max` ancestors of `rev_id`, newest first, excluding
    /// `rev_id` itself. An unknown revision has no ancestors.
    fn ancestors(&self, doc_id: &str, rev_id: &str, max: usize) -> StorageResult<Vec<String>>;

    /// Returns the revision the given remote is known to have.
    fn remote_revision(&self, doc_id: &str, remote: RemoteId) -> StorageResult<Option<String>>;

    /// Records the revision the given remote is known to have.
    fn set_remote_revision(&self, doc_id: &str, remote: RemoteId, rev_id: &str)
        -> StorageResult<()>;

    /// Commits a batch of revisions atomically.
    ///
    /// The outer result fails when the transaction cannot be committed; the
    /// inner results carry each entry's sequence or the reason it was
    /// rejected, in input order.
    fn commit_revisions(
        &self,
        revisions: &[NewRevision],
    ) -> StorageResult<Vec<StorageResult<Sequence>>>;

    /// Registers a change observer. Dropping the returned handle
    /// unregisters it.
    fn observe(&self, callback: ChangeCallback) -> ChangeObserver;
}

/// Registration handle for a [`RevisionStore`] change observer.
#[must_use = "dropping the observer unregisters it"]
pub struct ChangeObserver {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl ChangeObserver {
    /// Creates a handle that runs `unregister` when dropped.
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }
}

impl fmt::Debug for ChangeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeObserver")
            .field("registered", &self.unregister.is_some())
            .finish()
    }
}

impl Drop for ChangeObserver {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}
