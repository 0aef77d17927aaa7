//! In-memory revision store for testing.

use crate::error::{StorageError, StorageResult};
use crate::revision::{
    generation, DocumentInfo, NewRevision, RawDocument, RemoteId, Revision, Sequence,
};
use crate::store::{ChangeCallback, ChangeObserver, RevisionStore};
use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::ops::Bound;
use std::sync::Arc;
use uuid::Uuid;

type SharedCallback = Arc<dyn Fn(Sequence) + Send + Sync>;

#[derive(Debug, Clone)]
struct RevNode {
    rev_id: String,
    parent: Option<usize>,
    sequence: Sequence,
    deleted: bool,
    body: Option<Bytes>,
}

#[derive(Debug, Default)]
struct DocRecord {
    revs: Vec<RevNode>,
    current: usize,
    sequence: Sequence,
    remote_revs: HashMap<RemoteId, String>,
}

impl DocRecord {
    fn find(&self, rev_id: &str) -> Option<usize> {
        self.revs.iter().position(|r| r.rev_id == rev_id)
    }

    fn is_leaf(&self, idx: usize) -> bool {
        !self.revs.iter().any(|r| r.parent == Some(idx))
    }

    /// Winner: live beats deleted, then higher generation, then higher ID.
    fn pick_current(&mut self) {
        let winner = (0..self.revs.len())
            .filter(|&i| self.is_leaf(i) && self.revs[i].body.is_some())
            .max_by(|&a, &b| {
                let (ra, rb) = (&self.revs[a], &self.revs[b]);
                (!ra.deleted, generation(&ra.rev_id), &ra.rev_id).cmp(&(
                    !rb.deleted,
                    generation(&rb.rev_id),
                    &rb.rev_id,
                ))
            });
        if let Some(winner) = winner {
            self.current = winner;
        }
    }

    fn info(&self, doc_id: &str) -> DocumentInfo {
        let current = &self.revs[self.current];
        DocumentInfo {
            doc_id: doc_id.to_string(),
            rev_id: current.rev_id.clone(),
            sequence: self.sequence,
            deleted: current.deleted,
            body_size: current.body.as_ref().map_or(0, |b| b.len()),
        }
    }
}

#[derive(Default)]
struct Inner {
    last_sequence: Sequence,
    docs: HashMap<String, DocRecord>,
    by_sequence: BTreeMap<Sequence, String>,
    raw: HashMap<(String, String), RawDocument>,
    remotes: Vec<String>,
    observers: Vec<(u64, SharedCallback)>,
    next_observer_id: u64,
    commit_log: Vec<Vec<(String, String)>>,
    fail_raw_reads: bool,
    fail_commits: bool,
}

impl Inner {
    fn insert(&mut self, rev: &NewRevision) -> StorageResult<Sequence> {
        if rev.doc_id.is_empty() {
            return Err(StorageError::InvalidParameter("empty document ID".into()));
        }
        let gen = generation(&rev.rev_id).ok_or_else(|| {
            StorageError::InvalidParameter(format!("bad revision ID {:?}", rev.rev_id))
        })?;
        let mut below = gen;
        for ancestor in &rev.history {
            match generation(ancestor) {
                Some(g) if g < below => below = g,
                _ => {
                    return Err(StorageError::InvalidParameter(format!(
                        "bad history entry {:?} for {:?}",
                        ancestor, rev.rev_id
                    )))
                }
            }
        }

        let doc = self.docs.entry(rev.doc_id.clone()).or_default();
        if let Some(existing) = doc.find(&rev.rev_id) {
            if let Some(remote) = rev.remote {
                doc.remote_revs.insert(remote, rev.rev_id.clone());
            }
            return Ok(doc.revs[existing].sequence);
        }

        let common = rev.history.iter().position(|r| doc.find(r).is_some());
        let (mut parent, missing) = match common {
            Some(i) => (doc.find(&rev.history[i]), &rev.history[..i]),
            None => (None, &rev.history[..]),
        };
        for ancestor in missing.iter().rev() {
            doc.revs.push(RevNode {
                rev_id: ancestor.clone(),
                parent,
                sequence: 0,
                deleted: false,
                body: None,
            });
            parent = Some(doc.revs.len() - 1);
        }

        self.last_sequence += 1;
        let sequence = self.last_sequence;
        doc.revs.push(RevNode {
            rev_id: rev.rev_id.clone(),
            parent,
            sequence,
            deleted: rev.deleted,
            body: Some(rev.body.clone()),
        });
        doc.pick_current();

        let previous = std::mem::replace(&mut doc.sequence, sequence);
        if previous != 0 {
            self.by_sequence.remove(&previous);
        }
        self.by_sequence.insert(sequence, rev.doc_id.clone());

        if let Some(remote) = rev.remote {
            doc.remote_revs.insert(remote, rev.rev_id.clone());
        }
        Ok(sequence)
    }
}

/// An in-memory revision store.
///
/// Clones share the same underlying database, so a test can keep a handle
/// while a worker owns another. All access goes through one `RwLock`.
///
/// # Example
///
/// ```rust
/// use revdb_storage::{InMemoryRevisionStore, RevisionStore};
///
/// let store = InMemoryRevisionStore::new();
/// let rev_id = store.put_local("doc1", b"{}".to_vec()).unwrap();
/// assert_eq!(store.get_document("doc1").unwrap().unwrap().rev_id, rev_id);
/// ```
#[derive(Clone)]
pub struct InMemoryRevisionStore {
    uuid: Uuid,
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRevisionStore {
    /// Creates a new empty store with a random private UUID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Creates a local revision on top of the document's current revision.
    ///
    /// Returns the new revision ID (`<gen>-<digest>`).
    pub fn put_local(&self, doc_id: &str, body: Vec<u8>) -> StorageResult<String> {
        self.write_local(doc_id, body, false)
    }

    /// Creates a local deletion on top of the document's current revision.
    pub fn delete_local(&self, doc_id: &str) -> StorageResult<String> {
        self.write_local(doc_id, Vec::new(), true)
    }

    fn write_local(&self, doc_id: &str, body: Vec<u8>, deleted: bool) -> StorageResult<String> {
        let current = self.get_document(doc_id)?;
        let (gen, history) = match &current {
            Some(info) => {
                let mut history = vec![info.rev_id.clone()];
                history.extend(self.ancestors(doc_id, &info.rev_id, usize::MAX)?);
                (generation(&info.rev_id).unwrap_or(0) + 1, history)
            }
            None => (1, Vec::new()),
        };

        let mut hasher = Sha256::new();
        if let Some(parent) = history.first() {
            hasher.update(parent.as_bytes());
        }
        hasher.update([u8::from(deleted)]);
        hasher.update(&body);
        let rev_id = format!("{}-{}", gen, hex::encode(&hasher.finalize()[..8]));

        let revision = NewRevision {
            doc_id: doc_id.to_string(),
            rev_id: rev_id.clone(),
            history,
            body: Bytes::from(body),
            deleted,
            remote: None,
        };
        let mut results = self.commit_revisions(std::slice::from_ref(&revision))?;
        results.remove(0)?;
        Ok(rev_id)
    }

    /// Makes every raw read fail with a corruption error.
    pub fn fail_raw_reads(&self, fail: bool) {
        self.inner.write().fail_raw_reads = fail;
    }

    /// Makes every commit transaction fail with an I/O error.
    pub fn fail_commits(&self, fail: bool) {
        self.inner.write().fail_commits = fail;
    }

    /// Returns the (doc ID, rev ID) pairs of every commit transaction so far.
    pub fn commit_log(&self) -> Vec<Vec<(String, String)>> {
        self.inner.read().commit_log.clone()
    }

    /// Returns the number of registered change observers.
    pub fn observer_count(&self) -> usize {
        self.inner.read().observers.len()
    }

    /// Returns the IDs of all leaf revisions of a document.
    pub fn leaf_revisions(&self, doc_id: &str) -> Vec<String> {
        let inner = self.inner.read();
        inner.docs.get(doc_id).map_or_else(Vec::new, |doc| {
            (0..doc.revs.len())
                .filter(|&i| doc.is_leaf(i))
                .map(|i| doc.revs[i].rev_id.clone())
                .collect()
        })
    }
}

impl Default for InMemoryRevisionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RevisionStore for InMemoryRevisionStore {
    fn private_uuid(&self) -> Uuid {
        self.uuid
    }

    fn remote_id(&self, address: &str, create: bool) -> StorageResult<Option<RemoteId>> {
        let mut inner = self.inner.write();
        if let Some(pos) = inner.remotes.iter().position(|a| a == address) {
            return Ok(Some(pos as RemoteId + 1));
        }
        if !create {
            return Ok(None);
        }
        inner.remotes.push(address.to_string());
        Ok(Some(inner.remotes.len() as RemoteId))
    }

    fn get_raw(&self, store: &str, key: &str) -> StorageResult<Option<RawDocument>> {
        let inner = self.inner.read();
        if inner.fail_raw_reads {
            return Err(StorageError::Corrupted(format!(
                "unreadable raw document {}/{}",
                store, key
            )));
        }
        Ok(inner.raw.get(&(store.to_string(), key.to_string())).cloned())
    }

    fn put_raw(&self, store: &str, key: &str, meta: &[u8], body: &[u8]) -> StorageResult<()> {
        let doc = RawDocument {
            key: key.to_string(),
            meta: meta.to_vec(),
            body: body.to_vec(),
        };
        self.inner
            .write()
            .raw
            .insert((store.to_string(), key.to_string()), doc);
        Ok(())
    }

    fn delete_raw(&self, store: &str, key: &str) -> StorageResult<()> {
        self.inner
            .write()
            .raw
            .remove(&(store.to_string(), key.to_string()));
        Ok(())
    }

    fn last_sequence(&self) -> StorageResult<Sequence> {
        Ok(self.inner.read().last_sequence)
    }

    fn changes_since(&self, since: Sequence, limit: usize) -> StorageResult<Vec<DocumentInfo>> {
        let inner = self.inner.read();
        inner
            .by_sequence
            .range((Bound::Excluded(since), Bound::Unbounded))
            .take(limit)
            .map(|(_, doc_id)| {
                inner
                    .docs
                    .get(doc_id)
                    .map(|doc| doc.info(doc_id))
                    .ok_or_else(|| {
                        StorageError::Corrupted(format!("sequence index points at {:?}", doc_id))
                    })
            })
            .collect()
    }

    fn get_document(&self, doc_id: &str) -> StorageResult<Option<DocumentInfo>> {
        Ok(self.inner.read().docs.get(doc_id).map(|doc| doc.info(doc_id)))
    }

    fn get_revision(&self, doc_id: &str, rev_id: &str) -> StorageResult<Option<Revision>> {
        let inner = self.inner.read();
        Ok(inner.docs.get(doc_id).and_then(|doc| {
            doc.find(rev_id).map(|idx| {
                let node = &doc.revs[idx];
                Revision {
                    doc_id: doc_id.to_string(),
                    rev_id: node.rev_id.clone(),
                    sequence: node.sequence,
                    deleted: node.deleted,
                    body: node.body.clone(),
                }
            })
        }))
    }

    fn ancestors(&self, doc_id: &str, rev_id: &str, max: usize) -> StorageResult<Vec<String>> {
        let inner = self.inner.read();
        let Some(doc) = inner.docs.get(doc_id) else {
            return Ok(Vec::new());
        };
        let mut result = Vec::new();
        let mut cursor = doc.find(rev_id).and_then(|idx| doc.revs[idx].parent);
        while let Some(idx) = cursor {
            if result.len() >= max {
                break;
            }
            result.push(doc.revs[idx].rev_id.clone());
            cursor = doc.revs[idx].parent;
        }
        Ok(result)
    }

    fn remote_revision(&self, doc_id: &str, remote: RemoteId) -> StorageResult<Option<String>> {
        let inner = self.inner.read();
        Ok(inner
            .docs
            .get(doc_id)
            .and_then(|doc| doc.remote_revs.get(&remote).cloned()))
    }

    fn set_remote_revision(
        &self,
        doc_id: &str,
        remote: RemoteId,
        rev_id: &str,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write();
        let doc = inner
            .docs
            .get_mut(doc_id)
            .ok_or_else(|| StorageError::NotFound(doc_id.to_string()))?;
        doc.remote_revs.insert(remote, rev_id.to_string());
        Ok(())
    }

    fn commit_revisions(
        &self,
        revisions: &[NewRevision],
    ) -> StorageResult<Vec<StorageResult<Sequence>>> {
        let (results, callbacks, last_sequence, advanced) = {
            let mut inner = self.inner.write();
            if inner.fail_commits {
                return Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "transaction commit failed",
                )));
            }
            let before = inner.last_sequence;
            let results: Vec<_> = revisions.iter().map(|rev| inner.insert(rev)).collect();
            inner.commit_log.push(
                revisions
                    .iter()
                    .map(|r| (r.doc_id.clone(), r.rev_id.clone()))
                    .collect(),
            );
            let callbacks: Vec<SharedCallback> =
                inner.observers.iter().map(|(_, cb)| Arc::clone(cb)).collect();
            (results, callbacks, inner.last_sequence, inner.last_sequence > before)
        };

        if advanced {
            tracing::trace!(last_sequence, observers = callbacks.len(), "notifying observers");
            for callback in callbacks {
                callback(last_sequence);
            }
        }
        Ok(results)
    }

    fn observe(&self, callback: ChangeCallback) -> ChangeObserver {
        let id = {
            let mut inner = self.inner.write();
            let id = inner.next_observer_id;
            inner.next_observer_id += 1;
            inner.observers.push((id, Arc::from(callback)));
            id
        };
        let weak = Arc::downgrade(&self.inner);
        ChangeObserver::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.write().observers.retain(|(other, _)| *other != id);
            }
        })
    }
}
