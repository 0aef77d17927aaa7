//! Revision negotiation.
//!
//! Decides, for a revision proposed by the peer, whether the local database
//! needs it, and which local ancestors the peer may skip sending.

use crate::config::MAX_POSSIBLE_ANCESTORS;
use revdb_storage::{generation, RevisionStore, StorageResult};

/// Outcome of negotiating one proposed revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// New revision building on the local current one.
    Send,
    /// Already present locally.
    Skip,
    /// Builds on something other than the local current revision.
    Conflict,
}

/// Revision negotiation over a [`RevisionStore`].
///
/// Holds no state of its own; every answer is derived from the store.
pub struct RevisionNegotiator<'a, S: RevisionStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RevisionStore + ?Sized> RevisionNegotiator<'a, S> {
    /// Creates a negotiator reading from `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns true if `rev_id` of `doc_id` exists locally.
    pub fn has_revision(&self, doc_id: &str, rev_id: &str) -> StorageResult<bool> {
        Ok(self.store.get_revision(doc_id, rev_id)?.is_some())
    }

    /// Decides what to do with a proposed revision.
    ///
    /// A document whose current revision is a deletion may be recreated
    /// without a parent.
    pub fn decide(
        &self,
        doc_id: &str,
        rev_id: &str,
        parent_rev_id: Option<&str>,
    ) -> StorageResult<Decision> {
        if self.has_revision(doc_id, rev_id)? {
            return Ok(Decision::Skip);
        }
        let current = self.store.get_document(doc_id)?;
        let decision = match (current, parent_rev_id) {
            (None, None) => Decision::Send,
            (None, Some(_)) => Decision::Conflict,
            (Some(doc), Some(parent)) if doc.rev_id == parent => Decision::Send,
            (Some(doc), None) if doc.deleted => Decision::Send,
            (Some(_), _) => Decision::Conflict,
        };
        Ok(decision)
    }

    /// Returns local revisions of `doc_id` the peer might already have,
    /// newest first: the first revisions of the current branch with a
    /// generation below `rev_id`'s, at most [`MAX_POSSIBLE_ANCESTORS`].
    ///
    /// When local history is ahead of `rev_id`, the walk skips the newer
    /// generations first.
    pub fn find_ancestors(&self, doc_id: &str, rev_id: &str) -> StorageResult<Vec<String>> {
        let Some(current) = self.store.get_document(doc_id)? else {
            return Ok(Vec::new());
        };
        let limit = generation(rev_id).unwrap_or(u32::MAX);
        let newer = generation(&current.rev_id)
            .map_or(0, |g| g.saturating_add(1).saturating_sub(limit) as usize);

        let mut chain = vec![current.rev_id.clone()];
        chain.extend(self.store.ancestors(
            doc_id,
            &current.rev_id,
            newer.saturating_add(MAX_POSSIBLE_ANCESTORS),
        )?);
        Ok(chain
            .into_iter()
            .filter(|rev| generation(rev).is_some_and(|g| g < limit))
            .take(MAX_POSSIBLE_ANCESTORS)
            .collect())
    }
}
