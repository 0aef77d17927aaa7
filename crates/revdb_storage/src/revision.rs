//! Revision and document records exchanged with a [`crate::RevisionStore`].

use bytes::Bytes;

/// A local database sequence number. Zero means "before the first change".
pub type Sequence = u64;

/// Storage-assigned numeric ID of a remote database.
pub type RemoteId = u32;

/// Returns the generation of a revision ID (`"3-abc"` → `3`).
///
/// Returns `None` if the ID has no numeric prefix or the generation is zero.
pub fn generation(rev_id: &str) -> Option<u32> {
    let (gen, digest) = rev_id.split_once('-')?;
    if digest.is_empty() {
        return None;
    }
    gen.parse::<u32>().ok().filter(|g| *g > 0)
}

/// Summary of a document's current (winning) revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Document ID.
    pub doc_id: String,
    /// Current revision ID.
    pub rev_id: String,
    /// Sequence at which the current revision was committed.
    pub sequence: Sequence,
    /// Whether the current revision is a deletion.
    pub deleted: bool,
    /// Size of the current revision's body in bytes.
    pub body_size: usize,
}

/// A single stored revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID.
    pub rev_id: String,
    /// Sequence at which it was committed (0 for ancestor stubs).
    pub sequence: Sequence,
    /// Whether this revision is a deletion.
    pub deleted: bool,
    /// Encoded body; `None` when only the revision ID is known.
    pub body: Option<Bytes>,
}

/// A revision to be committed by [`crate::RevisionStore::commit_revisions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRevision {
    /// Document ID.
    pub doc_id: String,
    /// Revision ID of the new revision.
    pub rev_id: String,
    /// Ancestor revision IDs, newest first; `history[0]` is the parent.
    pub history: Vec<String>,
    /// Encoded body.
    pub body: Bytes,
    /// Whether the revision is a deletion.
    pub deleted: bool,
    /// Remote this revision came from. When set the store records it as
    /// the remote's known revision of the document.
    pub remote: Option<RemoteId>,
}

/// A non-versioned document kept in a named raw store (checkpoints).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawDocument {
    /// Key within the raw store.
    pub key: String,
    /// Metadata, e.g. a revision string.
    pub meta: Vec<u8>,
    /// Opaque body.
    pub body: Vec<u8>,
}
