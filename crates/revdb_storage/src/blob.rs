//! Content-addressed blob store.
//!
//! Blobs are keyed by the SHA-256 digest of their contents, so storing the
//! same bytes twice yields the same key and a single copy.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

const KEY_PREFIX: &str = "sha256-";

/// Content hash identifying a blob.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobKey([u8; 32]);

impl BlobKey {
    /// Computes the key for the given contents.
    pub fn for_contents(contents: &[u8]) -> Self {
        Self(Sha256::digest(contents).into())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex digest, used as a file name.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", KEY_PREFIX, self.to_hex())
    }
}

impl fmt::Debug for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobKey({})", self)
    }
}

impl FromStr for BlobKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digest = s
            .strip_prefix(KEY_PREFIX)
            .ok_or_else(|| StorageError::InvalidParameter(format!("not a blob key: {:?}", s)))?;
        let bytes = hex::decode(digest)
            .map_err(|e| StorageError::InvalidParameter(format!("bad blob key {:?}: {}", s, e)))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StorageError::InvalidParameter(format!("bad blob key length: {:?}", s)))?;
        Ok(Self(digest))
    }
}

/// A blob read from a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// The blob's key.
    pub key: BlobKey,
    /// Full contents.
    pub contents: Bytes,
}

impl Blob {
    /// Returns the content length in bytes.
    pub fn len(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Returns true if the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

/// A content-addressed store for large attachments.
///
/// Blob stores are shared between replicator workers, so implementations
/// must be internally synchronized.
pub trait BlobStore: Send + Sync {
    /// Stores `contents` and returns its key. Storing existing contents is
    /// a no-op that returns the same key.
    fn put(&self, contents: &[u8]) -> StorageResult<BlobKey>;

    /// Reads a blob. Missing blobs are [`StorageError::NotFound`].
    fn get(&self, key: &BlobKey) -> StorageResult<Blob>;

    /// Returns a blob's length without reading it.
    fn size(&self, key: &BlobKey) -> StorageResult<u64>;

    /// Deletes a blob. Missing blobs are [`StorageError::NotFound`].
    fn delete(&self, key: &BlobKey) -> StorageResult<()>;

    /// Deletes the whole store. Later operations fail with
    /// [`StorageError::Closed`].
    fn delete_store(&self) -> StorageResult<()>;
}

/// An in-memory blob store.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<Option<HashMap<BlobKey, Bytes>>>,
}

impl InMemoryBlobStore {
    /// Creates a new empty blob store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(Some(HashMap::new())),
        }
    }

    /// Returns the number of stored blobs.
    pub fn count(&self) -> usize {
        self.blobs.read().as_ref().map_or(0, HashMap::len)
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, contents: &[u8]) -> StorageResult<BlobKey> {
        let key = BlobKey::for_contents(contents);
        let mut guard = self.blobs.write();
        let blobs = guard.as_mut().ok_or(StorageError::Closed)?;
        blobs
            .entry(key)
            .or_insert_with(|| Bytes::copy_from_slice(contents));
        Ok(key)
    }

    fn get(&self, key: &BlobKey) -> StorageResult<Blob> {
        let guard = self.blobs.read();
        let blobs = guard.as_ref().ok_or(StorageError::Closed)?;
        blobs
            .get(key)
            .map(|contents| Blob {
                key: *key,
                contents: contents.clone(),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn size(&self, key: &BlobKey) -> StorageResult<u64> {
        self.get(key).map(|blob| blob.len())
    }

    fn delete(&self, key: &BlobKey) -> StorageResult<()> {
        let mut guard = self.blobs.write();
        let blobs = guard.as_mut().ok_or(StorageError::Closed)?;
        blobs
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete_store(&self) -> StorageResult<()> {
        *self.blobs.write() = None;
        Ok(())
    }
}
