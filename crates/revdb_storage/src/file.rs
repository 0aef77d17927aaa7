//! Directory-backed blob store.

use crate::blob::{Blob, BlobKey, BlobStore};
use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use parking_lot::RwLock;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const BLOB_EXTENSION: &str = "blob";

/// A blob store keeping one file per blob in a directory.
///
/// # Durability
///
/// New blobs are written to a uniquely named temporary file, synced with
/// `sync_all()` and renamed into place, so a reader never observes a
/// partial blob.
///
/// # Thread Safety
///
/// The store can be shared across threads. Concurrent puts of the same
/// contents each write their own temporary file. A lock serializes writers
/// against `delete_store`.
///
/// # Example
///
/// ```no_run
/// use revdb_storage::{BlobStore, FileBlobStore};
/// use std::path::Path;
///
/// let store = FileBlobStore::open(Path::new("attachments"), true).unwrap();
/// let key = store.put(b"large attachment").unwrap();
/// assert_eq!(store.size(&key).unwrap(), 16);
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
    deleted: RwLock<bool>,
}

impl FileBlobStore {
    /// Opens a blob store directory, creating it when `create` is true.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the directory is missing and
    /// `create` is false, or an I/O error.
    pub fn open(dir: &Path, create: bool) -> StorageResult<Self> {
        if create {
            fs::create_dir_all(dir)?;
        } else if !dir.is_dir() {
            return Err(StorageError::NotFound(dir.display().to_string()));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            deleted: RwLock::new(false),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &BlobKey) -> PathBuf {
        self.dir.join(key.to_hex()).with_extension(BLOB_EXTENSION)
    }

    fn check_open(&self) -> StorageResult<()> {
        if *self.deleted.read() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }

    fn map_missing(key: &BlobKey, err: io::Error) -> StorageError {
        if err.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, contents: &[u8]) -> StorageResult<BlobKey> {
        let deleted = self.deleted.read();
        if *deleted {
            return Err(StorageError::Closed);
        }

        let key = BlobKey::for_contents(contents);
        let path = self.blob_path(&key);
        if path.exists() {
            return Ok(key);
        }

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        match tmp.persist(&path) {
            Ok(_) => Ok(key),
            // Another writer stored the same contents first.
            Err(_) if path.exists() => Ok(key),
            Err(err) => Err(StorageError::Io(err.error)),
        }
    }

    fn get(&self, key: &BlobKey) -> StorageResult<Blob> {
        self.check_open()?;
        let contents = fs::read(self.blob_path(key)).map_err(|e| Self::map_missing(key, e))?;
        if BlobKey::for_contents(&contents) != *key {
            return Err(StorageError::Corrupted(format!(
                "blob {} does not match its key",
                key
            )));
        }
        Ok(Blob {
            key: *key,
            contents: Bytes::from(contents),
        })
    }

    fn size(&self, key: &BlobKey) -> StorageResult<u64> {
        self.check_open()?;
        let metadata =
            fs::metadata(self.blob_path(key)).map_err(|e| Self::map_missing(key, e))?;
        Ok(metadata.len())
    }

    fn delete(&self, key: &BlobKey) -> StorageResult<()> {
        self.check_open()?;
        fs::remove_file(self.blob_path(key)).map_err(|e| Self::map_missing(key, e))
    }

    fn delete_store(&self) -> StorageResult<()> {
        let mut deleted = self.deleted.write();
        if !*deleted {
            fs::remove_dir_all(&self.dir)?;
            *deleted = true;
        }
        Ok(())
    }
}
