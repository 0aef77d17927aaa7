//! # revdb Storage
//!
//! Storage contracts consumed by the revdb replicator.
//!
//! The replicator never owns a storage engine. It talks to one through two
//! narrow traits:
//!
//! - [`RevisionStore`] - revision trees, the change feed, raw checkpoint
//!   documents and per-remote revision bookkeeping
//! - [`BlobStore`] - content-addressed attachment storage
//!
//! Bodies are **opaque byte buffers**. Nothing in this crate decodes them.
//!
//! ## Available Implementations
//!
//! - [`InMemoryRevisionStore`] - For testing and ephemeral databases
//! - [`InMemoryBlobStore`] - For testing
//! - [`FileBlobStore`] - One file per blob under a directory
//!
//! ## Example
//!
//! ```rust
//! use revdb_storage::{BlobStore, InMemoryBlobStore};
//!
//! let blobs = InMemoryBlobStore::new();
//! let key = blobs.put(b"hello world").unwrap();
//! assert_eq!(&blobs.get(&key).unwrap().contents[..], b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod blob;
mod error;
mod file;
mod memory;
mod revision;
mod store;

pub use blob::{Blob, BlobKey, BlobStore, InMemoryBlobStore};
pub use error::{ErrorCode, ErrorDomain, StorageError, StorageResult};
pub use file::FileBlobStore;
pub use memory::InMemoryRevisionStore;
pub use revision::{
    generation, DocumentInfo, NewRevision, RawDocument, RemoteId, Revision, Sequence,
};
pub use store::{ChangeCallback, ChangeObserver, RevisionStore};
