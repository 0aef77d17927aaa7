//! # revdb Replicator
//!
//! The database side of a revdb replicator connection.
//!
//! This crate provides:
//! - [`DbWorker`], an actor that owns the local store for one connection
//! - Checkpoint resolution, reads and writes, plus peer checkpoints
//! - Revision negotiation (which revisions to request, which ancestors the
//!   peer may skip)
//! - Batched, debounced commits of inbound revisions
//! - A persistable HTTP cookie jar
//!
//! ## Architecture
//!
//! The protocol layer calls [`DbWorker`] operations from any thread. Each
//! call becomes a message in the worker's mailbox and returns a [`Pending`]
//! future. The worker handles one message at a time, so the store is never
//! accessed concurrently by the same connection.
//!
//! Inbound revisions bypass the mailbox on the way in: they are appended to
//! a pending list and committed together when the batch is full or the
//! debounce timer fires.
//!
//! ## Key Invariants
//!
//! - A checkpoint is resolved once per connection; failures are never
//!   mistaken for a fresh start
//! - Answers to negotiation requests come back in input order
//! - Revisions of one document are committed in the order they were queued
//! - Continuous change delivery follows commit order and never echoes
//!   revisions back to the remote they came from
//! - After the connection closes every operation fails with
//!   [`ReplError::ConnectionClosed`]

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod checkpoint;
mod config;
mod cookie;
mod error;
mod inserter;
mod negotiator;
mod types;
mod worker;

pub use address::Address;
pub use checkpoint::{
    checkpoint_id, get_peer_checkpoint, set_peer_checkpoint, CheckpointManager, CHECKPOINT_STORE,
    PEER_CHECKPOINT_STORE,
};
pub use config::{Mode, ReplicatorOptions, MAX_POSSIBLE_ANCESTORS};
pub use cookie::{Cookie, CookieStore};
pub use error::{ReplError, ReplResult};
pub use inserter::{DebounceTimer, FlushFn, PendingInsert, RevisionInserter};
pub use negotiator::{Decision, RevisionNegotiator};
pub use types::{
    ChangeBatch, ChangesRequest, ChangesSink, Checkpoint, GetChangesParams, PeerCheckpoint,
    Progress, ProgressCallback, ProposedChange, Rev, RevRequest, RevToInsert, RevWant,
    RevisionMessage,
};
pub use worker::{DbWorker, Pending};
