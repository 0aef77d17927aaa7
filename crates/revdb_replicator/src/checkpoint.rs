//! Checkpoint lifecycle.
//!
//! A checkpoint records how far replication with one peer has progressed.
//! Its ID is derived from the local database and the replication settings,
//! so changing the filter or direction starts a fresh checkpoint instead of
//! resuming an unrelated one.

use crate::address::Address;
use crate::config::ReplicatorOptions;
use crate::error::{ReplError, ReplResult};
use crate::types::{Checkpoint, PeerCheckpoint};
use revdb_storage::{generation, RemoteId, RevisionStore};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Raw store holding this database's checkpoints against remotes.
pub const CHECKPOINT_STORE: &str = "checkpoints";

/// Raw store holding checkpoints that passive peers saved here.
pub const PEER_CHECKPOINT_STORE: &str = "peerCheckpoints";

const PEER_REV_SUFFIX: &str = "cc";

/// Normalizes a remote URL so spellings of the same address agree.
fn canonical_remote(url: &str) -> String {
    Address::parse(url).map_or_else(|_| url.to_string(), |address| address.to_string())
}

/// Derives the checkpoint ID for a local database and replication settings.
///
/// The remote URL is hashed in its normalized form.
pub fn checkpoint_id(private_uuid: &[u8], options: &ReplicatorOptions) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, private_uuid);
    field(&mut hasher, canonical_remote(&options.remote_url).as_bytes());
    match &options.doc_ids {
        Some(ids) => {
            hasher.update([1]);
            for id in ids {
                field(&mut hasher, id.as_bytes());
            }
        }
        None => hasher.update([0]),
    }
    field(
        &mut hasher,
        options.filter.as_deref().unwrap_or_default().as_bytes(),
    );
    for (key, value) in &options.filter_params {
        field(&mut hasher, key.as_bytes());
        field(&mut hasher, value.as_bytes());
    }
    field(&mut hasher, options.push.as_str().as_bytes());
    field(&mut hasher, options.pull.as_str().as_bytes());

    format!("cp-{}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone)]
enum Resolution {
    Unresolved,
    Resolved { remote_id: RemoteId },
    Failed(ReplError),
}

/// Per-connection checkpoint state.
///
/// Lives inside the worker, which serializes all calls. The first call
/// resolves the remote; later calls reuse the result. A failure is kept and
/// returned to every later caller for the rest of the connection.
#[derive(Debug)]
pub struct CheckpointManager {
    checkpoint_id: String,
    remote_url: String,
    state: Resolution,
}

impl CheckpointManager {
    /// Creates an unresolved manager for `store` and `options`.
    pub fn new<S: RevisionStore + ?Sized>(store: &S, options: &ReplicatorOptions) -> Self {
        Self {
            checkpoint_id: checkpoint_id(store.private_uuid().as_bytes(), options),
            remote_url: canonical_remote(&options.remote_url),
            state: Resolution::Unresolved,
        }
    }

    /// Returns the checkpoint ID.
    pub fn checkpoint_id(&self) -> &str {
        &self.checkpoint_id
    }

    /// Returns the storage-assigned remote ID, once resolved.
    pub fn remote_id(&self) -> Option<RemoteId> {
        match self.state {
            Resolution::Resolved { remote_id } => Some(remote_id),
            _ => None,
        }
    }

    /// Resolves the remote's numeric ID, once per connection.
    ///
    /// # Errors
    ///
    /// Returns the resolution failure, now and on every later call.
    pub fn resolve<S: RevisionStore + ?Sized>(&mut self, store: &S) -> ReplResult<RemoteId> {
        match &self.state {
            Resolution::Resolved { remote_id } => return Ok(*remote_id),
            Resolution::Failed(err) => return Err(err.clone()),
            Resolution::Unresolved => {}
        }

        let result = store
            .remote_id(&self.remote_url, true)
            .map_err(ReplError::from)
            .and_then(|id| {
                id.ok_or_else(|| {
                    ReplError::NotFound(format!("no remote ID for {}", self.remote_url))
                })
            });
        match result {
            Ok(remote_id) => {
                debug!(checkpoint_id = %self.checkpoint_id, remote_id, "checkpoint resolved");
                self.state = Resolution::Resolved { remote_id };
                Ok(remote_id)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Reads the checkpoint.
    ///
    /// A missing checkpoint is not an error: it comes back empty with
    /// `db_is_empty` set.
    ///
    /// # Errors
    ///
    /// Returns any resolution or storage failure; both are sticky.
    pub fn read<S: RevisionStore + ?Sized>(&mut self, store: &S) -> ReplResult<Checkpoint> {
        self.resolve(store)?;
        let doc = match store.get_raw(CHECKPOINT_STORE, &self.checkpoint_id) {
            Ok(doc) => doc,
            Err(err) if err.is_not_found() => None,
            Err(err) => {
                warn!(checkpoint_id = %self.checkpoint_id, error = %err, "checkpoint read failed");
                return Err(self.fail(err.into()));
            }
        };
        let checkpoint = match doc {
            Some(doc) => Checkpoint {
                checkpoint_id: self.checkpoint_id.clone(),
                data: doc.body,
                db_is_empty: false,
            },
            None => Checkpoint {
                checkpoint_id: self.checkpoint_id.clone(),
                data: Vec::new(),
                db_is_empty: true,
            },
        };
        debug!(
            checkpoint_id = %self.checkpoint_id,
            fresh = checkpoint.db_is_empty,
            "checkpoint read"
        );
        Ok(checkpoint)
    }

    /// Stores new checkpoint data. Returns once the write is durable.
    pub fn write<S: RevisionStore + ?Sized>(&mut self, store: &S, data: &[u8]) -> ReplResult<()> {
        self.resolve(store)?;
        store.put_raw(CHECKPOINT_STORE, &self.checkpoint_id, &[], data)?;
        debug!(checkpoint_id = %self.checkpoint_id, len = data.len(), "checkpoint saved");
        Ok(())
    }

    /// Deletes the checkpoint so the next replication starts over.
    pub fn reset<S: RevisionStore + ?Sized>(&mut self, store: &S) -> ReplResult<()> {
        self.resolve(store)?;
        store.delete_raw(CHECKPOINT_STORE, &self.checkpoint_id)?;
        debug!(checkpoint_id = %self.checkpoint_id, "checkpoint reset");
        Ok(())
    }

    fn fail(&mut self, err: ReplError) -> ReplError {
        self.state = Resolution::Failed(err.clone());
        err
    }
}

fn check_client_id(client_id: &str) -> ReplResult<()> {
    if client_id.is_empty() {
        Err(ReplError::InvalidInput("empty peer checkpoint ID".into()))
    } else {
        Ok(())
    }
}

/// Reads a checkpoint a peer stored under `client_id`.
///
/// # Errors
///
/// Returns [`ReplError::NotFound`] if the peer never stored one.
pub fn get_peer_checkpoint<S: RevisionStore + ?Sized>(
    store: &S,
    client_id: &str,
) -> ReplResult<PeerCheckpoint> {
    check_client_id(client_id)?;
    let doc = store
        .get_raw(PEER_CHECKPOINT_STORE, client_id)?
        .ok_or_else(|| ReplError::NotFound(format!("peer checkpoint {}", client_id)))?;
    let rev = String::from_utf8(doc.meta)
        .map_err(|e| ReplError::Codec(format!("peer checkpoint revision: {}", e)))?;
    Ok(PeerCheckpoint {
        data: doc.body,
        rev,
    })
}

/// Stores a peer's checkpoint and returns its new revision.
///
/// `rev` must be the revision the peer last received, or `None` for a new
/// checkpoint.
///
/// # Errors
///
/// Returns [`ReplError::Conflict`] if `rev` is stale.
pub fn set_peer_checkpoint<S: RevisionStore + ?Sized>(
    store: &S,
    client_id: &str,
    data: &[u8],
    rev: Option<&str>,
) -> ReplResult<String> {
    check_client_id(client_id)?;
    let current = match get_peer_checkpoint(store, client_id) {
        Ok(checkpoint) => Some(checkpoint.rev),
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err),
    };
    if current.as_deref() != rev {
        return Err(ReplError::Conflict(format!(
            "peer checkpoint {} is at {:?}, not {:?}",
            client_id, current, rev
        )));
    }

    let gen = current.as_deref().and_then(generation).unwrap_or(0) + 1;
    let new_rev = format!("{}-{}", gen, PEER_REV_SUFFIX);
    store.put_raw(PEER_CHECKPOINT_STORE, client_id, new_rev.as_bytes(), data)?;
    debug!(client_id, rev = %new_rev, "peer checkpoint saved");
    Ok(new_rev)
}
