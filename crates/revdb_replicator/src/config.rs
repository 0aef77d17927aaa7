//! Configuration for the replicator.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Maximum number of ancestor revision IDs offered to a peer per document.
pub const MAX_POSSIBLE_ANCESTORS: usize = 10;

/// Replication mode for one direction (push or pull).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Mode {
    /// This direction is off.
    #[default]
    Disabled,
    /// Respond to the peer but never initiate.
    Passive,
    /// Run until caught up, then stop.
    OneShot,
    /// Keep streaming changes as they happen.
    Continuous,
}

impl Mode {
    /// Returns the stable name used when deriving checkpoint IDs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Disabled => "disabled",
            Mode::Passive => "passive",
            Mode::OneShot => "one-shot",
            Mode::Continuous => "continuous",
        }
    }

    /// Returns true if this direction does anything.
    pub fn is_active(&self) -> bool {
        *self != Mode::Disabled
    }
}

/// Configuration for one replicator connection.
#[derive(Debug, Clone)]
pub struct ReplicatorOptions {
    /// Remote database URL (`wss://host:port/db`).
    pub remote_url: String,
    /// Push mode.
    pub push: Mode,
    /// Pull mode.
    pub pull: Mode,
    /// Optional doc-ID allow-list.
    pub doc_ids: Option<BTreeSet<String>>,
    /// Name of a replication filter, if any.
    pub filter: Option<String>,
    /// Parameters passed to the filter.
    pub filter_params: BTreeMap<String, String>,
    /// Change-feed limit used when a request asks for a limit of zero.
    pub changes_batch_size: usize,
    /// Pending inbound revisions that trigger an immediate commit.
    pub insert_batch_size: usize,
    /// Debounce delay before pending inbound revisions are committed.
    pub insert_delay: Duration,
    /// Maximum history entries sent with a revision.
    pub max_history: usize,
}

impl ReplicatorOptions {
    /// Creates options for the given remote with both directions disabled.
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            push: Mode::Disabled,
            pull: Mode::Disabled,
            doc_ids: None,
            filter: None,
            filter_params: BTreeMap::new(),
            changes_batch_size: 200,
            insert_batch_size: 100,
            insert_delay: Duration::from_millis(50),
            max_history: 20,
        }
    }

    /// Sets the push mode.
    pub fn with_push(mut self, mode: Mode) -> Self {
        self.push = mode;
        self
    }

    /// Sets the pull mode.
    pub fn with_pull(mut self, mode: Mode) -> Self {
        self.pull = mode;
        self
    }

    /// Restricts replication to the given document IDs.
    pub fn with_doc_ids<I, T>(mut self, doc_ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.doc_ids = Some(doc_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Sets a named filter and its parameters.
    pub fn with_filter(mut self, name: impl Into<String>, params: BTreeMap<String, String>) -> Self {
        self.filter = Some(name.into());
        self.filter_params = params;
        self
    }

    /// Sets the default change-feed limit.
    pub fn with_changes_batch_size(mut self, size: usize) -> Self {
        self.changes_batch_size = size.max(1);
        self
    }

    /// Sets the insert batch threshold.
    pub fn with_insert_batch_size(mut self, size: usize) -> Self {
        self.insert_batch_size = size.max(1);
        self
    }

    /// Sets the insert debounce delay.
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = delay;
        self
    }

    /// Sets the maximum history length sent with a revision.
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }
}

impl Default for ReplicatorOptions {
    fn default() -> Self {
        Self::new("")
    }
}
