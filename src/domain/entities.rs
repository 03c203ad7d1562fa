//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the replication domain.
//! They have no I/O dependencies and contain only business logic.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// What a replication request asks the receiving side to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationActionType {
    /// Content was added or modified
    Add,
    /// Content was removed
    Delete,
    /// Ask a remote endpoint for pending packages
    Poll,
}

impl ReplicationActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Delete => "DELETE",
            Self::Poll => "POLL",
        }
    }

    /// Parse an action name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "ADD" => Some(Self::Add),
            "DELETE" => Some(Self::Delete),
            "POLL" => Some(Self::Poll),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReplicationActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable descriptor of what changed in the source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRequest {
    /// Creation time in milliseconds since the Unix epoch
    pub time: u64,
    /// Requested action
    pub action: ReplicationActionType,
    /// Repository paths affected by the change
    pub paths: Vec<String>,
}

impl ReplicationRequest {
    /// Create a request stamped with the current time.
    pub fn new<I, S>(action: ReplicationActionType, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            time,
            action,
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Check that the request can be turned into a package.
    ///
    /// Content actions need at least one absolute path. Poll requests may
    /// be unscoped.
    pub fn validate(&self) -> Result<(), String> {
        if self.action != ReplicationActionType::Poll && self.paths.is_empty() {
            return Err(format!("{} request without paths", self.action));
        }
        if let Some(bad) = self.paths.iter().find(|p| !p.starts_with('/')) {
            return Err(format!("path {:?} is not absolute", bad));
        }
        Ok(())
    }
}

/// An exportable artifact representing content to replicate.
///
/// The payload is reference counted, so clones share the same bytes and the
/// content is released once the last holder drops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    id: String,
    kind: String,
    action: ReplicationActionType,
    paths: Vec<String>,
    data: Bytes,
}

impl Package {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        action: ReplicationActionType,
        paths: Vec<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            action,
            paths,
            data: data.into(),
        }
    }

    /// Stable identifier of this package.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Builder-specific package type (e.g. "json").
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn action(&self) -> ReplicationActionType {
        self.action
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Cheap handle on the payload.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Readable stream over the payload.
    pub fn reader(&self) -> impl std::io::Read {
        use bytes::Buf;
        self.data.clone().reader()
    }
}

/// A package waiting in a queue.
#[derive(Debug, Clone)]
pub struct QueueItem {
    package: Package,
    enqueued_at: SystemTime,
    attempts: u32,
    last_attempt: Option<Instant>,
}

impl QueueItem {
    pub fn new(package: Package) -> Self {
        Self {
            package,
            enqueued_at: SystemTime::now(),
            attempts: 0,
            last_attempt: None,
        }
    }

    pub fn id(&self) -> &str {
        self.package.id()
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn enqueued_at(&self) -> SystemTime {
        self.enqueued_at
    }

    /// Number of failed delivery attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the last failed attempt happened.
    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }

    /// Count a failed delivery attempt.
    pub(crate) fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt = Some(Instant::now());
    }
}
