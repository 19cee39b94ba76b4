use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A service observed on the multicast group.
/// Produced fresh on every successfully decoded announcement; the engine never
/// deduplicates these, consumers decide what counts as the same service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Service name, e.g. "Greeter"
    pub name: String,

    /// Announcing host, e.g. "nas.local"
    pub host: String,

    /// Service port
    pub port: u16,

    /// Ordered tags; the first one is conventionally the role
    pub tags: Vec<String>,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            tags,
        }
    }

    /// First tag, used by consumers as a role discriminator
    pub fn role(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }

    /// host:port, suitable for dialing the collaborator endpoint
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Last-write-wins view of a discovered record, kept by the daemon directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Most recently observed record for this (name, role) key
    pub record: ServiceRecord,

    /// First time this key was seen
    pub first_seen: DateTime<Utc>,

    /// Last time this key was seen
    pub last_seen: DateTime<Utc>,

    /// False once the entry has gone without traffic past the stale threshold
    pub alive: bool,
}

impl DirectoryEntry {
    pub fn new(record: ServiceRecord, seen_at: DateTime<Utc>) -> Self {
        Self {
            record,
            first_seen: seen_at,
            last_seen: seen_at,
            alive: true,
        }
    }
}
