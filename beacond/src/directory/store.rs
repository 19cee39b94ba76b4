use std::collections::HashMap;
use chrono::{DateTime, Duration, Utc};
use shared::types::{DirectoryEntry, ServiceRecord};

/// Directory key: service name plus role (first tag, empty if untagged)
type Key = (String, String);

fn key_of(record: &ServiceRecord) -> Key {
    (record.name.clone(), record.role().unwrap_or_default().to_string())
}

/// In-memory last-write-wins directory of discovered services
#[derive(Default)]
pub struct DirectoryStore {
    entries: HashMap<Key, DirectoryEntry>,
}

impl DirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a record. Returns true if data changed.
    pub fn upsert(&mut self, record: ServiceRecord, seen_at: DateTime<Utc>) -> bool {
        match self.entries.get_mut(&key_of(&record)) {
            Some(existing) => {
                let changed = !existing.alive || record_data_changed(&existing.record, &record);
                existing.record = record;
                existing.last_seen = seen_at;
                existing.alive = true;
                changed
            }
            None => {
                self.entries.insert(key_of(&record), DirectoryEntry::new(record, seen_at));
                true
            }
        }
    }

    /// All entries ordered by (name, role)
    pub fn get_all(&self) -> Vec<DirectoryEntry> {
        let mut keys: Vec<&Key> = self.entries.keys().collect();
        keys.sort();
        keys.into_iter().map(|k| self.entries[k].clone()).collect()
    }

    pub fn get_by_role(&self, role: &str) -> Vec<DirectoryEntry> {
        self.get_all()
            .into_iter()
            .filter(|e| e.record.role() == Some(role))
            .collect()
    }

    pub fn get_by_name(&self, name: &str) -> Vec<DirectoryEntry> {
        self.get_all()
            .into_iter()
            .filter(|e| e.record.name == name)
            .collect()
    }

    /// Mark entries not seen for `stale_after_secs` as no longer alive.
    /// Returns how many entries flipped.
    pub fn mark_stale(&mut self, stale_after_secs: u64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(stale_after_secs as i64);
        let mut flipped = 0;
        for entry in self.entries.values_mut() {
            if entry.alive && entry.last_seen < cutoff {
                entry.alive = false;
                flipped += 1;
            }
        }
        flipped
    }

    /// Delete dead entries not seen for `prune_after_secs`.
    /// Returns how many were deleted.
    pub fn prune_stale(&mut self, prune_after_secs: u64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(prune_after_secs as i64);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.alive || entry.last_seen >= cutoff);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Timestamps don't count as a change, only what a client would dial.
fn record_data_changed(old: &ServiceRecord, new: &ServiceRecord) -> bool {
    old.host != new.host || old.port != new.port || old.tags != new.tags
}
