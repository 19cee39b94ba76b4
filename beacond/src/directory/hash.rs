use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::DirectoryEntry;

/// Only fields a client would act on; first_seen/last_seen move on every
/// announcement without the directory meaningfully changing.
#[derive(Serialize)]
struct HashView<'a> {
    name: &'a str,
    host: &'a str,
    port: u16,
    tags: &'a [String],
    alive: bool,
}

/// Computes a SHA-256 hash of the directory.
/// Entries are sorted by (name, tags) for deterministic output.
pub fn compute_hash(entries: &[DirectoryEntry]) -> String {
    let mut indices: Vec<usize> = (0..entries.len()).collect();
    indices.sort_by(|&a, &b| {
        let (a, b) = (&entries[a].record, &entries[b].record);
        (&a.name, &a.tags).cmp(&(&b.name, &b.tags))
    });

    let views: Vec<HashView<'_>> = indices
        .iter()
        .map(|&i| {
            let e = &entries[i];
            HashView {
                name: &e.record.name,
                host: &e.record.host,
                port: e.record.port,
                tags: &e.record.tags,
                alive: e.alive,
            }
        })
        .collect();

    // Serializing plain strings and integers cannot fail
    let json = serde_json::to_string(&views).unwrap_or_default();

    let hash = Sha256::digest(json.as_bytes());
    hex::encode(hash)
}
