use std::thread;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use shared::types::{DirectoryEntry, ServiceRecord};
use crate::config::DirectoryConfig;
use crate::directory::{hash, store::DirectoryStore};
pub use crate::discovery::listener::ListenerEvent;

/// Commands sent to the directory thread
pub enum DirectoryCommand {
    Upsert(ServiceRecord, oneshot::Sender<bool>),
    GetAll(oneshot::Sender<Vec<DirectoryEntry>>),
    GetByRole(String, oneshot::Sender<Vec<DirectoryEntry>>),
    GetByName(String, oneshot::Sender<Vec<DirectoryEntry>>),
    Maintenance {
        stale_after_secs: u64,
        prune_after_secs: u64,
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to interact with the directory
#[derive(Clone)]
pub struct DirectoryHandle {
    tx: mpsc::Sender<DirectoryCommand>,
}

impl DirectoryHandle {
    /// Spawn a new directory thread owning `store`
    pub fn spawn(mut store: DirectoryStore, hash_tx: watch::Sender<String>) -> Self {
        let (tx, mut rx) = mpsc::channel::<DirectoryCommand>(256);

        // Recompute the hash only after mutations
        let recompute_hash = |store: &DirectoryStore, hash_tx: &watch::Sender<String>| {
            let _ = hash_tx.send(hash::compute_hash(&store.get_all()));
        };

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    DirectoryCommand::Upsert(record, reply) => {
                        let changed = store.upsert(record, Utc::now());
                        if changed {
                            recompute_hash(&store, &hash_tx);
                        }
                        let _ = reply.send(changed);
                    }
                    DirectoryCommand::GetAll(reply) => {
                        let _ = reply.send(store.get_all());
                    }
                    DirectoryCommand::GetByRole(role, reply) => {
                        let _ = reply.send(store.get_by_role(&role));
                    }
                    DirectoryCommand::GetByName(name, reply) => {
                        let _ = reply.send(store.get_by_name(&name));
                    }
                    DirectoryCommand::Maintenance { stale_after_secs, prune_after_secs, reply } => {
                        let now = Utc::now();
                        let flipped = store.mark_stale(stale_after_secs, now);
                        let pruned = store.prune_stale(prune_after_secs, now);
                        if flipped + pruned > 0 {
                            tracing::debug!(flipped, pruned, remaining = store.len(), "Directory maintenance changed entries");
                            recompute_hash(&store, &hash_tx);
                        }
                        let _ = reply.send(());
                    }
                    DirectoryCommand::Shutdown => {
                        tracing::info!("Directory thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Insert or update a record. Returns true if data changed.
    pub async fn upsert(&self, record: ServiceRecord) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(DirectoryCommand::Upsert(record, reply)).await?;
        Ok(rx.await?)
    }

    /// Get all entries
    pub async fn get_all(&self) -> Result<Vec<DirectoryEntry>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(DirectoryCommand::GetAll(reply)).await?;
        Ok(rx.await?)
    }

    /// Get entries whose first tag is `role`
    pub async fn get_by_role(&self, role: String) -> Result<Vec<DirectoryEntry>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(DirectoryCommand::GetByRole(role, reply)).await?;
        Ok(rx.await?)
    }

    /// Get every role registered under a service name
    pub async fn get_by_name(&self, name: String) -> Result<Vec<DirectoryEntry>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(DirectoryCommand::GetByName(name, reply)).await?;
        Ok(rx.await?)
    }

    /// Run maintenance (mark stale, prune old)
    pub async fn maintenance(&self, stale_after_secs: u64, prune_after_secs: u64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(DirectoryCommand::Maintenance {
            stale_after_secs,
            prune_after_secs,
            reply,
        }).await?;
        Ok(rx.await?)
    }

    /// Shutdown the directory thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(DirectoryCommand::Shutdown).await?;
        Ok(())
    }
}

/// Directory manager event loop - bridges listener events to the directory
pub async fn run(
    directory: DirectoryHandle,
    mut rx: mpsc::Receiver<ListenerEvent>,
    config: DirectoryConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut maintenance_interval = tokio::time::interval(
        std::time::Duration::from_secs(config.maintenance_interval_secs)
    );

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                match event {
                    ListenerEvent::Observed(record) => {
                        if let Err(e) = directory.upsert(record).await {
                            tracing::error!("Failed to upsert record: {}", e);
                        }
                    }
                }
            }
            _ = maintenance_interval.tick() => {
                if let Err(e) = directory.maintenance(
                    config.stale_after_secs,
                    config.prune_after_secs
                ).await {
                    tracing::error!("Failed to run maintenance: {}", e);
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("Directory manager shutting down");
                break;
            }
        }
    }

    Ok(())
}
