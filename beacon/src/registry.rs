//! Locally managed announce and discover intents.
//!
//! A single actor task owns every `ManagedService` and its timers. The
//! public handle sends commands over an mpsc channel and waits on a oneshot
//! reply, so all lookups, inserts, removals and timer start/stop happen in
//! one place. The same loop runs the expiry sweep on its own interval.

use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;
use crate::codec::{self, MessageCodec};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::transport::Transport;

const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Which of an entry's two timers an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Announce,
    Discover,
}

impl IntentKind {
    fn as_str(self) -> &'static str {
        match self {
            IntentKind::Announce => "announcement",
            IntentKind::Discover => "discovery",
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The timer was running and has been stopped
    Stopped,
    /// The entry exists but that timer was not running
    NotRunning,
    /// No entry matches the (name, tags) key
    Miss,
}

/// Read-only view of a managed entry
#[derive(Debug, Clone, Serialize)]
pub struct ManagedServiceInfo {
    pub id: Uuid,
    pub name: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub announcing: bool,
    pub discovering: bool,
    /// Seconds since the last successful broadcast or (re)start
    pub idle_secs: u64,
}

struct ManagedService {
    id: Uuid,
    name: String,
    port: u16,
    tags: Vec<String>,
    announcement: Option<TimerHandle>,
    discovery: Option<TimerHandle>,
    last_activity: Instant,
}

impl ManagedService {
    fn new(name: String, port: u16, tags: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            port,
            tags,
            announcement: None,
            discovery: None,
            last_activity: Instant::now(),
        }
    }

    /// Same managed service iff the name and the ordered tags match exactly
    fn matches(&self, name: &str, tags: &[String]) -> bool {
        self.name == name && self.tags == tags
    }

    fn timer_mut(&mut self, kind: IntentKind) -> &mut Option<TimerHandle> {
        match kind {
            IntentKind::Announce => &mut self.announcement,
            IntentKind::Discover => &mut self.discovery,
        }
    }

    fn info(&self, now: Instant) -> ManagedServiceInfo {
        ManagedServiceInfo {
            id: self.id,
            name: self.name.clone(),
            port: self.port,
            tags: self.tags.clone(),
            announcing: self.announcement.is_some(),
            discovering: self.discovery.is_some(),
            idle_secs: now.saturating_duration_since(self.last_activity).as_secs(),
        }
    }
}

/// Commands sent to the registry actor
enum RegistryCommand {
    Start {
        kind: IntentKind,
        name: String,
        port: u16,
        tags: Vec<String>,
        continuous: bool,
        reply: oneshot::Sender<Uuid>,
    },
    Stop {
        kind: IntentKind,
        name: String,
        tags: Vec<String>,
        reply: oneshot::Sender<StopOutcome>,
    },
    StopAll {
        kind: IntentKind,
        reply: oneshot::Sender<usize>,
    },
    Remove(Uuid, oneshot::Sender<bool>),
    List(oneshot::Sender<Vec<ManagedServiceInfo>>),
    Sweep(oneshot::Sender<Vec<ManagedServiceInfo>>),
    /// Sent by timers after a successful broadcast
    Touch(Uuid),
}

/// Handle to the registry actor
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the registry actor. It runs until `cancel` fires or every
    /// handle is dropped; either way all timers are stopped on exit.
    pub fn spawn(
        config: &DiscoveryConfig,
        codec: MessageCodec,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let registry = Registry {
            entries: Vec::new(),
            scheduler: Scheduler::new(cancel.clone()),
            transport,
            codec,
            touch_tx: tx.downgrade(),
            announce_interval: config.announce_interval(),
            discovery_interval: config.discovery_interval(),
            stale_after: config.stale_after(),
        };

        tokio::spawn(run(registry, rx, config.sweep_interval(), cancel));

        Self { tx }
    }

    /// New announce entry, broadcasting every announce interval.
    pub async fn announce(&self, name: &str, port: u16, tags: &[String]) -> Result<Uuid> {
        self.start(IntentKind::Announce, name, port, tags, false).await
    }

    /// New discover entry, broadcasting a query every discovery interval.
    pub async fn discover(&self, name: &str, tags: &[String]) -> Result<Uuid> {
        self.start(IntentKind::Discover, name, 0, tags, false).await
    }

    /// Find-or-create the entry for (name, tags) and make sure its
    /// announcement timer is running with `port`.
    pub async fn start_continuous_announcement(&self, name: &str, port: u16, tags: &[String]) -> Result<Uuid> {
        self.start(IntentKind::Announce, name, port, tags, true).await
    }

    /// Find-or-create the entry for (name, tags) and make sure its
    /// discovery timer is running.
    pub async fn start_continuous_discovery(&self, name: &str, tags: &[String]) -> Result<Uuid> {
        self.start(IntentKind::Discover, name, 0, tags, true).await
    }

    pub async fn stop_announcement(&self, name: &str, tags: &[String]) -> Result<StopOutcome> {
        self.stop(IntentKind::Announce, name, tags).await
    }

    pub async fn stop_discovery(&self, name: &str, tags: &[String]) -> Result<StopOutcome> {
        self.stop(IntentKind::Discover, name, tags).await
    }

    /// Stops every running announcement timer; returns how many were stopped.
    pub async fn stop_all_announcements(&self) -> Result<usize> {
        self.request(|reply| RegistryCommand::StopAll { kind: IntentKind::Announce, reply }).await
    }

    /// Stops every running discovery timer; returns how many were stopped.
    pub async fn stop_all_discovery(&self) -> Result<usize> {
        self.request(|reply| RegistryCommand::StopAll { kind: IntentKind::Discover, reply }).await
    }

    /// Stops both timers and deletes the entry. False if `id` is unknown.
    pub async fn remove(&self, id: Uuid) -> Result<bool> {
        self.request(|reply| RegistryCommand::Remove(id, reply)).await
    }

    pub async fn services(&self) -> Result<Vec<ManagedServiceInfo>> {
        self.request(RegistryCommand::List).await
    }

    /// Runs the expiry sweep now and returns the removed entries.
    pub async fn sweep(&self) -> Result<Vec<ManagedServiceInfo>> {
        self.request(RegistryCommand::Sweep).await
    }

    async fn start(
        &self,
        kind: IntentKind,
        name: &str,
        port: u16,
        tags: &[String],
        continuous: bool,
    ) -> Result<Uuid> {
        codec::validate(name, tags)?;
        self.request(|reply| RegistryCommand::Start {
            kind,
            name: name.to_string(),
            port,
            tags: tags.to_vec(),
            continuous,
            reply,
        })
        .await
    }

    async fn stop(&self, kind: IntentKind, name: &str, tags: &[String]) -> Result<StopOutcome> {
        self.request(|reply| RegistryCommand::Stop {
            kind,
            name: name.to_string(),
            tags: tags.to_vec(),
            reply,
        })
        .await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| DiscoveryError::Disposed)?;
        rx.await.map_err(|_| DiscoveryError::Disposed)
    }
}

struct Registry {
    entries: Vec<ManagedService>,
    scheduler: Scheduler,
    transport: Arc<dyn Transport>,
    codec: MessageCodec,
    touch_tx: mpsc::WeakSender<RegistryCommand>,
    announce_interval: Duration,
    discovery_interval: Duration,
    stale_after: Duration,
}

impl Registry {
    fn handle(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Start { kind, name, port, tags, continuous, reply } => {
                let id = self.start(kind, name, port, tags, continuous);
                let _ = reply.send(id);
            }
            RegistryCommand::Stop { kind, name, tags, reply } => {
                let _ = reply.send(self.stop(kind, &name, &tags));
            }
            RegistryCommand::StopAll { kind, reply } => {
                let _ = reply.send(self.stop_all(kind));
            }
            RegistryCommand::Remove(id, reply) => {
                let _ = reply.send(self.remove(id));
            }
            RegistryCommand::List(reply) => {
                let now = Instant::now();
                let _ = reply.send(self.entries.iter().map(|e| e.info(now)).collect());
            }
            RegistryCommand::Sweep(reply) => {
                let _ = reply.send(self.sweep());
            }
            RegistryCommand::Touch(id) => {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
                    entry.last_activity = Instant::now();
                }
            }
        }
    }

    fn start(&mut self, kind: IntentKind, name: String, port: u16, tags: Vec<String>, continuous: bool) -> Uuid {
        let existing = if continuous {
            self.entries.iter().position(|e| e.matches(&name, &tags))
        } else {
            None
        };

        let idx = match existing {
            Some(idx) => idx,
            None => {
                self.entries.push(ManagedService::new(name, port, tags));
                self.entries.len() - 1
            }
        };

        // A port change invalidates the payload of a running announcement
        if kind == IntentKind::Announce && self.entries[idx].port != port {
            self.entries[idx].port = port;
            self.entries[idx].announcement = None;
        }

        if self.entries[idx].timer_mut(kind).is_none() {
            let timer = self.spawn_timer(kind, &self.entries[idx]);
            let entry = &mut self.entries[idx];
            *entry.timer_mut(kind) = Some(timer);
            entry.last_activity = Instant::now();
            info!(
                service = %entry.name,
                tags = ?entry.tags,
                port = entry.port,
                "Started {}",
                kind.as_str()
            );
        } else {
            debug!(service = %self.entries[idx].name, "{} already running", kind.as_str());
        }

        self.entries[idx].id
    }

    fn spawn_timer(&self, kind: IntentKind, entry: &ManagedService) -> TimerHandle {
        let (payload, period) = match kind {
            IntentKind::Announce => (
                self.codec.encode_announcement(&entry.name, entry.port, &entry.tags),
                self.announce_interval,
            ),
            IntentKind::Discover => (
                self.codec.encode_discovery_query(&entry.name, &entry.tags),
                self.discovery_interval,
            ),
        };

        let id = entry.id;
        let name = entry.name.clone();
        let transport = self.transport.clone();
        let touch_tx = self.touch_tx.clone();

        self.scheduler.every(period, move || match transport.send_to_group(&payload) {
            Ok(()) => {
                trace!(service = %name, "Sent {}", kind.as_str());
                if let Some(tx) = touch_tx.upgrade() {
                    let _ = tx.try_send(RegistryCommand::Touch(id));
                }
            }
            Err(e) => {
                warn!(service = %name, error = %e, "Failed to send {}", kind.as_str());
            }
        })
    }

    fn stop(&mut self, kind: IntentKind, name: &str, tags: &[String]) -> StopOutcome {
        let Some(entry) = self.entries.iter_mut().find(|e| e.matches(name, tags)) else {
            debug!(service = %name, ?tags, "No managed service to stop {} for", kind.as_str());
            return StopOutcome::Miss;
        };

        match entry.timer_mut(kind).take() {
            Some(timer) => {
                timer.cancel();
                info!(service = %name, ?tags, "Stopped {}", kind.as_str());
                StopOutcome::Stopped
            }
            None => StopOutcome::NotRunning,
        }
    }

    fn stop_all(&mut self, kind: IntentKind) -> usize {
        let stopped = self
            .entries
            .iter_mut()
            .filter_map(|e| e.timer_mut(kind).take())
            .map(TimerHandle::cancel)
            .count();
        info!(count = stopped, "Stopped all {} timers", kind.as_str());
        stopped
    }

    fn remove(&mut self, id: Uuid) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(idx) => {
                let entry = self.entries.remove(idx);
                info!(service = %entry.name, %id, "Removed managed service");
                true
            }
            None => {
                debug!(%id, "No managed service to remove");
                false
            }
        }
    }

    /// Drops every entry idle for longer than the staleness threshold.
    fn sweep(&mut self) -> Vec<ManagedServiceInfo> {
        let now = Instant::now();
        let stale_after = self.stale_after;
        let mut removed = Vec::new();

        self.entries.retain(|entry| {
            if now.saturating_duration_since(entry.last_activity) > stale_after {
                info!(
                    service = %entry.name,
                    tags = ?entry.tags,
                    "Expiring managed service with no activity"
                );
                removed.push(entry.info(now));
                false
            } else {
                true
            }
        });

        removed
    }
}

/// Registry actor loop: serves commands and runs the periodic sweep.
async fn run(
    mut registry: Registry,
    mut rx: mpsc::Receiver<RegistryCommand>,
    sweep_interval: Duration,
    cancel: CancellationToken,
) {
    let mut sweep = tokio::time::interval_at(Instant::now() + sweep_interval, sweep_interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Registry shutting down");
                break;
            }
            cmd = rx.recv() => match cmd {
                Some(cmd) => registry.handle(cmd),
                None => break,
            },
            _ = sweep.tick() => {
                let removed = registry.sweep();
                if !removed.is_empty() {
                    debug!(count = removed.len(), "Sweep removed stale entries");
                }
            }
        }
    }

    // Dropping the entries cancels their timers
    let remaining = registry.entries.len();
    registry.entries.clear();
    debug!(remaining, "Registry stopped");
}
