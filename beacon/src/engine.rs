use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;
use crate::codec::{self, MessageCodec};
use crate::config::DiscoveryConfig;
use crate::error::{DecodeError, DiscoveryError, Result};
use crate::events::{EventStream, Subscription, SubscriptionId};
use crate::registry::{ManagedServiceInfo, RegistryHandle, StopOutcome};
use crate::transport::{MulticastTransport, Transport};

/// Decodes inbound datagrams and publishes the resulting records.
#[derive(Clone)]
pub struct InboundSink {
    events: EventStream,
}

impl InboundSink {
    pub fn handle(&self, buf: &[u8], from: SocketAddr) {
        match codec::decode(buf) {
            Ok(record) => {
                trace!(%from, service = %record.name, port = record.port, "Decoded announcement");
                self.events.publish(record);
            }
            Err(DecodeError::MissingLocation) => match codec::decode_query(buf) {
                Ok(query) => trace!(%from, service = %query.name, tags = ?query.tags, "Discovery query seen"),
                Err(e) => trace!(%from, error = %e, "Discarding datagram"),
            },
            Err(e) => trace!(%from, error = %e, "Discarding datagram"),
        }
    }
}

/// One discovery engine: a transport, a registry of managed services and a
/// stream of discovered records. Constructed explicitly and disposed
/// explicitly (or on drop).
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    codec: MessageCodec,
    registry: RegistryHandle,
    events: EventStream,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl DiscoveryEngine {
    /// Joins the configured multicast group and starts the receive loop.
    /// Must be called inside a tokio runtime.
    pub fn start(config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;
        let codec = codec_for(&config)?;
        let transport = Arc::new(MulticastTransport::open(&config)?);
        let local = transport.local_addr();

        let engine = Self::assemble(config, codec, transport.clone());
        let sink = engine.inbound_sink();
        let task = tokio::spawn(async move {
            transport.receive_loop(|buf, from| sink.handle(buf, from)).await;
        });
        *engine.receive_task.lock() = Some(task);

        info!(host = %engine.codec.advertised_host(), local = ?local, "Discovery engine started");
        Ok(engine)
    }

    /// Builds an engine over any transport. Inbound traffic must be fed
    /// through `inbound_sink()` by whoever owns the receive side.
    pub fn with_transport(config: DiscoveryConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let codec = codec_for(&config)?;
        Ok(Self::assemble(config, codec, transport))
    }

    fn assemble(config: DiscoveryConfig, codec: MessageCodec, transport: Arc<dyn Transport>) -> Self {
        let cancel = CancellationToken::new();
        let registry = RegistryHandle::spawn(&config, codec.clone(), transport.clone(), cancel.clone());

        Self {
            config,
            codec,
            registry,
            events: EventStream::new(),
            transport,
            cancel,
            receive_task: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn hostname(&self) -> &str {
        self.codec.hostname()
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    pub fn inbound_sink(&self) -> InboundSink {
        InboundSink {
            events: self.events.clone(),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub async fn announce(&self, name: &str, port: u16, tags: &[String]) -> Result<Uuid> {
        self.ensure_live()?;
        self.registry.announce(name, port, tags).await
    }

    pub async fn discover(&self, name: &str, tags: &[String]) -> Result<Uuid> {
        self.ensure_live()?;
        self.registry.discover(name, tags).await
    }

    pub async fn start_continuous_announcement(&self, name: &str, port: u16, tags: &[String]) -> Result<Uuid> {
        self.ensure_live()?;
        self.registry.start_continuous_announcement(name, port, tags).await
    }

    pub async fn start_continuous_discovery(&self, name: &str, tags: &[String]) -> Result<Uuid> {
        self.ensure_live()?;
        self.registry.start_continuous_discovery(name, tags).await
    }

    pub async fn stop_announcement(&self, name: &str, tags: &[String]) -> Result<StopOutcome> {
        self.ensure_live()?;
        self.registry.stop_announcement(name, tags).await
    }

    pub async fn stop_discovery(&self, name: &str, tags: &[String]) -> Result<StopOutcome> {
        self.ensure_live()?;
        self.registry.stop_discovery(name, tags).await
    }

    pub async fn stop_all_announcements(&self) -> Result<usize> {
        self.ensure_live()?;
        self.registry.stop_all_announcements().await
    }

    pub async fn stop_all_discovery(&self) -> Result<usize> {
        self.ensure_live()?;
        self.registry.stop_all_discovery().await
    }

    pub async fn remove(&self, id: Uuid) -> Result<bool> {
        self.ensure_live()?;
        self.registry.remove(id).await
    }

    pub async fn services(&self) -> Result<Vec<ManagedServiceInfo>> {
        self.ensure_live()?;
        self.registry.services().await
    }

    pub async fn sweep(&self) -> Result<Vec<ManagedServiceInfo>> {
        self.ensure_live()?;
        self.registry.sweep().await
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stops every timer, closes the transport (releasing its socket) and
    /// completes the event stream.
    /// Runs once; later calls return immediately.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.transport.close();
        if let Some(task) = self.receive_task.lock().take() {
            task.abort();
        }
        self.events.complete();
        debug!("Discovery engine disposed");
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(DiscoveryError::Disposed);
        }
        Ok(())
    }
}

impl Drop for DiscoveryEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn codec_for(config: &DiscoveryConfig) -> Result<MessageCodec> {
    match &config.hostname {
        Some(hostname) => MessageCodec::new(hostname.clone()),
        None => MessageCodec::from_system(),
    }
}
