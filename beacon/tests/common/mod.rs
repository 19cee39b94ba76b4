//! In-process stand-in for the multicast group.

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use beacon::{DiscoveryConfig, DiscoveryEngine, InboundSink, TransportError, Transport};

/// Every datagram sent by a member is delivered to all members, sender
/// included, like multicast with loopback enabled.
#[derive(Clone, Default)]
pub struct MemoryBus {
    members: Arc<Mutex<Vec<InboundSink>>>,
}

impl MemoryBus {
    pub fn join(&self, sink: InboundSink) {
        self.members.lock().unwrap().push(sink);
    }

    pub fn deliver(&self, payload: &[u8], from: SocketAddr) {
        let members = self.members.lock().unwrap().clone();
        for sink in members {
            sink.handle(payload, from);
        }
    }
}

pub struct BusTransport {
    bus: MemoryBus,
    addr: SocketAddr,
    attempts: AtomicUsize,
    sent: AtomicUsize,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl BusTransport {
    pub fn new(bus: &MemoryBus, last_octet: u8) -> Arc<Self> {
        Arc::new(Self {
            bus: bus.clone(),
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, last_octet), 5353)),
            attempts: AtomicUsize::new(0),
            sent: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every send call, failed or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Datagrams actually delivered to the bus
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for BusTransport {
    fn send_to_group(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::Other,
                "network unreachable",
            )));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.bus.deliver(payload, self.addr);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// An engine named `hostname` joined to `bus`
pub fn peer(bus: &MemoryBus, hostname: &str, last_octet: u8) -> (DiscoveryEngine, Arc<BusTransport>) {
    let transport = BusTransport::new(bus, last_octet);
    let config = DiscoveryConfig {
        hostname: Some(hostname.to_string()),
        ..Default::default()
    };
    let engine = DiscoveryEngine::with_transport(config, transport.clone()).unwrap();
    bus.join(engine.inbound_sink());
    (engine, transport)
}

pub fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}
