//! Multicast UDP transport.
//!
//! One socket is used for both directions. It is created through socket2 so
//! that several peers on the same host can share the group port.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use crate::config::DiscoveryConfig;
use crate::error::TransportError;

/// Send side of a group transport, as seen by registry timers.
pub trait Transport: Send + Sync + 'static {
    /// Fire-and-forget send to the whole group. Never waits for the network.
    fn send_to_group(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Leaves the group and releases the socket, ending any receive loop.
    /// Idempotent.
    fn close(&self);
}

/// Create a non-blocking UDP socket bound to the group port with address
/// reuse, joined to the group.
pub fn create_multicast_socket(config: &DiscoveryConfig) -> Result<std::net::UdpSocket, TransportError> {
    let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
    let bind_err = |source| TransportError::Bind { addr: bind_addr, source };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;

    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(bind_err)?;

    socket.bind(&bind_addr.into()).map_err(bind_err)?;

    let join_err = |source| TransportError::Join { group: config.group, source };
    socket
        .join_multicast_v4(&config.group, &config.interface)
        .map_err(join_err)?;
    socket.set_multicast_ttl_v4(config.ttl).map_err(join_err)?;
    socket.set_multicast_loop_v4(true).map_err(join_err)?;

    socket.set_nonblocking(true).map_err(bind_err)?;

    Ok(socket.into())
}

/// Owns the group socket until `close()`, which releases it.
pub struct MulticastTransport {
    socket: Mutex<Option<Arc<UdpSocket>>>,
    group: Ipv4Addr,
    interface: Ipv4Addr,
    destination: SocketAddr,
    recv_buffer_size: usize,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl MulticastTransport {
    /// Bind and join the configured group. Must be called inside a tokio
    /// runtime.
    pub fn open(config: &DiscoveryConfig) -> Result<Self, TransportError> {
        let std_socket = create_multicast_socket(config)?;
        let socket = UdpSocket::from_std(std_socket).map_err(|source| TransportError::Bind {
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port)),
            source,
        })?;

        info!(group = %config.group, port = config.port, "Joined multicast group");

        Ok(Self {
            socket: Mutex::new(Some(Arc::new(socket))),
            group: config.group,
            interface: config.interface,
            destination: SocketAddr::V4(SocketAddrV4::new(config.group, config.port)),
            recv_buffer_size: config.recv_buffer_size,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// Bound address, or `None` once the socket has been released.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.lock().as_ref()?.local_addr().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Hands every received datagram to `handler` until `close()` is called.
    /// Per-datagram errors are logged and the loop keeps going.
    pub async fn receive_loop<F>(&self, mut handler: F)
    where
        F: FnMut(&[u8], SocketAddr),
    {
        let Some(socket) = self.socket.lock().clone() else {
            return;
        };
        let mut buf = vec![0u8; self.recv_buffer_size];

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Multicast receive loop shutting down");
                    break;
                }
                result = socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, from)) => {
                            trace!(%from, len, "Datagram received");
                            handler(&buf[..len], from);
                        }
                        Err(e) => {
                            if self.is_closed() {
                                break;
                            }
                            let err = TransportError::Receive(e);
                            warn!(error = %err, "Multicast receive failed");
                        }
                    }
                }
            }
        }
    }
}

impl Transport for MulticastTransport {
    fn send_to_group(&self, payload: &[u8]) -> Result<(), TransportError> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or(TransportError::Closed)?;
        socket
            .try_send_to(payload, self.destination)
            .map(|_| ())
            .map_err(TransportError::Send)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        let Some(socket) = self.socket.lock().take() else {
            return;
        };
        if let Err(e) = socket.leave_multicast_v4(self.group, self.interface) {
            warn!(group = %self.group, error = %e, "Failed to leave multicast group");
        }
        info!(group = %self.group, "Left multicast group");
    }
}

impl Drop for MulticastTransport {
    fn drop(&mut self) {
        self.close();
    }
}
