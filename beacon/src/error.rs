//! Error types for the discovery engine.

use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors surfaced to callers of the engine API
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Rejected input, e.g. a service name that would break the wire format
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine was disposed; no further operations are accepted
    #[error("Discovery engine has been disposed")]
    Disposed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Faults of the multicast socket. Logged where they occur, never fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to join multicast group {group}: {source}")]
    Join {
        group: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send to group: {0}")]
    Send(#[source] std::io::Error),

    #[error("Failed to receive datagram: {0}")]
    Receive(#[source] std::io::Error),

    #[error("Transport is closed")]
    Closed,
}

/// Reasons an inbound datagram was not turned into a record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Message is not valid UTF-8")]
    NotUtf8,

    #[error("Message has no pointer line")]
    MissingPointer,

    #[error("Message has no location line")]
    MissingLocation,

    #[error("Message has no text line")]
    MissingText,

    #[error("Pointer line names an empty service")]
    EmptyName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_wraps_into_discovery_error() {
        let err: DiscoveryError = TransportError::Closed.into();
        assert_eq!(format!("{}", err), "Transport error: Transport is closed");
    }

    #[test]
    fn test_join_error_names_group() {
        let err = TransportError::Join {
            group: Ipv4Addr::new(224, 0, 0, 251),
            source: std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no route"),
        };
        assert!(format!("{}", err).contains("224.0.0.251"));
    }
}
