//! Serverless service announcement and discovery over a multicast group.
//!
//! Peers periodically broadcast announcements (name, host, port, tags) and
//! discovery queries (name, tags) onto a shared group. Every announcement
//! received is decoded into a [`ServiceRecord`] and published to the
//! engine's subscribers.
//!
//! ```no_run
//! use beacon::{DiscoveryConfig, DiscoveryEngine};
//!
//! #[tokio::main]
//! async fn main() -> beacon::Result<()> {
//!     let engine = DiscoveryEngine::start(DiscoveryConfig::default())?;
//!     let events = engine.subscribe();
//!
//!     let tags = vec!["server".to_string()];
//!     engine.start_continuous_announcement("Greeter", 9001, &tags).await?;
//!     engine.start_continuous_discovery("Greeter", &tags).await?;
//!
//!     while let Some(record) = events.recv().await {
//!         println!("{} at {}", record.name, record.endpoint());
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod registry;
pub mod scheduler;
pub mod transport;

pub use codec::{DiscoveryQuery, MessageCodec};
pub use config::DiscoveryConfig;
pub use engine::{DiscoveryEngine, InboundSink};
pub use error::{DecodeError, DiscoveryError, Result, TransportError};
pub use events::{EventStream, Subscription, SubscriptionId};
pub use registry::{ManagedServiceInfo, RegistryHandle, StopOutcome};
pub use scheduler::{Scheduler, TimerHandle};
pub use shared::types::ServiceRecord;
pub use transport::{MulticastTransport, Transport};
