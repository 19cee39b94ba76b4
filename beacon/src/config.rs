use std::net::Ipv4Addr;
use std::time::Duration;
use serde::Deserialize;
use shared::protocol::{MULTICAST_GROUP, MULTICAST_PORT, MULTICAST_TTL};
use crate::error::{DiscoveryError, Result};

/// Engine configuration. Every field has a default so an empty
/// `[discovery]` table is valid.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_group")]
    pub group: Ipv4Addr,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Interface address used to join the group
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,
    /// Overrides the system hostname in outgoing announcements
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default = "default_announce_interval")]
    pub announce_interval_secs: u64,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

fn default_group() -> Ipv4Addr {
    MULTICAST_GROUP
}

fn default_port() -> u16 {
    MULTICAST_PORT
}

fn default_ttl() -> u32 {
    MULTICAST_TTL
}

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_announce_interval() -> u64 {
    5
}

fn default_discovery_interval() -> u64 {
    5
}

fn default_stale_after() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_recv_buffer_size() -> usize {
    9000
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: default_group(),
            port: default_port(),
            ttl: default_ttl(),
            interface: default_interface(),
            hostname: None,
            announce_interval_secs: default_announce_interval(),
            discovery_interval_secs: default_discovery_interval(),
            stale_after_secs: default_stale_after(),
            sweep_interval_secs: default_sweep_interval(),
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.group.is_multicast() {
            return Err(DiscoveryError::InvalidArgument(format!(
                "{} is not a multicast address",
                self.group
            )));
        }
        if self.ttl == 0 || self.ttl > 255 {
            return Err(DiscoveryError::InvalidArgument(format!(
                "multicast ttl must be 1-255, got {}",
                self.ttl
            )));
        }
        let intervals = [
            ("announce_interval_secs", self.announce_interval_secs),
            ("discovery_interval_secs", self.discovery_interval_secs),
            ("stale_after_secs", self.stale_after_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(DiscoveryError::InvalidArgument(format!("{} must be non-zero", name)));
            }
        }
        // Activity is only refreshed by broadcast ticks, so a running timer
        // must tick at least once per staleness window.
        let broadcasts = [
            ("announce_interval_secs", self.announce_interval_secs),
            ("discovery_interval_secs", self.discovery_interval_secs),
        ];
        for (name, value) in broadcasts {
            if value >= self.stale_after_secs {
                return Err(DiscoveryError::InvalidArgument(format!(
                    "{} ({}) must be less than stale_after_secs ({})",
                    name, value, self.stale_after_secs
                )));
            }
        }
        if self.recv_buffer_size == 0 {
            return Err(DiscoveryError::InvalidArgument(
                "recv_buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_secs(self.announce_interval_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
