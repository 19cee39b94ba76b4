use anyhow::{Context, Result};
use uuid::Uuid;
use beacon::DiscoveryEngine;
use crate::config::{AnnounceConfig, DiscoverConfig};

/// Starts continuous announcement and discovery for every configured service.
pub async fn register_services(
    engine: &DiscoveryEngine,
    announce: &[AnnounceConfig],
    discover: &[DiscoverConfig],
) -> Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(announce.len() + discover.len());

    for service in announce {
        let id = engine
            .start_continuous_announcement(&service.name, service.port, &service.tags)
            .await
            .with_context(|| format!("Failed to announce {}", service.name))?;

        tracing::info!(
            "Announcing {} on port {} as {} with tags {:?}",
            service.name,
            service.port,
            engine.codec().advertised_host(),
            service.tags
        );
        ids.push(id);
    }

    for service in discover {
        let id = engine
            .start_continuous_discovery(&service.name, &service.tags)
            .await
            .with_context(|| format!("Failed to start discovery for {}", service.name))?;

        tracing::info!("Discovering {} with tags {:?}", service.name, service.tags);
        ids.push(id);
    }

    Ok(ids)
}

/// Stops every announcement and discovery timer the engine is running.
pub async fn unregister_services(engine: &DiscoveryEngine) -> Result<()> {
    let announcements = engine
        .stop_all_announcements()
        .await
        .context("Failed to stop announcements")?;
    let discoveries = engine
        .stop_all_discovery()
        .await
        .context("Failed to stop discovery")?;

    tracing::info!(
        "Stopped {} announcements and {} discoveries",
        announcements,
        discoveries
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use beacon::{DiscoveryConfig, Transport, TransportError};

    struct NullTransport;

    impl Transport for NullTransport {
        fn send_to_group(&self, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn test_register_returns_managed_ids() {
        let config = DiscoveryConfig {
            hostname: Some("alpha".to_string()),
            ..Default::default()
        };
        let engine = DiscoveryEngine::with_transport(config, Arc::new(NullTransport)).unwrap();
        let announce = vec![AnnounceConfig {
            name: "Greeter".to_string(),
            port: 9001,
            tags: vec!["server".to_string()],
            payload: None,
        }];
        let discover = vec![DiscoverConfig {
            name: "Greeter".to_string(),
            tags: vec!["client".to_string()],
        }];

        let ids = register_services(&engine, &announce, &discover).await.unwrap();
        let managed = engine.services().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| managed.iter().any(|m| m.id == *id)));

        unregister_services(&engine).await.unwrap();
        let managed = engine.services().await.unwrap();
        assert!(managed.iter().all(|m| !m.announcing && !m.discovering));
    }
}
