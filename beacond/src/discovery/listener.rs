use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use anyhow::Result;
use beacon::Subscription;
use shared::types::ServiceRecord;

/// Events forwarded from the engine subscription to the directory manager
pub enum ListenerEvent {
    Observed(ServiceRecord),
}

/// Drains the engine's discovery stream into `tx` until cancelled or the
/// engine completes the stream.
pub async fn run_listener(
    subscription: Subscription,
    tx: mpsc::Sender<ListenerEvent>,
    cancel: CancellationToken,
) -> Result<()> {
    tracing::info!("Starting discovery listener");

    let mut seen = HashSet::new();

    loop {
        tokio::select! {
            record = subscription.recv() => {
                let Some(record) = record else {
                    tracing::info!("Discovery stream completed");
                    break;
                };

                let key = (record.name.clone(), record.tags.clone());
                if seen.insert(key) {
                    tracing::info!(
                        service = %record.name,
                        tags = ?record.tags,
                        endpoint = %record.endpoint(),
                        "Discovered new service"
                    );
                } else {
                    tracing::trace!(service = %record.name, "Service re-observed");
                }

                if let Err(e) = tx.send(ListenerEvent::Observed(record)).await {
                    tracing::error!("Failed to forward discovered record: {}", e);
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("Discovery listener shutting down");
                break;
            }
        }
    }

    Ok(())
}
