use crate::client::AzmClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};

/// Result of one connection health check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    ConnectionLost,
}

/// Periodic connection health checker for one device
///
/// Updates arrive by push, so this only watches the client's connected
/// flag and reports it to listeners. It never reconnects.
pub struct HealthCoordinator {
    client: Arc<AzmClient>,
    interval: Duration,
    status_tx: broadcast::Sender<HealthStatus>,
    stop_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl HealthCoordinator {
    pub fn new(client: Arc<AzmClient>, interval: Duration) -> Self {
        let (status_tx, _) = broadcast::channel(16);
        Self {
            client,
            interval,
            status_tx,
            stop_tx: None,
            task_handle: None,
        }
    }

    /// Subscribe to health results
    pub fn subscribe(&self) -> broadcast::Receiver<HealthStatus> {
        self.status_tx.subscribe()
    }

    /// Check once and publish the result
    pub fn check(&self) -> HealthStatus {
        check_and_publish(&self.client, &self.status_tx)
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Start periodic checks, restarting them if already running
    pub async fn start(&mut self) {
        self.stop().await;

        if self.interval.is_zero() {
            tracing::debug!("Health checks disabled");
            return;
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        self.stop_tx = Some(stop_tx);

        let client = self.client.clone();
        let status_tx = self.status_tx.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = ticker.tick() => {
                        check_and_publish(&client, &status_tx);
                    }
                }
            }
            tracing::debug!("Health checks stopped");
        });

        self.task_handle = Some(handle);
    }

    /// Stop periodic checks. Does nothing if not running.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut handle) = self.task_handle.take() {
            if tokio::time::timeout(Duration::from_millis(500), &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("Health check task did not stop in time");
                handle.abort();
            }
        }
    }
}

impl Drop for HealthCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

fn check_and_publish(
    client: &AzmClient,
    status_tx: &broadcast::Sender<HealthStatus>,
) -> HealthStatus {
    let status = if client.is_connected() {
        HealthStatus::Healthy
    } else {
        tracing::warn!("Connection lost to Atlas AZM at {}", client.config().host);
        HealthStatus::ConnectionLost
    };
    let _ = status_tx.send(status);
    status
}
