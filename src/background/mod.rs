pub mod sweeper;

use tokio::sync::broadcast;

/// Holds the shutdown broadcast for periodic background tasks.
pub struct BackgroundCoordinator {
    shutdown_tx: broadcast::Sender<()>,
}

impl BackgroundCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signal all background tasks to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Default for BackgroundCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_coordinator_shutdown_signal() {
        let coord = BackgroundCoordinator::new();
        let mut rx = coord.subscribe_shutdown();
        coord.shutdown();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_shutdown_without_subscribers_is_harmless() {
        BackgroundCoordinator::default().shutdown();
    }
}
