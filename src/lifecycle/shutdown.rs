//! Shutdown coordination for the gateway.

use tokio::sync::broadcast;

use crate::security::ForkLimiter;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that every accept loop subscribes to.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of loops still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until every running session has released its admission slot.
pub async fn drain_sessions(limiter: &ForkLimiter) {
    let active = limiter.active();
    if active > 0 {
        tracing::info!(active, "Waiting for sessions to finish");
    }
    limiter.wait_idle().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_reaches_all_subscribers() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        a.recv().await.unwrap();
        b.recv().await.unwrap();
    }

    #[tokio::test]
    async fn drain_waits_for_released_slots() {
        let limiter = ForkLimiter::new(0);
        let slot = limiter.try_acquire().unwrap();

        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            slot.release();
        });

        tokio::time::timeout(Duration::from_secs(2), drain_sessions(&limiter))
            .await
            .unwrap();
        assert_eq!(limiter.active(), 0);
        release.await.unwrap();
    }
}
