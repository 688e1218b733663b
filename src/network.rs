// network.rs - Single source of truth for "may we talk to the server"

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::{Error, Result};

/// Default deadline for any single server call
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

/// Gate combining host-reported reachability with a bounded-deadline
/// wrapper for server calls
///
/// The host (UI shell, OS reachability monitor) flips the online flag; the
/// engine only reads it. All server-talking paths wrap their futures in
/// `with_timeout`.
pub struct NetworkGate {
    online_tx: watch::Sender<bool>,
    timeout: Duration,
}

impl NetworkGate {
    pub fn new(timeout: Duration) -> Self {
        let (online_tx, _) = watch::channel(false);
        Self { online_tx, timeout }
    }

    /// Synchronous online snapshot
    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// Host-reported reachability transition
    pub fn set_online(&self, online: bool) {
        let changed = self.online_tx.send_replace(online) != online;
        if changed {
            tracing::info!(
                "Network gate: {}",
                if online { "online" } else { "offline" }
            );
        }
    }

    /// Watch online transitions (used to wake and to cancel the drain loop)
    pub fn watch_online(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    /// Run a server call under the gate's deadline
    pub async fn with_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::NetworkTimeout(format!(
                "Deadline of {:?} exceeded",
                self.timeout
            ))),
        }
    }
}

impl Default for NetworkGate {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_starts_offline_and_follows_host() {
        let gate = NetworkGate::default();
        assert!(!gate.is_online());

        gate.set_online(true);
        assert!(gate.is_online());

        gate.set_online(false);
        assert!(!gate.is_online());
    }

    #[tokio::test]
    async fn watchers_observe_transitions() {
        let gate = NetworkGate::default();
        let mut rx = gate.watch_online();

        gate.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn deadline_maps_to_network_timeout_error() {
        let gate = NetworkGate::new(Duration::from_millis(10));

        let result: Result<()> = gate
            .with_timeout(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::NetworkTimeout(_))));
    }

    #[tokio::test]
    async fn fast_futures_pass_through() {
        let gate = NetworkGate::default();
        let result = gate.with_timeout(async { Ok(41 + 1) }).await.unwrap();
        assert_eq!(result, 42);
    }
}
