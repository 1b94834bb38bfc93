use std::{sync::Arc, time::Duration};

use tokio::sync::watch;

use crate::MediaServer;

/// A read handle on the online/offline signal.
#[derive(Clone)]
pub struct Connectivity(watch::Receiver<bool>);
impl Connectivity {
    /// Whether the server is currently considered unreachable.
    pub fn is_offline(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait for the next transition, returning the new offline state.
    /// Returns `None` once the monitor has gone away.
    pub async fn changed(&mut self) -> Option<bool> {
        self.0.changed().await.ok()?;
        Some(*self.0.borrow_and_update())
    }

    /// A handle that always reports `is_offline`, for callers without a monitor.
    pub fn fixed(is_offline: bool) -> Self {
        let (tx, rx) = watch::channel(is_offline);
        // Dropping the sender freezes the value.
        drop(tx);
        Self(rx)
    }
}

/// Publishes whether the server is reachable.
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
    probe: Option<tokio::task::JoinHandle<()>>,
}
impl ConnectivityMonitor {
    /// A monitor that starts online and only changes through [`Self::set_offline`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx, probe: None }
    }

    /// A monitor that pings `server` every `interval`.
    pub fn with_probe<S: MediaServer>(server: Arc<S>, interval: Duration) -> Self {
        let mut monitor = Self::new();
        let tx = monitor.tx.clone();
        monitor.probe = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let is_offline = match server.ping().await {
                    Ok(()) => false,
                    Err(e) => {
                        tracing::debug!("Connectivity probe failed: {e}");
                        true
                    }
                };
                publish(&tx, is_offline);
            }
        }));
        monitor
    }

    /// Force the offline state.
    pub fn set_offline(&self, is_offline: bool) {
        publish(&self.tx, is_offline);
    }

    /// Whether the server is currently considered unreachable.
    pub fn is_offline(&self) -> bool {
        *self.tx.borrow()
    }

    /// A read handle for consumers.
    pub fn subscribe(&self) -> Connectivity {
        Connectivity(self.tx.subscribe())
    }
}
impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe.abort();
        }
    }
}

fn publish(tx: &watch::Sender<bool>, is_offline: bool) {
    let changed = tx.send_if_modified(|current| {
        if *current == is_offline {
            return false;
        }
        *current = is_offline;
        true
    });
    if changed {
        if is_offline {
            tracing::warn!("Server unreachable; switching to offline mode");
        } else {
            tracing::info!("Server reachable again");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transitions_are_published_once() {
        let monitor = ConnectivityMonitor::new();
        let mut connectivity = monitor.subscribe();
        assert!(!connectivity.is_offline());

        monitor.set_offline(true);
        assert_eq!(connectivity.changed().await, Some(true));
        assert!(connectivity.is_offline());

        // Same value again is not a transition.
        monitor.set_offline(true);
        monitor.set_offline(false);
        assert_eq!(connectivity.changed().await, Some(false));
        assert!(!monitor.is_offline());
    }

    #[tokio::test]
    async fn test_probe_follows_server() {
        let server = Arc::new(crate::test_support::FakeServer::new());
        server.set_ping_fails(true);
        let monitor = ConnectivityMonitor::with_probe(server.clone(), Duration::from_millis(10));
        let mut connectivity = monitor.subscribe();

        let wait = Duration::from_secs(5);
        assert_eq!(
            tokio::time::timeout(wait, connectivity.changed()).await.unwrap(),
            Some(true)
        );
        assert!(monitor.is_offline());

        server.set_ping_fails(false);
        assert_eq!(
            tokio::time::timeout(wait, connectivity.changed()).await.unwrap(),
            Some(false)
        );
        assert!(!monitor.is_offline());

        // Dropping the monitor stops the probe and closes the channel.
        drop(monitor);
        assert_eq!(
            tokio::time::timeout(wait, connectivity.changed()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_fixed_handle() {
        let mut connectivity = Connectivity::fixed(true);
        assert!(connectivity.is_offline());
        assert_eq!(connectivity.changed().await, None);
    }
}
