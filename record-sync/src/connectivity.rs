//! Online/offline signal and the retry-on-reconnect task.

use std::sync::Arc;

use events::DomainEvent;
use log::*;
use service::store::KeyValueStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::RecordSyncQueue;

/// Shared boolean connectivity status with change notifications.
#[derive(Debug, Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Updates the status. Returns `true` if it changed; subscribers are only
    /// notified on a change.
    pub fn set_online(&self, online: bool) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Runs [`RecordSyncQueue::retry_pending`] on every offline to online transition.
///
/// Also publishes `ConnectivityChanged` for every transition. The queue keeps
/// its own [`Connectivity`] handle, so the task runs until it is aborted.
pub fn spawn_reconnect_retry<S>(queue: Arc<RecordSyncQueue<S>>) -> JoinHandle<()>
where
    S: KeyValueStore + 'static,
{
    let mut receiver = queue.connectivity().subscribe();

    tokio::spawn(async move {
        let mut was_online = *receiver.borrow_and_update();

        while receiver.changed().await.is_ok() {
            let online = *receiver.borrow_and_update();
            if online == was_online {
                continue;
            }
            was_online = online;

            info!("Connectivity changed: {}", if online { "online" } else { "offline" });
            queue
                .publisher()
                .publish(DomainEvent::ConnectivityChanged { online })
                .await;

            if online {
                match queue.retry_pending().await {
                    Ok(synced) => info!("Reconnect retry synced {synced} records"),
                    Err(e) => error!("Reconnect retry failed: {e}"),
                }
            }
        }

        debug!("Connectivity signal closed, reconnect retry stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_online_reports_changes_only() {
        let connectivity = Connectivity::new(false);
        assert!(!connectivity.is_online());
        assert!(connectivity.set_online(true));
        assert!(!connectivity.set_online(true));
        assert!(connectivity.is_online());
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let connectivity = Connectivity::new(false);
        let mut receiver = connectivity.subscribe();

        connectivity.set_online(true);
        receiver.changed().await.unwrap();
        assert!(*receiver.borrow_and_update());

        let clone = connectivity.clone();
        clone.set_online(false);
        receiver.changed().await.unwrap();
        assert!(!*receiver.borrow());
        assert!(!connectivity.is_online());
    }
}
