//! Online/offline tracking.
//!
//! The host environment's network signal is injected as an
//! [`OnlineStatusSource`]; [`ConnectivityMonitor`] turns it into a
//! deduplicated stream of transitions delivered to registered listeners in
//! registration order.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Host capability reporting whether the network is reachable.
pub trait OnlineStatusSource: Send + Sync {
    /// Current reachability
    fn is_online(&self) -> bool;

    /// Receiver that observes every reported change
    fn changes(&self) -> watch::Receiver<bool>;
}

/// Source driven by explicit calls, for hosts that push status changes
/// (and for tests).
#[derive(Debug)]
pub struct ManualStatusSource {
    sender: watch::Sender<bool>,
}

impl ManualStatusSource {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Report a new status; repeated values are forwarded and deduplicated downstream
    pub fn set_online(&self, online: bool) {
        self.sender.send_replace(online);
    }
}

impl OnlineStatusSource for ManualStatusSource {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn changes(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Process-wide connectivity snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub online: bool,
    /// Number of genuine transitions seen so far
    pub transitions: u64,
}

/// Delivered to listeners on every genuine transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityEvent {
    pub online: bool,
    /// Value of the transition counter after this change
    pub transition: u64,
}

type Listener = Arc<dyn Fn(ConnectivityEvent) + Send + Sync>;

struct Shared {
    state: ConnectivityState,
    listeners: Vec<(u64, Listener)>,
    next_listener_id: u64,
}

/// Tracks online/offline transitions and notifies subscribers.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    shared: Arc<Mutex<Shared>>,
    source: Arc<dyn OnlineStatusSource>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectivityMonitor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the source's current status.
    pub fn new(source: Arc<dyn OnlineStatusSource>) -> Self {
        let online = source.is_online();
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectivityState {
                    online,
                    transitions: 0,
                },
                listeners: Vec::new(),
                next_listener_id: 0,
            })),
            source,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        // Listeners never run under the lock, so a poisoned guard still holds consistent state
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the device is currently considered online
    pub fn current(&self) -> bool {
        self.lock().state.online
    }

    /// Snapshot including the transition counter
    pub fn state(&self) -> ConnectivityState {
        self.lock().state
    }

    /// Register a listener; it is removed when the returned subscription is dropped.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(ConnectivityEvent) + Send + Sync + 'static,
    {
        let mut shared = self.lock();
        let id = shared.next_listener_id;
        shared.next_listener_id += 1;
        shared.listeners.push((id, Arc::new(listener)));

        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }

    /// Feed a reported status into the monitor.
    ///
    /// Returns the event when the status actually changed; repeated reports
    /// of the current status are ignored and notify nobody.
    pub fn observe(&self, online: bool) -> Option<ConnectivityEvent> {
        let (event, listeners) = {
            let mut shared = self.lock();
            if shared.state.online == online {
                return None;
            }
            shared.state.online = online;
            shared.state.transitions += 1;

            let event = ConnectivityEvent {
                online,
                transition: shared.state.transitions,
            };
            let listeners = shared
                .listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect::<Vec<_>>();
            (event, listeners)
        };

        if online {
            tracing::info!("Connectivity: online (transition {})", event.transition);
        } else {
            tracing::warn!("Connectivity: offline (transition {})", event.transition);
        }

        for listener in listeners {
            listener(event);
        }
        Some(event)
    }

    /// Spawn a task forwarding every change the source reports.
    pub fn watch_source(&self) -> JoinHandle<()> {
        let monitor = self.clone();
        let mut changes = self.source.changes();
        tokio::spawn(async move {
            // Catch up with anything reported between construction and now
            let initial = *changes.borrow_and_update();
            monitor.observe(initial);

            while changes.changed().await.is_ok() {
                let online = *changes.borrow_and_update();
                monitor.observe(online);
            }
            tracing::debug!("Connectivity source closed");
        })
    }
}

/// Handle returned by [`ConnectivityMonitor::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    shared: Weak<Mutex<Shared>>,
    id: u64,
}

impl Subscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut shared = shared.lock().unwrap_or_else(PoisonError::into_inner);
            shared.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
