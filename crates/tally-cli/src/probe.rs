//! Connectivity source backed by the voting API health check.

use std::sync::Arc;
use std::time::Duration;

use tally_core::{HttpRemoteAuthority, OnlineStatusSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const PROBE_INTERVAL_SECS: u64 = 15;

/// Reports the API as reachable while `GET /health` succeeds.
#[derive(Debug)]
pub struct HttpProbeSource {
    sender: watch::Sender<bool>,
}

impl HttpProbeSource {
    pub fn new(initial: bool) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Store a probe result; returns whether the status changed.
    pub fn record(&self, online: bool) -> bool {
        self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    /// Probe `remote` every `every` until the task is aborted.
    pub fn spawn_polling(
        self: &Arc<Self>,
        remote: HttpRemoteAuthority,
        every: Duration,
    ) -> JoinHandle<()> {
        let source = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let online = remote.probe().await;
                if source.record(online) {
                    let status = if online { "up" } else { "down" };
                    tracing::debug!("Health probe now reports {status}");
                }
            }
        })
    }
}

impl OnlineStatusSource for HttpProbeSource {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn changes(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
