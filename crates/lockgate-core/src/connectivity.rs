//! Connectivity status publishing
//!
//! Publishes a de-duplicated online/offline flag with last-value replay: a
//! late subscriber sees the most recent status immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::{LockgateError, Result};

/// Source of the online/offline status
pub trait ConnectivityPublisher: Send + Sync {
    /// Last published status, without polling
    fn is_online(&self) -> bool;

    /// Receiver that starts at the last published status
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Watch-channel backed publisher
///
/// Clones share the same channel. Starts offline unless told otherwise.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ConnectivityMonitor {
    /// Create a publisher with an initial status
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Publish a status
    ///
    /// Returns false, without notifying subscribers, when the status is
    /// unchanged.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }
}

impl ConnectivityPublisher for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Reachability probe that feeds a [`ConnectivityMonitor`]
///
/// Online means a TCP connection to `addr` completes within `timeout`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    /// `host:port` to connect to
    addr: String,
    /// Time between probes
    interval: Duration,
    /// Connect timeout per probe
    timeout: Duration,
}

impl TcpProbe {
    /// Create a probe
    pub fn new(addr: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    /// Connect once, reporting why the target is unreachable
    pub async fn try_connect(&self) -> Result<()> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(LockgateError::Connectivity(format!(
                "{}: {}",
                self.addr, e
            ))),
            Err(_) => Err(LockgateError::Connectivity(format!(
                "{}: no answer within {}ms",
                self.addr,
                self.timeout.as_millis()
            ))),
        }
    }

    /// Probe once
    pub async fn check(&self) -> bool {
        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }

    /// Probe on an interval, publishing into `monitor`
    ///
    /// The first probe runs immediately. Dropping the handle stops probing.
    pub fn spawn(self, monitor: ConnectivityMonitor) -> ProbeHandle {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let online = self.check().await;
                if monitor.set_online(online) {
                    info!(
                        "Connectivity changed: {}",
                        if online { "online" } else { "offline" }
                    );
                }
            }
        });

        ProbeHandle { handle }
    }
}

/// Running probe; aborted on drop
#[derive(Debug)]
pub struct ProbeHandle {
    handle: JoinHandle<()>,
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
