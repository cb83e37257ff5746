//! Shared shutdown flags for the simulated fleet.
//!
//! The per-client `active` and `blocked` flags are the only state shared
//! between client tasks. All of them live in one table behind one lock, and
//! every change to the table wakes the tasks waiting on it.

use crate::ClientId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown flags of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientFlags {
    /// The client still produces messages.
    pub active: bool,
    /// Every send for this client is suppressed.
    pub blocked: bool,
}

impl Default for ClientFlags {
    fn default() -> Self {
        Self {
            active: true,
            blocked: false,
        }
    }
}

/// Flags table plus the identity of the designated client.
#[derive(Debug)]
pub struct FleetControl {
    flags: Mutex<BTreeMap<ClientId, ClientFlags>>,
    changed: Notify,
    designated: ClientId,
}

impl FleetControl {
    pub fn new(clients: &[ClientId], designated: ClientId) -> Self {
        let flags = clients
            .iter()
            .map(|id| (*id, ClientFlags::default()))
            .collect();
        Self {
            flags: Mutex::new(flags),
            changed: Notify::new(),
            designated,
        }
    }

    /// Client whose CRITICAL transition halts the whole fleet.
    pub fn designated(&self) -> ClientId {
        self.designated
    }

    pub fn is_designated(&self, client: ClientId) -> bool {
        client == self.designated
    }

    pub fn flags(&self, client: ClientId) -> Option<ClientFlags> {
        self.flags.lock().get(&client).copied()
    }

    /// Unknown clients count as blocked.
    pub fn is_blocked(&self, client: ClientId) -> bool {
        self.flags(client).map_or(true, |f| f.blocked)
    }

    pub fn is_active(&self, client: ClientId) -> bool {
        self.flags(client).map_or(false, |f| f.active)
    }

    /// Stops a single client without touching the others.
    pub fn deactivate(&self, client: ClientId) {
        if let Some(flags) = self.flags.lock().get_mut(&client) {
            flags.active = false;
        }
        self.changed.notify_waiters();
    }

    /// Suppresses every further send of every client, including sends
    /// already in flight.
    pub fn block_all(&self) {
        for flags in self.flags.lock().values_mut() {
            flags.blocked = true;
        }
        self.changed.notify_waiters();
    }

    pub fn deactivate_all(&self) {
        for flags in self.flags.lock().values_mut() {
            flags.active = false;
        }
        self.changed.notify_waiters();
    }

    /// Resolves once the client is blocked.
    pub async fn wait_until_blocked(&self, client: ClientId) {
        loop {
            // Registered before the check so a change in between is not lost.
            let changed = self.changed.notified();
            if self.is_blocked(client) {
                return;
            }
            changed.await;
        }
    }

    /// Resolves once the client is no longer active.
    pub async fn wait_until_inactive(&self, client: ClientId) {
        loop {
            let changed = self.changed.notified();
            if !self.is_active(client) {
                return;
            }
            changed.await;
        }
    }

    pub fn all_inactive(&self) -> bool {
        self.flags.lock().values().all(|f| !f.active)
    }

    pub fn all_blocked(&self) -> bool {
        self.flags.lock().values().all(|f| f.blocked)
    }

    /// Runs the shutdown cascade: block every client, hold for the grace
    /// period so the receiver can observe the stop, then deactivate everyone.
    ///
    /// The lock is not held during the grace period. Cancellation cuts the
    /// wait short but still deactivates all clients.
    pub async fn cascade(&self, grace_period: Duration, cancel: &CancellationToken) {
        self.block_all();
        warn!(
            "Designated client {} went CRITICAL, all clients blocked for {:?}",
            self.designated, grace_period
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Cancelled during shutdown grace period");
            }
            _ = tokio::time::sleep(grace_period) => {}
        }

        self.deactivate_all();
        info!("All clients deactivated");
    }
}
