//! Network availability checks

use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::SyncMode;

/// Answers whether the network allows syncing in a given mode
pub trait ConnectivityChecker: Send + Sync {
    fn is_connection_available(&self, mode: SyncMode) -> bool;
}

/// Connectivity state pushed in by the host
#[derive(Debug)]
pub struct StaticConnectivity {
    connected: AtomicBool,
    unmetered: AtomicBool,
}

impl StaticConnectivity {
    #[must_use]
    pub const fn new(connected: bool, unmetered: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            unmetered: AtomicBool::new(unmetered),
        }
    }

    /// Connected on an unmetered network
    #[must_use]
    pub const fn online() -> Self {
        Self::new(true, true)
    }

    #[must_use]
    pub const fn offline() -> Self {
        Self::new(false, false)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_unmetered(&self, unmetered: bool) {
        self.unmetered.store(unmetered, Ordering::SeqCst);
    }
}

impl Default for StaticConnectivity {
    fn default() -> Self {
        Self::online()
    }
}

impl ConnectivityChecker for StaticConnectivity {
    fn is_connection_available(&self, mode: SyncMode) -> bool {
        let connected = self.connected.load(Ordering::SeqCst);
        match mode {
            SyncMode::Always => connected,
            SyncMode::Wifi => connected && self.unmetered.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wifi_mode_requires_unmetered_network() {
        let connectivity = StaticConnectivity::new(true, false);
        assert!(connectivity.is_connection_available(SyncMode::Always));
        assert!(!connectivity.is_connection_available(SyncMode::Wifi));

        connectivity.set_unmetered(true);
        assert!(connectivity.is_connection_available(SyncMode::Wifi));

        connectivity.set_connected(false);
        assert!(!connectivity.is_connection_available(SyncMode::Always));
        assert!(!connectivity.is_connection_available(SyncMode::Wifi));
    }
}
