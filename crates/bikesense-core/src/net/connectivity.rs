use alloc::string::String;
use alloc::vec::Vec;
use log::{debug, info};

use super::WifiStation;
use crate::config::WifiCredentials;

/// Checks whether any known network is reachable.
///
/// The monitor does not throttle itself; the caller decides how often
/// [`check`](Self::check) runs.
pub struct ConnectivityMonitor<W> {
    wifi: W,
    networks: Vec<WifiCredentials>,
}

impl<W: WifiStation> ConnectivityMonitor<W> {
    pub fn new(wifi: W, networks: Vec<WifiCredentials>) -> Self {
        Self { wifi, networks }
    }

    /// SSID of the currently joined network, if any
    pub fn ssid(&self) -> Option<String> {
        self.wifi.ssid()
    }

    /// True if already associated, otherwise try the known networks in the
    /// order they were added and stop at the first one that joins.
    pub async fn check(&mut self) -> bool {
        if self.wifi.is_connected() {
            return true;
        }

        for credentials in &self.networks {
            match self.wifi.connect(credentials).await {
                Ok(()) => {
                    info!("Joined WiFi network {}", credentials.ssid);
                    return true;
                }
                Err(e) => debug!("Could not join {}: {}", credentials.ssid, e),
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWifi;
    use alloc::vec;
    use embassy_futures::block_on;

    fn networks() -> Vec<WifiCredentials> {
        vec![
            WifiCredentials::new("home", "pw-home").unwrap(),
            WifiCredentials::new("office", "pw-office").unwrap(),
            WifiCredentials::new("phone", "pw-phone").unwrap(),
        ]
    }

    #[test]
    fn test_offline_when_nothing_in_range() {
        let wifi = MockWifi::new();
        let mut monitor = ConnectivityMonitor::new(wifi.clone(), networks());

        assert!(!block_on(monitor.check()));
        assert_eq!(wifi.attempts(), ["home", "office", "phone"]);
        assert_eq!(monitor.ssid(), None);
    }

    #[test]
    fn test_tries_networks_in_order_and_stops_at_first_join() {
        let wifi = MockWifi::new();
        wifi.set_in_range("office", true);
        wifi.set_in_range("phone", true);
        let mut monitor = ConnectivityMonitor::new(wifi.clone(), networks());

        assert!(block_on(monitor.check()));
        assert_eq!(wifi.attempts(), ["home", "office"]);
        assert_eq!(monitor.ssid().as_deref(), Some("office"));
    }

    #[test]
    fn test_already_connected_skips_association() {
        let wifi = MockWifi::new();
        wifi.set_in_range("phone", true);
        let mut monitor = ConnectivityMonitor::new(wifi.clone(), networks());
        assert!(block_on(monitor.check()));
        let attempts = wifi.attempts().len();

        assert!(block_on(monitor.check()));
        assert_eq!(wifi.attempts().len(), attempts);
    }

    #[test]
    fn test_drops_when_network_leaves_range() {
        let wifi = MockWifi::new();
        wifi.set_in_range("home", true);
        let mut monitor = ConnectivityMonitor::new(wifi.clone(), networks());
        assert!(block_on(monitor.check()));

        wifi.set_in_range("home", false);
        assert!(!block_on(monitor.check()));
    }

    #[test]
    fn test_link_lost_between_checks() {
        let wifi = MockWifi::new();
        wifi.set_in_range("office", true);
        wifi.leave_range_after(1);
        let mut monitor = ConnectivityMonitor::new(wifi.clone(), networks());

        assert!(block_on(monitor.check()));
        assert!(!block_on(monitor.check()));
        assert_eq!(wifi.attempts(), ["home", "office", "home", "office", "phone"]);

        wifi.set_in_range("phone", true);
        assert!(block_on(monitor.check()));
        wifi.go_offline();
        assert!(!block_on(monitor.check()));
    }
}
