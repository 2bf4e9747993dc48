use alloc::collections::BTreeSet;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::bounded;
use crate::config::WifiCredentials;
use crate::net::{NetworkError, WifiStation};

#[derive(Debug, Default)]
struct WifiState {
    in_range: BTreeSet<String>,
    connected: Option<String>,
    attempts: Vec<String>,
    /// Link status queries left before every network leaves range
    link_queries_left: Option<usize>,
}

/// WiFi station whose reachable networks are set by the test
#[derive(Debug, Clone, Default)]
pub struct MockWifi {
    state: Rc<RefCell<WifiState>>,
}

impl MockWifi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a network into or out of range. Leaving range drops the association.
    pub fn set_in_range(&self, ssid: &str, in_range: bool) {
        let mut state = self.state.borrow_mut();
        if in_range {
            state.in_range.insert(String::from(ssid));
        } else {
            state.in_range.remove(ssid);
            if state.connected.as_deref() == Some(ssid) {
                state.connected = None;
            }
        }
    }

    /// Take every network out of range
    pub fn go_offline(&self) {
        let mut state = self.state.borrow_mut();
        state.in_range.clear();
        state.connected = None;
    }

    /// Answer the next `queries` link status checks normally, then take every
    /// network out of range
    pub fn leave_range_after(&self, queries: usize) {
        self.state.borrow_mut().link_queries_left = Some(queries);
    }

    /// SSIDs of every association attempt, in order
    pub fn attempts(&self) -> Vec<String> {
        self.state.borrow().attempts.clone()
    }
}

impl WifiStation for MockWifi {
    fn is_connected(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        let left = state.link_queries_left;
        match left {
            Some(0) => {
                state.link_queries_left = None;
                state.in_range.clear();
                state.connected = None;
            }
            Some(left) => state.link_queries_left = Some(left - 1),
            None => {}
        }
        state.connected.is_some()
    }

    async fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), NetworkError> {
        let mut state = self.state.borrow_mut();
        let ssid = credentials.ssid.as_str();
        state.attempts.push(String::from(ssid));
        if state.in_range.contains(ssid) {
            state.connected = Some(String::from(ssid));
            Ok(())
        } else {
            Err(NetworkError::NotFound(bounded(ssid)))
        }
    }

    fn ssid(&self) -> Option<String> {
        self.state.borrow().connected.clone()
    }
}
