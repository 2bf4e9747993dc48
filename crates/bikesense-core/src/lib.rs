//! Hardware-independent core library for the BikeSense sensing unit
//!
//! This crate contains the platform-agnostic logic of the bicycle-mounted
//! environmental sensing unit: the trip lifecycle state machine, the
//! registration and batch upload client, the persistent append log with its
//! backup/resume scheme, and the trait seams for sensors, GPS, storage medium,
//! WiFi, HTTP and the status LED.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod api;
pub mod config;
pub mod controller;
pub mod indicator;
pub mod mock;
pub mod net;
pub mod sensors;
pub mod storage;
pub mod time;

/// Copy `value` into a bounded string, dropping whatever does not fit.
pub(crate) fn bounded<const N: usize>(value: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in value.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::bounded;

    #[test]
    fn test_bounded_truncates_on_char_boundary() {
        let s: heapless::String<4> = bounded("añbcd");
        assert_eq!(s.as_str(), "añb");

        let short: heapless::String<16> = bounded("ok");
        assert_eq!(short.as_str(), "ok");
    }
}
