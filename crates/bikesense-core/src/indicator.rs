//! Status LED seam and the colour shown for each controller state

use embedded_graphics::pixelcolor::{Rgb888, WebColors};

use crate::controller::TripState;

/// Something that can show one colour, usually an RGB LED
pub trait StatusIndicator {
    fn set_color(&mut self, color: Rgb888);
}

/// No indicator fitted
impl StatusIndicator for () {
    fn set_color(&mut self, _color: Rgb888) {}
}

impl TripState {
    /// Colour the status indicator shows while in this state
    pub const fn color(self) -> Rgb888 {
        match self {
            Self::Idle => Rgb888::CSS_WHITE,
            Self::CollectingData => Rgb888::CSS_LIME,
            Self::NoGps => Rgb888::CSS_ORANGE,
            Self::UploadingData => Rgb888::CSS_BLUE,
            Self::Error => Rgb888::CSS_RED,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::CollectingData => "COLLECTING_DATA",
            Self::NoGps => "NO_GPS",
            Self::UploadingData => "UPLOADING_DATA",
            Self::Error => "ERROR",
        }
    }
}

impl core::fmt::Display for TripState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::pixelcolor::RgbColor;

    #[test]
    fn test_state_colors() {
        assert_eq!(TripState::Idle.color(), Rgb888::new(255, 255, 255));
        assert_eq!(TripState::CollectingData.color(), Rgb888::new(0, 255, 0));
        assert_eq!(TripState::Error.color(), Rgb888::new(255, 0, 0));
        assert_eq!(TripState::UploadingData.color().b(), 255);
        assert_eq!(TripState::NoGps.color().r(), 255);
    }

    #[test]
    fn test_every_state_has_a_distinct_color() {
        let states = [
            TripState::Idle,
            TripState::CollectingData,
            TripState::NoGps,
            TripState::UploadingData,
            TripState::Error,
        ];
        for (i, a) in states.iter().enumerate() {
            for b in &states[i + 1..] {
                assert_ne!(a.color(), b.color(), "{} and {} share a colour", a, b);
            }
        }
    }
}
