//! # Detector configuration

use crate::prelude::v1::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit used when presenting speeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedUnit {
    #[serde(rename = "km/h")]
    Kmh,
    #[serde(rename = "mph")]
    Mph,
}

const KMH_TO_MPH: f32 = 0.621_371;

impl SpeedUnit {
    /// Convert a km/h value into this unit.
    pub fn convert(&self, speed_kmh: f32) -> f32 {
        match self {
            Self::Kmh => speed_kmh,
            Self::Mph => speed_kmh * KMH_TO_MPH,
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kmh => f.write_str("km/h"),
            Self::Mph => f.write_str("mph"),
        }
    }
}

impl Default for SpeedUnit {
    fn default() -> Self {
        Self::Kmh
    }
}

/// Recognised pipeline options.
///
/// Persistence of the configuration is the surrounding application's
/// concern; this type only carries the values and validates them.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Real-world width the frame is assumed to span, in metres.
    pub known_distance_m: f32,
    /// Process only every nth frame.
    pub frame_skip: usize,
    /// Frame channel capacity.
    pub buffer_size: usize,
    pub speed_unit: SpeedUnit,
    pub show_speed: bool,
    /// Sliding window length for speed smoothing.
    pub speed_window: usize,
    /// Maximum allowed speed change between frames, in km/h.
    pub max_speed_change: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            known_distance_m: 10.0,
            frame_skip: 1,
            buffer_size: 30,
            speed_unit: SpeedUnit::Kmh,
            show_speed: true,
            speed_window: 5,
            max_speed_change: 10.0,
        }
    }
}

impl DetectorConfig {
    /// Validate the configuration.
    ///
    /// Invalid configurations are fatal at startup and must prevent pipeline
    /// construction.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.known_distance_m > 0.0, "known distance must be positive");
        ensure!(self.frame_skip >= 1, "frame skip must be at least 1");
        ensure!(self.buffer_size >= 1, "buffer size must be at least 1");
        ensure!(self.speed_window >= 2, "speed window must be at least 2");
        ensure!(
            self.max_speed_change >= 0.0,
            "max speed change must not be negative"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn defaults_validate() {
        DetectorConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_values_rejected() {
        let mut config = DetectorConfig::default();
        config.frame_skip = 0;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.speed_window = 1;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.known_distance_m = -2.0;
        assert!(config.validate().is_err());

        let mut config = DetectorConfig::default();
        config.max_speed_change = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unit_names_roundtrip() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{ "speed_unit": "mph", "frame_skip": 2 }"#).unwrap();
        assert_eq!(config.speed_unit, SpeedUnit::Mph);
        assert_eq!(config.frame_skip, 2);
        // Remaining fields fall back to defaults.
        assert_eq!(config.buffer_size, 30);

        assert!(serde_json::from_str::<DetectorConfig>(r#"{ "speed_unit": "m/s" }"#).is_err());
    }

    #[test]
    fn mph_conversion() {
        assert_approx_eq!(SpeedUnit::Mph.convert(100.0), 62.1371, 0.001);
        assert_approx_eq!(SpeedUnit::Kmh.convert(42.0), 42.0, 1e-6);
        assert_eq!(SpeedUnit::Mph.to_string(), "mph");
        assert_eq!(SpeedUnit::Kmh.to_string(), "km/h");
    }
}
