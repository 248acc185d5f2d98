//! Runtime configuration
//!
//! All knobs live here with their defaults; every value can be overridden
//! through the environment (`GHOST_*`). The server binary layers CLI flags
//! on top.

use std::env;
use std::time::Duration;

/// Default seconds between screen samples
pub const CAPTURE_INTERVAL_DEFAULT: u64 = 3;
/// Screenshots are resized to this width before encoding
pub const CAPTURE_WIDTH: u32 = 1280;
/// JPEG quality for encoded frames
pub const JPEG_QUALITY: u8 = 60;
/// Perceptual-hash Hamming distance above which a frame counts as changed
pub const HASH_THRESHOLD: u32 = 5;
/// Minimum seconds between two emitted interventions
pub const INTERVENTION_COOLDOWN_SECS: u64 = 30;
/// Seconds between biometric polls
pub const BIOMETRIC_POLL_SECS: u64 = 5;

/// Engine configuration resolved at startup
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    /// Serve simulated band data instead of a live vendor source
    pub use_mock_biometrics: bool,
    pub capture_interval: Duration,
    pub capture_width: u32,
    pub jpeg_quality: u8,
    pub hash_threshold: u32,
    pub intervention_cooldown: Duration,
    pub biometric_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            use_mock_biometrics: true,
            capture_interval: Duration::from_secs(CAPTURE_INTERVAL_DEFAULT),
            capture_width: CAPTURE_WIDTH,
            jpeg_quality: JPEG_QUALITY,
            hash_threshold: HASH_THRESHOLD,
            intervention_cooldown: Duration::from_secs(INTERVENTION_COOLDOWN_SECS),
            biometric_poll_interval: Duration::from_secs(BIOMETRIC_POLL_SECS),
        }
    }
}

impl EngineConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(host) = read_var("GHOST_HOST") {
            config.host = host;
        }
        if let Some(port) = read_parsed::<u16>("GHOST_PORT") {
            config.port = port;
        }
        if let Some(mock) = read_var("GHOST_USE_MOCK_BIOMETRICS") {
            config.use_mock_biometrics = matches!(mock.as_str(), "1" | "true" | "yes");
        }
        if let Some(secs) = read_parsed::<u64>("GHOST_CAPTURE_INTERVAL_SECS") {
            config.capture_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(width) = read_parsed::<u32>("GHOST_CAPTURE_WIDTH") {
            config.capture_width = width;
        }
        if let Some(quality) = read_parsed::<u8>("GHOST_JPEG_QUALITY") {
            config.jpeg_quality = quality.clamp(1, 100);
        }
        if let Some(threshold) = read_parsed::<u32>("GHOST_HASH_THRESHOLD") {
            config.hash_threshold = threshold;
        }
        if let Some(secs) = read_parsed::<u64>("GHOST_INTERVENTION_COOLDOWN_SECS") {
            config.intervention_cooldown = Duration::from_secs(secs);
        }
        if let Some(secs) = read_parsed::<u64>("GHOST_BIOMETRIC_POLL_SECS") {
            config.biometric_poll_interval = Duration::from_secs(secs.max(1));
        }

        config
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    read_var(name).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_shipped_tuning() {
        let config = EngineConfig::default();
        assert_eq!(config.port, 8000);
        assert!(config.use_mock_biometrics);
        assert_eq!(config.capture_width, 1280);
        assert_eq!(config.jpeg_quality, 60);
        assert_eq!(config.hash_threshold, 5);
        assert_eq!(config.intervention_cooldown, Duration::from_secs(30));
        assert_eq!(config.biometric_poll_interval, Duration::from_secs(5));
    }
}
