//! Biometric sources
//!
//! This module defines the seam for physiological data providers and the
//! simulated band used for demos and tests. The real vendor client (OAuth +
//! polling against the band's API) plugs in behind [`BiometricSource`].

use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::types::{BiometricSample, CognitiveState};

/// Provider of physiological readings.
///
/// `fetch` is a blocking call and is only ever invoked from the biometric
/// worker loop, never from the network event loop.
pub trait BiometricSource: Send {
    fn fetch(&mut self) -> Result<BiometricSample, EngineError>;
}

/// Canonical per-state calibration presets.
///
/// These double as the classifier's anchors and as the mock band's preset
/// bank (keyed 1-5 on the wire: focus, stressed, fatigued, relaxed, wired).
pub const PRESETS: [(CognitiveState, BiometricSample); 5] = [
    (
        CognitiveState::DeepFocus,
        BiometricSample {
            heart_rate: 62.0,
            strain: 10.2,
            recovery: 75.0,
            sleep_performance: 0.85,
            hrv: 65.0,
            estimated_stress: 1.2,
            spo2: 97.5,
            skin_temp: 33.2,
        },
    ),
    (
        CognitiveState::Stressed,
        BiometricSample {
            heart_rate: 95.0,
            strain: 18.5,
            recovery: 45.0,
            sleep_performance: 0.60,
            hrv: 22.0,
            estimated_stress: 2.6,
            spo2: 96.0,
            skin_temp: 34.1,
        },
    ),
    (
        CognitiveState::Fatigued,
        BiometricSample {
            heart_rate: 55.0,
            strain: 3.1,
            recovery: 30.0,
            sleep_performance: 0.45,
            hrv: 28.0,
            estimated_stress: 1.8,
            spo2: 95.5,
            skin_temp: 33.0,
        },
    ),
    (
        CognitiveState::Relaxed,
        BiometricSample {
            heart_rate: 68.0,
            strain: 4.5,
            recovery: 85.0,
            sleep_performance: 0.92,
            hrv: 72.0,
            estimated_stress: 0.4,
            spo2: 98.0,
            skin_temp: 33.5,
        },
    ),
    (
        CognitiveState::Wired,
        BiometricSample {
            heart_rate: 88.0,
            strain: 14.3,
            recovery: 50.0,
            sleep_performance: 0.70,
            hrv: 35.0,
            estimated_stress: 1.9,
            spo2: 96.5,
            skin_temp: 33.8,
        },
    ),
];

/// Default preset at boot (relaxed)
pub const DEFAULT_PRESET: u8 = 4;

/// How long readings glide from one preset to the next
pub const TRANSITION_WINDOW: Duration = Duration::from_secs(2);

/// Sample for a 1-based preset number, if it exists
pub fn preset_sample(preset: u8) -> Option<BiometricSample> {
    PRESETS
        .get(preset.checked_sub(1)? as usize)
        .map(|(_, sample)| *sample)
}

/// Simulated band.
///
/// Holds five preset states and glides readings linearly from the previous
/// values to the target over [`TRANSITION_WINDOW`], so heart rate never
/// jumps instantaneously between presets.
pub struct MockBiometrics {
    preset: u8,
    start: BiometricSample,
    target: BiometricSample,
    transition_started: Option<Instant>,
    transition_window: Duration,
}

impl Default for MockBiometrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBiometrics {
    pub fn new() -> Self {
        let initial = preset_sample(DEFAULT_PRESET).unwrap_or(PRESETS[0].1);
        Self {
            preset: DEFAULT_PRESET,
            start: initial,
            target: initial,
            transition_started: None,
            transition_window: TRANSITION_WINDOW,
        }
    }

    /// Same mock with a custom glide window (zero makes switches instant;
    /// handy in tests and demos)
    pub fn with_transition_window(window: Duration) -> Self {
        let mut mock = Self::new();
        mock.transition_window = window;
        mock
    }

    /// Switch to a preset (1-5). Returns false for unknown presets and
    /// leaves the current target untouched.
    pub fn set_preset(&mut self, preset: u8) -> bool {
        let Some(target) = preset_sample(preset) else {
            return false;
        };
        self.start = self.reading();
        self.target = target;
        self.preset = preset;
        self.transition_started = Some(Instant::now());
        true
    }

    /// Active preset number (the transition target)
    pub fn preset(&self) -> u8 {
        self.preset
    }

    /// Wire name of the target preset's state
    pub fn preset_name(&self) -> &'static str {
        PRESETS[(self.preset - 1) as usize].0.as_str()
    }

    /// Current reading, interpolated mid-transition
    pub fn reading(&self) -> BiometricSample {
        let progress = match self.transition_started {
            None => 1.0,
            Some(started) => {
                if self.transition_window.is_zero() {
                    1.0
                } else {
                    (started.elapsed().as_secs_f64() / self.transition_window.as_secs_f64())
                        .min(1.0)
                }
            }
        };
        lerp_sample(&self.start, &self.target, progress)
    }
}

impl BiometricSource for MockBiometrics {
    fn fetch(&mut self) -> Result<BiometricSample, EngineError> {
        Ok(self.reading())
    }
}

/// A shared mock can serve as the poll loop's source while the network
/// surface switches presets on the same instance.
impl BiometricSource for std::sync::Arc<std::sync::Mutex<MockBiometrics>> {
    fn fetch(&mut self) -> Result<BiometricSample, EngineError> {
        let mock = self.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(mock.reading())
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_sample(a: &BiometricSample, b: &BiometricSample, t: f64) -> BiometricSample {
    BiometricSample {
        heart_rate: lerp(a.heart_rate, b.heart_rate, t),
        strain: lerp(a.strain, b.strain, t),
        recovery: lerp(a.recovery, b.recovery, t),
        sleep_performance: lerp(a.sleep_performance, b.sleep_performance, t),
        hrv: lerp(a.hrv, b.hrv, t),
        estimated_stress: lerp(a.estimated_stress, b.estimated_stress, t),
        spo2: lerp(a.spo2, b.spo2, t),
        skin_temp: lerp(a.skin_temp, b.skin_temp, t),
    }
}
