//! Cognitive state classification
//!
//! Maps a biometric sample onto one of five discrete cognitive states using
//! an inverted-U arousal model: an arousal score is derived from strain and
//! heart-rate elevation, a resilience score from recovery, HRV, and sleep
//! performance, and the sample is assigned to the nearest calibration anchor
//! in (arousal, resilience) space.
//!
//! The classifier also detects state transitions: it remembers the last
//! classification and notifies a registered observer exactly once whenever
//! the result changes, with a human-readable reason derived from the sample.

use crate::biometrics::PRESETS;
use crate::types::{BiometricSample, CognitiveState};

/// Weight of strain in the arousal score
const AROUSAL_STRAIN_WEIGHT: f64 = 0.7;
/// Weight of heart-rate elevation in the arousal score
const AROUSAL_HR_WEIGHT: f64 = 0.3;
/// Resting heart rate used as the elevation floor (bpm)
const HR_REST: f64 = 60.0;
/// Heart-rate span mapped onto the 0-1 elevation range (bpm)
const HR_SPAN: f64 = 60.0;

const RESILIENCE_RECOVERY_WEIGHT: f64 = 0.5;
const RESILIENCE_HRV_WEIGHT: f64 = 0.3;
const RESILIENCE_SLEEP_WEIGHT: f64 = 0.2;
/// HRV ceiling mapped onto the 0-1 range (ms RMSSD)
const HRV_SPAN: f64 = 100.0;

/// A detected change in cognitive state
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: CognitiveState,
    pub to: CognitiveState,
    pub reason: String,
}

/// Observer invoked on every state transition
pub type TransitionObserver = Box<dyn Fn(&StateTransition) + Send>;

/// Arousal score in 0-1: physiological activation from strain and HR elevation
pub fn arousal_score(sample: &BiometricSample) -> f64 {
    let strain = (sample.strain / 21.0).clamp(0.0, 1.0);
    let hr_elevation = ((sample.heart_rate - HR_REST) / HR_SPAN).clamp(0.0, 1.0);
    AROUSAL_STRAIN_WEIGHT * strain + AROUSAL_HR_WEIGHT * hr_elevation
}

/// Resilience score in 0-1: recovery capacity from recovery, HRV, and sleep
pub fn resilience_score(sample: &BiometricSample) -> f64 {
    let recovery = (sample.recovery / 100.0).clamp(0.0, 1.0);
    let hrv = (sample.hrv / HRV_SPAN).clamp(0.0, 1.0);
    let sleep = sample.sleep_performance.clamp(0.0, 1.0);
    RESILIENCE_RECOVERY_WEIGHT * recovery
        + RESILIENCE_HRV_WEIGHT * hrv
        + RESILIENCE_SLEEP_WEIGHT * sleep
}

/// Human-readable explanation for a state change, by priority
fn transition_reason(sample: &BiometricSample) -> String {
    if sample.strain > 16.0 {
        "Strain over 16".to_string()
    } else if sample.recovery < 40.0 {
        "Recovery dropped below 40".to_string()
    } else if sample.sleep_performance < 0.7 {
        "Poor sleep performance".to_string()
    } else {
        "Biometric data changed".to_string()
    }
}

/// Stateful classifier with transition detection.
///
/// Classification itself is a pure function of the sample; the retained
/// state exists only to detect and report transitions.
pub struct StateClassifier {
    /// (state, arousal, resilience) anchors from the canonical presets
    anchors: Vec<(CognitiveState, f64, f64)>,
    current: CognitiveState,
    observer: Option<TransitionObserver>,
}

impl Default for StateClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StateClassifier {
    pub fn new() -> Self {
        let anchors = PRESETS
            .iter()
            .map(|(state, sample)| (*state, arousal_score(sample), resilience_score(sample)))
            .collect();
        Self {
            anchors,
            current: CognitiveState::default(),
            observer: None,
        }
    }

    /// Register the transition observer. The observer runs on whichever
    /// thread calls `classify`, so it must be `Send`.
    pub fn on_transition(&mut self, observer: TransitionObserver) {
        self.observer = Some(observer);
    }

    /// The most recent classification result (RELAXED before the first call)
    pub fn current_state(&self) -> CognitiveState {
        self.current
    }

    /// Classify a sample. Total: out-of-range values are clamped, never
    /// rejected. Fires the transition observer exactly once when the result
    /// differs from the previous one; the stored state is updated only after
    /// the observer returns, so it always sees the true old value.
    pub fn classify(&mut self, sample: &BiometricSample) -> CognitiveState {
        let state = self.classify_pure(sample);
        if state != self.current {
            let transition = StateTransition {
                from: self.current,
                to: state,
                reason: transition_reason(sample),
            };
            if let Some(observer) = &self.observer {
                observer(&transition);
            }
            self.current = state;
        }
        state
    }

    /// Nearest-anchor lookup in (arousal, resilience) space, no side effects
    pub fn classify_pure(&self, sample: &BiometricSample) -> CognitiveState {
        let arousal = arousal_score(sample);
        let resilience = resilience_score(sample);

        self.anchors
            .iter()
            .min_by(|a, b| {
                let da = (a.1 - arousal).powi(2) + (a.2 - resilience).powi(2);
                let db = (b.1 - arousal).powi(2) + (b.2 - resilience).powi(2);
                da.total_cmp(&db)
            })
            .map(|(state, _, _)| *state)
            .unwrap_or_default()
    }
}
