//! Core types for the Ghost engine
//!
//! This module defines the values that flow through the sensing pipeline:
//! biometric samples, cognitive states, per-state behavior modifiers, and
//! intervention records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EngineError;

/// A single physiological reading from the band (or the mock source).
///
/// Produced once per poll and treated as immutable afterwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BiometricSample {
    /// Heart rate (bpm)
    #[serde(rename = "heartRate")]
    pub heart_rate: f64,
    /// Day strain on the vendor's 0-21 scale
    pub strain: f64,
    /// Recovery score (0-100)
    pub recovery: f64,
    /// Sleep performance as a fraction (0-1)
    #[serde(rename = "sleepPerformance")]
    pub sleep_performance: f64,
    /// Heart rate variability, RMSSD (ms)
    pub hrv: f64,
    /// Estimated stress index (vendor-specific scale)
    #[serde(rename = "estimatedStress")]
    pub estimated_stress: f64,
    /// Blood oxygen saturation (percent)
    pub spo2: f64,
    /// Skin temperature (celsius)
    #[serde(rename = "skinTemp")]
    pub skin_temp: f64,
}

/// Discrete cognitive state derived from a biometric sample.
///
/// The five states follow the inverted-U arousal model: performance peaks at
/// moderate arousal and drops off at both extremes, with recovery capacity
/// deciding whether high arousal reads as focus or stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CognitiveState {
    DeepFocus,
    Stressed,
    Fatigued,
    Relaxed,
    Wired,
}

impl CognitiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveState::DeepFocus => "DEEP_FOCUS",
            CognitiveState::Stressed => "STRESSED",
            CognitiveState::Fatigued => "FATIGUED",
            CognitiveState::Relaxed => "RELAXED",
            CognitiveState::Wired => "WIRED",
        }
    }

    /// Behavior modifiers for this state.
    ///
    /// Deep focus widens the capture interval so the agent stays out of the
    /// way; wired tightens it because context shifts fast.
    pub fn modifiers(&self) -> PersonalityModifiers {
        match self {
            CognitiveState::DeepFocus => PersonalityModifiers {
                capture_interval_secs: 8,
                max_response_tokens: 60,
                tone: "minimal",
            },
            CognitiveState::Stressed => PersonalityModifiers {
                capture_interval_secs: 4,
                max_response_tokens: 80,
                tone: "gentle",
            },
            CognitiveState::Fatigued => PersonalityModifiers {
                capture_interval_secs: 6,
                max_response_tokens: 90,
                tone: "supportive",
            },
            CognitiveState::Relaxed => PersonalityModifiers {
                capture_interval_secs: 3,
                max_response_tokens: 100,
                tone: "casual",
            },
            CognitiveState::Wired => PersonalityModifiers {
                capture_interval_secs: 2,
                max_response_tokens: 70,
                tone: "direct",
            },
        }
    }
}

impl Default for CognitiveState {
    fn default() -> Self {
        CognitiveState::Relaxed
    }
}

/// Per-state configuration controlling sampling cadence and response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersonalityModifiers {
    /// Seconds between screen samples while in this state
    pub capture_interval_secs: u64,
    /// Token budget handed to the response layer
    pub max_response_tokens: u32,
    /// Voice used by the response layer
    pub tone: &'static str,
}

/// Resolution of an intervention record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterventionOutcome {
    Pending,
    Accepted,
    Ignored,
}

/// One emitted intervention.
///
/// Immutable after creation except for `outcome`, which user feedback sets
/// exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub id: Uuid,
    pub message: String,
    pub tone: String,
    pub state: CognitiveState,
    /// Biometric reading at emission time, if one was available
    pub biometric: Option<BiometricSample>,
    pub created_at: DateTime<Utc>,
    pub outcome: InterventionOutcome,
}

/// Process-lifetime intervention counters; monotonically non-decreasing
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineCounters {
    pub interventions_total: u64,
    pub accepted: u64,
    pub ignored: u64,
}

/// User reaction to an intervention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackAction {
    Accepted,
    Ignored,
}

impl FromStr for FeedbackAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(FeedbackAction::Accepted),
            // the overlay frontend historically sends "dismissed"
            "ignored" | "dismissed" => Ok(FeedbackAction::Ignored),
            other => Err(EngineError::InvalidFeedback(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_state_wire_names() {
        assert_eq!(CognitiveState::DeepFocus.as_str(), "DEEP_FOCUS");
        let json = serde_json::to_string(&CognitiveState::DeepFocus).unwrap();
        assert_eq!(json, "\"DEEP_FOCUS\"");
        let back: CognitiveState = serde_json::from_str("\"WIRED\"").unwrap();
        assert_eq!(back, CognitiveState::Wired);
    }

    #[test]
    fn test_default_state_is_relaxed() {
        assert_eq!(CognitiveState::default(), CognitiveState::Relaxed);
    }

    #[test]
    fn test_modifiers_lookup() {
        let focus = CognitiveState::DeepFocus.modifiers();
        assert_eq!(focus.capture_interval_secs, 8);

        let wired = CognitiveState::Wired.modifiers();
        assert!(wired.capture_interval_secs < focus.capture_interval_secs);
    }

    #[test]
    fn test_feedback_action_parsing() {
        assert_eq!(
            "accepted".parse::<FeedbackAction>().unwrap(),
            FeedbackAction::Accepted
        );
        assert_eq!(
            "dismissed".parse::<FeedbackAction>().unwrap(),
            FeedbackAction::Ignored
        );
        assert!("snoozed".parse::<FeedbackAction>().is_err());
    }

    #[test]
    fn test_sample_wire_field_names() {
        let sample = BiometricSample {
            heart_rate: 62.0,
            strain: 10.2,
            recovery: 75.0,
            sleep_performance: 0.85,
            hrv: 65.0,
            estimated_stress: 1.2,
            spo2: 97.5,
            skin_temp: 33.2,
        };
        let value = serde_json::to_value(sample).unwrap();
        assert_eq!(value["heartRate"], 62.0);
        assert_eq!(value["sleepPerformance"], 0.85);
        assert_eq!(value["skinTemp"], 33.2);
    }
}
