//! Vision collaborators
//!
//! The actual vision-language call lives outside this crate; here we define
//! the seam it plugs into plus the in-memory session context that
//! accumulates what the agent has seen.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::CognitiveState;

/// Analyses retained for the rolling context summary
const CONTEXT_WINDOW: usize = 10;

/// Result of analyzing a batch of screen frames
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// One-line description of what is on screen
    pub summary: String,
    /// Best guess at the user's current activity (e.g. "coding", "email")
    pub activity: String,
    pub observed_at: DateTime<Utc>,
}

/// Seam for the external vision summarizer.
///
/// `analyze` is a blocking network call and only ever runs on the decision
/// worker thread. Implementations should bound their own latency; an expired
/// call is a recoverable per-cycle failure, never fatal.
pub trait VisionAnalyzer: Send {
    fn analyze(
        &mut self,
        frames: &[String],
        context_summary: &str,
    ) -> Result<AnalysisResult, EngineError>;
}

/// Session statistics surfaced on the status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    pub analyses_total: u64,
    pub current_activity: Option<String>,
    /// How many analyses were observed in each cognitive state
    pub state_counts: HashMap<String, u64>,
}

/// Rolling in-memory record of what the agent has observed this session.
///
/// Bounded: only the last [`CONTEXT_WINDOW`] analyses contribute to the
/// summary handed back to the vision layer.
pub struct ContextTracker {
    started_at: DateTime<Utc>,
    recent: VecDeque<AnalysisResult>,
    analyses_total: u64,
    state_counts: HashMap<String, u64>,
}

impl Default for ContextTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTracker {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            recent: VecDeque::with_capacity(CONTEXT_WINDOW),
            analyses_total: 0,
            state_counts: HashMap::new(),
        }
    }

    /// Fold a completed analysis into the session context
    pub fn update(&mut self, analysis: &AnalysisResult, state: CognitiveState) {
        self.recent.push_back(analysis.clone());
        while self.recent.len() > CONTEXT_WINDOW {
            self.recent.pop_front();
        }
        self.analyses_total += 1;
        *self
            .state_counts
            .entry(state.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// Compact text summary of recent activity, oldest first
    pub fn summary(&self) -> String {
        if self.recent.is_empty() {
            return String::new();
        }
        self.recent
            .iter()
            .map(|analysis| analysis.activity.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    pub fn session_stats(&self) -> SessionStats {
        SessionStats {
            started_at: self.started_at,
            analyses_total: self.analyses_total,
            current_activity: self.recent.back().map(|a| a.activity.clone()),
            state_counts: self.state_counts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn analysis(activity: &str) -> AnalysisResult {
        AnalysisResult {
            summary: format!("user is {activity}"),
            activity: activity.to_string(),
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_tracker() {
        let tracker = ContextTracker::new();
        assert_eq!(tracker.summary(), "");
        let stats = tracker.session_stats();
        assert_eq!(stats.analyses_total, 0);
        assert_eq!(stats.current_activity, None);
    }

    #[test]
    fn test_summary_orders_oldest_first() {
        let mut tracker = ContextTracker::new();
        tracker.update(&analysis("coding"), CognitiveState::DeepFocus);
        tracker.update(&analysis("email"), CognitiveState::Stressed);
        assert_eq!(tracker.summary(), "coding -> email");
    }

    #[test]
    fn test_context_window_is_bounded() {
        let mut tracker = ContextTracker::new();
        for i in 0..25 {
            tracker.update(&analysis(&format!("task-{i}")), CognitiveState::Relaxed);
        }
        let stats = tracker.session_stats();
        assert_eq!(stats.analyses_total, 25);
        assert_eq!(stats.current_activity.as_deref(), Some("task-24"));
        // summary only covers the window
        assert!(tracker.summary().starts_with("task-15"));
        assert_eq!(tracker.summary().matches("->").count(), 9);
    }

    #[test]
    fn test_state_counts_accumulate() {
        let mut tracker = ContextTracker::new();
        tracker.update(&analysis("coding"), CognitiveState::DeepFocus);
        tracker.update(&analysis("coding"), CognitiveState::DeepFocus);
        tracker.update(&analysis("slack"), CognitiveState::Wired);
        let stats = tracker.session_stats();
        assert_eq!(stats.state_counts.get("DEEP_FOCUS"), Some(&2));
        assert_eq!(stats.state_counts.get("WIRED"), Some(&1));
    }
}
