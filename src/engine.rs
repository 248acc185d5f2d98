//! Intervention decision engine
//!
//! Each decision cycle runs IDLE -> EVALUATING -> {SUPPRESSED, EMITTED} ->
//! IDLE: a global cooldown gate first, then the external judge, with a
//! deterministic fallback generator covering judge outages. Emissions land
//! in a bounded history and bump process-lifetime counters; user feedback
//! resolves the most recent pending record.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::{
    BiometricSample, CognitiveState, EngineCounters, FeedbackAction, InterventionOutcome,
    InterventionRecord, PersonalityModifiers,
};
use crate::vision::AnalysisResult;

/// Intervention history keeps at most this many records
pub const HISTORY_CAPACITY: usize = 50;

/// A behavioral nudge ready to surface
#[derive(Debug, Clone)]
pub struct Nudge {
    pub message: String,
    pub tone: String,
}

/// Seam for the external judge that decides whether the current
/// visual+biometric context warrants a nudge. A blocking call; runs only on
/// the decision worker thread.
pub trait NudgeJudge: Send {
    fn judge(
        &mut self,
        analysis: &AnalysisResult,
        state: CognitiveState,
        modifiers: &PersonalityModifiers,
    ) -> Result<Option<Nudge>, EngineError>;
}

/// Seam for the deterministic fallback generator used when the judge is
/// unreachable. Must always produce a nudge.
pub trait FallbackNudges: Send {
    fn fallback(&mut self, state: CognitiveState) -> Nudge;
}

/// Default fallback bank: canned per-state messages, rotating
pub struct CannedNudges {
    cursor: usize,
}

impl Default for CannedNudges {
    fn default() -> Self {
        Self::new()
    }
}

impl CannedNudges {
    pub fn new() -> Self {
        Self { cursor: 0 }
    }

    fn bank(state: CognitiveState) -> &'static [&'static str] {
        match state {
            CognitiveState::DeepFocus => &[
                "Still deep in it. Remember to blink.",
                "Long stretch of focus. Shoulders down, jaw loose.",
            ],
            CognitiveState::Stressed => &[
                "Strain is spiking. Thirty seconds of slow breathing pays for itself.",
                "You've been grinding. One thing at a time.",
            ],
            CognitiveState::Fatigued => &[
                "You're running on fumes. A short break now beats a long one later.",
                "Energy is low. Stand up, get water, come back.",
            ],
            CognitiveState::Relaxed => &[
                "Good steady pace. Keep it.",
                "Nice rhythm today. Nothing to fix.",
            ],
            CognitiveState::Wired => &[
                "You're wired. Water instead of another coffee?",
                "High revs, shallow focus. Pick one tab and close the rest.",
            ],
        }
    }
}

impl FallbackNudges for CannedNudges {
    fn fallback(&mut self, state: CognitiveState) -> Nudge {
        let bank = Self::bank(state);
        let message = bank[self.cursor % bank.len()];
        self.cursor = self.cursor.wrapping_add(1);
        Nudge {
            message: message.to_string(),
            tone: state.modifiers().tone.to_string(),
        }
    }
}

/// Decides whether to surface an intervention, with a single global
/// cooldown timer shared across all states and both judge paths.
pub struct InterventionEngine {
    judge: Box<dyn NudgeJudge>,
    fallback: Box<dyn FallbackNudges>,
    cooldown: Duration,
    last_emitted: Option<Instant>,
    history: VecDeque<InterventionRecord>,
    counters: EngineCounters,
}

impl InterventionEngine {
    pub fn new(
        judge: Box<dyn NudgeJudge>,
        fallback: Box<dyn FallbackNudges>,
        cooldown: Duration,
    ) -> Self {
        Self {
            judge,
            fallback,
            cooldown,
            last_emitted: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            counters: EngineCounters::default(),
        }
    }

    /// Run one decision cycle. Returns the emitted record, or None when
    /// suppressed by cooldown or when the judge declines.
    pub fn decide(
        &mut self,
        analysis: &AnalysisResult,
        state: CognitiveState,
        modifiers: &PersonalityModifiers,
        sample: Option<BiometricSample>,
    ) -> Option<InterventionRecord> {
        self.decide_at(Instant::now(), analysis, state, modifiers, sample)
    }

    fn decide_at(
        &mut self,
        now: Instant,
        analysis: &AnalysisResult,
        state: CognitiveState,
        modifiers: &PersonalityModifiers,
        sample: Option<BiometricSample>,
    ) -> Option<InterventionRecord> {
        // one global timer, not per-state
        if let Some(last) = self.last_emitted {
            if now.duration_since(last) < self.cooldown {
                return None;
            }
        }

        let nudge = match self.judge.judge(analysis, state, modifiers) {
            Ok(Some(nudge)) => nudge,
            Ok(None) => return None,
            Err(e) => {
                warn!("judge unavailable, using fallback: {e}");
                self.fallback.fallback(state)
            }
        };

        let record = InterventionRecord {
            id: Uuid::new_v4(),
            message: nudge.message,
            tone: nudge.tone,
            state,
            biometric: sample,
            created_at: Utc::now(),
            outcome: InterventionOutcome::Pending,
        };

        self.history.push_back(record.clone());
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.counters.interventions_total += 1;
        self.last_emitted = Some(now);

        Some(record)
    }

    /// Resolve the most recent pending record. No pending record is a
    /// no-op (returns false), never an error.
    pub fn apply_feedback(&mut self, action: FeedbackAction) -> bool {
        let Some(record) = self
            .history
            .iter_mut()
            .rev()
            .find(|record| record.outcome == InterventionOutcome::Pending)
        else {
            return false;
        };

        match action {
            FeedbackAction::Accepted => {
                record.outcome = InterventionOutcome::Accepted;
                self.counters.accepted += 1;
            }
            FeedbackAction::Ignored => {
                record.outcome = InterventionOutcome::Ignored;
                self.counters.ignored += 1;
            }
        }
        true
    }

    pub fn counters(&self) -> EngineCounters {
        self.counters
    }

    /// Most recent records, oldest first, at most `limit`
    pub fn history_tail(&self, limit: usize) -> Vec<InterventionRecord> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct AlwaysNudge;

    impl NudgeJudge for AlwaysNudge {
        fn judge(
            &mut self,
            _analysis: &AnalysisResult,
            state: CognitiveState,
            _modifiers: &PersonalityModifiers,
        ) -> Result<Option<Nudge>, EngineError> {
            Ok(Some(Nudge {
                message: format!("nudge for {}", state.as_str()),
                tone: "casual".to_string(),
            }))
        }
    }

    struct NeverNudge;

    impl NudgeJudge for NeverNudge {
        fn judge(
            &mut self,
            _analysis: &AnalysisResult,
            _state: CognitiveState,
            _modifiers: &PersonalityModifiers,
        ) -> Result<Option<Nudge>, EngineError> {
            Ok(None)
        }
    }

    struct BrokenJudge;

    impl NudgeJudge for BrokenJudge {
        fn judge(
            &mut self,
            _analysis: &AnalysisResult,
            _state: CognitiveState,
            _modifiers: &PersonalityModifiers,
        ) -> Result<Option<Nudge>, EngineError> {
            Err(EngineError::Judge("unreachable".to_string()))
        }
    }

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            summary: "user is coding".to_string(),
            activity: "coding".to_string(),
            observed_at: Utc::now(),
        }
    }

    fn engine_with(judge: Box<dyn NudgeJudge>, cooldown: Duration) -> InterventionEngine {
        InterventionEngine::new(judge, Box::new(CannedNudges::new()), cooldown)
    }

    fn decide_at(engine: &mut InterventionEngine, now: Instant) -> Option<InterventionRecord> {
        let state = CognitiveState::Relaxed;
        engine.decide_at(now, &analysis(), state, &state.modifiers(), None)
    }

    #[test]
    fn test_cooldown_limits_emission_rate() {
        let mut engine = engine_with(Box::new(AlwaysNudge), Duration::from_secs(30));
        let base = Instant::now();

        // decide every 100ms for 60 simulated seconds
        let mut emitted = 0;
        for tick in 0..600u64 {
            let now = base + Duration::from_millis(tick * 100);
            if decide_at(&mut engine, now).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 2);
        assert_eq!(engine.counters().interventions_total, 2);
    }

    #[test]
    fn test_judge_decline_does_not_reset_cooldown() {
        let mut engine = engine_with(Box::new(NeverNudge), Duration::from_secs(30));
        let base = Instant::now();
        assert!(decide_at(&mut engine, base).is_none());

        // swap in an eager judge: emission allowed immediately because the
        // decline above never armed the cooldown timer
        engine.judge = Box::new(AlwaysNudge);
        assert!(decide_at(&mut engine, base + Duration::from_millis(1)).is_some());
    }

    #[test]
    fn test_broken_judge_falls_back() {
        let mut engine = engine_with(Box::new(BrokenJudge), Duration::from_secs(30));
        let record = decide_at(&mut engine, Instant::now()).unwrap();
        assert!(!record.message.is_empty());
        assert_eq!(record.outcome, InterventionOutcome::Pending);
        assert_eq!(engine.counters().interventions_total, 1);
    }

    #[test]
    fn test_fallback_respects_same_cooldown() {
        let mut engine = engine_with(Box::new(BrokenJudge), Duration::from_secs(30));
        let base = Instant::now();
        assert!(decide_at(&mut engine, base).is_some());
        assert!(decide_at(&mut engine, base + Duration::from_secs(5)).is_none());
        assert!(decide_at(&mut engine, base + Duration::from_secs(31)).is_some());
    }

    #[test]
    fn test_history_bounded_fifo() {
        let mut engine = engine_with(Box::new(AlwaysNudge), Duration::ZERO);
        let base = Instant::now();
        let mut ids = Vec::new();
        for tick in 0..60u64 {
            let record = decide_at(&mut engine, base + Duration::from_secs(tick)).unwrap();
            ids.push(record.id);
        }

        let tail = engine.history_tail(HISTORY_CAPACITY);
        assert_eq!(tail.len(), HISTORY_CAPACITY);
        // oldest ten evicted
        assert_eq!(tail.first().unwrap().id, ids[10]);
        assert_eq!(tail.last().unwrap().id, ids[59]);

        let last_twenty = engine.history_tail(20);
        assert_eq!(last_twenty.len(), 20);
        assert_eq!(last_twenty.first().unwrap().id, ids[40]);
    }

    #[test]
    fn test_feedback_without_pending_is_noop() {
        let mut engine = engine_with(Box::new(AlwaysNudge), Duration::ZERO);
        assert!(!engine.apply_feedback(FeedbackAction::Accepted));
        let counters = engine.counters();
        assert_eq!(counters.accepted, 0);
        assert_eq!(counters.ignored, 0);
    }

    #[test]
    fn test_feedback_resolves_most_recent_pending() {
        let mut engine = engine_with(Box::new(AlwaysNudge), Duration::ZERO);
        let base = Instant::now();
        decide_at(&mut engine, base);
        decide_at(&mut engine, base + Duration::from_secs(1));

        assert!(engine.apply_feedback(FeedbackAction::Accepted));
        let tail = engine.history_tail(2);
        assert_eq!(tail[1].outcome, InterventionOutcome::Accepted);
        assert_eq!(tail[0].outcome, InterventionOutcome::Pending);

        assert!(engine.apply_feedback(FeedbackAction::Ignored));
        let tail = engine.history_tail(2);
        assert_eq!(tail[0].outcome, InterventionOutcome::Ignored);

        let counters = engine.counters();
        assert_eq!(counters.accepted, 1);
        assert_eq!(counters.ignored, 1);

        // everything resolved: further feedback is a no-op
        assert!(!engine.apply_feedback(FeedbackAction::Accepted));
        assert_eq!(engine.counters().accepted, 1);
    }

    #[test]
    fn test_canned_nudges_rotate() {
        let mut bank = CannedNudges::new();
        let first = bank.fallback(CognitiveState::Wired);
        let second = bank.fallback(CognitiveState::Wired);
        assert_ne!(first.message, second.message);
        assert_eq!(first.tone, "direct");
    }
}
