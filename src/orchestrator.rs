//! Worker loop orchestration
//!
//! Three independently cadenced worker threads drive the pipeline: biometric
//! polling, screen sampling, and the decision loop. Blocking I/O (band
//! fetch, display grab, vision call) stays on these threads and never
//! touches the network event loop; results cross over through the event
//! bus. Every loop isolates its own failures: log, continue, never
//! propagate out.
//!
//! Shutdown is cooperative: a shared flag checked at iteration boundaries,
//! then a bounded join per thread. In-flight blocking calls are not
//! interrupted; a thread that outlives the join window is detached with a
//! warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::biometrics::BiometricSource;
use crate::broadcast::{BiometricUpdate, Event, EventBus, InterventionEvent};
use crate::capture::{ChangeDetector, FrameBuffer, SamplingInterval};
use crate::classifier::StateClassifier;
use crate::config::EngineConfig;
use crate::engine::InterventionEngine;
use crate::types::{BiometricSample, CognitiveState};
use crate::vision::{AnalysisResult, ContextTracker, VisionAnalyzer};

/// Decision loop waits this long before its first cycle so the screen loop
/// can seed the frame buffer
const DECISION_WARM_START: Duration = Duration::from_secs(2);
/// Decision loop backoff when the frame buffer is still empty
const EMPTY_BUFFER_BACKOFF: Duration = Duration::from_secs(1);
/// How long shutdown waits for each worker before detaching it
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Granularity of shutdown-aware sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Mutable state shared across loops and the network surface.
///
/// Every field sits behind its own lock and is reached only through the
/// accessors below; no loop touches another loop's internals directly.
#[derive(Default)]
pub struct SharedState {
    current_state: Mutex<CognitiveState>,
    latest_sample: Mutex<Option<BiometricSample>>,
    last_analysis: Mutex<Option<AnalysisResult>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> CognitiveState {
        *lock(&self.current_state)
    }

    pub fn set_current_state(&self, state: CognitiveState) {
        *lock(&self.current_state) = state;
    }

    pub fn latest_sample(&self) -> Option<BiometricSample> {
        *lock(&self.latest_sample)
    }

    pub fn set_latest_sample(&self, sample: BiometricSample) {
        *lock(&self.latest_sample) = Some(sample);
    }

    pub fn last_analysis(&self) -> Option<AnalysisResult> {
        lock(&self.last_analysis).clone()
    }

    pub fn set_last_analysis(&self, analysis: AnalysisResult) {
        *lock(&self.last_analysis) = Some(analysis);
    }
}

/// Lock that shrugs off poisoning: a panicked worker iteration must not
/// take the rest of the process down with it.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything the worker loops consume
pub struct WorkerDeps {
    pub config: EngineConfig,
    pub source: Box<dyn BiometricSource>,
    pub classifier: Arc<Mutex<StateClassifier>>,
    pub detector: ChangeDetector,
    pub buffer: Arc<Mutex<FrameBuffer>>,
    pub interval: Arc<SamplingInterval>,
    pub vision: Box<dyn VisionAnalyzer>,
    pub tracker: Arc<Mutex<ContextTracker>>,
    pub engine: Arc<Mutex<InterventionEngine>>,
    pub shared: Arc<SharedState>,
    pub bus: EventBus,
}

/// Owns the lifecycle of the three worker loops
pub struct Orchestrator {
    shutdown: Arc<AtomicBool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Orchestrator {
    /// Wire the transition observer and spawn the three loops.
    pub fn start(deps: WorkerDeps) -> Self {
        let WorkerDeps {
            config,
            source,
            classifier,
            detector,
            buffer,
            interval,
            vision,
            tracker,
            engine,
            shared,
            bus,
        } = deps;

        // state transitions fan out a notification and retune the screen
        // sampling cadence
        {
            let bus = bus.clone();
            let interval = interval.clone();
            lock(&classifier).on_transition(Box::new(move |transition| {
                info!(
                    "state {} -> {} ({})",
                    transition.from.as_str(),
                    transition.to.as_str(),
                    transition.reason
                );
                if bus
                    .publish(Event::StateChange {
                        from: transition.from.as_str().to_string(),
                        to: transition.to.as_str().to_string(),
                        reason: transition.reason.clone(),
                    })
                    .is_err()
                {
                    warn!("event bus closed, state change not delivered");
                }
                interval.set_secs(transition.to.modifiers().capture_interval_secs);
            }));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::new();

        {
            let shutdown = shutdown.clone();
            let classifier = classifier.clone();
            let shared = shared.clone();
            let bus = bus.clone();
            let poll = config.biometric_poll_interval;
            handles.push((
                "biometric",
                spawn_worker("ghost-biometric", move || {
                    biometric_loop(&shutdown, source, &classifier, &shared, &bus, poll)
                }),
            ));
        }

        {
            let shutdown = shutdown.clone();
            let buffer = buffer.clone();
            let interval = interval.clone();
            handles.push((
                "screen",
                spawn_worker("ghost-screen", move || {
                    screen_loop(&shutdown, detector, &buffer, &interval)
                }),
            ));
        }

        {
            let shutdown = shutdown.clone();
            handles.push((
                "decision",
                spawn_worker("ghost-decision", move || {
                    decision_loop(&shutdown, buffer, vision, &tracker, &engine, &shared, &bus)
                }),
            ));
        }

        info!("orchestrator started (3 worker loops)");
        Self { shutdown, handles }
    }

    /// Signal the loops and join each with a bounded timeout.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        for (name, handle) in self.handles.drain(..) {
            let deadline = Instant::now() + SHUTDOWN_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(SLEEP_SLICE);
            }
            if handle.is_finished() {
                let _ = handle.join();
                info!("{name} loop stopped");
            } else {
                warn!("{name} loop still busy after {SHUTDOWN_JOIN_TIMEOUT:?}, detaching");
            }
        }
    }
}

fn spawn_worker(name: &str, body: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .unwrap_or_else(|e| panic!("failed to spawn {name}: {e}"))
}

/// Sleep in slices so shutdown is observed promptly
fn sleep_with_shutdown(shutdown: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if shutdown.load(Ordering::Acquire) {
            return;
        }
        thread::sleep(SLEEP_SLICE.min(deadline.saturating_duration_since(Instant::now())));
    }
}

/// Fixed-cadence band polling: fetch, classify, publish.
fn biometric_loop(
    shutdown: &AtomicBool,
    mut source: Box<dyn BiometricSource>,
    classifier: &Mutex<StateClassifier>,
    shared: &SharedState,
    bus: &EventBus,
    poll: Duration,
) {
    while !shutdown.load(Ordering::Acquire) {
        match source.fetch() {
            Ok(sample) => {
                let state = lock(classifier).classify(&sample);
                shared.set_current_state(state);
                shared.set_latest_sample(sample);
                if bus
                    .publish(Event::BiometricUpdate(BiometricUpdate::from_sample(&sample)))
                    .is_err()
                {
                    warn!("event bus closed, biometric update not delivered");
                }
            }
            Err(e) => warn!("biometric fetch failed: {e}"),
        }
        sleep_with_shutdown(shutdown, poll);
    }
}

/// Adaptive-cadence screen sampling: capture, dedupe, buffer.
fn screen_loop(
    shutdown: &AtomicBool,
    mut detector: ChangeDetector,
    buffer: &Mutex<FrameBuffer>,
    interval: &SamplingInterval,
) {
    while !shutdown.load(Ordering::Acquire) {
        match detector.sample() {
            Ok(frame) => {
                if detector.has_changed(&frame) {
                    debug!("screen changed ({})", frame.hash);
                    lock(buffer).push(&frame);
                }
            }
            Err(e) => warn!("screen capture failed: {e}"),
        }
        sleep_with_shutdown(shutdown, interval.get());
    }
}

/// Decision cycle: frames -> vision -> engine -> broadcast.
fn decision_loop(
    shutdown: &AtomicBool,
    buffer: Arc<Mutex<FrameBuffer>>,
    mut vision: Box<dyn VisionAnalyzer>,
    tracker: &Mutex<ContextTracker>,
    engine: &Mutex<InterventionEngine>,
    shared: &SharedState,
    bus: &EventBus,
) {
    // let the screen loop land its first frames
    sleep_with_shutdown(shutdown, DECISION_WARM_START);

    while !shutdown.load(Ordering::Acquire) {
        let state = shared.current_state();
        let modifiers = state.modifiers();

        let frames = lock(&buffer).snapshot();
        if frames.is_empty() {
            sleep_with_shutdown(shutdown, EMPTY_BUFFER_BACKOFF);
            continue;
        }

        let context_summary = lock(tracker).summary();
        let analysis = match vision.analyze(&frames, &context_summary) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("vision analysis failed: {e}");
                sleep_with_shutdown(
                    shutdown,
                    Duration::from_secs(modifiers.capture_interval_secs),
                );
                continue;
            }
        };

        lock(tracker).update(&analysis, state);
        shared.set_last_analysis(analysis.clone());

        let sample = shared.latest_sample();
        let record = lock(engine).decide(&analysis, state, &modifiers, sample);
        if let Some(record) = record {
            let preview: String = record.message.chars().take(80).collect();
            info!("({}) {}", state.as_str(), preview);
            if bus
                .publish(Event::Intervention(InterventionEvent::from_record(&record)))
                .is_err()
            {
                warn!("event bus closed, intervention not delivered");
            }
        }

        sleep_with_shutdown(
            shutdown,
            Duration::from_secs(modifiers.capture_interval_secs),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::MockBiometrics;
    use crate::capture::ScreenGrabber;
    use crate::engine::{CannedNudges, Nudge, NudgeJudge};
    use crate::error::EngineError;
    use crate::types::PersonalityModifiers;
    use chrono::Utc;
    use image::{DynamicImage, RgbaImage};
    use pretty_assertions::assert_eq;

    struct FlatGrabber {
        level: u8,
    }

    impl ScreenGrabber for FlatGrabber {
        fn grab(&mut self) -> Result<DynamicImage, EngineError> {
            self.level = self.level.wrapping_add(40);
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                320,
                180,
                image::Rgba([self.level, self.level, self.level, 255]),
            )))
        }
    }

    struct StubVision;

    impl VisionAnalyzer for StubVision {
        fn analyze(
            &mut self,
            _frames: &[String],
            _context_summary: &str,
        ) -> Result<AnalysisResult, EngineError> {
            Ok(AnalysisResult {
                summary: "terminal work".to_string(),
                activity: "coding".to_string(),
                observed_at: Utc::now(),
            })
        }
    }

    struct QuietJudge;

    impl NudgeJudge for QuietJudge {
        fn judge(
            &mut self,
            _analysis: &AnalysisResult,
            _state: CognitiveState,
            _modifiers: &PersonalityModifiers,
        ) -> Result<Option<Nudge>, EngineError> {
            Ok(None)
        }
    }

    fn deps(bus: EventBus) -> WorkerDeps {
        // instant glide, jump straight into a stressed reading so a
        // transition fires on the first poll
        let mut mock = MockBiometrics::with_transition_window(Duration::ZERO);
        mock.set_preset(2);

        WorkerDeps {
            config: EngineConfig::default(),
            source: Box::new(mock),
            classifier: Arc::new(Mutex::new(StateClassifier::new())),
            detector: ChangeDetector::new(Box::new(FlatGrabber { level: 0 }), 320, 60, 5),
            buffer: Arc::new(Mutex::new(FrameBuffer::new())),
            interval: Arc::new(SamplingInterval::new(Duration::from_secs(3))),
            vision: Box::new(StubVision),
            tracker: Arc::new(Mutex::new(ContextTracker::new())),
            engine: Arc::new(Mutex::new(InterventionEngine::new(
                Box::new(QuietJudge),
                Box::new(CannedNudges::new()),
                Duration::from_secs(30),
            ))),
            shared: Arc::new(SharedState::new()),
            bus,
        }
    }

    #[test]
    fn test_shared_state_accessors() {
        let shared = SharedState::new();
        assert_eq!(shared.current_state(), CognitiveState::Relaxed);
        assert!(shared.latest_sample().is_none());

        shared.set_current_state(CognitiveState::Wired);
        assert_eq!(shared.current_state(), CognitiveState::Wired);
    }

    #[test]
    fn test_loops_publish_and_shut_down_promptly() {
        let (bus, mut rx) = EventBus::channel();
        let deps = deps(bus);
        let shared = deps.shared.clone();
        let interval = deps.interval.clone();
        let buffer = deps.buffer.clone();

        let orchestrator = Orchestrator::start(deps);

        // first iterations run immediately; give them a moment
        thread::sleep(Duration::from_millis(600));

        let started = Instant::now();
        orchestrator.shutdown();
        assert!(started.elapsed() < Duration::from_secs(3));

        // biometric loop classified the stressed preset
        assert_eq!(shared.current_state(), CognitiveState::Stressed);
        // ...which retuned the capture interval via the transition observer
        assert_eq!(
            interval.get(),
            Duration::from_secs(
                CognitiveState::Stressed.modifiers().capture_interval_secs
            )
        );
        // screen loop buffered its first frame
        assert!(!lock(&buffer).is_empty());

        let drained: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let has_update = drained.iter().any(|command| {
            matches!(command, crate::broadcast::BusCommand::Publish(Event::BiometricUpdate(_)))
        });
        let has_transition = drained.iter().any(|command| {
            matches!(command, crate::broadcast::BusCommand::Publish(Event::StateChange { .. }))
        });
        assert!(has_update);
        assert!(has_transition);
    }
}
