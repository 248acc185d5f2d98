//! Ghost daemon
//!
//! Boots the sensing pipeline (biometric polling, screen sampling, decision
//! loop) and serves the overlay API over HTTP/WebSocket. The vision
//! summarizer and intervention judge are external collaborators; until they
//! are wired in, offline stand-ins keep the pipeline running end to end.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ghost_engine::biometrics::{BiometricSource, MockBiometrics};
use ghost_engine::broadcast::{spawn_pump, EventBus};
use ghost_engine::capture::{ChangeDetector, FrameBuffer, OsScreenGrabber, SamplingInterval};
use ghost_engine::classifier::StateClassifier;
use ghost_engine::config::EngineConfig;
use ghost_engine::engine::{CannedNudges, InterventionEngine, Nudge, NudgeJudge};
use ghost_engine::error::EngineError;
use ghost_engine::orchestrator::{Orchestrator, SharedState, WorkerDeps};
use ghost_engine::server::{router, AppState};
use ghost_engine::types::{CognitiveState, PersonalityModifiers};
use ghost_engine::vision::{AnalysisResult, ContextTracker, VisionAnalyzer};
use ghost_engine::GHOST_VERSION;

/// Ghost - ambient sensing and intervention daemon
#[derive(Parser)]
#[command(name = "ghostd")]
#[command(version = GHOST_VERSION)]
#[command(about = "Serve the Ghost sensing pipeline and overlay API", long_about = None)]
struct Cli {
    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Bind port
    #[arg(long)]
    port: Option<u16>,

    /// Serve simulated band data instead of a live vendor source
    #[arg(long)]
    mock: Option<bool>,
}

/// Stand-in summarizer until the real vision client is wired: reports what
/// it can know without looking at pixels.
struct OfflineVision;

impl VisionAnalyzer for OfflineVision {
    fn analyze(
        &mut self,
        frames: &[String],
        _context_summary: &str,
    ) -> Result<AnalysisResult, EngineError> {
        Ok(AnalysisResult {
            summary: format!("{} recent screen changes captured", frames.len()),
            activity: "screen activity".to_string(),
            observed_at: chrono::Utc::now(),
        })
    }
}

/// Permanently unreachable judge: the engine's fallback bank carries the
/// nudges, exactly as it would during a judge outage.
struct OfflineJudge;

impl NudgeJudge for OfflineJudge {
    fn judge(
        &mut self,
        _analysis: &AnalysisResult,
        _state: CognitiveState,
        _modifiers: &PersonalityModifiers,
    ) -> Result<Option<Nudge>, EngineError> {
        Err(EngineError::Judge("no judge configured".to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(mock) = cli.mock {
        config.use_mock_biometrics = mock;
    }

    // a dead display at boot is a startup failure, not something to
    // degrade through silently
    let mut detector = ChangeDetector::new(
        Box::new(OsScreenGrabber::new()),
        config.capture_width,
        config.jpeg_quality,
        config.hash_threshold,
    );
    detector
        .probe()
        .context("display probe failed, refusing to start blind")?;

    let (source, mock): (Box<dyn BiometricSource>, Option<Arc<Mutex<MockBiometrics>>>) =
        if config.use_mock_biometrics {
            let mock = Arc::new(Mutex::new(MockBiometrics::new()));
            (Box::new(mock.clone()), Some(mock))
        } else {
            anyhow::bail!(
                "no live band source is wired in this build; run with --mock true"
            );
        };

    let (bus, bus_rx) = EventBus::channel();
    let pump = spawn_pump(bus_rx);

    let classifier = Arc::new(Mutex::new(StateClassifier::new()));
    let buffer = Arc::new(Mutex::new(FrameBuffer::new()));
    let interval = Arc::new(SamplingInterval::new(config.capture_interval));
    let tracker = Arc::new(Mutex::new(ContextTracker::new()));
    let engine = Arc::new(Mutex::new(InterventionEngine::new(
        Box::new(OfflineJudge),
        Box::new(CannedNudges::new()),
        config.intervention_cooldown,
    )));
    let shared = Arc::new(SharedState::new());

    let orchestrator = Orchestrator::start(WorkerDeps {
        config: config.clone(),
        source,
        classifier: classifier.clone(),
        detector,
        buffer,
        interval,
        vision: Box::new(OfflineVision),
        tracker: tracker.clone(),
        engine: engine.clone(),
        shared: shared.clone(),
        bus: bus.clone(),
    });

    info!(
        "biometric polling started (mock={})",
        config.use_mock_biometrics
    );

    let app = router(AppState {
        config: config.clone(),
        shared,
        classifier,
        engine,
        tracker,
        mock,
        bus,
    });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("ghostd listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve api")?;

    info!("shutting down");
    orchestrator.shutdown();
    pump.abort();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
