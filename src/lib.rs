//! Ghost Engine - realtime sensing and intervention pipeline
//!
//! Ghost continuously senses on-screen activity and physiological signals
//! and decides, in near-real time, whether to surface a behavioral nudge.
//! The pipeline: a change-aware screen sampler deduplicates visually
//! identical frames; a biometric classifier maps readings onto a discrete
//! cognitive-state model (inverted-U arousal); an intervention engine gates
//! nudges behind a global cooldown; and an event broadcaster fans decisions
//! out to connected overlay clients.
//!
//! ## Modules
//!
//! - **classifier / biometrics**: physiological readings to cognitive states
//! - **capture / phash**: change-aware screen sampling
//! - **engine**: cooldown-gated intervention decisions with feedback counters
//! - **broadcast / orchestrator / server**: loops, fan-out, and the API

pub mod biometrics;
pub mod broadcast;
pub mod capture;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod phash;
pub mod server;
pub mod types;
pub mod vision;

pub use classifier::StateClassifier;
pub use engine::InterventionEngine;
pub use error::EngineError;
pub use types::{BiometricSample, CognitiveState};

/// Engine version embedded in logs and the CLI
pub const GHOST_VERSION: &str = env!("CARGO_PKG_VERSION");
