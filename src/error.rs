//! Error types for the Ghost engine

use thiserror::Error;

/// Errors that can occur while sensing, classifying, or deciding
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("No display available: {0}")]
    NoDisplay(String),

    #[error("Biometric source failed: {0}")]
    Source(String),

    #[error("Vision analysis failed: {0}")]
    Vision(String),

    #[error("Intervention judge failed: {0}")]
    Judge(String),

    #[error("Invalid feedback action: {0}")]
    InvalidFeedback(String),

    #[error("Unknown biometric preset: {0}")]
    UnknownPreset(u8),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image processing failed: {0}")]
    Image(String),

    #[error("Event bus closed")]
    BusClosed,
}
