//! Screen sensing
//!
//! Captures the primary display, downscales and JPEG-encodes each frame,
//! and uses perceptual hashing to decide whether the screen meaningfully
//! changed since the previous sample. Visually identical frames are
//! deduplicated; changed frames land in a small rolling buffer consumed by
//! the decision loop.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::EngineError;
use crate::phash::PerceptualHash;

/// Rolling buffer keeps this many most-recent frames
pub const FRAME_BUFFER_CAPACITY: usize = 5;
/// Sampling can never run faster than this
pub const MIN_CAPTURE_INTERVAL_SECS: u64 = 1;

/// One captured, resized, encoded display frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub jpeg: Vec<u8>,
    pub b64: String,
    pub hash: PerceptualHash,
    pub captured_at: DateTime<Utc>,
}

/// Bounded FIFO of encoded frames; length never exceeds
/// [`FRAME_BUFFER_CAPACITY`].
#[derive(Debug, Default)]
pub struct FrameBuffer {
    frames: VecDeque<String>,
    latest: Option<String>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::with_capacity(FRAME_BUFFER_CAPACITY),
            latest: None,
        }
    }

    /// Append an encoded frame, evicting the oldest when full
    pub fn push(&mut self, frame: &Frame) {
        self.frames.push_back(frame.b64.clone());
        self.latest = Some(frame.b64.clone());
        while self.frames.len() > FRAME_BUFFER_CAPACITY {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Buffered frames, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.frames.iter().cloned().collect()
    }

    /// Most recently pushed frame, if any
    pub fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }
}

/// Seconds between screen samples, shared across threads.
///
/// The screen loop reads it every iteration; biometric state transitions
/// retune it. Values clamp to [`MIN_CAPTURE_INTERVAL_SECS`].
#[derive(Debug)]
pub struct SamplingInterval {
    secs: AtomicU64,
}

impl SamplingInterval {
    pub fn new(initial: Duration) -> Self {
        Self {
            secs: AtomicU64::new(initial.as_secs().max(MIN_CAPTURE_INTERVAL_SECS)),
        }
    }

    pub fn set_secs(&self, secs: u64) {
        self.secs
            .store(secs.max(MIN_CAPTURE_INTERVAL_SECS), Ordering::Relaxed);
    }

    pub fn get(&self) -> Duration {
        Duration::from_secs(self.secs.load(Ordering::Relaxed))
    }
}

/// Seam for the actual display grab.
///
/// `grab` is blocking and only runs on the screen worker thread.
pub trait ScreenGrabber: Send {
    fn grab(&mut self) -> Result<DynamicImage, EngineError>;

    /// Startup check that a display is reachable
    fn probe(&mut self) -> Result<(), EngineError> {
        self.grab().map(|_| ())
    }
}

/// Grabber backed by the platform screenshot tool.
///
/// Writes a PNG to a temp path and decodes it; per-call failures surface as
/// [`EngineError::Capture`] and are handled by the loop, not here.
pub struct OsScreenGrabber {
    scratch: PathBuf,
}

impl Default for OsScreenGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl OsScreenGrabber {
    pub fn new() -> Self {
        let scratch =
            std::env::temp_dir().join(format!("ghost-frame-{}.png", std::process::id()));
        Self { scratch }
    }

    fn capture_command(&self) -> Result<Command, EngineError> {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("screencapture");
            cmd.arg("-x").arg("-t").arg("png").arg(&self.scratch);
            Ok(cmd)
        } else if cfg!(target_os = "linux") {
            // wayland first, X11 fallback
            if tool_available("grim") {
                let mut cmd = Command::new("grim");
                cmd.arg(&self.scratch);
                Ok(cmd)
            } else if tool_available("import") {
                let mut cmd = Command::new("import");
                cmd.arg("-window").arg("root").arg(&self.scratch);
                Ok(cmd)
            } else {
                Err(EngineError::NoDisplay(
                    "no screenshot tool found (grim or import)".to_string(),
                ))
            }
        } else {
            Err(EngineError::NoDisplay(format!(
                "unsupported platform: {}",
                std::env::consts::OS
            )))
        }
    }
}

fn tool_available(name: &str) -> bool {
    Command::new(name)
        .arg("--help")
        .output()
        .map(|_| true)
        .unwrap_or(false)
}

impl ScreenGrabber for OsScreenGrabber {
    fn grab(&mut self) -> Result<DynamicImage, EngineError> {
        let status = self
            .capture_command()?
            .status()
            .map_err(|e| EngineError::Capture(format!("failed to spawn screenshot tool: {e}")))?;
        if !status.success() {
            return Err(EngineError::Capture(format!(
                "screenshot tool exited with {status}"
            )));
        }
        let image = image::open(&self.scratch)
            .map_err(|e| EngineError::Capture(format!("failed to decode screenshot: {e}")))?;
        let _ = std::fs::remove_file(&self.scratch);
        Ok(image)
    }
}

/// Change-aware screen sampler.
///
/// Owns the grabber and the previous frame's hash. The stored hash advances
/// on EVERY check, so distance is always measured against the immediately
/// preceding frame rather than the last frame that counted as changed.
pub struct ChangeDetector {
    grabber: Box<dyn ScreenGrabber>,
    target_width: u32,
    jpeg_quality: u8,
    threshold: u32,
    last_hash: Option<PerceptualHash>,
}

impl ChangeDetector {
    pub fn new(
        grabber: Box<dyn ScreenGrabber>,
        target_width: u32,
        jpeg_quality: u8,
        threshold: u32,
    ) -> Self {
        Self {
            grabber,
            target_width,
            jpeg_quality,
            threshold,
            last_hash: None,
        }
    }

    /// Capture one frame: grab, resize to the target width preserving
    /// aspect ratio, hash, JPEG-encode.
    pub fn sample(&mut self) -> Result<Frame, EngineError> {
        let image = self.grabber.grab()?;
        let resized = resize_to_width(&image, self.target_width);
        let hash = PerceptualHash::of(&resized);
        let jpeg = encode_jpeg(&resized, self.jpeg_quality)?;
        let b64 = BASE64.encode(&jpeg);
        Ok(Frame {
            jpeg,
            b64,
            hash,
            captured_at: Utc::now(),
        })
    }

    /// Did the screen meaningfully change since the previous check?
    ///
    /// The very first frame is always a change (there is no prior hash) and
    /// seeds the baseline. A Hamming distance of exactly the threshold does
    /// NOT count as changed.
    pub fn has_changed(&mut self, frame: &Frame) -> bool {
        match self.last_hash.replace(frame.hash) {
            None => true,
            Some(previous) => previous.distance(&frame.hash) > self.threshold,
        }
    }

    pub fn last_hash(&self) -> Option<PerceptualHash> {
        self.last_hash
    }

    /// Startup probe; failure here should abort boot rather than let the
    /// screen loop spin on a dead display.
    pub fn probe(&mut self) -> Result<(), EngineError> {
        self.grabber.probe()
    }
}

fn resize_to_width(image: &DynamicImage, target_width: u32) -> DynamicImage {
    if image.width() == target_width || image.width() == 0 {
        return image.clone();
    }
    let height =
        ((image.height() as u64 * target_width as u64) / image.width() as u64).max(1) as u32;
    image.resize_exact(target_width, height, FilterType::Lanczos3)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EngineError> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| EngineError::Image(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use pretty_assertions::assert_eq;

    struct SyntheticGrabber {
        width: u32,
        height: u32,
        seed: u64,
    }

    impl ScreenGrabber for SyntheticGrabber {
        fn grab(&mut self) -> Result<DynamicImage, EngineError> {
            let mut state = self.seed | 1;
            let image = RgbaImage::from_fn(self.width, self.height, |_, _| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                let level = (state >> 33) as u8;
                image::Rgba([level, level, level, 255])
            });
            Ok(DynamicImage::ImageRgba8(image))
        }
    }

    struct DeadGrabber;

    impl ScreenGrabber for DeadGrabber {
        fn grab(&mut self) -> Result<DynamicImage, EngineError> {
            Err(EngineError::Capture("no display".to_string()))
        }
    }

    fn frame_with_hash(bits: u64) -> Frame {
        Frame {
            jpeg: Vec::new(),
            b64: String::new(),
            hash: PerceptualHash(bits),
            captured_at: Utc::now(),
        }
    }

    fn detector() -> ChangeDetector {
        ChangeDetector::new(
            Box::new(SyntheticGrabber {
                width: 2560,
                height: 1440,
                seed: 11,
            }),
            1280,
            60,
            5,
        )
    }

    #[test]
    fn test_buffer_bounded_fifo() {
        let mut buffer = FrameBuffer::new();
        for i in 0..8u64 {
            let mut frame = frame_with_hash(i);
            frame.b64 = format!("frame-{i}");
            buffer.push(&frame);
            assert!(buffer.len() <= FRAME_BUFFER_CAPACITY);
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(
            buffer.snapshot(),
            vec!["frame-3", "frame-4", "frame-5", "frame-6", "frame-7"]
        );
        assert_eq!(buffer.latest(), Some("frame-7"));
    }

    #[test]
    fn test_first_check_is_always_changed() {
        let mut detector = detector();
        let frame = frame_with_hash(0xabcd);
        assert!(detector.has_changed(&frame));
        assert_eq!(detector.last_hash(), Some(PerceptualHash(0xabcd)));
    }

    #[test]
    fn test_threshold_boundary() {
        let mut detector = detector();
        detector.has_changed(&frame_with_hash(0));

        // distance exactly 5: not changed
        assert!(!detector.has_changed(&frame_with_hash(0b11111)));

        // baseline advanced to 0b11111; distance 6 from there: changed
        assert!(detector.has_changed(&frame_with_hash(0b11111 ^ 0b111111_000000)));
    }

    #[test]
    fn test_baseline_tracks_every_frame() {
        let mut detector = detector();
        detector.has_changed(&frame_with_hash(0));

        // slow drift: each step under threshold, none count as changed,
        // even though the total drift from the first frame is large
        assert!(!detector.has_changed(&frame_with_hash(0b11)));
        assert!(!detector.has_changed(&frame_with_hash(0b1111)));
        assert!(!detector.has_changed(&frame_with_hash(0b111111)));
        assert_eq!(detector.last_hash(), Some(PerceptualHash(0b111111)));
    }

    #[test]
    fn test_sample_resizes_and_encodes() {
        let mut detector = detector();
        let frame = detector.sample().unwrap();
        assert!(!frame.jpeg.is_empty());
        assert!(!frame.b64.is_empty());

        let decoded = image::load_from_memory(&frame.jpeg).unwrap();
        assert_eq!(decoded.width(), 1280);
        assert_eq!(decoded.height(), 720);

        assert_eq!(BASE64.decode(&frame.b64).unwrap(), frame.jpeg);
    }

    #[test]
    fn test_capture_failure_propagates() {
        let mut detector = ChangeDetector::new(Box::new(DeadGrabber), 1280, 60, 5);
        assert!(detector.sample().is_err());
        assert!(detector.probe().is_err());
    }

    #[test]
    fn test_interval_clamps_to_minimum() {
        let interval = SamplingInterval::new(Duration::from_secs(3));
        assert_eq!(interval.get(), Duration::from_secs(3));
        interval.set_secs(0);
        assert_eq!(interval.get(), Duration::from_secs(1));
        interval.set_secs(8);
        assert_eq!(interval.get(), Duration::from_secs(8));
    }
}
