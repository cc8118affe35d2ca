//! Presence analysis: one frame in, one presence reading out.

mod heuristic;

use std::{fs, path::PathBuf};

use image::{ImageBuffer, Rgba};
use proctor_types::{presence::PresenceReading, vision::Frame, ProctorError, Result};
use tracing::info;

pub use heuristic::{HeuristicPresenceAnalyzer, Region, RegionScan};

/// Turns a frame into a presence judgment.
///
/// Implementations hold no per-session state; the previous frame used for
/// motion scoring is owned by the caller and passed in.
pub trait PresenceAnalyzer: Send + Sync {
    /// Prepares any backing model. Heuristic analyzers have nothing to load.
    fn load(&mut self) -> Result<()> {
        Ok(())
    }

    fn analyze(&self, frame: &Frame, previous: Option<&Frame>) -> Result<PresenceReading>;
}

/// Saves the frames behind presence violations for later review.
pub struct EvidenceRecorder {
    capture_dir: Option<PathBuf>,
}

impl EvidenceRecorder {
    pub fn new(capture_dir: Option<String>) -> Self {
        Self {
            capture_dir: capture_dir.map(PathBuf::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capture_dir.is_some()
    }

    pub fn persist(&self, frame: &Frame, label: &str) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.capture_dir else {
            return Ok(None);
        };

        fs::create_dir_all(dir)
            .map_err(|err| vision_error(format!("failed to create evidence dir {:?}: {err}", dir)))?;
        let timestamp = frame.captured_at.format("%Y%m%d_%H%M%S_%3f");
        let path = dir.join(format!("{label}_{timestamp}.png"));
        let Some(buffer) =
            ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width, frame.height, frame.data.clone())
        else {
            return Err(vision_error("frame buffer does not match its dimensions"));
        };
        buffer
            .save(&path)
            .map_err(|err| vision_error(format!("failed to save evidence frame: {err}")))?;
        info!("Saved evidence frame {:?}", path);
        Ok(Some(path))
    }
}

pub fn vision_error(message: impl Into<String>) -> ProctorError {
    ProctorError::Vision(message.into())
}
