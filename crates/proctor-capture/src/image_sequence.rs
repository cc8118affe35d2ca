use std::{
    fs, io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Utc;
use proctor_types::{
    camera::{CameraError, CameraErrorKind, CaptureConstraints, CaptureHandle},
    vision::Frame,
};
use tracing::{info, warn};

use crate::{CaptureMetrics, FrameSampler};

/// Replays a directory of still images as if it were a live webcam.
pub struct ImageSequenceCamera {
    dir: PathBuf,
    looping: bool,
    files: Vec<PathBuf>,
    cursor: usize,
    capturing: bool,
    metrics: CaptureMetrics,
}

impl ImageSequenceCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            looping: false,
            files: Vec::new(),
            cursor: 0,
            capturing: false,
            metrics: CaptureMetrics::default(),
        }
    }

    /// Restart from the first image instead of reporting a lost device.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    fn list_images(&self) -> Result<Vec<PathBuf>, CameraError> {
        if !self.dir.is_dir() {
            return Err(CameraError::new(
                CameraErrorKind::NotFound,
                format!("frame directory {} does not exist", self.dir.display()),
            ));
        }
        let entries = fs::read_dir(&self.dir).map_err(|err| io_to_camera(&self.dir, err))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_png(path))
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(CameraError::new(
                CameraErrorKind::NotFound,
                format!("no PNG frames in {}", self.dir.display()),
            ));
        }
        Ok(files)
    }
}

#[async_trait]
impl FrameSampler for ImageSequenceCamera {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureHandle, CameraError> {
        if self.capturing {
            return Err(CameraError::new(
                CameraErrorKind::DeviceBusy,
                "image sequence is already open",
            ));
        }
        let files = self.list_images()?;
        let first = decode(&files[0]).map_err(|err| {
            CameraError::new(CameraErrorKind::DeviceBusy, format!("unreadable frame: {err}"))
        })?;
        if constraints.exact_resolution
            && (first.width != constraints.ideal_width || first.height != constraints.ideal_height)
        {
            return Err(CameraError::new(
                CameraErrorKind::Overconstrained,
                format!(
                    "sequence is {}x{}, {}x{} required",
                    first.width, first.height, constraints.ideal_width, constraints.ideal_height
                ),
            ));
        }

        info!(
            "Opened image sequence {} ({} frames, {}x{})",
            self.dir.display(),
            files.len(),
            first.width,
            first.height
        );
        self.files = files;
        self.cursor = 0;
        self.capturing = true;
        self.metrics.acquisitions += 1;
        Ok(CaptureHandle {
            device_label: self.dir.display().to_string(),
            width: first.width,
            height: first.height,
            frame_rate: constraints.frame_rate,
        })
    }

    async fn sample(&mut self) -> Result<Option<Frame>, CameraError> {
        if !self.capturing {
            return Err(CameraError::new(
                CameraErrorKind::Disconnected,
                "image sequence is not open",
            ));
        }
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Err(CameraError::new(
                    CameraErrorKind::Disconnected,
                    "image sequence exhausted",
                ));
            }
            self.cursor = 0;
        }
        let path = self.files[self.cursor].clone();
        self.cursor += 1;

        let decoded = tokio::task::spawn_blocking(move || decode(&path))
            .await
            .map_err(|err| {
                CameraError::new(
                    CameraErrorKind::Disconnected,
                    format!("frame decode worker join failed: {err}"),
                )
            })?;
        match decoded {
            Ok(frame) => {
                self.metrics.frames_sampled += 1;
                Ok(Some(frame))
            }
            Err(err) => {
                warn!("Skipping undecodable frame: {err}");
                self.metrics.not_ready += 1;
                Ok(None)
            }
        }
    }

    async fn stop(&mut self) {
        if self.capturing {
            self.capturing = false;
            self.files.clear();
            self.cursor = 0;
            self.metrics.releases += 1;
            info!("Image sequence {} released", self.dir.display());
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn metrics(&self) -> CaptureMetrics {
        self.metrics.clone()
    }
}

fn is_png(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

fn decode(path: &Path) -> Result<Frame, String> {
    let img = image::open(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Frame::from_rgba_at(width, height, rgba.into_raw(), Utc::now()))
}

fn io_to_camera(dir: &Path, err: io::Error) -> CameraError {
    let kind = match err.kind() {
        io::ErrorKind::PermissionDenied => CameraErrorKind::PermissionDenied,
        io::ErrorKind::NotFound => CameraErrorKind::NotFound,
        _ => CameraErrorKind::DeviceBusy,
    };
    CameraError::new(kind, format!("{}: {err}", dir.display()))
}
