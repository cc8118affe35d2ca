//! Camera acquisition and fixed-cadence frame sampling.

mod image_sequence;

use std::{collections::VecDeque, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proctor_types::{
    camera::{CameraError, CameraErrorKind, CaptureConstraints, CaptureHandle},
    vision::Frame,
};
use tracing::{debug, info};

pub use image_sequence::ImageSequenceCamera;

/// Aggregated sampler counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureMetrics {
    pub frames_sampled: u64,
    pub not_ready: u64,
    pub acquisitions: u64,
    pub releases: u64,
}

#[async_trait]
pub trait FrameSampler: Send + Sync {
    /// Acquires the device. The only operation that waits on the host.
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureHandle, CameraError>;

    /// `Ok(None)` while the device has not reported its dimensions yet.
    async fn sample(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Releases every track. Idempotent.
    async fn stop(&mut self);

    fn is_capturing(&self) -> bool;

    fn metrics(&self) -> CaptureMetrics;
}

/// One scripted outcome of a [`ScriptedCamera::sample`] call.
#[derive(Debug, Clone)]
pub enum ScriptedSample {
    Frame(Frame),
    NotReady,
    Fail(CameraErrorKind),
}

/// Deterministic device used for integration tests and demos.
///
/// Frames are re-stamped on a fixed clock so debounce windows can be
/// reasoned about in samples rather than wall time.
pub struct ScriptedCamera {
    start_failure: Option<CameraErrorKind>,
    script: VecDeque<ScriptedSample>,
    repeat_last: Option<Frame>,
    clock: DateTime<Utc>,
    step: chrono::Duration,
    capturing: bool,
    metrics: CaptureMetrics,
}

impl ScriptedCamera {
    pub fn new(step: Duration) -> Self {
        Self {
            start_failure: None,
            script: VecDeque::new(),
            repeat_last: None,
            clock: Utc::now(),
            step: chrono::Duration::from_std(step).unwrap_or_else(|_| chrono::Duration::zero()),
            capturing: false,
            metrics: CaptureMetrics::default(),
        }
    }

    /// Device that refuses to start, as a host would after e.g. `NotAllowedError`.
    pub fn failing(kind: CameraErrorKind) -> Self {
        let mut camera = Self::new(Duration::from_millis(500));
        camera.start_failure = Some(kind);
        camera
    }

    pub fn starting_at(mut self, clock: DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn push(&mut self, sample: ScriptedSample) -> &mut Self {
        self.script.push_back(sample);
        self
    }

    pub fn push_frames(&mut self, frame: &Frame, count: usize) -> &mut Self {
        for _ in 0..count {
            self.script.push_back(ScriptedSample::Frame(frame.clone()));
        }
        self
    }

    /// Keeps returning the last scripted frame once the script runs out.
    pub fn repeat_last(mut self, frame: Frame) -> Self {
        self.repeat_last = Some(frame);
        self
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn stamp(&mut self, frame: Frame) -> Frame {
        let stamped = frame.with_timestamp(self.clock);
        self.clock += self.step;
        stamped
    }
}

#[async_trait]
impl FrameSampler for ScriptedCamera {
    async fn start(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<CaptureHandle, CameraError> {
        if let Some(kind) = self.start_failure {
            info!("Scripted camera refusing to start: {:?}", kind);
            return Err(CameraError::new(kind, "scripted start failure"));
        }
        self.capturing = true;
        self.metrics.acquisitions += 1;
        Ok(CaptureHandle {
            device_label: "scripted camera".into(),
            width: constraints.ideal_width,
            height: constraints.ideal_height,
            frame_rate: constraints.frame_rate,
        })
    }

    async fn sample(&mut self) -> Result<Option<Frame>, CameraError> {
        if !self.capturing {
            return Err(CameraError::new(
                CameraErrorKind::Disconnected,
                "scripted camera is not capturing",
            ));
        }
        let next = match self.script.pop_front() {
            Some(sample) => sample,
            None => match self.repeat_last.clone() {
                Some(frame) => ScriptedSample::Frame(frame),
                None => ScriptedSample::NotReady,
            },
        };
        match next {
            ScriptedSample::Frame(frame) => {
                self.metrics.frames_sampled += 1;
                Ok(Some(self.stamp(frame)))
            }
            ScriptedSample::NotReady => {
                self.metrics.not_ready += 1;
                debug!("Scripted camera not ready");
                Ok(None)
            }
            ScriptedSample::Fail(kind) => Err(CameraError::new(kind, "scripted sample failure")),
        }
    }

    async fn stop(&mut self) {
        if self.capturing {
            self.capturing = false;
            self.metrics.releases += 1;
            info!("Scripted camera released");
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn metrics(&self) -> CaptureMetrics {
        self.metrics.clone()
    }
}
