use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a capture device could not be acquired (or was lost).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraErrorKind {
    PermissionDenied,
    NotFound,
    DeviceBusy,
    Overconstrained,
    InsecureContext,
    Aborted,
    /// Device went away after capture had already started.
    Disconnected,
}

impl CameraErrorKind {
    /// Maps a host media error name onto a kind.
    pub fn from_dom_name(name: &str) -> Option<Self> {
        let kind = match name {
            "NotAllowedError" | "PermissionDeniedError" => CameraErrorKind::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => CameraErrorKind::NotFound,
            "NotReadableError" | "TrackStartError" => CameraErrorKind::DeviceBusy,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                CameraErrorKind::Overconstrained
            }
            "SecurityError" => CameraErrorKind::InsecureContext,
            "AbortError" => CameraErrorKind::Aborted,
            _ => return None,
        };
        Some(kind)
    }

    /// User-facing instruction for getting the camera working again.
    pub fn remediation(self) -> &'static str {
        match self {
            CameraErrorKind::PermissionDenied => {
                "Camera access was denied. Allow camera permission for this site and retry."
            }
            CameraErrorKind::NotFound => {
                "No camera was found. Connect a webcam and retry."
            }
            CameraErrorKind::DeviceBusy => {
                "The camera is in use by another application. Close it and retry."
            }
            CameraErrorKind::Overconstrained => {
                "The camera does not support the requested settings. Try a different camera."
            }
            CameraErrorKind::InsecureContext => {
                "Camera access requires a secure (HTTPS) connection."
            }
            CameraErrorKind::Aborted => {
                "The camera request was cancelled. Retry and accept the permission prompt."
            }
            CameraErrorKind::Disconnected => {
                "The camera stopped sending video. Check the connection and retry."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("camera error ({kind:?}): {message}")]
pub struct CameraError {
    pub kind: CameraErrorKind,
    pub message: String,
}

impl CameraError {
    pub fn new(kind: CameraErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn remediation(&self) -> &'static str {
        self.kind.remediation()
    }
}

/// Requested device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
    pub facing_mode: FacingMode,
    /// Treat the ideal resolution as mandatory.
    #[serde(default)]
    pub exact_resolution: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            frame_rate: 30,
            facing_mode: FacingMode::User,
            exact_resolution: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Description of an acquired device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureHandle {
    pub device_label: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}
