use thiserror::Error;

use crate::camera::CameraError;

pub type Result<T, E = ProctorError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("vision error: {0}")]
    Vision(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProctorError {
    /// Camera acquisition failure carried by this error, if any.
    pub fn camera(&self) -> Option<&CameraError> {
        match self {
            ProctorError::Camera(err) => Some(err),
            _ => None,
        }
    }
}
