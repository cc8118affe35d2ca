//! Shared domain types for the proctoring monitor.

pub mod camera;
pub mod config;
pub mod environment;
pub mod events;
pub mod presence;
pub mod submission;
pub mod violation;
pub mod vision;

mod errors;

pub use errors::{ProctorError, Result};
