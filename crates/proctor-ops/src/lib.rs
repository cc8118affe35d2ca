//! Operational helpers: logging, event journal, session reports.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use proctor_types::{
    config::OpsConfig,
    events::SystemEvent,
    violation::{ViolationLog, ViolationSummary},
    ProctorError, Result,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ProctorError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| ProctorError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// In-memory record of everything a session published.
#[derive(Clone, Default)]
pub struct EventJournal {
    events: Arc<Mutex<Vec<SystemEvent>>>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: SystemEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    pub async fn snapshot_events(&self) -> Vec<SystemEvent> {
        self.events.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

/// Final account of one proctored attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: DateTime<Utc>,
    pub summary: ViolationSummary,
    pub violations: ViolationLog,
}

impl SessionReport {
    pub fn new(session_id: Uuid, started_at: Option<DateTime<Utc>>, log: &ViolationLog) -> Self {
        Self {
            session_id,
            started_at,
            stopped_at: Utc::now(),
            summary: log.summary(),
            violations: log.clone(),
        }
    }
}

pub fn ensure_report_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| ProctorError::Ops(format!("failed to create report dir: {err}")))?;
    info!("Report directory ready at {:?}", dir);
    Ok(dir)
}

pub fn write_session_report(dir: &Path, report: &SessionReport) -> Result<PathBuf> {
    let path = dir.join(format!("session_{}.json", report.session_id));
    let body = serde_json::to_string_pretty(report)
        .map_err(|err| ProctorError::Ops(format!("failed to encode session report: {err}")))?;
    std::fs::write(&path, body)
        .map_err(|err| ProctorError::Ops(format!("failed to write session report: {err}")))?;
    info!(
        "Session report written to {:?} ({} violations)",
        path, report.summary.total
    );
    Ok(path)
}
