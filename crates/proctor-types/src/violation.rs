use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    MultiplePeople,
    LookingAway,
    Motionless,
    Inactivity,
    TabSwitch,
    WindowBlur,
    FullscreenExit,
    SuspiciousKey,
    CameraError,
    ModelLoadError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// How long a live alert stays on screen before dismissing itself.
    pub fn alert_ttl(self) -> Duration {
        match self {
            Severity::Low | Severity::Medium => Duration::from_secs(5),
            Severity::High => Duration::from_secs(8),
            Severity::Critical => Duration::from_secs(10),
        }
    }

    fn penalty(self) -> u32 {
        match self {
            Severity::Low => 2,
            Severity::Medium => 5,
            Severity::High => 10,
            Severity::Critical => 25,
        }
    }
}

/// Durable record of one detected integrity concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub description: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        severity: Severity,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            description: description.into(),
            severity,
            timestamp,
        }
    }
}

/// Append-only, ordered list of violations for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViolationLog {
    entries: Vec<Violation>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.entries.push(violation);
    }

    pub fn entries(&self) -> &[Violation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.entries.iter()
    }

    pub fn count_of(&self, kind: ViolationKind) -> usize {
        self.entries.iter().filter(|v| v.kind == kind).count()
    }

    pub fn summary(&self) -> ViolationSummary {
        let mut summary = ViolationSummary {
            total: self.entries.len(),
            integrity_score: 100,
            ..Default::default()
        };
        let mut penalty = 0u32;
        for violation in &self.entries {
            *summary.by_kind.entry(violation.kind).or_default() += 1;
            *summary.by_severity.entry(violation.severity).or_default() += 1;
            penalty = penalty.saturating_add(violation.severity.penalty());
        }
        summary.integrity_score = 100u32.saturating_sub(penalty);
        summary
    }
}

impl<'a> IntoIterator for &'a ViolationLog {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: usize,
    pub by_kind: BTreeMap<ViolationKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// 100 for a clean session, floored at 0.
    pub integrity_score: u32,
}
