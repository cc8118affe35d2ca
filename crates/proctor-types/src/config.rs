use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    camera::{CaptureConstraints, FacingMode},
    ProctorError, Result,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
    pub facing_mode: FacingMode,
    pub exact_resolution: bool,
    pub sample_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ideal_width: 640,
            ideal_height: 480,
            frame_rate: 30,
            facing_mode: FacingMode::User,
            exact_resolution: false,
            sample_interval_ms: 500,
        }
    }
}

impl CaptureConfig {
    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
            frame_rate: self.frame_rate,
            facing_mode: self.facing_mode,
            exact_resolution: self.exact_resolution,
        }
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Inclusive RGB bounds of one skin-tone tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneRange {
    pub red: (u8, u8),
    pub green: (u8, u8),
    pub blue: (u8, u8),
}

impl ToneRange {
    pub const fn new(red: (u8, u8), green: (u8, u8), blue: (u8, u8)) -> Self {
        Self { red, green, blue }
    }

    pub fn contains(&self, [r, g, b]: [u8; 3]) -> bool {
        (self.red.0..=self.red.1).contains(&r)
            && (self.green.0..=self.green.1).contains(&g)
            && (self.blue.0..=self.blue.1).contains(&b)
    }
}

pub const DEFAULT_SKIN_TONES: [ToneRange; 3] = [
    // light
    ToneRange::new((170, 255), (120, 230), (90, 210)),
    // medium
    ToneRange::new((120, 200), (70, 160), (40, 130)),
    // dark
    ToneRange::new((45, 130), (25, 100), (10, 85)),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub skin_fraction_threshold: f32,
    pub region_stride: u32,
    pub edge_stride: u32,
    pub edge_gradient_threshold: u32,
    pub edge_count_threshold: u32,
    pub motion_byte_stride: usize,
    /// Max centroid distance from centre, as a fraction of the shorter side.
    pub gaze_tolerance: f32,
    pub skin_tones: Vec<ToneRange>,
    pub evidence_dir: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            skin_fraction_threshold: 0.15,
            region_stride: 2,
            edge_stride: 4,
            edge_gradient_threshold: 30,
            edge_count_threshold: 800,
            motion_byte_stride: 16,
            gaze_tolerance: 0.3,
            skin_tones: DEFAULT_SKIN_TONES.to_vec(),
            evidence_dir: None,
        }
    }
}

/// Debounce windows and escalation limits for the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolationPolicy {
    pub no_face_secs: f32,
    pub look_away_secs: f32,
    pub motionless_secs: f32,
    pub motion_threshold: f32,
    pub inactivity_secs: u64,
    pub tab_switch_escalation: u32,
}

impl Default for ViolationPolicy {
    fn default() -> Self {
        Self {
            no_face_secs: 3.0,
            look_away_secs: 5.0,
            motionless_secs: 15.0,
            motion_threshold: 0.01,
            inactivity_secs: 30,
            tab_switch_escalation: 3,
        }
    }
}

impl ViolationPolicy {
    /// Number of consecutive samples that cover `secs` at the given cadence.
    pub fn samples_for(secs: f32, interval: Duration) -> u32 {
        let interval_secs = interval.as_secs_f32();
        if interval_secs <= 0.0 {
            return 1;
        }
        ((secs / interval_secs).ceil() as u32).max(1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub require_fullscreen: bool,
    pub feed_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            require_fullscreen: true,
            feed_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    pub report_dir: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            report_dir: "reports".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub capture: CaptureConfig,
    pub analysis: AnalysisConfig,
    pub policy: ViolationPolicy,
    pub session: SessionConfig,
    pub ops: OpsConfig,
}

impl ProctorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            ProctorError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            ProctorError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.sample_interval_ms == 0 {
            return Err(ProctorError::Configuration(
                "capture.sample_interval_ms must be greater than zero".into(),
            ));
        }
        if self.capture.ideal_width == 0 || self.capture.ideal_height == 0 {
            return Err(ProctorError::Configuration(
                "capture resolution must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.skin_fraction_threshold) {
            return Err(ProctorError::Configuration(
                "analysis.skin_fraction_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.analysis.region_stride == 0
            || self.analysis.edge_stride == 0
            || self.analysis.motion_byte_stride == 0
        {
            return Err(ProctorError::Configuration(
                "analysis strides must be greater than zero".into(),
            ));
        }
        if self.analysis.skin_tones.is_empty() {
            return Err(ProctorError::Configuration(
                "analysis.skin_tones must list at least one range".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.policy.motion_threshold) {
            return Err(ProctorError::Configuration(
                "policy.motion_threshold must be between 0.0 and 1.0".into(),
            ));
        }
        if self.policy.no_face_secs <= 0.0
            || self.policy.look_away_secs <= 0.0
            || self.policy.motionless_secs <= 0.0
        {
            return Err(ProctorError::Configuration(
                "policy windows must be positive".into(),
            ));
        }
        if self.policy.tab_switch_escalation == 0 {
            return Err(ProctorError::Configuration(
                "policy.tab_switch_escalation must be greater than zero".into(),
            ));
        }
        if self.session.feed_capacity == 0 {
            return Err(ProctorError::Configuration(
                "session.feed_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_proctor_config_from_file() {
        let temp_path = std::env::temp_dir().join("proctor-config-test.toml");
        let mut config = ProctorConfig::default();
        config.capture.sample_interval_ms = 250;
        config.policy.tab_switch_escalation = 5;
        config.session.require_fullscreen = false;
        config.analysis.evidence_dir = Some("evidence".into());

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = ProctorConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.capture.sample_interval_ms, 250);
        assert_eq!(loaded.policy.tab_switch_escalation, 5);
        assert!(!loaded.session.require_fullscreen);
        assert_eq!(loaded.analysis.skin_tones, DEFAULT_SKIN_TONES.to_vec());
        assert_eq!(loaded.analysis.evidence_dir.as_deref(), Some("evidence"));
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config: ProctorConfig =
            toml::from_str("[policy]\nno_face_secs = 4.0\n").expect("parse partial config");
        assert_eq!(config.policy.no_face_secs, 4.0);
        assert_eq!(config.policy.look_away_secs, 5.0);
        assert_eq!(config.capture.sample_interval_ms, 500);
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = ProctorConfig::default();
        assert!(config.validate().is_ok());

        config.capture.sample_interval_ms = 0;
        assert!(config.validate().is_err());
        config.capture.sample_interval_ms = 500;
        config.analysis.skin_fraction_threshold = 1.5;
        assert!(config.validate().is_err());
        config.analysis.skin_fraction_threshold = 0.15;
        config.analysis.motion_byte_stride = 0;
        assert!(config.validate().is_err());
        config.analysis.motion_byte_stride = 16;
        config.policy.tab_switch_escalation = 0;
        assert!(config.validate().is_err());
        config.policy.tab_switch_escalation = 3;
        config.session.feed_capacity = 0;
        assert!(config.validate().is_err());
        config.session.feed_capacity = 8;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sample_counts_follow_cadence() {
        let interval = Duration::from_millis(500);
        assert_eq!(ViolationPolicy::samples_for(3.0, interval), 6);
        assert_eq!(ViolationPolicy::samples_for(5.0, interval), 10);
        assert_eq!(ViolationPolicy::samples_for(15.0, interval), 30);
        assert_eq!(ViolationPolicy::samples_for(0.1, interval), 1);
    }

    #[test]
    fn tone_ranges_are_inclusive() {
        let range = ToneRange::new((10, 20), (10, 20), (10, 20));
        assert!(range.contains([10, 20, 15]));
        assert!(!range.contains([21, 15, 15]));
    }

    #[test]
    fn bundled_config_is_valid() {
        let config: ProctorConfig =
            toml::from_str(include_str!("../../../configs/proctor.toml")).unwrap();
        config.validate().unwrap();
        assert!(config.session.require_fullscreen);
        assert_eq!(config.analysis.skin_tones.len(), DEFAULT_SKIN_TONES.len());
    }
}
