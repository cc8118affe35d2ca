//! Debounce, threshold and escalation rules turning raw signals into a
//! sparse violation log.

mod state;

use std::time::Duration;

use chrono::{DateTime, Utc};
use proctor_types::{
    camera::CameraError,
    config::ViolationPolicy,
    environment::{EnvironmentEvent, SessionPhase},
    presence::PresenceReading,
    violation::{Severity, Violation, ViolationKind, ViolationLog},
};
use tracing::{debug, warn};

pub use state::MonitorState;

/// Presence windows expressed in samples at the session cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleThresholds {
    pub no_face: u32,
    pub look_away: u32,
    pub motionless: u32,
}

impl SampleThresholds {
    pub fn from_policy(policy: &ViolationPolicy, sample_interval: Duration) -> Self {
        Self {
            no_face: ViolationPolicy::samples_for(policy.no_face_secs, sample_interval),
            look_away: ViolationPolicy::samples_for(policy.look_away_secs, sample_interval),
            motionless: ViolationPolicy::samples_for(policy.motionless_secs, sample_interval),
        }
    }
}

/// Single writer of the session's violation log.
pub struct ViolationAggregator {
    policy: ViolationPolicy,
    thresholds: SampleThresholds,
    phase: SessionPhase,
    state: MonitorState,
    log: ViolationLog,
}

impl ViolationAggregator {
    pub fn new(policy: ViolationPolicy, sample_interval: Duration) -> Self {
        let thresholds = SampleThresholds::from_policy(&policy, sample_interval);
        Self {
            policy,
            thresholds,
            phase: SessionPhase::Setup,
            state: MonitorState::default(),
            log: ViolationLog::new(),
        }
    }

    pub fn thresholds(&self) -> SampleThresholds {
        self.thresholds
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MonitorState {
        &mut self.state
    }

    pub fn log(&self) -> &ViolationLog {
        &self.log
    }

    /// Zeroes every counter and empties the log for a new attempt.
    pub fn reset(&mut self) {
        self.state = MonitorState::default();
        self.log = ViolationLog::new();
        self.phase = SessionPhase::Setup;
    }

    /// Applies the presence rules for one sample tick, returning what was emitted.
    pub fn observe_presence(
        &mut self,
        reading: &PresenceReading,
        at: DateTime<Utc>,
    ) -> Vec<Violation> {
        let mut emitted = Vec::new();
        self.check_no_face(reading, at, &mut emitted);
        self.check_multiple_people(reading, at, &mut emitted);
        self.check_looking_away(reading, at, &mut emitted);
        self.check_motionless(reading, at, &mut emitted);
        self.check_inactivity(reading, at, &mut emitted);
        emitted
    }

    /// Applies the environment rules for one event, in arrival order.
    pub fn observe_environment(
        &mut self,
        event: &EnvironmentEvent,
        at: DateTime<Utc>,
    ) -> Vec<Violation> {
        let mut emitted = Vec::new();
        match event {
            EnvironmentEvent::TabHidden => {
                self.state.tab_switches += 1;
                let count = self.state.tab_switches;
                self.emit(
                    &mut emitted,
                    ViolationKind::TabSwitch,
                    Severity::High,
                    format!("Switched away from the interview tab (#{count})"),
                    at,
                );
                if count == self.policy.tab_switch_escalation {
                    self.emit(
                        &mut emitted,
                        ViolationKind::TabSwitch,
                        Severity::Critical,
                        format!("Tab switched {count} times; interview integrity compromised"),
                        at,
                    );
                }
            }
            EnvironmentEvent::WindowBlur => self.emit(
                &mut emitted,
                ViolationKind::WindowBlur,
                Severity::Medium,
                "Interview window lost focus",
                at,
            ),
            EnvironmentEvent::FullscreenExited => {
                if self.phase == SessionPhase::Setup {
                    debug!("Fullscreen exit during setup ignored");
                } else {
                    self.emit(
                        &mut emitted,
                        ViolationKind::FullscreenExit,
                        Severity::High,
                        "Exited fullscreen mode during the interview",
                        at,
                    );
                }
            }
            EnvironmentEvent::SuspiciousKey { combo } => {
                self.state.suspicious_keys += 1;
                let count = self.state.suspicious_keys;
                self.emit(
                    &mut emitted,
                    ViolationKind::SuspiciousKey,
                    Severity::Medium,
                    format!("Blocked shortcut {combo} (suspicious key press #{count})"),
                    at,
                );
            }
            EnvironmentEvent::TabVisible | EnvironmentEvent::FullscreenEntered => {
                debug!("Environment event {:?} needs no violation", event);
            }
        }
        emitted
    }

    pub fn report_camera_error(&mut self, error: &CameraError, at: DateTime<Utc>) -> Violation {
        let mut emitted = Vec::with_capacity(1);
        self.emit(
            &mut emitted,
            ViolationKind::CameraError,
            Severity::Critical,
            format!("Camera unavailable: {} {}", error.message, error.remediation()),
            at,
        );
        emitted.remove(0)
    }

    pub fn report_model_load_error(
        &mut self,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Violation {
        let mut emitted = Vec::with_capacity(1);
        self.emit(
            &mut emitted,
            ViolationKind::ModelLoadError,
            Severity::High,
            format!("Presence model failed to load: {}", message.into()),
            at,
        );
        emitted.remove(0)
    }

    fn check_no_face(
        &mut self,
        reading: &PresenceReading,
        at: DateTime<Utc>,
        emitted: &mut Vec<Violation>,
    ) {
        if reading.face_detected {
            self.state.no_face_samples = 0;
            return;
        }
        self.state.no_face_samples += 1;
        if self.state.no_face_samples >= self.thresholds.no_face {
            self.state.no_face_samples = 0;
            self.emit(
                emitted,
                ViolationKind::NoFace,
                Severity::High,
                format!(
                    "No face detected for {} seconds",
                    self.policy.no_face_secs
                ),
                at,
            );
        }
    }

    fn check_multiple_people(
        &mut self,
        reading: &PresenceReading,
        at: DateTime<Utc>,
        emitted: &mut Vec<Violation>,
    ) {
        let previous = self.state.last_person_count;
        self.state.last_person_count = reading.person_count;
        if reading.person_count > 1 && previous <= 1 {
            self.emit(
                emitted,
                ViolationKind::MultiplePeople,
                Severity::Critical,
                format!("{} people detected in camera view", reading.person_count),
                at,
            );
        }
    }

    fn check_looking_away(
        &mut self,
        reading: &PresenceReading,
        at: DateTime<Utc>,
        emitted: &mut Vec<Violation>,
    ) {
        if reading.looking_at_screen {
            self.state.look_away_streak = 0;
            return;
        }
        self.state.look_away_streak += 1;
        if self.state.look_away_streak >= self.thresholds.look_away {
            self.state.look_away_streak = 0;
            self.emit(
                emitted,
                ViolationKind::LookingAway,
                Severity::Medium,
                format!(
                    "Looking away from the screen for {} seconds",
                    self.policy.look_away_secs
                ),
                at,
            );
        }
    }

    fn check_motionless(
        &mut self,
        reading: &PresenceReading,
        at: DateTime<Utc>,
        emitted: &mut Vec<Violation>,
    ) {
        match reading.motion_level {
            Some(level) if level < self.policy.motion_threshold => {
                self.state.motionless_streak += 1;
                if self.state.motionless_streak >= self.thresholds.motionless {
                    self.state.motionless_streak = 0;
                    self.emit(
                        emitted,
                        ViolationKind::Motionless,
                        Severity::Medium,
                        format!(
                            "No movement for {} seconds; possible photo or video substitution",
                            self.policy.motionless_secs
                        ),
                        at,
                    );
                }
            }
            Some(_) => self.state.motionless_streak = 0,
            None => {}
        }
    }

    fn check_inactivity(
        &mut self,
        reading: &PresenceReading,
        at: DateTime<Utc>,
        emitted: &mut Vec<Violation>,
    ) {
        let active = reading
            .motion_level
            .map(|level| level >= self.policy.motion_threshold)
            .unwrap_or(false);
        let Some(last_active) = self.state.last_active else {
            self.state.last_active = Some(at);
            return;
        };
        if active {
            self.state.last_active = Some(at);
            return;
        }
        let idle = at.signed_duration_since(last_active);
        if idle >= chrono::Duration::seconds(self.policy.inactivity_secs as i64) {
            self.state.last_active = Some(at);
            self.emit(
                emitted,
                ViolationKind::Inactivity,
                Severity::Low,
                format!(
                    "No candidate activity for {} seconds",
                    self.policy.inactivity_secs
                ),
                at,
            );
        }
    }

    fn emit(
        &mut self,
        emitted: &mut Vec<Violation>,
        kind: ViolationKind,
        severity: Severity,
        description: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        let violation = Violation::new(kind, severity, description, at);
        warn!(
            "Violation {:?} ({:?}): {}",
            violation.kind, violation.severity, violation.description
        );
        self.log.push(violation.clone());
        emitted.push(violation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_types::camera::CameraErrorKind;

    const TICK_MS: i64 = 500;

    fn aggregator() -> ViolationAggregator {
        let mut aggregator =
            ViolationAggregator::new(ViolationPolicy::default(), Duration::from_millis(500));
        aggregator.set_phase(SessionPhase::Interview);
        aggregator
    }

    /// Feeds `readings` one per tick starting at `start`, returning the next tick time.
    fn feed(
        aggregator: &mut ViolationAggregator,
        start: DateTime<Utc>,
        readings: impl IntoIterator<Item = PresenceReading>,
    ) -> DateTime<Utc> {
        let mut at = start;
        for reading in readings {
            aggregator.observe_presence(&reading, at);
            at += chrono::Duration::milliseconds(TICK_MS);
        }
        at
    }

    fn moving() -> PresenceReading {
        PresenceReading::frontal(Some(0.2))
    }

    #[test]
    fn thresholds_follow_sample_cadence() {
        let thresholds = aggregator().thresholds();
        assert_eq!(
            thresholds,
            SampleThresholds {
                no_face: 6,
                look_away: 10,
                motionless: 30,
            }
        );
    }

    #[test]
    fn no_face_emits_once_per_window() {
        let mut agg = aggregator();
        let start = Utc::now();
        let at = feed(&mut agg, start, (0..5).map(|_| PresenceReading::absent(Some(0.2))));
        assert_eq!(agg.log().count_of(ViolationKind::NoFace), 0);

        let at = feed(&mut agg, at, [PresenceReading::absent(Some(0.2))]);
        assert_eq!(agg.log().count_of(ViolationKind::NoFace), 1);
        assert_eq!(agg.state().no_face_samples, 0);

        // The very next sample starts a fresh window instead of re-emitting.
        let at = feed(&mut agg, at, [PresenceReading::absent(Some(0.2))]);
        assert_eq!(agg.log().count_of(ViolationKind::NoFace), 1);

        feed(&mut agg, at, (0..5).map(|_| PresenceReading::absent(Some(0.2))));
        assert_eq!(agg.log().count_of(ViolationKind::NoFace), 2);
        let violation = &agg.log().entries()[0];
        assert_eq!(violation.severity, Severity::High);
    }

    #[test]
    fn returning_face_resets_no_face_counter() {
        let mut agg = aggregator();
        let readings = (0..5)
            .map(|_| PresenceReading::absent(Some(0.2)))
            .chain([moving()])
            .chain((0..5).map(|_| PresenceReading::absent(Some(0.2))));
        feed(&mut agg, Utc::now(), readings);
        assert_eq!(agg.log().count_of(ViolationKind::NoFace), 0);
        assert_eq!(agg.state().no_face_samples, 5);
    }

    #[test]
    fn multiple_people_is_edge_triggered() {
        let mut agg = aggregator();
        let crowd = || moving().with_person_count(2);
        let readings = [moving()]
            .into_iter()
            .chain((0..20).map(|_| crowd()))
            .chain([moving()])
            .chain((0..3).map(|_| crowd()));
        feed(&mut agg, Utc::now(), readings);

        let crowds: Vec<&Violation> = agg
            .log()
            .iter()
            .filter(|v| v.kind == ViolationKind::MultiplePeople)
            .collect();
        assert_eq!(crowds.len(), 2);
        assert!(crowds.iter().all(|v| v.severity == Severity::Critical));
    }

    #[test]
    fn transient_crowd_is_still_reported_once() {
        let mut agg = aggregator();
        feed(
            &mut agg,
            Utc::now(),
            [moving(), moving().with_person_count(3), moving()],
        );
        assert_eq!(agg.log().count_of(ViolationKind::MultiplePeople), 1);
    }

    #[test]
    fn looking_away_needs_ten_samples() {
        let mut agg = aggregator();
        let at = feed(&mut agg, Utc::now(), (0..9).map(|_| moving().looking_away()));
        assert_eq!(agg.log().count_of(ViolationKind::LookingAway), 0);
        feed(&mut agg, at, [moving().looking_away()]);
        assert_eq!(agg.log().count_of(ViolationKind::LookingAway), 1);
        assert_eq!(agg.log().entries()[0].severity, Severity::Medium);
        assert_eq!(agg.state().look_away_streak, 0);
    }

    #[test]
    fn absent_face_also_counts_as_looking_away() {
        let mut agg = aggregator();
        let readings: Vec<PresenceReading> =
            (0..10).map(|_| PresenceReading::absent(Some(0.2))).collect();
        assert!(readings.iter().all(|r| !r.looking_at_screen));
        feed(&mut agg, Utc::now(), readings);
        assert_eq!(agg.log().count_of(ViolationKind::NoFace), 1);
        assert_eq!(agg.log().count_of(ViolationKind::LookingAway), 1);
        let kinds: Vec<ViolationKind> = agg.log().iter().map(|v| v.kind).collect();
        assert_eq!(kinds, [ViolationKind::NoFace, ViolationKind::LookingAway]);
    }

    #[test]
    fn still_frontal_face_is_motionless_every_fifteen_seconds() {
        let mut agg = aggregator();
        let start = Utc::now();
        // First frame has no predecessor; the next 40 cover 20 seconds.
        let readings = [PresenceReading::frontal(None)]
            .into_iter()
            .chain((0..40).map(|_| PresenceReading::frontal(Some(0.001))));
        let at = feed(&mut agg, start, readings);
        assert_eq!(agg.log().count_of(ViolationKind::Motionless), 1);
        let motionless = agg
            .log()
            .iter()
            .find(|v| v.kind == ViolationKind::Motionless)
            .expect("motionless violation");
        assert_eq!(
            motionless.timestamp - start,
            chrono::Duration::milliseconds(15_000)
        );
        assert!(motionless.description.contains("photo or video"));

        feed(
            &mut agg,
            at,
            (0..20).map(|_| PresenceReading::frontal(Some(0.001))),
        );
        assert_eq!(agg.log().count_of(ViolationKind::Motionless), 2);
    }

    #[test]
    fn movement_resets_motionless_streak() {
        let mut agg = aggregator();
        let readings = (0..29)
            .map(|_| PresenceReading::frontal(Some(0.0)))
            .chain([moving()])
            .chain((0..29).map(|_| PresenceReading::frontal(Some(0.0))));
        feed(&mut agg, Utc::now(), readings);
        assert_eq!(agg.log().count_of(ViolationKind::Motionless), 0);
    }

    #[test]
    fn inactivity_fires_after_thirty_idle_seconds() {
        let mut agg = aggregator();
        let start = Utc::now();
        let at = feed(
            &mut agg,
            start,
            (0..60).map(|_| PresenceReading::frontal(None)),
        );
        assert_eq!(agg.log().count_of(ViolationKind::Inactivity), 0);
        feed(&mut agg, at, [PresenceReading::frontal(None)]);
        assert_eq!(agg.log().count_of(ViolationKind::Inactivity), 1);
        assert_eq!(agg.state().last_active, Some(at));
    }

    #[test]
    fn steady_movement_never_goes_inactive() {
        let mut agg = aggregator();
        feed(&mut agg, Utc::now(), (0..120).map(|_| moving()));
        assert!(agg.log().is_empty());
    }

    #[test]
    fn third_tab_switch_escalates_once() {
        let mut agg = aggregator();
        let at = Utc::now();
        for _ in 0..3 {
            agg.observe_environment(&EnvironmentEvent::TabHidden, at);
            agg.observe_environment(&EnvironmentEvent::TabVisible, at);
        }
        let log = agg.log();
        assert_eq!(log.len(), 4);
        let high = log.iter().filter(|v| v.severity == Severity::High).count();
        let critical = log
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .count();
        assert_eq!((high, critical), (3, 1));
        assert_eq!(log.entries()[3].severity, Severity::Critical);

        let fourth = agg.observe_environment(&EnvironmentEvent::TabHidden, at);
        assert_eq!(fourth.len(), 1);
        assert_eq!(fourth[0].severity, Severity::High);
        assert_eq!(agg.state().tab_switches, 4);
    }

    #[test]
    fn fullscreen_exit_is_ignored_during_setup() {
        let mut agg = aggregator();
        agg.set_phase(SessionPhase::Setup);
        assert!(agg
            .observe_environment(&EnvironmentEvent::FullscreenExited, Utc::now())
            .is_empty());
        agg.set_phase(SessionPhase::Interview);
        let emitted = agg.observe_environment(&EnvironmentEvent::FullscreenExited, Utc::now());
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind, ViolationKind::FullscreenExit);
        assert_eq!(emitted[0].severity, Severity::High);
    }

    #[test]
    fn blur_and_keys_emit_immediately() {
        let mut agg = aggregator();
        let at = Utc::now();
        agg.observe_environment(&EnvironmentEvent::WindowBlur, at);
        for _ in 0..2 {
            agg.observe_environment(
                &EnvironmentEvent::SuspiciousKey {
                    combo: "Ctrl+C".into(),
                },
                at,
            );
        }
        let log = agg.log();
        assert_eq!(log.count_of(ViolationKind::WindowBlur), 1);
        assert_eq!(log.count_of(ViolationKind::SuspiciousKey), 2);
        assert!(log.entries()[2].description.contains("#2"));
        assert!(log.iter().all(|v| v.severity == Severity::Medium));
    }

    #[test]
    fn failures_are_recorded_without_debounce() {
        let mut agg = aggregator();
        let camera = agg.report_camera_error(
            &CameraError::new(CameraErrorKind::Disconnected, "track ended"),
            Utc::now(),
        );
        assert_eq!(camera.severity, Severity::Critical);
        let model = agg.report_model_load_error("weights missing", Utc::now());
        assert_eq!(model.severity, Severity::High);
        assert_eq!(agg.log().len(), 2);
    }

    #[test]
    fn reset_clears_counters_and_log() {
        let mut agg = aggregator();
        agg.observe_environment(&EnvironmentEvent::TabHidden, Utc::now());
        agg.state_mut().remember_frame(proctor_types::vision::Frame::solid(1, 1, [0, 0, 0]));
        agg.reset();
        assert!(agg.log().is_empty());
        assert_eq!(agg.state().tab_switches, 0);
        assert!(agg.state().previous_frame().is_none());
        assert_eq!(agg.phase(), SessionPhase::Setup);
    }
}
