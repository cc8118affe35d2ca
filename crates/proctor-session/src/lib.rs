//! Proctoring session lifecycle: owns the camera, the environment watcher
//! and the violation log for exactly one interview attempt.

use chrono::{DateTime, Utc};
use proctor_aggregator::ViolationAggregator;
use proctor_capture::FrameSampler;
use proctor_environment::{
    EnvironmentReceiver, EnvironmentWatcher, KeyDenyList, TimedEnvironmentEvent, WatcherHandle,
};
use proctor_network::ViolationFeed;
use proctor_ops::{EventJournal, SessionReport};
use proctor_types::{
    camera::CameraError,
    config::{CaptureConfig, ProctorConfig, SessionConfig},
    environment::{EnvironmentEvent, SessionPhase},
    events::{EventKind, SessionState, SystemEvent},
    presence::PresenceReading,
    submission::SubmissionPayload,
    vision::Frame,
    violation::{Violation, ViolationKind, ViolationLog},
    ProctorError, Result,
};
use proctor_vision::{EvidenceRecorder, PresenceAnalyzer};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    pub require_fullscreen: bool,
}

impl From<&SessionConfig> for StartOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            require_fullscreen: config.require_fullscreen,
        }
    }
}

/// Live push for UI alerting.
pub type ViolationCallback = Box<dyn Fn(&Violation) + Send + Sync>;

/// Snapshot of the session for the interview UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub state: SessionState,
    pub phase: SessionPhase,
    pub violation_count: usize,
    pub tab_switches: u32,
    pub fullscreen_confirmed: bool,
    pub last_reading: Option<PresenceReading>,
}

pub struct ProctoringSession<S, A, F>
where
    S: FrameSampler,
    A: PresenceAnalyzer,
    F: ViolationFeed,
{
    id: Uuid,
    sampler: S,
    analyzer: A,
    feed: F,
    journal: EventJournal,
    evidence: EvidenceRecorder,
    capture: CaptureConfig,
    watcher: EnvironmentWatcher,
    host: Option<WatcherHandle>,
    environment_rx: Option<EnvironmentReceiver>,
    aggregator: ViolationAggregator,
    state: SessionState,
    options: StartOptions,
    first_frame_seen: bool,
    fullscreen_confirmed: bool,
    started_at: Option<DateTime<Utc>>,
    last_reading: Option<PresenceReading>,
    callbacks: Vec<ViolationCallback>,
}

impl<S, A, F> ProctoringSession<S, A, F>
where
    S: FrameSampler,
    A: PresenceAnalyzer,
    F: ViolationFeed,
{
    pub fn new(
        config: &ProctorConfig,
        sampler: S,
        analyzer: A,
        feed: F,
        journal: EventJournal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sampler,
            analyzer,
            feed,
            journal,
            evidence: EvidenceRecorder::new(config.analysis.evidence_dir.clone()),
            capture: config.capture.clone(),
            watcher: EnvironmentWatcher::new(KeyDenyList::default()),
            host: None,
            environment_rx: None,
            aggregator: ViolationAggregator::new(
                config.policy.clone(),
                config.capture.sample_interval(),
            ),
            state: SessionState::Idle,
            options: StartOptions::from(&config.session),
            first_frame_seen: false,
            fullscreen_confirmed: false,
            started_at: None,
            last_reading: None,
            callbacks: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.aggregator.phase()
    }

    pub fn log(&self) -> &ViolationLog {
        self.aggregator.log()
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            state: self.state,
            phase: self.aggregator.phase(),
            violation_count: self.aggregator.log().len(),
            tab_switches: self.aggregator.state().tab_switches,
            fullscreen_confirmed: self.fullscreen_confirmed,
            last_reading: self.last_reading.clone(),
        }
    }

    /// Handle for host listeners. `None` outside `initializing`/`active`.
    pub fn host_handle(&self) -> Option<WatcherHandle> {
        self.host.clone()
    }

    pub fn on_violation<C>(&mut self, callback: C)
    where
        C: Fn(&Violation) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Acquires the camera and begins monitoring in the setup phase.
    ///
    /// A camera failure is terminal for this attempt: the session ends up
    /// `stopped` and the error is returned for the caller to offer a retry.
    pub async fn start(&mut self, options: StartOptions) -> Result<()> {
        match self.state {
            SessionState::Initializing | SessionState::Active => {
                return Err(session_error("session already running"));
            }
            SessionState::Stopped => self.reset(),
            SessionState::Idle => {}
        }

        self.options = options;
        self.transition(SessionState::Initializing, None).await?;
        let (handle, rx) = self.watcher.attach();
        self.host = Some(handle);
        self.environment_rx = Some(rx);

        let constraints = self.capture.constraints();
        match self.sampler.start(&constraints).await {
            Ok(handle) => {
                info!(
                    "Camera acquired: {} ({}x{} @ {}fps)",
                    handle.device_label, handle.width, handle.height, handle.frame_rate
                );
            }
            Err(err) => {
                warn!("Camera acquisition failed: {err}");
                self.publish(SystemEvent::alert(
                    err.to_string(),
                    Some(err.remediation().to_string()),
                ))
                .await?;
                self.stop().await;
                return Err(ProctorError::Camera(err));
            }
        }

        if let Err(err) = self.analyzer.load() {
            let violation = self
                .aggregator
                .report_model_load_error(err.to_string(), Utc::now());
            self.dispatch(vec![violation]).await?;
        }

        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// One sample tick: drain host events, then sample, analyze, aggregate.
    pub async fn tick(&mut self) -> Result<()> {
        self.pump_environment().await?;
        if !matches!(
            self.state,
            SessionState::Initializing | SessionState::Active
        ) {
            return Ok(());
        }

        let frame = match self.sampler.sample().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Camera not ready; skipping tick");
                return Ok(());
            }
            Err(err) => return self.camera_lost(err).await,
        };

        if self.state == SessionState::Initializing {
            self.first_frame_seen = true;
            self.aggregator.state_mut().remember_frame(frame);
            return self.try_activate().await;
        }

        let reading = match self
            .analyzer
            .analyze(&frame, self.aggregator.state().previous_frame())
        {
            Ok(reading) => reading,
            Err(err) => {
                debug!("Skipping tick, frame not analyzable: {err}");
                return Ok(());
            }
        };

        let violations = self.aggregator.observe_presence(&reading, frame.captured_at);
        for violation in &violations {
            self.persist_evidence(violation.kind, &frame);
        }
        self.dispatch(violations).await?;
        self.publish(SystemEvent::presence(reading.clone())).await?;
        self.last_reading = Some(reading);
        self.aggregator.state_mut().remember_frame(frame);
        Ok(())
    }

    /// Processes every queued host event in arrival order.
    pub async fn pump_environment(&mut self) -> Result<()> {
        let mut pending = Vec::new();
        if let Some(rx) = self.environment_rx.as_mut() {
            while let Ok(event) = rx.try_recv() {
                pending.push(event);
            }
        }
        for event in pending {
            self.handle_environment(event).await?;
        }
        Ok(())
    }

    pub async fn handle_environment(&mut self, timed: TimedEnvironmentEvent) -> Result<()> {
        match (&timed.event, self.state) {
            (EnvironmentEvent::FullscreenEntered, _) => {
                self.fullscreen_confirmed = true;
                return self.try_activate().await;
            }
            (EnvironmentEvent::FullscreenExited, SessionState::Initializing) => {
                self.fullscreen_confirmed = false;
                return Ok(());
            }
            (EnvironmentEvent::FullscreenExited, SessionState::Active) => {
                self.fullscreen_confirmed = false;
            }
            (_, SessionState::Active) => {}
            (event, state) => {
                debug!("Ignoring {:?} while {:?}", event, state);
                return Ok(());
            }
        }
        let violations = self.aggregator.observe_environment(&timed.event, timed.at);
        self.dispatch(violations).await
    }

    /// Drives the session at the configured cadence until cancelled or the
    /// camera is lost, then stops and returns the final log.
    ///
    /// Losing the camera before the interview began surfaces as an error.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<ViolationLog> {
        if !matches!(
            self.state,
            SessionState::Initializing | SessionState::Active
        ) {
            return Err(session_error("session must be started before running"));
        }

        let mut ticker = interval(self.capture.sample_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events = self.environment_rx.take();

        let mut outcome = loop {
            tokio::select! {
                // Cancellation wins over a due tick.
                biased;
                _ = cancel.cancelled() => {
                    info!("Proctoring session {} cancelled", self.id);
                    break Ok(());
                }
                _ = ticker.tick() => {
                    let was_active = self.state == SessionState::Active;
                    match self.tick().await {
                        Ok(()) => {}
                        // Loss while active is already on the log.
                        Err(ProctorError::Camera(_)) if was_active => break Ok(()),
                        Err(err) => break Err(err),
                    }
                }
                Some(event) = next_event(&mut events) => {
                    if let Err(err) = self.handle_environment(event).await {
                        break Err(err);
                    }
                }
            }
        };

        if let Some(rx) = events.as_mut() {
            while let Ok(event) = rx.try_recv() {
                if self.state != SessionState::Active || outcome.is_err() {
                    continue;
                }
                let violations = self.aggregator.observe_environment(&event.event, event.at);
                if let Err(err) = self.dispatch(violations).await {
                    outcome = Err(err);
                }
            }
        }
        // The camera is released even when the drain failed.
        let log = self.stop().await;
        outcome.map(|_| log)
    }

    /// Releases the camera, detaches host listeners and returns the log.
    /// Safe in any state and idempotent.
    pub async fn stop(&mut self) -> ViolationLog {
        if self.state == SessionState::Active {
            if let Err(err) = self.pump_environment().await {
                warn!("Failed to flush environment events on stop: {err}");
            }
        }
        self.sampler.stop().await;
        self.watcher.detach();
        self.host = None;
        self.environment_rx = None;

        if self.state != SessionState::Stopped {
            if let Err(err) = self.transition(SessionState::Stopped, None).await {
                warn!("Failed to publish stop transition: {err}");
            }
            info!(
                "Proctoring session {} stopped with {} violations",
                self.id,
                self.aggregator.log().len()
            );
        }
        self.aggregator.log().clone()
    }

    /// Stops the session and embeds its log into the interview results.
    pub async fn complete(&mut self, results: serde_json::Value) -> Result<serde_json::Value> {
        let log = self.stop().await;
        SubmissionPayload::attach(results, &log)
    }

    pub fn report(&self) -> SessionReport {
        SessionReport::new(self.id, self.started_at, self.aggregator.log())
    }

    fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.aggregator.reset();
        self.state = SessionState::Idle;
        self.first_frame_seen = false;
        self.fullscreen_confirmed = false;
        self.started_at = None;
        self.last_reading = None;
        info!("Proctoring session reset as {}", self.id);
    }

    async fn try_activate(&mut self) -> Result<()> {
        if self.state != SessionState::Initializing || !self.first_frame_seen {
            return Ok(());
        }
        if self.options.require_fullscreen && !self.fullscreen_confirmed {
            debug!("Waiting for fullscreen before activating");
            return Ok(());
        }
        self.aggregator.set_phase(SessionPhase::Interview);
        self.watcher.set_phase(SessionPhase::Interview);
        self.transition(SessionState::Active, Some("interview monitoring active".into()))
            .await
    }

    async fn camera_lost(&mut self, err: CameraError) -> Result<()> {
        warn!("Camera failure in {:?}: {err}", self.state);
        if self.state == SessionState::Active {
            let violation = self.aggregator.report_camera_error(&err, Utc::now());
            self.dispatch(vec![violation]).await?;
        } else {
            self.publish(SystemEvent::alert(
                err.to_string(),
                Some(err.remediation().to_string()),
            ))
            .await?;
        }
        self.stop().await;
        Err(ProctorError::Camera(err))
    }

    fn persist_evidence(&self, kind: ViolationKind, frame: &Frame) {
        if !self.evidence.is_enabled() {
            return;
        }
        let Some(label) = evidence_label(kind) else {
            return;
        };
        if let Err(err) = self.evidence.persist(frame, label) {
            warn!("Failed to save evidence for {:?}: {err}", kind);
        }
    }

    async fn dispatch(&mut self, violations: Vec<Violation>) -> Result<()> {
        for violation in violations {
            for callback in &self.callbacks {
                callback(&violation);
            }
            self.publish(SystemEvent::violation(violation)).await?;
        }
        Ok(())
    }

    async fn transition(&mut self, state: SessionState, details: Option<String>) -> Result<()> {
        info!("Session {} {:?} -> {:?}", self.id, self.state, state);
        self.state = state;
        self.publish(SystemEvent::lifecycle(state, details)).await
    }

    /// Presence readings go to live subscribers only; the journal keeps
    /// lifecycle, violation and alert events.
    async fn publish(&self, event: SystemEvent) -> Result<()> {
        if event.kind == EventKind::Presence {
            return self.feed.publish(event).await;
        }
        let cloned = event.clone();
        self.feed.publish(event).await?;
        self.journal.record_event(cloned).await?;
        Ok(())
    }
}

async fn next_event(events: &mut Option<EnvironmentReceiver>) -> Option<TimedEnvironmentEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => futures::future::pending().await,
    }
}

fn evidence_label(kind: ViolationKind) -> Option<&'static str> {
    match kind {
        ViolationKind::NoFace => Some("no_face"),
        ViolationKind::MultiplePeople => Some("multiple_people"),
        ViolationKind::LookingAway => Some("looking_away"),
        ViolationKind::Motionless => Some("motionless"),
        _ => None,
    }
}

pub fn session_error(message: impl Into<String>) -> ProctorError {
    ProctorError::Session(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use futures::{stream::BoxStream, StreamExt};
    use proctor_capture::{ScriptedCamera, ScriptedSample};
    use proctor_network::{network_error, LocalFeed};
    use proctor_types::{
        camera::CameraErrorKind,
        environment::{HostEvent, KeyStroke},
        violation::Severity,
    };
    use proctor_vision::vision_error;

    struct ScriptedAnalyzer {
        readings: Mutex<VecDeque<PresenceReading>>,
        fallback: PresenceReading,
        fail_load: bool,
    }

    impl ScriptedAnalyzer {
        fn steady() -> Self {
            Self {
                readings: Mutex::new(VecDeque::new()),
                fallback: PresenceReading::frontal(Some(0.5)),
                fail_load: false,
            }
        }

        fn with_readings(readings: Vec<PresenceReading>) -> Self {
            Self {
                readings: Mutex::new(readings.into()),
                ..Self::steady()
            }
        }
    }

    impl PresenceAnalyzer for ScriptedAnalyzer {
        fn load(&mut self) -> Result<()> {
            if self.fail_load {
                return Err(vision_error("weights unavailable"));
            }
            Ok(())
        }

        fn analyze(&self, _frame: &Frame, _previous: Option<&Frame>) -> Result<PresenceReading> {
            let mut readings = self.readings.lock().unwrap();
            Ok(readings.pop_front().unwrap_or_else(|| self.fallback.clone()))
        }
    }

    type TestSession = ProctoringSession<ScriptedCamera, ScriptedAnalyzer, LocalFeed>;

    fn config(require_fullscreen: bool) -> ProctorConfig {
        let mut config = ProctorConfig::default();
        config.session.require_fullscreen = require_fullscreen;
        config
    }

    fn camera_with_frames(count: usize) -> ScriptedCamera {
        let mut camera = ScriptedCamera::new(Duration::from_millis(500));
        camera.push_frames(&Frame::solid(64, 48, [40, 40, 40]), count);
        camera
    }

    fn session(camera: ScriptedCamera, analyzer: ScriptedAnalyzer) -> (TestSession, EventJournal) {
        let journal = EventJournal::new();
        let config = config(false);
        let session = ProctoringSession::new(
            &config,
            camera,
            analyzer,
            LocalFeed::new(16),
            journal.clone(),
        );
        (session, journal)
    }

    fn no_fullscreen() -> StartOptions {
        StartOptions {
            require_fullscreen: false,
        }
    }

    async fn active_session(camera: ScriptedCamera, analyzer: ScriptedAnalyzer) -> TestSession {
        let (mut session, _) = session(camera, analyzer);
        session.start(no_fullscreen()).await.unwrap();
        session.tick().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        session
    }

    #[tokio::test]
    async fn camera_denied_never_activates() {
        let (mut session, journal) = session(
            ScriptedCamera::failing(CameraErrorKind::PermissionDenied),
            ScriptedAnalyzer::steady(),
        );

        let err = session.start(no_fullscreen()).await.unwrap_err();
        assert_eq!(
            err.camera().map(|camera| camera.kind),
            Some(CameraErrorKind::PermissionDenied)
        );
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.host_handle().is_none());

        let alerts = journal
            .snapshot_events()
            .await
            .into_iter()
            .filter(|event| event.kind == EventKind::Alert)
            .count();
        assert_eq!(alerts, 1);

        assert!(session.stop().await.is_empty());
        assert!(session.stop().await.is_empty());
    }

    #[tokio::test]
    async fn not_ready_frames_keep_initializing() {
        let mut camera = ScriptedCamera::new(Duration::from_millis(500));
        camera
            .push(ScriptedSample::NotReady)
            .push(ScriptedSample::NotReady);
        let (mut session, _) = session(camera, ScriptedAnalyzer::steady());
        session.start(no_fullscreen()).await.unwrap();

        session.tick().await.unwrap();
        session.tick().await.unwrap();
        assert_eq!(session.state(), SessionState::Initializing);
        assert_eq!(session.sampler().metrics().not_ready, 2);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn fullscreen_gates_activation() {
        let (mut session, _) = session(camera_with_frames(4), ScriptedAnalyzer::steady());
        session
            .start(StartOptions {
                require_fullscreen: true,
            })
            .await
            .unwrap();

        session.tick().await.unwrap();
        assert_eq!(session.state(), SessionState::Initializing);
        assert_eq!(session.phase(), SessionPhase::Setup);

        let host = session.host_handle().unwrap();
        let dispatch = host.dispatch(HostEvent::FullscreenChanged { active: true });
        assert_eq!(dispatch.forwarded, Some(EnvironmentEvent::FullscreenEntered));

        session.tick().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.phase(), SessionPhase::Interview);
        assert!(session.status().fullscreen_confirmed);
    }

    #[tokio::test]
    async fn setup_phase_events_are_not_violations() {
        let (mut session, _) = session(camera_with_frames(2), ScriptedAnalyzer::steady());
        session
            .start(StartOptions {
                require_fullscreen: true,
            })
            .await
            .unwrap();
        let host = session.host_handle().unwrap();

        host.dispatch(HostEvent::VisibilityChanged { hidden: true });
        host.dispatch(HostEvent::FullscreenChanged { active: false });
        session.tick().await.unwrap();

        assert_eq!(session.state(), SessionState::Initializing);
        assert!(session.stop().await.is_empty());
    }

    #[tokio::test]
    async fn clean_session_returns_empty_log() {
        let mut session = active_session(camera_with_frames(8), ScriptedAnalyzer::steady()).await;
        for _ in 0..7 {
            session.tick().await.unwrap();
        }
        let log = session.stop().await;
        assert!(log.is_empty());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.sampler().is_capturing());
        assert_eq!(session.sampler().metrics().releases, 1);
    }

    #[tokio::test]
    async fn tab_switches_escalate_and_stop_is_idempotent() {
        let mut session = active_session(camera_with_frames(1), ScriptedAnalyzer::steady()).await;
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&pushed);
        session.on_violation(move |violation| sink.lock().unwrap().push(violation.clone()));

        let host = session.host_handle().unwrap();
        for _ in 0..3 {
            host.dispatch(HostEvent::VisibilityChanged { hidden: true });
            host.dispatch(HostEvent::VisibilityChanged { hidden: false });
        }

        let log = session.stop().await;
        assert_eq!(log.len(), 4);
        assert_eq!(log.count_of(ViolationKind::TabSwitch), 4);
        assert_eq!(log.entries()[3].severity, Severity::Critical);
        assert_eq!(pushed.lock().unwrap().as_slice(), log.entries());

        let again = session.stop().await;
        assert_eq!(again.entries(), log.entries());
        assert!(host
            .dispatch(HostEvent::VisibilityChanged { hidden: true })
            .forwarded
            .is_none());
    }

    #[tokio::test]
    async fn denied_shortcut_is_blocked_and_logged() {
        let mut session = active_session(camera_with_frames(1), ScriptedAnalyzer::steady()).await;
        let host = session.host_handle().unwrap();

        let dispatch = host.dispatch(HostEvent::KeyDown(KeyStroke::new("c").ctrl()));
        assert!(dispatch.prevent_default);
        let allowed = host.dispatch(HostEvent::KeyDown(KeyStroke::new("a")));
        assert!(!allowed.prevent_default);

        let log = session.stop().await;
        assert_eq!(log.count_of(ViolationKind::SuspiciousKey), 1);
    }

    #[tokio::test]
    async fn sustained_absence_raises_one_no_face() {
        let absent = vec![PresenceReading::absent(Some(0.5)); 6];
        let mut session =
            active_session(camera_with_frames(7), ScriptedAnalyzer::with_readings(absent)).await;
        for _ in 0..6 {
            session.tick().await.unwrap();
        }
        let log = session.stop().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].kind, ViolationKind::NoFace);
        assert_eq!(log.entries()[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn second_person_is_reported_once() {
        let readings = vec![
            PresenceReading::frontal(Some(0.5)).with_person_count(2),
            PresenceReading::frontal(Some(0.5)).with_person_count(2),
            PresenceReading::frontal(Some(0.5)),
        ];
        let mut session =
            active_session(camera_with_frames(4), ScriptedAnalyzer::with_readings(readings)).await;
        for _ in 0..3 {
            session.tick().await.unwrap();
        }
        let status = session.status();
        assert_eq!(status.violation_count, 1);
        assert_eq!(status.last_reading.map(|r| r.person_count), Some(1));
        assert_eq!(
            session.log().entries()[0].kind,
            ViolationKind::MultiplePeople
        );
    }

    #[tokio::test]
    async fn camera_loss_mid_session_is_logged_and_stops() {
        let mut camera = camera_with_frames(1);
        camera.push(ScriptedSample::Fail(CameraErrorKind::Disconnected));
        let mut session = active_session(camera, ScriptedAnalyzer::steady()).await;

        let err = session.tick().await.unwrap_err();
        assert!(err.camera().is_some());
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.log().count_of(ViolationKind::CameraError), 1);
        assert_eq!(session.log().entries()[0].severity, Severity::Critical);
        assert!(!session.sampler().is_capturing());
    }

    #[tokio::test]
    async fn restart_after_stop_starts_fresh() {
        let mut session = active_session(camera_with_frames(3), ScriptedAnalyzer::steady()).await;
        let first_id = session.id();
        session
            .host_handle()
            .unwrap()
            .dispatch(HostEvent::WindowBlur);
        assert_eq!(session.stop().await.len(), 1);

        session.start(no_fullscreen()).await.unwrap();
        assert_ne!(session.id(), first_id);
        assert!(session.log().is_empty());
        assert_eq!(session.phase(), SessionPhase::Setup);
        assert!(session.start(no_fullscreen()).await.is_err());
    }

    #[tokio::test]
    async fn model_load_failure_is_recorded_once() {
        let analyzer = ScriptedAnalyzer {
            fail_load: true,
            ..ScriptedAnalyzer::steady()
        };
        let mut session = active_session(camera_with_frames(3), analyzer).await;
        session.tick().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.log().len(), 1);
        assert_eq!(session.log().entries()[0].kind, ViolationKind::ModelLoadError);
    }

    #[tokio::test]
    async fn complete_embeds_violations() {
        let mut session = active_session(camera_with_frames(1), ScriptedAnalyzer::steady()).await;
        session
            .host_handle()
            .unwrap()
            .dispatch(HostEvent::WindowBlur);

        let payload = session
            .complete(serde_json::json!({ "score": 7 }))
            .await
            .unwrap();
        assert_eq!(payload["score"], 7);
        assert_eq!(payload["violations"][0]["type"], "window_blur");
        assert_eq!(session.state(), SessionState::Stopped);

        let report = session.report();
        assert_eq!(report.session_id, session.id());
        assert_eq!(report.summary.total, 1);
    }

    #[tokio::test]
    async fn run_loop_stops_on_cancellation() {
        let mut config = config(false);
        config.capture.sample_interval_ms = 10;
        let camera = ScriptedCamera::new(Duration::from_millis(10))
            .repeat_last(Frame::solid(64, 48, [40, 40, 40]));
        let mut session = ProctoringSession::new(
            &config,
            camera,
            ScriptedAnalyzer::steady(),
            LocalFeed::new(16),
            EventJournal::new(),
        );
        session.start(no_fullscreen()).await.unwrap();
        session.tick().await.unwrap();
        session
            .host_handle()
            .unwrap()
            .dispatch(HostEvent::VisibilityChanged { hidden: true });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let log = session.run(cancel).await.unwrap();
        assert_eq!(log.count_of(ViolationKind::TabSwitch), 1);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.sampler().metrics().frames_sampled > 1);
    }

    #[tokio::test]
    async fn run_requires_started_session() {
        let (mut session, _) = session(camera_with_frames(1), ScriptedAnalyzer::steady());
        assert!(session.run(CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn presence_readings_are_not_journaled() {
        let camera = ScriptedCamera::new(Duration::from_millis(500))
            .repeat_last(Frame::solid(64, 48, [40, 40, 40]));
        let journal = EventJournal::new();
        let feed = LocalFeed::new(16);
        let mut live = feed.subscribe();
        let mut session = ProctoringSession::new(
            &config(false),
            camera,
            ScriptedAnalyzer::steady(),
            feed,
            journal.clone(),
        );
        session.start(no_fullscreen()).await.unwrap();
        for _ in 0..200 {
            session.tick().await.unwrap();
        }

        let journaled = journal.snapshot_events().await;
        assert_eq!(journaled.len(), 2);
        assert!(journaled
            .iter()
            .all(|event| event.kind == EventKind::Lifecycle));
        assert!(session.status().last_reading.is_some());

        let latest = live.next().await.unwrap();
        assert_eq!(latest.kind, EventKind::Presence);
    }

    #[tokio::test]
    async fn fullscreen_exit_clears_confirmation() {
        let (mut session, _) = session(camera_with_frames(3), ScriptedAnalyzer::steady());
        session
            .start(StartOptions {
                require_fullscreen: true,
            })
            .await
            .unwrap();
        let host = session.host_handle().unwrap();
        host.dispatch(HostEvent::FullscreenChanged { active: true });
        session.tick().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.status().fullscreen_confirmed);

        host.dispatch(HostEvent::FullscreenChanged { active: false });
        session.pump_environment().await.unwrap();
        assert!(!session.status().fullscreen_confirmed);
        assert_eq!(session.log().count_of(ViolationKind::FullscreenExit), 1);
    }

    /// Feed whose transport refuses violation records.
    struct RejectingFeed;

    #[async_trait]
    impl ViolationFeed for RejectingFeed {
        async fn publish(&self, event: SystemEvent) -> Result<()> {
            match event.kind {
                EventKind::Violation => Err(network_error("violation transport closed")),
                _ => Ok(()),
            }
        }

        fn subscribe(&self) -> BoxStream<'static, SystemEvent> {
            futures::stream::empty().boxed()
        }
    }

    #[tokio::test]
    async fn failed_final_drain_still_releases_camera() {
        let mut session = ProctoringSession::new(
            &config(false),
            camera_with_frames(2),
            ScriptedAnalyzer::steady(),
            RejectingFeed,
            EventJournal::new(),
        );
        session.start(no_fullscreen()).await.unwrap();
        session.tick().await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        session
            .host_handle()
            .unwrap()
            .dispatch(HostEvent::WindowBlur);

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(session.run(cancel).await.is_err());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!session.sampler().is_capturing());
        assert_eq!(session.sampler().metrics().releases, 1);
    }
}
