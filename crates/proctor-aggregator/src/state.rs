use chrono::{DateTime, Utc};
use proctor_types::vision::Frame;

/// Per-session counters behind the debounce rules.
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub no_face_samples: u32,
    pub last_person_count: u32,
    pub look_away_streak: u32,
    pub motionless_streak: u32,
    pub last_active: Option<DateTime<Utc>>,
    pub suspicious_keys: u32,
    pub tab_switches: u32,
    /// Only the latest frame is kept, for motion comparison.
    previous_frame: Option<Frame>,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            no_face_samples: 0,
            last_person_count: 1,
            look_away_streak: 0,
            motionless_streak: 0,
            last_active: None,
            suspicious_keys: 0,
            tab_switches: 0,
            previous_frame: None,
        }
    }
}

impl MonitorState {
    pub fn previous_frame(&self) -> Option<&Frame> {
        self.previous_frame.as_ref()
    }

    /// Stores `frame` as the comparison baseline, dropping the older one.
    pub fn remember_frame(&mut self, frame: Frame) {
        self.previous_frame = Some(frame);
    }
}
