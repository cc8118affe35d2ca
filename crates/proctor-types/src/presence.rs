use serde::{Deserialize, Serialize};

/// Normalised position in `[0, 1]` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacePosition {
    pub x: f32,
    pub y: f32,
}

/// Per-frame judgment about who is in front of the camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceReading {
    pub face_detected: bool,
    pub person_count: u32,
    pub looking_at_screen: bool,
    /// `None` until a previous frame exists to compare against.
    pub motion_level: Option<f32>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_position: Option<FacePosition>,
}

impl PresenceReading {
    /// Reading for a lone, still candidate facing the camera.
    pub fn frontal(motion_level: Option<f32>) -> Self {
        Self {
            face_detected: true,
            person_count: 1,
            looking_at_screen: true,
            motion_level,
            confidence: 1.0,
            face_position: Some(FacePosition { x: 0.5, y: 0.35 }),
        }
    }

    pub fn absent(motion_level: Option<f32>) -> Self {
        Self {
            face_detected: false,
            person_count: 1,
            looking_at_screen: false,
            motion_level,
            confidence: 1.0,
            face_position: None,
        }
    }

    pub fn with_person_count(mut self, person_count: u32) -> Self {
        self.person_count = person_count;
        self
    }

    pub fn looking_away(mut self) -> Self {
        self.looking_at_screen = false;
        self
    }
}
