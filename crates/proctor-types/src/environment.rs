use serde::{Deserialize, Serialize};

/// Which part of the interview the session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Camera check and fullscreen prompt; integrity rules are relaxed.
    #[default]
    Setup,
    Interview,
}

/// Integrity signals raised by the host window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EnvironmentEvent {
    TabHidden,
    TabVisible,
    WindowBlur,
    FullscreenEntered,
    FullscreenExited,
    SuspiciousKey { combo: String },
}

/// A key press as reported by the host, before deny-list matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeyStroke {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub meta: bool,
}

impl KeyStroke {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Human readable combination such as `Ctrl+Shift+I`.
    pub fn combo(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(5);
        if self.ctrl {
            parts.push("Ctrl".into());
        }
        if self.meta {
            parts.push("Meta".into());
        }
        if self.alt {
            parts.push("Alt".into());
        }
        if self.shift {
            parts.push("Shift".into());
        }
        let key = if self.key.chars().count() == 1 {
            self.key.to_uppercase()
        } else {
            self.key.clone()
        };
        parts.push(key);
        parts.join("+")
    }
}

/// Raw host signal before the watcher filters it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEvent {
    VisibilityChanged { hidden: bool },
    WindowBlur,
    FullscreenChanged { active: bool },
    KeyDown(KeyStroke),
}
