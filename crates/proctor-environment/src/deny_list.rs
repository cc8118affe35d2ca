use proctor_types::environment::KeyStroke;
use serde::{Deserialize, Serialize};

/// One blocked key combination. Modifiers must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRule {
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

impl KeyRule {
    fn from_stroke(stroke: KeyStroke) -> Self {
        Self {
            key: stroke.key,
            ctrl: stroke.ctrl,
            alt: stroke.alt,
            shift: stroke.shift,
            meta: stroke.meta,
        }
    }

    pub fn matches(&self, stroke: &KeyStroke) -> bool {
        self.key.eq_ignore_ascii_case(&stroke.key)
            && self.ctrl == stroke.ctrl
            && self.alt == stroke.alt
            && self.shift == stroke.shift
            && self.meta == stroke.meta
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDenyList {
    rules: Vec<KeyRule>,
}

impl KeyDenyList {
    pub fn new(rules: Vec<KeyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[KeyRule] {
        &self.rules
    }

    pub fn is_denied(&self, stroke: &KeyStroke) -> bool {
        self.rules.iter().any(|rule| rule.matches(stroke))
    }
}

impl Default for KeyDenyList {
    /// Developer tools, reload, clipboard, tab management and app switching.
    fn default() -> Self {
        let strokes = [
            // developer tools
            KeyStroke::new("F12"),
            KeyStroke::new("I").ctrl().shift(),
            KeyStroke::new("J").ctrl().shift(),
            KeyStroke::new("C").ctrl().shift(),
            KeyStroke::new("I").meta().alt(),
            KeyStroke::new("J").meta().alt(),
            KeyStroke::new("U").ctrl(),
            // reload
            KeyStroke::new("F5"),
            KeyStroke::new("R").ctrl(),
            KeyStroke::new("R").ctrl().shift(),
            KeyStroke::new("R").meta(),
            // clipboard
            KeyStroke::new("C").ctrl(),
            KeyStroke::new("V").ctrl(),
            KeyStroke::new("X").ctrl(),
            KeyStroke::new("C").meta(),
            KeyStroke::new("V").meta(),
            KeyStroke::new("X").meta(),
            // tabs and windows
            KeyStroke::new("T").ctrl(),
            KeyStroke::new("W").ctrl(),
            KeyStroke::new("N").ctrl(),
            KeyStroke::new("Tab").ctrl(),
            KeyStroke::new("T").meta(),
            KeyStroke::new("W").meta(),
            KeyStroke::new("N").meta(),
            // app switching
            KeyStroke::new("Tab").alt(),
            KeyStroke::new("Tab").meta(),
            KeyStroke::new("F4").alt(),
        ];
        Self::new(strokes.into_iter().map(KeyRule::from_stroke).collect())
    }
}
