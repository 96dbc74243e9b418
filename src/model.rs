use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Pressed,
    Released,
}

/// One physical key transition sent to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub keycode: u32,
    pub state: KeyState,
}

impl KeyEvent {
    pub fn pressed(keycode: u32) -> Self {
        Self {
            keycode,
            state: KeyState::Pressed,
        }
    }

    pub fn released(keycode: u32) -> Self {
        Self {
            keycode,
            state: KeyState::Released,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEnd {
    Completed,
    Cancelled,
}

/// Delivered once per run when the dispatch loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub end: RunEnd,
    /// Characters injected without error.
    pub typed: usize,
    /// Characters with no keystroke in the table.
    pub skipped: usize,
    /// Characters whose injection returned an error.
    pub failed: usize,
}

impl RunReport {
    pub fn is_cancelled(&self) -> bool {
        self.end == RunEnd::Cancelled
    }
}
