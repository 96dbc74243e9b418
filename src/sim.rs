use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::keyboard::{resolve, typable_chars, KEY_LEFTSHIFT, KEY_RIGHTSHIFT};
use crate::model::{KeyEvent, KeyState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    pub presses: usize,
    pub releases: usize,
    pub shift_presses: usize,
}

pub fn stats(events: &[KeyEvent]) -> EventStats {
    let mut out = EventStats::default();
    for e in events {
        match e.state {
            KeyState::Pressed => {
                out.presses += 1;
                if is_shift(e.keycode) {
                    out.shift_presses += 1;
                }
            }
            KeyState::Released => out.releases += 1,
        }
    }
    out
}

fn is_shift(keycode: u32) -> bool {
    keycode == KEY_LEFTSHIFT || keycode == KEY_RIGHTSHIFT
}

fn us_qwerty_decode_map() -> HashMap<(u32, bool), char> {
    typable_chars()
        .filter_map(|c| resolve(c).map(|stroke| ((stroke.keycode, stroke.shift), c)))
        .collect()
}

/// Decode recorded key events back into the text a US-layout editor would show.
///
/// Intended for tests and dry runs: it tracks Shift and inserts one character
/// per key press, nothing more.
pub fn replay_text(events: &[KeyEvent]) -> Result<String> {
    let decode = us_qwerty_decode_map();
    let mut shift_down = false;
    let mut out = String::new();

    for e in events {
        if is_shift(e.keycode) {
            shift_down = e.state == KeyState::Pressed;
            continue;
        }
        if e.state == KeyState::Released {
            continue;
        }

        let c = decode.get(&(e.keycode, shift_down)).copied().ok_or_else(|| {
            anyhow!(
                "replay_text does not support keycode {} (shift={shift_down})",
                e.keycode
            )
        })?;
        out.push(c);
    }

    Ok(out)
}
