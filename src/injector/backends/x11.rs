use anyhow::{anyhow, Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt as _;
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::protocol::{xproto, xtest};
use x11rb::rust_connection::RustConnection;

use crate::injector::backends::COMMON_MODIFIER_KEYCODES;
use crate::injector::InputInjector;
use crate::keyboard::{KEY_1, KEY_A, KEY_APOSTROPHE, KEY_LEFTBRACE, KEY_MINUS, KEY_Q, KEY_SLASH};
use crate::model::KeyState;

fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    // On Linux Xorg servers using the evdev driver, X11 keycodes are evdev + 8.
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

fn key_state_to_x11_event_type(state: KeyState) -> u8 {
    match state {
        KeyState::Pressed => xproto::KEY_PRESS_EVENT,
        KeyState::Released => xproto::KEY_RELEASE_EVENT,
    }
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 backend requires the XTEST extension (not present on this X server)"
        ));
    }

    let version = conn
        .xtest_get_version(2, 2)
        .ok()
        .and_then(|cookie| cookie.reply().ok());
    if let Some(v) = version {
        tracing::debug!(target: "injector.x11", major = v.major_version, minor = v.minor_version, "xtest available");
    }

    Ok(())
}

fn keysyms_for_keycode(conn: &impl Connection, keycode: u8) -> Result<(xproto::Keysym, xproto::Keysym)> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    let at = |index: usize| reply.keysyms.get(index).copied().unwrap_or(x11rb::NO_SYMBOL);
    Ok((at(0), at(1)))
}

// Latin-1 keysyms equal their character code.
fn latin1_keysym(c: char) -> xproto::Keysym {
    u32::from(c)
}

/// Check a handful of representative keys against the US layout the fixed
/// keystroke table assumes.
fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    let checks: [(u32, char, char); 7] = [
        (KEY_A, 'a', 'A'),
        (KEY_Q, 'q', 'Q'),
        (KEY_1, '1', '!'),
        (KEY_MINUS, '-', '_'),
        (KEY_APOSTROPHE, '\'', '"'),
        (KEY_LEFTBRACE, '[', '{'),
        (KEY_SLASH, '/', '?'),
    ];

    for (evdev, unshifted, shifted) in checks {
        let keycode = evdev_to_x11_keycode(evdev)?;
        let (got0, got1) = keysyms_for_keycode(conn, keycode)?;

        if got0 == x11rb::NO_SYMBOL || got1 == x11rb::NO_SYMBOL {
            return Err(anyhow!(
                "X11 backend could not validate the X server keymap: keycode {keycode} returned NoSymbol ({got0:#x}/{got1:#x}). This backend assumes X11 keycodes are evdev+8 and requires a US keymap."
            ));
        }

        if got0 != latin1_keysym(unshifted) || got1 != latin1_keysym(shifted) {
            return Err(anyhow!(
                "X11 backend requires a US keyboard layout, but the X server keymap does not match (keycode {keycode}: got {got0:#x}/{got1:#x}). Try `setxkbmap us`."
            ));
        }
    }

    Ok(())
}

/// Injects keys through the XTEST extension.
pub struct X11Injector {
    conn: RustConnection,
    root: xproto::Window,
}

impl X11Injector {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|screen| screen.root)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?;

        let mut injector = Self { conn, root };
        // X11 has no per-client modifier state; start from a neutral one in case
        // an earlier run was killed with Shift down.
        injector.reset_modifiers();
        Ok(injector)
    }

    fn send(&self, evdev_keycode: u32, state: KeyState) -> Result<()> {
        let keycode = evdev_to_x11_keycode(evdev_keycode)?;
        self.conn
            .xtest_fake_input(
                key_state_to_x11_event_type(state),
                keycode,
                x11rb::CURRENT_TIME,
                self.root,
                0,
                0,
                0,
            )
            .context("failed to send XTEST fake input")?;
        self.conn
            .flush()
            .context("failed to flush X11 connection")?;
        Ok(())
    }
}

impl InputInjector for X11Injector {
    fn press_key(&mut self, keycode: u32) -> Result<()> {
        self.send(keycode, KeyState::Pressed)
    }

    fn release_key(&mut self, keycode: u32) -> Result<()> {
        self.send(keycode, KeyState::Released)
    }

    fn reset_modifiers(&mut self) {
        for keycode in COMMON_MODIFIER_KEYCODES {
            if let Err(err) = self.send(keycode, KeyState::Released) {
                tracing::debug!(target: "injector.x11", keycode, error = %err, "modifier reset failed");
            }
        }
    }
}

impl Drop for X11Injector {
    fn drop(&mut self) {
        self.reset_modifiers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evdev_keycodes_are_offset_by_eight() {
        assert_eq!(evdev_to_x11_keycode(KEY_A).unwrap(), 38);
        assert!(evdev_to_x11_keycode(300).is_err());
    }
}
