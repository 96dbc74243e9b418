//! The boundary between the dispatch loop and the host's input system.
//!
//! An [`InputInjector`] turns evdev keycodes into synthetic key presses and
//! releases. The host backends live in [`backends`]; [`RecordingInjector`]
//! captures events in memory for dry runs and tests.

pub mod backends;

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Context, Result};

use crate::keyboard::{KeyStroke, KEY_LEFTSHIFT};
use crate::model::{KeyEvent, KeyState};

/// Synchronous, per-call fallible access to the host keyboard.
///
/// Implementations make no concurrency promises; callers serialize access.
pub trait InputInjector {
    fn press_key(&mut self, keycode: u32) -> Result<()>;

    fn release_key(&mut self, keycode: u32) -> Result<()>;

    /// Release any modifier that might still be held. Best effort.
    fn reset_modifiers(&mut self) {}
}

impl<T: InputInjector + ?Sized> InputInjector for Box<T> {
    fn press_key(&mut self, keycode: u32) -> Result<()> {
        (**self).press_key(keycode)
    }

    fn release_key(&mut self, keycode: u32) -> Result<()> {
        (**self).release_key(keycode)
    }

    fn reset_modifiers(&mut self) {
        (**self).reset_modifiers()
    }
}

/// Type one keystroke: `shift down, key down, key up, shift up` when shifted,
/// `key down, key up` otherwise.
///
/// Once Shift went down it is always released, even if the key itself failed.
pub fn type_stroke<I: InputInjector + ?Sized>(injector: &mut I, stroke: KeyStroke) -> Result<()> {
    if !stroke.shift {
        return tap(injector, stroke.keycode);
    }

    injector
        .press_key(KEY_LEFTSHIFT)
        .context("failed to press shift")?;
    let tapped = tap(injector, stroke.keycode);
    let released = injector
        .release_key(KEY_LEFTSHIFT)
        .context("failed to release shift");
    tapped.and(released)
}

fn tap<I: InputInjector + ?Sized>(injector: &mut I, keycode: u32) -> Result<()> {
    injector
        .press_key(keycode)
        .with_context(|| format!("failed to press keycode {keycode}"))?;
    injector
        .release_key(keycode)
        .with_context(|| format!("failed to release keycode {keycode}"))
}

/// Records every event instead of touching the host.
///
/// Clones share the same log, so a clone kept by the caller observes what the
/// dispatcher's copy recorded.
#[derive(Debug, Clone, Default)]
pub struct RecordingInjector {
    events: Arc<Mutex<Vec<KeyEvent>>>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<KeyEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn presses(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter(|e| e.state == KeyState::Pressed)
            .map(|e| e.keycode)
            .collect()
    }

    fn record(&self, event: KeyEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl InputInjector for RecordingInjector {
    fn press_key(&mut self, keycode: u32) -> Result<()> {
        self.record(KeyEvent::pressed(keycode));
        Ok(())
    }

    fn release_key(&mut self, keycode: u32) -> Result<()> {
        self.record(KeyEvent::released(keycode));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectorBackend {
    Auto,
    Wayland,
    X11,
}

impl InjectorBackend {
    fn name(self) -> &'static str {
        match self {
            InjectorBackend::Auto => "auto",
            InjectorBackend::Wayland => "Wayland",
            InjectorBackend::X11 => "X11",
        }
    }

    fn feature(self) -> Option<&'static str> {
        match self {
            InjectorBackend::Auto => None,
            InjectorBackend::Wayland => Some("wayland"),
            InjectorBackend::X11 => Some("x11"),
        }
    }

    fn is_compiled(self) -> bool {
        match self {
            InjectorBackend::Auto => false,
            InjectorBackend::Wayland => cfg!(feature = "wayland"),
            InjectorBackend::X11 => cfg!(feature = "x11"),
        }
    }
}

/// The display session this process runs in, as told by its environment.
#[derive(Debug, Clone)]
struct Session {
    wayland: bool,
    x11: bool,
    session_type: Option<String>,
}

impl Session {
    fn detect() -> Self {
        let set = |name: &str| std::env::var_os(name).is_some_and(|v| !v.is_empty());
        Self {
            wayland: set("WAYLAND_DISPLAY") || set("WAYLAND_SOCKET"),
            x11: set("DISPLAY"),
            session_type: std::env::var("XDG_SESSION_TYPE")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }

    /// Wayland sessions usually export DISPLAY for Xwayland too, and XTEST
    /// there only reaches X clients, so Wayland wins unless it is compiled out.
    fn pick(&self) -> Option<InjectorBackend> {
        match (self.wayland, self.x11) {
            (true, true) if !InjectorBackend::Wayland.is_compiled() => Some(InjectorBackend::X11),
            (true, _) => Some(InjectorBackend::Wayland),
            (false, true) => Some(InjectorBackend::X11),
            (false, false) => None,
        }
    }

    fn describe(&self) -> String {
        let kind = self
            .session_type
            .as_deref()
            .map(|kind| format!(" XDG_SESSION_TYPE={kind}."))
            .unwrap_or_default();

        let mut found = Vec::new();
        if self.wayland {
            found.push("Wayland display set");
        }
        if self.x11 {
            found.push("DISPLAY is set");
        }

        if found.is_empty() {
            format!("No display session detected (expected WAYLAND_DISPLAY, WAYLAND_SOCKET or DISPLAY).{kind}")
        } else {
            format!("Detected environment: {}.{kind}", found.join(", "))
        }
    }
}

/// Turn `Auto` into a concrete backend and check it is compiled in.
pub fn resolve_backend(requested: InjectorBackend) -> Result<InjectorBackend> {
    let session = Session::detect();

    let resolved = match requested {
        InjectorBackend::Auto => session.pick().ok_or_else(|| {
            let forced: Vec<String> = [InjectorBackend::Wayland, InjectorBackend::X11]
                .into_iter()
                .filter(|b| b.is_compiled())
                .map(|b| format!("--backend {}", b.name().to_lowercase()))
                .collect();
            let hint = if forced.is_empty() {
                "This build has no injection backends enabled.".to_string()
            } else {
                format!("Try forcing a backend: {}", forced.join(" or "))
            };
            anyhow!(
                "No supported injection backend detected. {}\n{hint}",
                session.describe()
            )
        })?,
        other => other,
    };

    if !resolved.is_compiled() {
        let how = if requested == InjectorBackend::Auto {
            "detected"
        } else {
            "requested"
        };
        return Err(anyhow!(
            "{} backend {how} but it is disabled in this build (rebuild with `--features {}`). {}",
            resolved.name(),
            resolved.feature().unwrap_or_default(),
            session.describe()
        ));
    }

    tracing::debug!(target: "injector", ?requested, ?resolved, "backend resolved");
    Ok(resolved)
}

/// Resolve the backend and check the `--seat` request against it.
pub fn preflight_backend(
    requested: InjectorBackend,
    seat_name: Option<&str>,
) -> Result<InjectorBackend> {
    if seat_name.is_some_and(|name| name.trim().is_empty()) {
        return Err(anyhow!("--seat must not be empty"));
    }

    let resolved = resolve_backend(requested)?;
    if seat_name.is_some() && resolved != InjectorBackend::Wayland {
        return Err(anyhow!(
            "--seat is Wayland-only and is not supported on {}",
            resolved.name()
        ));
    }

    Ok(resolved)
}

/// Connect to the host and return a ready injector for `requested`.
pub fn open_injector(
    requested: InjectorBackend,
    seat_name: Option<&str>,
) -> Result<Box<dyn InputInjector + Send>> {
    let backend = preflight_backend(requested, seat_name)?;
    tracing::debug!(target: "injector", ?backend, seat = ?seat_name, "opening injector");

    match backend {
        InjectorBackend::Wayland => {
            #[cfg(feature = "wayland")]
            {
                let injector = backends::wayland::WaylandInjector::connect(seat_name)?;
                Ok(Box::new(injector))
            }

            #[cfg(not(feature = "wayland"))]
            {
                Err(anyhow!("Wayland backend is not compiled in"))
            }
        }
        InjectorBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                let injector = backends::x11::X11Injector::connect()?;
                Ok(Box::new(injector))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!("X11 backend is not compiled in"))
            }
        }
        InjectorBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}
