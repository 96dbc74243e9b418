use std::collections::HashMap;
use std::io::Write;
use std::os::fd::{AsFd, OwnedFd};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use memfd::MemfdOptions;
use wayland_client::globals::{registry_queue_init, GlobalListContents};
use wayland_client::protocol::{wl_registry, wl_seat};
use wayland_client::{Connection, Dispatch, EventQueue, Proxy, QueueHandle};

use crate::injector::backends::COMMON_MODIFIER_KEYCODES;
use crate::injector::InputInjector;
use crate::keyboard::{KEY_LEFTSHIFT, KEY_RIGHTSHIFT};
use crate::keymap::us_qwerty_keymap;
use crate::model::KeyState;
use crate::protocols::virtual_keyboard_unstable_v1::zwp_virtual_keyboard_manager_v1::ZwpVirtualKeyboardManagerV1;
use crate::protocols::virtual_keyboard_unstable_v1::zwp_virtual_keyboard_v1::ZwpVirtualKeyboardV1;

#[derive(Debug, Clone)]
struct SeatData {
    global_name: u32,
}

#[derive(Debug, Default)]
struct State {
    seat_names_by_global: HashMap<u32, String>,
}

impl Dispatch<wl_registry::WlRegistry, GlobalListContents> for State {
    fn event(
        _state: &mut Self,
        _proxy: &wl_registry::WlRegistry,
        _event: wl_registry::Event,
        _data: &GlobalListContents,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_seat::WlSeat, SeatData> for State {
    fn event(
        state: &mut Self,
        _proxy: &wl_seat::WlSeat,
        event: wl_seat::Event,
        data: &SeatData,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        if let wl_seat::Event::Name { name } = event {
            state.seat_names_by_global.insert(data.global_name, name);
        }
    }
}

impl Dispatch<ZwpVirtualKeyboardManagerV1, ()> for State {
    fn event(
        _state: &mut Self,
        _proxy: &ZwpVirtualKeyboardManagerV1,
        _event: <ZwpVirtualKeyboardManagerV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<ZwpVirtualKeyboardV1, ()> for State {
    fn event(
        _state: &mut Self,
        _proxy: &ZwpVirtualKeyboardV1,
        _event: <ZwpVirtualKeyboardV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

fn key_state_to_u32(state: KeyState) -> u32 {
    match state {
        KeyState::Released => 0,
        KeyState::Pressed => 1,
    }
}

fn make_keymap_fd(keymap: &str) -> Result<(OwnedFd, u32)> {
    let memfd = MemfdOptions::default()
        .allow_sealing(true)
        .create("typer-xkb-keymap")
        .context("failed to create memfd for keymap")?;

    let mut file = memfd.as_file();
    file.write_all(keymap.as_bytes())?;
    file.write_all(&[0])?;

    let size = (keymap.len() + 1)
        .try_into()
        .map_err(|_| anyhow!("keymap too large"))?;

    Ok((OwnedFd::from(memfd.into_file()), size))
}

fn bind_seat(
    globals: &wayland_client::globals::GlobalList,
    event_queue: &mut EventQueue<State>,
    state: &mut State,
    seat_name: Option<&str>,
) -> Result<wl_seat::WlSeat> {
    let qh = event_queue.handle();
    let seat_globals: Vec<_> = globals
        .contents()
        .clone_list()
        .into_iter()
        .filter(|g| g.interface == wl_seat::WlSeat::interface().name)
        .collect();

    let bind = |g: &wayland_client::globals::Global| -> wl_seat::WlSeat {
        globals.registry().bind(
            g.name,
            g.version.min(7),
            &qh,
            SeatData {
                global_name: g.name,
            },
        )
    };

    let Some(requested) = seat_name else {
        let first = seat_globals
            .first()
            .ok_or_else(|| anyhow!("wl_seat not available (no seats advertised)"))?;
        return Ok(bind(first));
    };

    let seats: Vec<(u32, wl_seat::WlSeat)> =
        seat_globals.iter().map(|g| (g.name, bind(g))).collect();
    if seats.is_empty() {
        return Err(anyhow!("wl_seat not available (no seats advertised)"));
    }

    event_queue
        .roundtrip(state)
        .context("Wayland roundtrip (seat discovery) failed")?;

    if let Some(seat) = seats.iter().find_map(|(global_name, seat)| {
        state
            .seat_names_by_global
            .get(global_name)
            .filter(|n| n.as_str() == requested)
            .map(|_| seat.clone())
    }) {
        return Ok(seat);
    }

    let mut names: Vec<String> = state.seat_names_by_global.values().cloned().collect();
    names.sort();
    names.dedup();

    if names.is_empty() {
        return Err(anyhow!(
            "requested seat {requested:?}, but compositor did not advertise any wl_seat.name values (requires wl_seat v2+)"
        ));
    }

    Err(anyhow!(
        "requested seat {requested:?} not found; available seats: {}",
        names.join(", ")
    ))
}

/// Injects keys through `zwp_virtual_keyboard_v1` with an uploaded US keymap.
pub struct WaylandInjector {
    conn: Connection,
    _event_queue: EventQueue<State>,
    keyboard: ZwpVirtualKeyboardV1,
    shift_mask: u32,
    mods_depressed: u32,
    started: Instant,
}

impl WaylandInjector {
    pub fn connect(seat_name: Option<&str>) -> Result<Self> {
        let conn = Connection::connect_to_env().context("failed to connect to Wayland")?;
        let (globals, mut event_queue) =
            registry_queue_init(&conn).context("failed to init Wayland registry")?;
        let qh = event_queue.handle();
        let mut state = State::default();

        let manager: ZwpVirtualKeyboardManagerV1 = globals
            .bind(&qh, 1..=1, ())
            .context("zwp_virtual_keyboard_manager_v1 not available (is sway/wlroots exposing it?)")?;

        let seat = bind_seat(&globals, &mut event_queue, &mut state, seat_name)?;
        let keyboard = manager.create_virtual_keyboard(&seat, &qh, ());

        event_queue
            .roundtrip(&mut state)
            .context("Wayland roundtrip failed")?;

        let keymap = us_qwerty_keymap()?;
        let (keymap_fd, keymap_size) = make_keymap_fd(&keymap.keymap)?;
        keyboard.keymap(keymap.keymap_format, keymap_fd.as_fd(), keymap_size);
        conn.flush().context("Wayland flush failed")?;

        tracing::debug!(target: "injector.wayland", seat = ?seat_name, layout = %keymap.layout, "virtual keyboard ready");

        Ok(Self {
            conn,
            _event_queue: event_queue,
            keyboard,
            shift_mask: keymap.shift_mask,
            mods_depressed: 0,
            started: Instant::now(),
        })
    }

    fn time_ms(&self) -> u32 {
        self.started
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u32::MAX)
    }

    fn send(&mut self, keycode: u32, state: KeyState) -> Result<()> {
        self.keyboard
            .key(self.time_ms(), keycode, key_state_to_u32(state));

        // The compositor only applies modifiers we report explicitly.
        if keycode == KEY_LEFTSHIFT || keycode == KEY_RIGHTSHIFT {
            match state {
                KeyState::Pressed => self.mods_depressed |= self.shift_mask,
                KeyState::Released => self.mods_depressed &= !self.shift_mask,
            }
            self.keyboard.modifiers(self.mods_depressed, 0, 0, 0);
        }

        self.conn.flush().with_context(|| {
            format!("Wayland flush failed (keycode={keycode} state={state:?})")
        })
    }
}

impl InputInjector for WaylandInjector {
    fn press_key(&mut self, keycode: u32) -> Result<()> {
        self.send(keycode, KeyState::Pressed)
    }

    fn release_key(&mut self, keycode: u32) -> Result<()> {
        self.send(keycode, KeyState::Released)
    }

    fn reset_modifiers(&mut self) {
        self.mods_depressed = 0;
        self.keyboard.modifiers(0, 0, 0, 0);
        let time_ms = self.time_ms();
        for keycode in COMMON_MODIFIER_KEYCODES {
            self.keyboard
                .key(time_ms, keycode, key_state_to_u32(KeyState::Released));
        }
        if let Err(err) = self.conn.flush() {
            tracing::debug!(target: "injector.wayland", error = %err, "modifier reset flush failed");
        }
    }
}

impl Drop for WaylandInjector {
    fn drop(&mut self) {
        self.reset_modifiers();
        self.keyboard.destroy();
        let _ = self.conn.flush();
    }
}
