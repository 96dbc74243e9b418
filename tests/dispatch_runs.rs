use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use pretty_assertions::assert_eq;

use typer::dispatch::{ActivePolicy, DispatchConfig, Dispatcher, RunHandle, RunState};
use typer::injector::{InputInjector, RecordingInjector};
use typer::keyboard::{KEY_1, KEY_A, KEY_B, KEY_C, KEY_D, KEY_LEFTSHIFT};
use typer::model::{KeyEvent, RunEnd, RunReport};

const WAIT: Duration = Duration::from_secs(5);

fn instant_config() -> DispatchConfig {
    DispatchConfig {
        start_delay: Duration::ZERO,
        key_delay: Duration::ZERO,
        ..Default::default()
    }
}

fn wait_for(handle: &RunHandle) -> RunReport {
    handle
        .wait_timeout(WAIT)
        .expect("run should finish within the test timeout")
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Pauses after every non-shift key release until the test lets it continue.
struct GatedInjector {
    inner: RecordingInjector,
    released: Sender<u32>,
    resume: Receiver<()>,
    resets: Arc<AtomicUsize>,
}

impl InputInjector for GatedInjector {
    fn press_key(&mut self, keycode: u32) -> Result<()> {
        self.inner.press_key(keycode)
    }

    fn release_key(&mut self, keycode: u32) -> Result<()> {
        self.inner.release_key(keycode)?;
        if keycode != KEY_LEFTSHIFT {
            let _ = self.released.send(keycode);
            let _ = self.resume.recv();
        }
        Ok(())
    }

    fn reset_modifiers(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

struct FailingKey {
    inner: RecordingInjector,
    fail: u32,
}

impl InputInjector for FailingKey {
    fn press_key(&mut self, keycode: u32) -> Result<()> {
        if keycode == self.fail {
            return Err(anyhow!("host refused keycode {keycode}"));
        }
        self.inner.press_key(keycode)
    }

    fn release_key(&mut self, keycode: u32) -> Result<()> {
        self.inner.release_key(keycode)
    }
}

#[test]
fn blank_text_is_rejected_without_touching_the_injector() {
    let recorder = RecordingInjector::new();
    let stopped = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stopped);
    let mut dispatcher = Dispatcher::new(recorder.clone(), instant_config())
        .on_stopped(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    assert!(dispatcher.start("").is_none());
    assert!(dispatcher.start("   \n\t ").is_none());

    assert!(dispatcher.is_idle());
    assert!(!dispatcher.is_running());
    assert!(recorder.events().is_empty());
    assert_eq!(stopped.load(Ordering::SeqCst), 0);
}

#[test]
fn mixed_case_and_symbols_emit_exact_event_sequence() {
    let recorder = RecordingInjector::new();
    let mut dispatcher = Dispatcher::new(recorder.clone(), instant_config());

    let handle = dispatcher.start("Ab!").expect("run should start");
    let report = wait_for(&handle);

    assert_eq!(
        report,
        RunReport {
            end: RunEnd::Completed,
            typed: 3,
            skipped: 0,
            failed: 0,
        }
    );
    assert_eq!(
        recorder.events(),
        vec![
            KeyEvent::pressed(KEY_LEFTSHIFT),
            KeyEvent::pressed(KEY_A),
            KeyEvent::released(KEY_A),
            KeyEvent::released(KEY_LEFTSHIFT),
            KeyEvent::pressed(KEY_B),
            KeyEvent::released(KEY_B),
            KeyEvent::pressed(KEY_LEFTSHIFT),
            KeyEvent::pressed(KEY_1),
            KeyEvent::released(KEY_1),
            KeyEvent::released(KEY_LEFTSHIFT),
        ]
    );
    assert_eq!(handle.state(), RunState::Done);
    assert_eq!(handle.cursor(), 3);
}

#[test]
fn cancel_mid_run_stops_before_the_next_character() {
    let recorder = RecordingInjector::new();
    let (released_tx, released_rx) = unbounded();
    let (resume_tx, resume_rx) = unbounded();
    let resets = Arc::new(AtomicUsize::new(0));
    let injector = GatedInjector {
        inner: recorder.clone(),
        released: released_tx,
        resume: resume_rx,
        resets: Arc::clone(&resets),
    };
    let stopped = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&stopped);
    let mut dispatcher = Dispatcher::new(injector, instant_config()).on_stopped(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = dispatcher.start("abcdef").expect("run should start");

    let mut seen = Vec::new();
    for i in 0..3 {
        seen.push(released_rx.recv_timeout(WAIT).expect("key release"));
        assert!(handle.is_running());
        if i == 2 {
            handle.cancel();
        }
        resume_tx.send(()).expect("resume");
    }

    let report = wait_for(&handle);
    assert_eq!(seen, vec![KEY_A, KEY_B, KEY_C]);
    assert_eq!(report.end, RunEnd::Cancelled);
    assert_eq!(report.typed, 3);
    assert_eq!(recorder.presses(), vec![KEY_A, KEY_B, KEY_C]);
    assert!(!recorder.presses().contains(&KEY_D));
    assert_eq!(resets.load(Ordering::SeqCst), 1);
    assert!(!handle.is_running());
    assert_eq!(stopped.load(Ordering::SeqCst), 1);

    handle.cancel();
    drop(dispatcher);
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn stopped_callback_fires_exactly_once_per_run() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let mut dispatcher = Dispatcher::new(RecordingInjector::new(), instant_config())
        .on_stopped(move |report| sink.lock().unwrap().push(*report));

    let done = dispatcher.start("hi").expect("run should start");
    wait_for(&done);

    let cancelled = dispatcher
        .start_with_delay("later", Duration::from_secs(60))
        .expect("run should start");
    cancelled.cancel();
    cancelled.cancel();
    wait_for(&cancelled);
    drop(dispatcher);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].end, RunEnd::Completed);
    assert_eq!(reports[0].typed, 2);
    assert_eq!(reports[1].end, RunEnd::Cancelled);
    assert_eq!(reports[1].typed, 0);
}

#[test]
fn cancel_during_start_delay_types_nothing() {
    let recorder = RecordingInjector::new();
    let mut dispatcher = Dispatcher::new(
        recorder.clone(),
        DispatchConfig {
            start_delay: Duration::from_secs(60),
            ..instant_config()
        },
    );

    let started = Instant::now();
    let handle = dispatcher.start("never typed").expect("run should start");
    assert_eq!(handle.state(), RunState::Scheduled);
    assert!(!handle.is_running());
    assert!(!dispatcher.is_idle());

    handle.cancel();
    let report = wait_for(&handle);

    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(report.is_cancelled());
    assert_eq!(report.typed, 0);
    assert_eq!(handle.cursor(), 0);
    assert!(recorder.events().is_empty());
}

#[test]
fn injection_failures_are_counted_and_the_run_continues() {
    let recorder = RecordingInjector::new();
    let injector = FailingKey {
        inner: recorder.clone(),
        fail: KEY_B,
    };
    let mut dispatcher = Dispatcher::new(injector, instant_config());

    let handle = dispatcher.start("abc").expect("run should start");
    let report = wait_for(&handle);

    assert_eq!(
        report,
        RunReport {
            end: RunEnd::Completed,
            typed: 2,
            skipped: 0,
            failed: 1,
        }
    );
    assert_eq!(recorder.presses(), vec![KEY_A, KEY_C]);
}

#[test]
fn unmapped_characters_are_skipped() {
    let recorder = RecordingInjector::new();
    let mut dispatcher = Dispatcher::new(recorder.clone(), instant_config());

    let handle = dispatcher.start("a\u{20ac}b\r").expect("run should start");
    let report = wait_for(&handle);

    assert_eq!(report.end, RunEnd::Completed);
    assert_eq!(report.typed, 2);
    assert_eq!(report.skipped, 2);
    assert_eq!(handle.cursor(), 4);
    assert_eq!(recorder.presses(), vec![KEY_A, KEY_B]);
}

#[test]
fn reject_policy_refuses_a_second_start_while_active() {
    let recorder = RecordingInjector::new();
    let mut dispatcher = Dispatcher::new(
        recorder.clone(),
        DispatchConfig {
            start_delay: Duration::from_secs(60),
            active_policy: ActivePolicy::Reject,
            ..instant_config()
        },
    );

    let first = dispatcher.start("first").expect("run should start");
    assert!(dispatcher.start("second").is_none());
    assert_eq!(dispatcher.active().map(RunHandle::id), Some(first.id()));

    let report = dispatcher.stop().expect("active run report");
    assert!(report.is_cancelled());
    assert!(dispatcher.is_idle());
    assert!(recorder.events().is_empty());
}

#[test]
fn replace_policy_cancels_the_active_run_first() {
    let recorder = RecordingInjector::new();
    let observer = recorder.clone();
    // (run end, key events already emitted when the callback fired)
    let stops = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stops);
    let mut dispatcher = Dispatcher::new(
        recorder.clone(),
        DispatchConfig {
            active_policy: ActivePolicy::Replace,
            ..instant_config()
        },
    )
    .on_stopped(move |report| {
        sink.lock()
            .unwrap()
            .push((report.end, observer.events().len()));
    });

    let first = dispatcher
        .start_with_delay("old", Duration::from_secs(60))
        .expect("run should start");
    let second = dispatcher
        .start_with_delay("b", Duration::ZERO)
        .expect("replacement should start");

    assert!(first.is_finished());
    assert!(first.report().expect("report").is_cancelled());
    assert_eq!(*stops.lock().unwrap(), vec![(RunEnd::Cancelled, 0)]);

    let report = wait_for(&second);
    assert_eq!(report.end, RunEnd::Completed);
    assert_eq!(recorder.presses(), vec![KEY_B]);
    drop(dispatcher);

    assert_eq!(
        *stops.lock().unwrap(),
        vec![(RunEnd::Cancelled, 0), (RunEnd::Completed, 2)]
    );
}

#[test]
fn a_new_run_can_start_as_soon_as_the_stopped_callback_fires() {
    let recorder = RecordingInjector::new();
    let (stopped_tx, stopped_rx) = unbounded();
    let mut dispatcher = Dispatcher::new(recorder.clone(), instant_config()).on_stopped(
        move |report| {
            let _ = stopped_tx.send(*report);
            // Keep the run thread inside its callback while the next run starts.
            std::thread::sleep(Duration::from_millis(100));
        },
    );

    let first = dispatcher.start("a").expect("run should start");
    let stopped = stopped_rx.recv_timeout(WAIT).expect("stopped notification");
    assert_eq!(stopped.end, RunEnd::Completed);

    assert!(dispatcher.is_idle());
    let second = dispatcher
        .start("b")
        .expect("start after the stopped notification should be accepted");
    assert_ne!(first.id(), second.id());

    assert_eq!(wait_for(&second).end, RunEnd::Completed);
    assert_eq!(recorder.presses(), vec![KEY_A, KEY_B]);
}

#[test]
fn key_delay_pause_is_interruptible() {
    let recorder = RecordingInjector::new();
    let mut dispatcher = Dispatcher::new(
        recorder.clone(),
        DispatchConfig {
            key_delay: Duration::from_secs(10),
            ..instant_config()
        },
    );

    let started = Instant::now();
    let handle = dispatcher.start("ab").expect("run should start");
    wait_until(|| handle.cursor() == 1);

    handle.cancel();
    let report = wait_for(&handle);

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.is_cancelled());
    assert_eq!(report.typed, 1);
    assert_eq!(recorder.presses(), vec![KEY_A]);
}

#[test]
fn dropping_the_dispatcher_cancels_the_active_run() {
    let recorder = RecordingInjector::new();
    let mut dispatcher = Dispatcher::new(recorder.clone(), instant_config());

    let handle = dispatcher
        .start_with_delay("abc", Duration::from_secs(60))
        .expect("run should start");
    drop(dispatcher);

    assert!(handle.report().expect("report after drop").is_cancelled());
    assert!(recorder.events().is_empty());
}
