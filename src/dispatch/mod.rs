//! The cancellable typing loop.
//!
//! A [`Dispatcher`] owns one [`InputInjector`] and runs at most one typing
//! session at a time on a background thread. Each session walks a snapshot of
//! the text, resolves every character through [`crate::keyboard::resolve`], and
//! hands the keystroke to the injector, checking for cancellation before each
//! character:
//!
//! ```text
//! Idle -> Scheduled (start delay) -> Emitting (cursor advancing) -> Done
//!              \____________ cancel ____________/                  ^
//!                             \____________________________________/
//! ```
//!
//! Natural completion, cancellation and [`Dispatcher::stop`] all end in the
//! same teardown, which fires the stopped callback exactly once.

mod cancel;

pub use cancel::CancelToken;

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{ensure, Result};

use crate::injector::{type_stroke, InputInjector};
use crate::keyboard;
use crate::model::{RunEnd, RunReport};

const MAX_START_DELAY: Duration = Duration::from_secs(60 * 60);
const MAX_KEY_DELAY: Duration = Duration::from_secs(10);

/// What `start` does while another run is still active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivePolicy {
    /// Refuse the new run; `start` returns `None`.
    #[default]
    Reject,
    /// Cancel the active run, wait for its loop to exit, then start.
    Replace,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Wait before the first character, giving the user time to focus the target.
    pub start_delay: Duration,
    /// Pause between injected characters. Zero types back-to-back.
    pub key_delay: Duration,
    pub active_policy: ActivePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_millis(3000),
            key_delay: Duration::ZERO,
            active_policy: ActivePolicy::Reject,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.start_delay <= MAX_START_DELAY,
            "start delay must be at most {}s",
            MAX_START_DELAY.as_secs()
        );
        ensure!(
            self.key_delay <= MAX_KEY_DELAY,
            "key delay must be at most {}s",
            MAX_KEY_DELAY.as_secs()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Scheduled,
    Emitting,
    Done,
}

impl RunState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => RunState::Scheduled,
            1 => RunState::Emitting,
            _ => RunState::Done,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Scheduled => 0,
            RunState::Emitting => 1,
            RunState::Done => 2,
        }
    }
}

#[derive(Debug)]
struct RunShared {
    state: AtomicU8,
    cursor: AtomicUsize,
    report: Mutex<Option<RunReport>>,
    finished: Condvar,
}

/// Caller-side view of one run: cancel it, watch it, wait for it.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: u64,
    cancel: CancelToken,
    shared: Arc<RunShared>,
}

impl RunHandle {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancel: CancelToken::new(),
            shared: Arc::new(RunShared {
                state: AtomicU8::new(RunState::Scheduled.as_u8()),
                cursor: AtomicUsize::new(0),
                report: Mutex::new(None),
                finished: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Idempotent; a no-op once the run has finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// True only while characters are being emitted, not during the start delay.
    pub fn is_running(&self) -> bool {
        self.state() == RunState::Emitting
    }

    pub fn is_finished(&self) -> bool {
        self.report().is_some()
    }

    /// Number of characters processed so far (typed, skipped or failed).
    pub fn cursor(&self) -> usize {
        self.shared.cursor.load(Ordering::SeqCst)
    }

    pub fn report(&self) -> Option<RunReport> {
        *self
            .shared
            .report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait(&self) -> RunReport {
        let mut report = self
            .shared
            .report
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(done) = *report {
                return done;
            }
            report = self
                .shared
                .finished
                .wait(report)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<RunReport> {
        let report = self
            .shared
            .report
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (report, _) = self
            .shared
            .finished
            .wait_timeout_while(report, timeout, |r| r.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        *report
    }

    fn set_state(&self, state: RunState) {
        self.shared.state.store(state.as_u8(), Ordering::SeqCst);
    }

    fn advance_cursor(&self) {
        self.shared.cursor.fetch_add(1, Ordering::SeqCst);
    }
}

type StoppedCallback = Arc<dyn Fn(&RunReport) + Send + Sync>;

/// Immutable input of one run.
#[derive(Debug)]
struct DispatchRun {
    id: u64,
    text: String,
    start_delay: Duration,
    key_delay: Duration,
}

/// Runs the teardown on every exit path of the loop thread, panics included.
struct Teardown {
    handle: RunHandle,
    on_stopped: Option<StoppedCallback>,
    report: RunReport,
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.handle.set_state(RunState::Done);

        tracing::info!(
            target: "dispatch.run",
            run = self.handle.id,
            end = ?self.report.end,
            typed = self.report.typed,
            skipped = self.report.skipped,
            failed = self.report.failed,
            "run stopped"
        );

        if let Some(on_stopped) = &self.on_stopped {
            on_stopped(&self.report);
        }

        let mut slot = self
            .handle
            .shared
            .report
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(self.report);
        self.handle.shared.finished.notify_all();
    }
}

struct ActiveRun {
    handle: RunHandle,
    thread: JoinHandle<()>,
}

/// Owns the injector and at most one in-flight run.
pub struct Dispatcher<I> {
    injector: Arc<Mutex<I>>,
    config: DispatchConfig,
    on_stopped: Option<StoppedCallback>,
    active: Option<ActiveRun>,
    next_id: u64,
}

impl<I: InputInjector + Send + 'static> Dispatcher<I> {
    pub fn new(injector: I, config: DispatchConfig) -> Self {
        Self {
            injector: Arc::new(Mutex::new(injector)),
            config,
            on_stopped: None,
            active: None,
            next_id: 1,
        }
    }

    /// Called once per run, on the run's thread, whichever way it ended.
    ///
    /// The run is already `Done` when the callback executes, so the callback's
    /// owner may start the next run right away. [`RunHandle::wait`] returns
    /// only after the callback has finished.
    pub fn on_stopped(mut self, callback: impl Fn(&RunReport) + Send + Sync + 'static) -> Self {
        self.on_stopped = Some(Arc::new(callback));
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Start typing `text` after the configured start delay.
    pub fn start(&mut self, text: &str) -> Option<RunHandle> {
        self.start_with_delay(text, self.config.start_delay)
    }

    /// Returns `None` without side effects when `text` is blank, or when a run
    /// is active under [`ActivePolicy::Reject`].
    pub fn start_with_delay(&mut self, text: &str, start_delay: Duration) -> Option<RunHandle> {
        if text.trim().is_empty() {
            tracing::debug!(target: "dispatch", "start rejected: blank text");
            return None;
        }

        self.reap_finished();
        if let Some(active) = &self.active {
            match self.config.active_policy {
                ActivePolicy::Reject => {
                    tracing::debug!(target: "dispatch", active = active.handle.id, "start rejected: run already active");
                    return None;
                }
                ActivePolicy::Replace => {
                    tracing::debug!(target: "dispatch", active = active.handle.id, "replacing active run");
                    self.stop();
                }
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        let run = DispatchRun {
            id,
            text: text.to_owned(),
            start_delay,
            key_delay: self.config.key_delay,
        };
        let handle = RunHandle::new(id);

        let teardown = Teardown {
            handle: handle.clone(),
            on_stopped: self.on_stopped.clone(),
            report: RunReport {
                end: RunEnd::Cancelled,
                typed: 0,
                skipped: 0,
                failed: 0,
            },
        };
        let injector = Arc::clone(&self.injector);

        tracing::debug!(
            target: "dispatch",
            run = id,
            chars = run.text.chars().count(),
            start_delay_ms = u64::try_from(start_delay.as_millis()).unwrap_or(u64::MAX),
            "run scheduled"
        );

        let spawned = thread::Builder::new()
            .name(format!("typer-run-{id}"))
            .spawn(move || {
                let mut teardown = teardown;
                teardown.report = emit(&run, &injector, &teardown.handle);
            });

        match spawned {
            Ok(thread) => {
                self.active = Some(ActiveRun {
                    handle: handle.clone(),
                    thread,
                });
                Some(handle)
            }
            Err(err) => {
                tracing::error!(target: "dispatch", run = id, error = %err, "failed to spawn run thread");
                None
            }
        }
    }

    /// Cancel the active run, if any.
    pub fn cancel(&self) {
        if let Some(active) = &self.active {
            active.handle.cancel();
        }
    }

    /// Cancel the active run and wait for its teardown.
    pub fn stop(&mut self) -> Option<RunReport> {
        let active = self.active.take()?;
        active.handle.cancel();
        if active.thread.join().is_err() {
            tracing::error!(target: "dispatch", run = active.handle.id, "run thread panicked");
        }
        active.handle.report()
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.handle.is_running())
            .unwrap_or(false)
    }

    /// True when no run is scheduled or emitting. Already true while the
    /// stopped callback of the last run executes.
    pub fn is_idle(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.handle.state() == RunState::Done)
            .unwrap_or(true)
    }

    pub fn active(&self) -> Option<&RunHandle> {
        self.active.as_ref().map(|a| &a.handle)
    }

    fn reap_finished(&mut self) {
        if !self.is_idle() {
            return;
        }
        if let Some(done) = self.active.take() {
            // A stopped callback may start the next run from the run thread itself.
            if done.thread.thread().id() != thread::current().id() {
                let _ = done.thread.join();
            }
        }
    }
}

impl<I> Drop for Dispatcher<I> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.cancel();
            let _ = active.thread.join();
        }
    }
}

fn emit<I: InputInjector>(run: &DispatchRun, injector: &Mutex<I>, handle: &RunHandle) -> RunReport {
    let mut report = RunReport {
        end: RunEnd::Cancelled,
        typed: 0,
        skipped: 0,
        failed: 0,
    };

    if !handle.cancel.sleep(run.start_delay) {
        tracing::info!(target: "dispatch.run", run = run.id, "cancelled during start delay");
        return report;
    }

    let mut injector = injector.lock().unwrap_or_else(PoisonError::into_inner);
    handle.set_state(RunState::Emitting);
    tracing::info!(target: "dispatch.run", run = run.id, "typing started");

    for (cursor, c) in run.text.chars().enumerate() {
        if handle.cancel.is_cancelled() {
            tracing::info!(target: "dispatch.run", run = run.id, cursor, "cancelled");
            injector.reset_modifiers();
            return report;
        }

        let Some(stroke) = keyboard::resolve(c) else {
            tracing::trace!(target: "dispatch.run", run = run.id, cursor, ch = ?c, "no keystroke; skipped");
            report.skipped += 1;
            handle.advance_cursor();
            continue;
        };

        let emitted = report.typed + report.failed;
        if emitted > 0 && !handle.cancel.sleep(run.key_delay) {
            tracing::info!(target: "dispatch.run", run = run.id, cursor, "cancelled");
            injector.reset_modifiers();
            return report;
        }

        match type_stroke(&mut *injector, stroke) {
            Ok(()) => report.typed += 1,
            Err(err) => {
                tracing::warn!(target: "dispatch.run", run = run.id, cursor, ch = ?c, error = %format!("{err:#}"), "injection failed; continuing");
                report.failed += 1;
            }
        }
        handle.advance_cursor();
    }

    report.end = RunEnd::Completed;
    report
}
