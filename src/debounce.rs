//! Timer-reset debouncing on a worker thread.
//!
//! Every [`Debouncer::touch`] restarts the countdown; the callback only sees
//! the latest value, once the window passes with no further touch.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

/// Idle window the editor waits before recording an edit burst in history.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

enum Msg<T> {
    Touch(T),
    Flush(Sender<()>),
    Cancel,
}

pub struct Debouncer<T: Send + 'static> {
    tx: Option<Sender<Msg<T>>>,
    worker: Option<JoinHandle<()>>,
    window: Duration,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(window: Duration, on_fire: impl FnMut(T) + Send + 'static) -> Result<Self> {
        let (tx, rx) = unbounded();
        let worker = thread::Builder::new()
            .name("typer-debounce".to_string())
            .spawn(move || run_worker(rx, window, on_fire))
            .context("failed to spawn debounce worker")?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            window,
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Replace the pending value and restart the countdown.
    pub fn touch(&self, value: T) {
        self.send(Msg::Touch(value));
    }

    /// Fire the pending value now, if any, and return once the callback ran.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.send(Msg::Flush(ack_tx)) {
            let _ = ack_rx.recv();
        }
    }

    /// Drop the pending value without firing it.
    pub fn cancel_pending(&self) {
        self.send(Msg::Cancel);
    }

    fn send(&self, msg: Msg<T>) -> bool {
        match &self.tx {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    /// A pending value still fires before the worker exits.
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(target: "debounce", "debounce callback panicked");
            }
        }
    }
}

fn run_worker<T>(rx: Receiver<Msg<T>>, window: Duration, mut on_fire: impl FnMut(T)) {
    let mut pending: Option<T> = None;

    loop {
        let msg = if pending.is_some() {
            match rx.recv_timeout(window) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(value) = pending.take() {
                        on_fire(value);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            }
        };

        match msg {
            Msg::Touch(value) => pending = Some(value),
            Msg::Flush(ack) => {
                if let Some(value) = pending.take() {
                    on_fire(value);
                }
                let _ = ack.send(());
            }
            Msg::Cancel => pending = None,
        }
    }

    if let Some(value) = pending.take() {
        on_fire(value);
    }
}
