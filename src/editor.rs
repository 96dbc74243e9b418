//! The text buffer the user prepares before typing it out.
//!
//! Keystroke-level edits go through a [`Debouncer`] so a burst of typing
//! becomes a single history entry; toolbar transforms and undo/redo act
//! immediately. Both flush any pending edit first, so the debounced snapshot
//! can never land on top of a later undo.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{ensure, Result};

use crate::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use crate::history::{TextHistory, DEFAULT_HISTORY_CAPACITY};
use crate::normalize::{Normalization, DEFAULT_TAB_SIZE};

#[derive(Debug, Clone)]
pub struct EditorConfig {
    pub history_capacity: usize,
    pub debounce: Duration,
    pub tab_size: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            debounce: DEFAULT_DEBOUNCE,
            tab_size: DEFAULT_TAB_SIZE,
        }
    }
}

impl EditorConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.history_capacity > 0, "history_capacity must be > 0");
        ensure!(self.tab_size <= 16, "tab_size must be <= 16");
        Ok(())
    }
}

pub struct EditorSession {
    text: String,
    history: Arc<Mutex<TextHistory>>,
    debouncer: Debouncer<String>,
    tab_size: usize,
}

impl EditorSession {
    pub fn new(initial: impl Into<String>, config: EditorConfig) -> Result<Self> {
        config.validate()?;

        let text = initial.into();
        let history = Arc::new(Mutex::new(TextHistory::with_capacity(
            text.clone(),
            config.history_capacity,
        )));

        let sink = Arc::clone(&history);
        let debouncer = Debouncer::new(config.debounce, move |snapshot: String| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(snapshot);
        })?;

        Ok(Self {
            text,
            history,
            debouncer,
            tab_size: config.tab_size,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the buffer after a user edit; history catches up once typing pauses.
    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.debouncer.touch(self.text.clone());
    }

    /// Record any pending edit in history now.
    pub fn commit(&self) {
        self.debouncer.flush();
    }

    /// Run a toolbar transform. Returns whether the text changed.
    pub fn apply(&mut self, op: Normalization) -> bool {
        self.commit();
        let cleaned = op.apply_with(&self.text, self.tab_size);
        if cleaned == self.text {
            return false;
        }
        tracing::debug!(target: "editor", ?op, before = self.text.len(), after = cleaned.len(), "transform applied");
        self.text = cleaned;
        self.history().push(self.text.clone());
        true
    }

    pub fn undo(&mut self) -> bool {
        self.commit();
        let restored = self.history().undo();
        self.restore(restored)
    }

    pub fn redo(&mut self) -> bool {
        self.commit();
        let restored = self.history().redo();
        self.restore(restored)
    }

    pub fn has_undo(&self) -> bool {
        self.history().has_undo()
    }

    pub fn has_redo(&self) -> bool {
        self.history().has_redo()
    }

    pub fn undo_depth(&self) -> usize {
        self.history().undo_depth()
    }

    fn restore(&mut self, snapshot: Option<String>) -> bool {
        match snapshot {
            Some(text) => {
                self.text = text;
                true
            }
            None => false,
        }
    }

    fn history(&self) -> MutexGuard<'_, TextHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
