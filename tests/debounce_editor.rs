use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use typer::debounce::Debouncer;
use typer::editor::{EditorConfig, EditorSession};
use typer::normalize::Normalization;

const LONG: Duration = Duration::from_secs(60);

fn recording_debouncer(window: Duration) -> (Debouncer<u32>, Arc<Mutex<Vec<u32>>>) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let debouncer = Debouncer::new(window, move |v| sink.lock().unwrap().push(v))
        .expect("debouncer should start");
    (debouncer, fired)
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn session(initial: &str, debounce: Duration) -> EditorSession {
    EditorSession::new(
        initial,
        EditorConfig {
            debounce,
            ..Default::default()
        },
    )
    .expect("editor should start")
}

#[test]
fn a_burst_of_touches_fires_once_with_the_last_value() {
    let (debouncer, fired) = recording_debouncer(Duration::from_millis(50));
    debouncer.touch(1);
    debouncer.touch(2);
    debouncer.touch(3);

    wait_until(|| !fired.lock().unwrap().is_empty());
    std::thread::sleep(Duration::from_millis(150));

    assert_eq!(*fired.lock().unwrap(), vec![3]);
}

#[test]
fn flush_fires_the_pending_value_synchronously() {
    let (debouncer, fired) = recording_debouncer(LONG);
    debouncer.flush();
    assert!(fired.lock().unwrap().is_empty());

    debouncer.touch(7);
    debouncer.flush();
    assert_eq!(*fired.lock().unwrap(), vec![7]);

    debouncer.flush();
    assert_eq!(*fired.lock().unwrap(), vec![7]);
}

#[test]
fn cancel_pending_discards_the_value() {
    let (debouncer, fired) = recording_debouncer(LONG);
    debouncer.touch(1);
    debouncer.cancel_pending();
    debouncer.flush();
    drop(debouncer);

    assert!(fired.lock().unwrap().is_empty());
}

#[test]
fn dropping_fires_the_pending_value() {
    let (debouncer, fired) = recording_debouncer(LONG);
    assert_eq!(debouncer.window(), LONG);
    debouncer.touch(9);
    drop(debouncer);

    assert_eq!(*fired.lock().unwrap(), vec![9]);
}

#[test]
fn edits_reach_history_once_typing_pauses() {
    let editor = {
        let mut editor = session("", Duration::from_millis(30));
        editor.edit("h");
        editor.edit("he");
        editor.edit("hey");
        editor
    };

    wait_until(|| editor.has_undo());
    assert_eq!(editor.undo_depth(), 1);
    assert_eq!(editor.text(), "hey");
}

#[test]
fn undo_commits_the_pending_edit_first() {
    let mut editor = session("", LONG);
    editor.edit("hello");
    assert!(!editor.has_undo());

    assert!(editor.undo());
    assert_eq!(editor.text(), "");
    assert!(editor.redo());
    assert_eq!(editor.text(), "hello");
    assert!(!editor.redo());
}

#[test]
fn transforms_are_recorded_immediately() {
    let mut editor = session("  x  \n\n", LONG);

    assert!(editor.apply(Normalization::TrimLines));
    assert_eq!(editor.text(), "x\n\n");
    assert_eq!(editor.undo_depth(), 1);

    assert!(!editor.apply(Normalization::TrimLines));
    assert_eq!(editor.undo_depth(), 1);

    assert!(editor.undo());
    assert_eq!(editor.text(), "  x  \n\n");
    assert!(editor.has_redo());
}

#[test]
fn edit_then_transform_keeps_both_steps() {
    let mut editor = session("", LONG);
    editor.edit("a    b");
    assert!(editor.apply(Normalization::CollapseSpaces));
    assert_eq!(editor.text(), "a b");
    assert_eq!(editor.undo_depth(), 2);

    editor.undo();
    assert_eq!(editor.text(), "a    b");
    editor.undo();
    assert_eq!(editor.text(), "");
    assert!(!editor.undo());
}

#[test]
fn zero_history_capacity_is_rejected() {
    let err = EditorSession::new(
        "",
        EditorConfig {
            history_capacity: 0,
            ..Default::default()
        },
    )
    .err()
    .expect("capacity 0 should be rejected");
    assert!(err.to_string().contains("history_capacity"));
}
