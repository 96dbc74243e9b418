use pretty_assertions::assert_eq;

use typer::history::{BoundedStack, TextHistory};

#[test]
fn capacity_two_keeps_only_the_newest_snapshots() {
    let mut history = TextHistory::with_capacity("", 2);
    for snapshot in ["A", "B", "C", "D"] {
        history.push(snapshot);
    }
    assert_eq!(history.current(), "D");
    assert_eq!(history.undo_depth(), 2);

    assert_eq!(history.undo().as_deref(), Some("C"));
    assert_eq!(history.undo().as_deref(), Some("B"));
    assert_eq!(history.undo(), None);
    assert_eq!(history.current(), "B");
}

#[test]
fn undo_on_empty_history_changes_nothing() {
    let mut history = TextHistory::new("start");

    assert!(!history.has_undo());
    assert_eq!(history.undo(), None);
    assert_eq!(history.redo(), None);
    assert_eq!(history.current(), "start");
}

#[test]
fn undo_then_redo_restores_the_same_text() {
    let mut history = TextHistory::new("");
    history.push("one");
    history.push("two");

    assert_eq!(history.undo().as_deref(), Some("one"));
    assert!(history.has_redo());
    assert_eq!(history.redo().as_deref(), Some("two"));
    assert!(!history.has_redo());
    assert_eq!(history.undo_depth(), 2);
}

#[test]
fn push_after_undo_clears_redo() {
    let mut history = TextHistory::new("");
    history.push("one");
    history.push("two");
    history.undo();
    assert_eq!(history.redo_depth(), 1);

    history.push("branch");

    assert_eq!(history.redo_depth(), 0);
    assert_eq!(history.redo(), None);
    assert_eq!(history.undo().as_deref(), Some("one"));
}

#[test]
fn pushing_the_current_text_is_a_no_op() {
    let mut history = TextHistory::new("same");
    history.push("same");
    assert!(!history.has_undo());

    history.push("other");
    history.undo();
    history.push("same");
    // Equal to current, so the redo entry survives.
    assert_eq!(history.redo_depth(), 1);
}

#[test]
fn bounded_stack_evicts_from_the_bottom() {
    let mut stack = BoundedStack::new(3);
    assert_eq!(stack.push(1), None);
    assert_eq!(stack.push(2), None);
    assert_eq!(stack.push(3), None);
    assert_eq!(stack.push(4), Some(1));

    assert_eq!(stack.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    assert_eq!(stack.peek(), Some(&4));
    assert_eq!(stack.pop(), Some(4));
    assert_eq!(stack.len(), 2);
}

#[test]
fn bounded_stack_capacity_is_at_least_one() {
    let mut stack = BoundedStack::new(0);
    assert_eq!(stack.capacity(), 1);
    stack.push("a");
    assert_eq!(stack.push("b"), Some("a"));
    assert_eq!(stack.len(), 1);

    stack.clear();
    assert!(stack.is_empty());
}
