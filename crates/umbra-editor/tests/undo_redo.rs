//! Integration tests: transactions, undo and redo across the element graph
//! and the canvas.

use pretty_assertions::assert_eq;
use umbra_core::ElementType;
use umbra_core::geometry::Point;
use umbra_editor::{ItemKind, Session, SessionConfig};

fn init() -> (Session, umbra_core::ElementId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = Session::default();
    let diagram = s.create_diagram().unwrap();
    s.clear_undo_stack();
    (s, diagram)
}

// ─── Constraint-count scenario ──────────────────────────────────────────

#[test]
fn unlinking_a_connected_box_cycles_through_undo_and_redo() {
    let (mut s, diagram) = init();
    assert_eq!(s.constraint_count(diagram).unwrap(), 0);

    let left = s.create_item(diagram, ItemKind::Element, None).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), 6);
    let right = s
        .create_item_at(diagram, ItemKind::Element, None, Point::new(200.0, 0.0))
        .unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), 12);

    let line = s.create_item(diagram, ItemKind::Line, None).unwrap();
    let (head, tail) = {
        let handles = s.handles(line).unwrap();
        (handles[0].id, handles[1].id)
    };
    s.connect(line, head, left, None).unwrap();
    s.connect(line, tail, right, None).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), 14);
    assert_eq!(s.handle_position(line, tail).unwrap(), Point::new(200.0, 0.0));

    s.transaction(|s| s.unlink(right)).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), 7);
    assert_eq!(s.connected_item(line, tail), None);
    assert_eq!(s.connected_item(line, head), Some(left));

    for _ in 0..3 {
        assert!(s.undo_transaction().unwrap());
        assert_eq!(s.constraint_count(diagram).unwrap(), 14);
        assert_eq!(s.connected_item(line, tail), Some(right));
        assert_eq!(s.connected_item(line, head), Some(left));
        assert_eq!(s.items(diagram).unwrap().len(), 3);

        assert!(s.redo_transaction().unwrap());
        assert_eq!(s.constraint_count(diagram).unwrap(), 7);
        assert_eq!(s.connected_item(line, tail), None);
        assert!(!s.contains(right));
    }
}

// ─── Presentations stay out of the registry ─────────────────────────────

#[test]
fn created_item_never_enters_the_registry() {
    let (mut s, diagram) = init();
    let class = s.create(ElementType::new("Class")).unwrap();

    let item = s
        .transaction(|s| s.create_item(diagram, ItemKind::Element, Some(class)))
        .unwrap();
    assert!(s.contains(item));
    assert!(!s.lselect().contains(&item));

    s.undo_transaction().unwrap();
    assert!(!s.contains(item));
    assert!(!s.lselect().contains(&item));
    assert!(s.values(class, "presentation").is_empty());

    s.redo_transaction().unwrap();
    assert!(s.contains(item));
    assert!(!s.lselect().contains(&item));
    assert_eq!(s.subject(item), Some(class));
    assert_eq!(s.lselect(), vec![diagram, class]);
}

#[test]
fn deleted_item_never_enters_the_registry() {
    let (mut s, diagram) = init();
    let class = s.create(ElementType::new("Class")).unwrap();
    let item = s.create_item(diagram, ItemKind::Fork, Some(class)).unwrap();

    s.transaction(|s| s.unlink(item)).unwrap();
    assert!(s.contains(class), "unlinking an item keeps its subject");
    assert!(!s.lselect().contains(&item));

    s.undo_transaction().unwrap();
    assert_eq!(s.subject(item), Some(class));
    assert!(!s.lselect().contains(&item));

    s.redo_transaction().unwrap();
    assert!(!s.contains(item));
    assert!(!s.lselect().contains(&item));
}

#[test]
fn unlinking_a_subject_unlinks_its_presentations() {
    let (mut s, diagram) = init();
    let class = s.create(ElementType::new("Class")).unwrap();
    let a = s.create_item(diagram, ItemKind::Element, Some(class)).unwrap();
    let b = s.create_item(diagram, ItemKind::Element, Some(class)).unwrap();

    s.unlink(class).unwrap();
    assert!(!s.contains(a));
    assert!(!s.contains(b));
    assert_eq!(s.constraint_count(diagram).unwrap(), 0);

    s.undo_transaction().unwrap();
    assert_eq!(s.values(class, "presentation"), &[a, b]);
    assert_eq!(s.constraint_count(diagram).unwrap(), 12);
}

// ─── Stack behaviour ────────────────────────────────────────────────────

#[test]
fn empty_stacks_are_a_no_op() {
    let (mut s, _) = init();
    assert!(!s.can_undo());
    assert!(!s.can_redo());
    assert_eq!(s.undo_transaction(), Ok(false));
    assert_eq!(s.redo_transaction(), Ok(false));
}

#[test]
fn undo_depth_is_limited() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = Session::new(
        Default::default(),
        SessionConfig {
            max_undo_depth: 3,
            ..SessionConfig::default()
        },
    );
    for _ in 0..5 {
        s.create(ElementType::new("Class")).unwrap();
    }
    for _ in 0..3 {
        assert!(s.undo_transaction().unwrap());
    }
    assert!(!s.can_undo());
    assert_eq!(s.lselect().len(), 2);
}

#[test]
fn new_commit_clears_redo() {
    let (mut s, _) = init();
    s.create(ElementType::new("Class")).unwrap();
    s.undo_transaction().unwrap();
    assert!(s.can_redo());

    s.create(ElementType::new("Class")).unwrap();
    assert!(!s.can_redo());
}

#[test]
fn clear_undo_stack_discards_history_without_replay() {
    let (mut s, _) = init();
    let class = s.create(ElementType::new("Class")).unwrap();
    s.clear_undo_stack();
    assert!(!s.can_undo());
    assert!(s.contains(class));
}
