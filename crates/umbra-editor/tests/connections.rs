//! Integration tests: connecting line ends to item ports.

use pretty_assertions::assert_eq;
use umbra_canvas::{CanvasError, HandleId};
use umbra_core::ElementId;
use umbra_core::geometry::{Point, Vec2};
use umbra_editor::{EditorError, ItemKind, Session};

struct Fixture {
    s: Session,
    diagram: ElementId,
    boxed: ElementId,
    line: ElementId,
    head: HandleId,
    tail: HandleId,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = Session::default();
    let diagram = s.create_diagram().unwrap();
    let boxed = s
        .create_item_at(diagram, ItemKind::Element, None, Point::new(100.0, 100.0))
        .unwrap();
    let line = s.create_item(diagram, ItemKind::Line, None).unwrap();
    let handles = s.handles(line).unwrap();
    let (head, tail) = (handles[0].id, handles[1].id);
    Fixture {
        s,
        diagram,
        boxed,
        line,
        head,
        tail,
    }
}

#[test]
fn connect_then_disconnect_restores_the_constraint_count() {
    let Fixture {
        mut s,
        diagram,
        boxed,
        line,
        tail,
        ..
    } = fixture();
    let before = s.constraint_count(diagram).unwrap();

    let connection = s.connect(line, tail, boxed, None).unwrap();
    assert_eq!(connection.port, 0, "first port is picked");
    assert_eq!(s.constraint_count(diagram).unwrap(), before + 1);
    let glued = s.handle_position(line, tail).unwrap();
    assert_eq!(glued, Point::new(100.0, 100.0));

    s.disconnect(line, tail).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), before);
    assert_eq!(s.handle_position(line, tail).unwrap(), glued);
    assert_eq!(s.connection(line, tail), None);
}

#[test]
fn disconnecting_an_unconnected_handle_is_a_no_op() {
    let Fixture {
        mut s,
        diagram,
        line,
        head,
        ..
    } = fixture();
    let before = s.constraint_count(diagram).unwrap();
    s.disconnect(line, head).unwrap();
    s.disconnect(line, head).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), before);
}

#[test]
fn explicit_port_is_used() {
    let Fixture {
        mut s,
        boxed,
        line,
        head,
        ..
    } = fixture();
    // Port 3 is the left side, from (100, 150) up to (100, 100).
    s.move_handle(line, head, Point::new(80.0, 120.0)).unwrap();
    let connection = s.connect(line, head, boxed, Some(3)).unwrap();
    assert_eq!(connection.port, 3);
    assert_eq!(s.handle_position(line, head).unwrap(), Point::new(100.0, 120.0));
}

#[test]
fn target_without_ports_is_refused_and_nothing_changes() {
    let Fixture {
        mut s,
        diagram,
        line,
        head,
        ..
    } = fixture();
    let other = s.create_item(diagram, ItemKind::Line, None).unwrap();
    s.clear_undo_stack();
    let before = s.constraint_count(diagram).unwrap();

    let err = s.connect(line, head, other, None).unwrap_err();
    assert!(matches!(
        err,
        EditorError::Canvas(CanvasError::NoPortAvailable { item }) if item == other
    ));
    assert_eq!(s.constraint_count(diagram).unwrap(), before);
    assert_eq!(s.connection(line, head), None);
    assert!(!s.can_undo());
}

#[test]
fn box_corners_are_not_connectable() {
    let Fixture {
        mut s,
        boxed,
        line,
        ..
    } = fixture();
    let corner = s.handles(boxed).unwrap()[0].id;
    assert!(matches!(
        s.connect(boxed, corner, line, None),
        Err(EditorError::InvalidItem { .. })
    ));
}

#[test]
fn reconnecting_replaces_the_old_connection() {
    let Fixture {
        mut s,
        diagram,
        boxed,
        line,
        tail,
        ..
    } = fixture();
    let fork = s
        .create_item_at(diagram, ItemKind::Fork, None, Point::new(300.0, 0.0))
        .unwrap();
    s.connect(line, tail, boxed, None).unwrap();
    let count = s.constraint_count(diagram).unwrap();

    s.connect(line, tail, fork, None).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), count);
    assert_eq!(s.connected_item(line, tail), Some(fork));
    assert_eq!(s.handle_position(line, tail).unwrap().x, 300.0);
}

#[test]
fn connected_end_follows_a_moved_item() {
    let Fixture {
        mut s,
        boxed,
        line,
        head,
        ..
    } = fixture();
    s.connect(line, head, boxed, None).unwrap();
    s.move_item(boxed, Vec2::new(0.0, 50.0)).unwrap();
    assert_eq!(s.handle_position(line, head).unwrap(), Point::new(100.0, 150.0));

    s.undo_transaction().unwrap();
    assert_eq!(s.handle_position(line, head).unwrap(), Point::new(100.0, 100.0));
}

#[test]
fn unlinking_a_line_drops_both_connections() {
    let Fixture {
        mut s,
        diagram,
        boxed,
        line,
        head,
        tail,
    } = fixture();
    let other = s
        .create_item_at(diagram, ItemKind::Element, None, Point::new(400.0, 100.0))
        .unwrap();
    s.connect(line, head, boxed, None).unwrap();
    s.connect(line, tail, other, None).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), 14);

    s.unlink(line).unwrap();
    assert_eq!(s.constraint_count(diagram).unwrap(), 12);
    assert!(s.diagram(diagram).unwrap().canvas.connections().is_empty());

    s.undo_transaction().unwrap();
    assert_eq!(s.connected_item(line, head), Some(boxed));
    assert_eq!(s.connected_item(line, tail), Some(other));
}
