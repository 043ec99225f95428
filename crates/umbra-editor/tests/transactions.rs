//! Integration tests: nested transactions, rollback and observer failures.

use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::{ElementType, ModelEvent};
use umbra_editor::{EditorError, Event, Session};

fn init() -> Session {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = Session::default();
    s.create_diagram().unwrap();
    s.clear_undo_stack();
    s
}

fn classes(s: &Session) -> usize {
    s.lselect_type("Class").len()
}

#[test]
fn nested_scopes_produce_one_undo_entry() {
    let mut s = init();
    s.transaction(|s| {
        s.create(ElementType::new("Class"))?;
        s.transaction(|s| s.create(ElementType::new("Class")))?;
        s.create(ElementType::new("Class"))
    })
    .unwrap();
    assert_eq!(classes(&s), 3);

    assert!(s.undo_transaction().unwrap());
    assert_eq!(classes(&s), 0);
    assert!(!s.can_undo());

    assert!(s.redo_transaction().unwrap());
    assert_eq!(classes(&s), 3);
}

#[test]
fn propagated_inner_error_rolls_back_the_group() {
    let mut s = init();
    let result = s.transaction(|s| {
        s.create(ElementType::new("Class"))?;
        s.transaction(|s| {
            s.create(ElementType::new("Class"))?;
            Err::<(), _>(EditorError::Handler("boom".into()))
        })
    });
    assert_eq!(result, Err(EditorError::Handler("boom".into())));
    assert_eq!(classes(&s), 0);
    assert!(!s.can_undo());
    assert!(!s.in_transaction());
}

#[test]
fn swallowed_inner_error_still_aborts_the_outer_scope() {
    let mut s = init();
    let result = s.transaction(|s| {
        s.create(ElementType::new("Class"))?;
        let inner = s.transaction(|s| {
            s.create(ElementType::new("Class"))?;
            Err::<(), _>(EditorError::Handler("boom".into()))
        });
        assert!(inner.is_err());
        assert_eq!(classes(s), 0, "inner rollback is immediate");
        s.create(ElementType::new("Class"))
    });
    assert_eq!(result, Err(EditorError::RolledBack));
    assert_eq!(classes(&s), 0);
    assert!(!s.can_undo());
}

#[test]
fn empty_transaction_leaves_no_undo_entry() {
    let mut s = init();
    s.transaction(|_| Ok(())).unwrap();
    assert!(!s.can_undo());
}

#[test]
fn model_errors_abort_the_transaction() {
    let mut s = init();
    let class = s.create(ElementType::new("Class")).unwrap();
    s.unlink(class).unwrap();
    s.clear_undo_stack();

    let result = s.transaction(|s| {
        s.create(ElementType::new("Class"))?;
        s.set_attribute(class, "name", Some("gone".into()))
    });
    assert!(matches!(
        result,
        Err(EditorError::Model(umbra_core::ModelError::InvalidState { .. }))
    ));
    assert_eq!(classes(&s), 0);
}

#[test]
fn failing_observer_does_not_block_the_others() {
    let mut s = init();
    s.subscribe(|_, event| match event {
        Event::Model(ModelEvent::ElementCreated { .. }) => {
            Err(EditorError::Handler("first".into()))
        }
        _ => Ok(()),
    });
    let seen = Rc::new(Cell::new(0));
    let counter = seen.clone();
    s.subscribe(move |_, event| {
        if matches!(event, Event::Model(ModelEvent::ElementCreated { .. })) {
            counter.set(counter.get() + 1);
        }
        Ok(())
    });

    let result = s.create(ElementType::new("Class"));
    assert_eq!(result, Err(EditorError::Handler("first".into())));
    assert_eq!(seen.get(), 1, "second observer ran before the failure surfaced");
    assert_eq!(classes(&s), 0, "the failed transaction was rolled back");
    assert!(!s.can_undo());
}

#[test]
fn observers_may_mutate_reentrantly() {
    let mut s = init();
    s.subscribe(|s, event| {
        if let Event::Model(ModelEvent::ElementCreated { element }) = event
            && element.ty.name().as_str() == "Class"
        {
            s.set_attribute(element.id, "name", Some("Unnamed".into()))?;
        }
        Ok(())
    });

    let class = s.create(ElementType::new("Class")).unwrap();
    assert_eq!(
        s.attribute(class, "name").and_then(|v| v.as_text()),
        Some("Unnamed")
    );

    s.undo_transaction().unwrap();
    assert!(!s.contains(class));
    assert!(!s.can_undo(), "the cascade belongs to the same undo entry");
}
