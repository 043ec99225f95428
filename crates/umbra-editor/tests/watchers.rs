//! Integration tests: watch paths reacting to model changes.

use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::rc::Rc;
use umbra_core::{AssociationDef, ElementId, ElementType};
use umbra_editor::{Handler, ItemKind, Session};

struct Fixture {
    s: Session,
    diagram: ElementId,
    class: ElementId,
    stereotype: ElementId,
    item: ElementId,
}

/// A class with one applied stereotype, shown by a box item.
fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut s = Session::default();
    s.define_association(AssociationDef::many("appliedStereotype"));
    s.define_association(AssociationDef::one("classifier"));

    let diagram = s.create_diagram().unwrap();
    let class = s
        .create(ElementType::new("Class").extends("NamedElement"))
        .unwrap();
    let instance = s.create(ElementType::new("InstanceSpecification")).unwrap();
    let stereotype = s
        .create(ElementType::new("Stereotype").extends("NamedElement"))
        .unwrap();
    s.add(class, "appliedStereotype", instance).unwrap();
    s.set_one(instance, "classifier", Some(stereotype)).unwrap();
    let item = s.create_item(diagram, ItemKind::Element, Some(class)).unwrap();
    s.take_updates(diagram).unwrap();
    Fixture {
        s,
        diagram,
        class,
        stereotype,
        item,
    }
}

fn counting_handler() -> (Handler, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let handler = Handler::custom(move |_, _, _| {
        counter.set(counter.get() + 1);
        Ok(())
    });
    (handler, calls)
}

#[test]
fn deep_rename_fires_the_handler_once() {
    let Fixture {
        mut s,
        diagram,
        stereotype,
        item,
        ..
    } = fixture();
    let (handler, calls) = counting_handler();
    let path = "subject.appliedStereotype.classifier.name".parse().unwrap();
    s.watch(item, path, handler.clone()).unwrap();
    // Same key through an aliasing path with the same handler.
    let alias = "subject.appliedStereotype.classifier[NamedElement].name"
        .parse()
        .unwrap();
    s.watch(item, alias, handler).unwrap();

    s.set_attribute(stereotype, "name", Some("entity".into()))
        .unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(s.take_updates(diagram).unwrap(), vec![item]);
}

#[test]
fn changing_an_intermediate_link_follows_the_new_target() {
    let Fixture {
        mut s,
        class,
        stereotype,
        item,
        ..
    } = fixture();
    let (handler, calls) = counting_handler();
    s.watch(
        item,
        "subject.appliedStereotype.classifier.name".parse().unwrap(),
        handler,
    )
    .unwrap();

    let instance = s.values(class, "appliedStereotype")[0];
    let other = s
        .create(ElementType::new("Stereotype").extends("NamedElement"))
        .unwrap();
    s.set_one(instance, "classifier", Some(other)).unwrap();
    let after_relink = calls.get();
    assert!(after_relink >= 1, "the hop change itself is reported");

    s.set_attribute(stereotype, "name", Some("stale".into()))
        .unwrap();
    assert_eq!(calls.get(), after_relink, "old target is no longer watched");

    s.set_attribute(other, "name", Some("fresh".into())).unwrap();
    assert_eq!(calls.get(), after_relink + 1);
}

#[test]
fn type_filter_narrows_the_subject() {
    let Fixture { mut s, diagram, .. } = fixture();
    let untyped = s.create(ElementType::new("Comment")).unwrap();
    let item = s.create_item(diagram, ItemKind::Element, Some(untyped)).unwrap();
    s.take_updates(diagram).unwrap();

    s.set_attribute(untyped, "name", Some("note".into())).unwrap();
    assert!(
        s.take_updates(diagram).unwrap().is_empty(),
        "a Comment is not a NamedElement"
    );

    s.set_attribute(untyped, "body", Some("text".into())).unwrap();
    assert!(s.take_updates(diagram).unwrap().is_empty());
    assert!(s.contains(item));
}

#[test]
fn unsubscribed_items_are_quiet_until_resubscribed() {
    let Fixture {
        mut s,
        diagram,
        class,
        item,
        ..
    } = fixture();
    s.unsubscribe_all();
    s.set_attribute(class, "name", Some("A".into())).unwrap();
    assert!(s.take_updates(diagram).unwrap().is_empty());

    s.subscribe_all();
    s.set_attribute(class, "name", Some("B".into())).unwrap();
    assert_eq!(s.take_updates(diagram).unwrap(), vec![item]);
}

#[test]
fn undo_fires_watchers_like_a_live_edit() {
    let Fixture {
        mut s,
        diagram,
        class,
        item,
        ..
    } = fixture();
    s.set_attribute(class, "name", Some("A".into())).unwrap();
    s.take_updates(diagram).unwrap();

    s.undo_transaction().unwrap();
    assert_eq!(s.attribute(class, "name"), None);
    assert_eq!(s.take_updates(diagram).unwrap(), vec![item]);
}

#[test]
fn unlinked_item_keeps_its_watches_for_undo() {
    let Fixture {
        mut s,
        diagram,
        class,
        item,
        ..
    } = fixture();
    let paths = s.watch_paths(item);
    assert_eq!(paths.len(), 3);

    s.unlink(item).unwrap();
    s.set_attribute(class, "name", Some("A".into())).unwrap();
    assert!(s.take_updates(diagram).unwrap().is_empty());

    s.undo_transaction().unwrap();
    s.undo_transaction().unwrap();
    assert!(s.contains(item));
    s.take_updates(diagram).unwrap();
    s.set_attribute(class, "name", Some("B".into())).unwrap();
    assert_eq!(s.take_updates(diagram).unwrap(), vec![item]);
    assert_eq!(s.watch_paths(item), paths);
}
