//! Source and Change Notification Integration Tests
//!
//! Tests validate:
//! - A full wrap / notify / write round through one source
//! - Sources seen through proxies of other sources
//! - One-shot callbacks, weak observers and subjects
//! - The shadowless view and `_real_` access from the outside
//!
//! # Running Tests
//! ```bash
//! cargo test --test source_integration
//! ```

mod common;

use common::{context, skit, source, Plain};
use shroud_engine::notify::{pending, tracked_subjects};
use shroud_engine::{notify, unwrap, wrap, Args, EngineError, Id, Object, Source, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Callback that records every argument it is called with
fn recorder() -> (Value, Rc<RefCell<Vec<Value>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    let callback = Value::function("record", move |args: Args| {
        sink.borrow_mut().extend(args.positional);
        Ok(Value::None)
    });
    (callback, calls)
}

// ===== End to End =====

#[test]
fn test_wrap_notify_write_round() {
    let s = source("root");
    let ctx = Value::Source(s.clone());

    // Atomic values pass through.
    assert!(wrap(&Value::Int(42), &ctx).unwrap().eq_value(&Value::Int(42)).unwrap());

    // Tuples are rebuilt with wrapped elements.
    let s2 = context("child");
    let tuple = Value::tuple([Value::Int(1), Value::str("a"), s2.clone()]);
    let wrapped = wrap(&tuple, &ctx).unwrap();
    let expected = Value::tuple([Value::Int(1), Value::str("a"), wrap(&s2, &ctx).unwrap()]);
    assert!(wrapped.eq_value(&expected).unwrap());
    assert!(wrapped.get_item(&Value::Int(2)).unwrap().is_proxy());

    // A transform write fires the callback once, after the write.
    let observer = Value::object(Plain("observer"));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let reader = s.clone();
    let sink = seen.clone();
    let callback = Value::function("on_transform", move |_args: Args| {
        sink.borrow_mut().push(reader.transform()?);
        Ok(Value::None)
    });
    notify(&ctx, &Value::str("transform"), &observer, callback).unwrap();

    s.set("transform", Value::str("T1")).unwrap();
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].as_str(), Some("T1"));

    s.set("transform", Value::str("T2")).unwrap();
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn test_identifiers_follow_source_id() {
    let s = source("a");
    let ctx = Value::Source(s.clone());
    let relative = Id::new("b/c").into_value();

    assert_eq!(wrap(&relative, &ctx).unwrap().to_str().unwrap(), "a/b/c");
    s.set("id", Id::new("z").into_value()).unwrap();
    assert_eq!(wrap(&relative, &ctx).unwrap().to_str().unwrap(), "z/b/c");

    // A shadowed id is not what translatables see.
    s.shadow("id", Id::new("shadow").into_value()).unwrap();
    assert_eq!(s.id().unwrap().to_str().unwrap(), "shadow");
    assert_eq!(wrap(&relative, &ctx).unwrap().to_str().unwrap(), "z/b/c");
}

// ===== Sources Behind Proxies =====

#[test]
fn test_source_read_through_proxy() {
    let outer = context("outer");
    let inner_source = source("inner");
    let child = skit("child");
    inner_source.set("transform", child.clone()).unwrap();
    let proxied = wrap(&Value::Source(inner_source.clone()), &outer).unwrap();

    // Reads are wrapped under the outer context; identifiers are translated.
    let transform = proxied.get_attr("transform").unwrap();
    assert!(transform.is(&wrap(&child, &outer).unwrap()));
    assert_eq!(proxied.get_attr("id").unwrap().to_str().unwrap(), "outer/inner");

    // Writes are unwrapped before they reach the source.
    let other = skit("other");
    proxied
        .set_attr("transform", wrap(&other, &outer).unwrap())
        .unwrap();
    assert!(inner_source.transform().unwrap().is(&other));
}

#[test]
fn test_enter_is_not_wrapped() {
    let outer = context("outer");
    let inner = Value::Source(source("inner"));
    let proxied = wrap(&inner, &outer).unwrap();

    let enter = proxied.get_attr("enter").unwrap();
    assert!(!enter.is_proxy());
    let entered = enter.call(Args::default()).unwrap();
    assert!(entered.is(&inner));
}

#[test]
fn test_notify_through_proxied_subject() {
    let outer = context("outer");
    let s = source("inner");
    let proxied = wrap(&Value::Source(s.clone()), &outer).unwrap();
    let observer = skit("observer");
    let (callback, calls) = recorder();

    notify(&proxied, &Value::str("id"), &observer, callback).unwrap();
    assert_eq!(pending(&s, "id"), 1);

    s.set("id", Value::str("renamed")).unwrap();
    assert_eq!(calls.borrow().len(), 1);
    assert!(calls.borrow()[0].is(&observer));
}

#[test]
fn test_proxied_source_as_context() {
    let outer = context("outer");
    let inner = context("inner");
    let proxied = wrap(&inner, &outer).unwrap();

    let relative = Id::new("leaf").into_value();
    let applied = wrap(&relative, &proxied).unwrap();
    assert_eq!(applied.to_str().unwrap(), "outer/inner/leaf");

    let x = skit("x");
    let proxy = wrap(&x, &proxied).unwrap();
    assert!(unwrap(&proxy).is(&x));
}

// ===== One-Shot Callbacks =====

#[test]
fn test_write_through_either_view_fires() {
    let s = source("a");
    let observer = skit("observer");
    let (callback, calls) = recorder();
    s.notify("transform", &observer, callback.clone()).unwrap();
    s.set("_real_transform", Value::Int(1)).unwrap();
    assert_eq!(calls.borrow().len(), 1);

    s.notify("transform", &observer, callback).unwrap();
    s.shadowless().set("_real_transform", Value::Int(2)).unwrap();
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn test_shadow_does_not_fire() {
    let s = source("a");
    let observer = skit("observer");
    let (callback, calls) = recorder();
    s.notify("id", &observer, callback).unwrap();
    s.shadow("id", Value::str("shadowed")).unwrap();
    assert!(calls.borrow().is_empty());
    assert_eq!(s.callback_count("id"), 1);
}

#[test]
fn test_many_observers_one_write() {
    let s = source("a");
    let observers: Vec<Value> = (0..5).map(|i| skit(&format!("o{}", i))).collect();
    let (callback, calls) = recorder();
    for observer in &observers {
        s.notify("parent", observer, callback.clone()).unwrap();
    }
    assert_eq!(s.callback_count("parent"), 5);

    s.set("parent", Value::None).unwrap();
    assert_eq!(calls.borrow().len(), 5);
    for observer in &observers {
        assert!(calls.borrow().iter().any(|seen| seen.is(observer)));
    }
    assert_eq!(s.callback_count("parent"), 0);
}

#[test]
fn test_callbacks_on_other_attributes_survive() {
    let s = source("a");
    let observer = skit("observer");
    let (callback, calls) = recorder();
    s.notify("id", &observer, callback.clone()).unwrap();
    s.notify("transform", &observer, callback).unwrap();

    s.set("id", Value::str("b")).unwrap();
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(s.callback_count("transform"), 1);
}

#[test]
fn test_callback_error_reported_after_write() {
    let s = source("a");
    let observer = skit("observer");
    let failing = Value::function("fail", |_args: Args| Err(EngineError::Host("boom".to_string())));
    s.notify("transform", &observer, failing).unwrap();

    let result = s.set("transform", Value::str("T1"));
    assert_eq!(result, Err(EngineError::Host("boom".to_string())));
    assert_eq!(s.transform().unwrap().as_str(), Some("T1"));
}

// ===== Weak Participants =====

#[test]
fn test_dead_observer_is_forgotten() {
    let s = source("a");
    let (callback, calls) = recorder();
    {
        let observer = skit("short-lived");
        s.notify("transform", &observer, callback).unwrap();
        assert_eq!(s.callback_count("transform"), 1);
    }
    assert_eq!(s.callback_count("transform"), 0);
    s.set("transform", Value::None).unwrap();
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_dead_subject_releases_callbacks() {
    let observer = skit("observer");
    let released = Rc::new(Cell::new(false));
    let flag = released.clone();
    let token = Rc::new(DropFlag(flag));
    let callback = Value::function("hold", move |_args: Args| {
        Ok(Value::Int(Rc::strong_count(&token) as i64))
    });

    let before = tracked_subjects();
    {
        let s = source("a");
        s.notify("id", &observer, callback).unwrap();
        assert_eq!(tracked_subjects(), before + 1);
    }
    assert_eq!(tracked_subjects(), before);
    assert!(released.get());
}

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

/// Host object that writes a source attribute when it is dropped
struct WritesOnDrop {
    target: Source,
    attr: &'static str,
}

impl Drop for WritesOnDrop {
    fn drop(&mut self) {
        let _ = self.target.set(self.attr, Value::str("written-on-drop"));
    }
}

impl Object for WritesOnDrop {
    fn type_name(&self) -> &str {
        "WritesOnDrop"
    }
}

#[test]
fn test_observer_teardown_that_writes_the_subject() {
    let s = source("a");
    let observer = skit("observer");
    let (callback, calls) = recorder();

    let writer = Value::object(WritesOnDrop {
        target: s.clone(),
        attr: "transform",
    });
    let holds_writer = Value::function("holds", move |_args: Args| Ok(writer.clone()));
    s.notify("id", &observer, holds_writer).unwrap();
    s.notify("transform", &observer, callback).unwrap();

    // Releasing the first callback writes `transform` while the observer is
    // being torn down; its second callback is already gone.
    drop(observer);
    assert!(calls.borrow().is_empty());
    assert_eq!(s.callback_count("id"), 0);
    assert_eq!(s.callback_count("transform"), 0);
    assert_eq!(s.transform().unwrap().as_str(), Some("written-on-drop"));
}

#[test]
fn test_observer_not_kept_alive() {
    let s = source("a");
    let observer = skit("observer");
    let weak = observer.downgrade().unwrap();
    let (callback, _calls) = recorder();
    s.notify("id", &observer, callback).unwrap();
    drop(observer);
    assert!(!weak.is_alive());
}

// ===== Validation =====

#[test]
fn test_notify_argument_errors() {
    let s = source("a");
    let ctx = Value::Source(s.clone());
    let observer = skit("observer");
    let (callback, _) = recorder();

    assert!(matches!(
        notify(&Value::Int(1), &Value::str("id"), &observer, callback.clone()),
        Err(EngineError::WrongType { .. })
    ));
    assert!(matches!(
        notify(&ctx, &Value::Int(1), &observer, callback.clone()),
        Err(EngineError::WrongType { .. })
    ));
    assert!(matches!(
        notify(&ctx, &Value::str("nonexistent"), &observer, callback.clone()),
        Err(EngineError::InvalidAttribute { .. })
    ));
    assert!(matches!(
        notify(&ctx, &Value::str("id"), &observer, Value::Int(3)),
        Err(EngineError::NotCallable { .. })
    ));
    assert!(matches!(
        notify(&ctx, &Value::str("id"), &Value::Int(7), callback.clone()),
        Err(EngineError::WrongType { .. })
    ));
    assert_eq!(
        notify(&Value::Source(s.shadowless()), &Value::str("id"), &observer, callback),
        Err(EngineError::ImmutableContext)
    );
}

#[test]
fn test_registered_generic_attribute() {
    shroud_engine::attr::register("colour").unwrap();
    let s = source("a");
    let observer = skit("observer");
    let (callback, calls) = recorder();
    s.notify("colour", &observer, callback).unwrap();

    s.set("colour", Value::str("red")).unwrap();
    assert_eq!(calls.borrow().len(), 1);
    assert_eq!(s.get("colour").unwrap().as_str(), Some("red"));
}
