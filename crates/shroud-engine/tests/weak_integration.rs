//! Weak Registry Integration Tests
//!
//! Tests validate:
//! - Membership by identity, never by equality
//! - Automatic removal when members die
//! - Members are never kept alive by the set
//! - Proxies and sources as members
//!
//! # Running Tests
//! ```bash
//! cargo test --test weak_integration
//! ```

mod common;

use common::{context, skit, source};
use shroud_engine::{wrap, EngineError, Id, Value, WeakRegistry};

// ===== Membership =====

#[test]
fn test_add_contains_discard() {
    let registry = WeakRegistry::new();
    let a = skit("a");
    let b = skit("b");

    assert!(registry.add(&a).unwrap());
    assert!(!registry.add(&a).unwrap());
    assert!(registry.add(&b).unwrap());
    assert_eq!(registry.len(), 2);
    assert!(registry.contains(&a));

    assert!(registry.discard(&a));
    assert!(!registry.discard(&a));
    assert!(!registry.contains(&a));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_membership_is_by_identity() {
    let registry = WeakRegistry::new();
    let first = Id::new("same").into_value();
    let second = Id::new("same").into_value();
    assert!(first.eq_value(&second).unwrap());

    registry.add(&first).unwrap();
    assert!(registry.contains(&first));
    assert!(!registry.contains(&second));
}

#[test]
fn test_values_without_identity_rejected() {
    let registry = WeakRegistry::new();
    for value in [Value::None, Value::Int(1), Value::str("s")] {
        assert!(matches!(
            registry.add(&value),
            Err(EngineError::WrongType { .. })
        ));
        assert!(!registry.contains(&value));
        assert!(!registry.discard(&value));
    }
    assert!(registry.is_empty());
}

// ===== Lifetimes =====

#[test]
fn test_dead_members_disappear() {
    let registry = WeakRegistry::new();
    let keep = skit("keep");
    registry.add(&keep).unwrap();
    {
        let temporary = skit("temporary");
        registry.add(&temporary).unwrap();
        assert_eq!(registry.len(), 2);
    }
    assert_eq!(registry.len(), 1);
    let members: Vec<Value> = registry.iter().collect();
    assert_eq!(members.len(), 1);
    assert!(members[0].is(&keep));
}

#[test]
fn test_members_not_kept_alive() {
    let registry = WeakRegistry::new();
    let member = skit("member");
    let weak = member.downgrade().unwrap();
    registry.add(&member).unwrap();
    drop(member);
    assert!(!weak.is_alive());
    assert!(weak.upgrade().is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_member_outlives_registry() {
    let member = skit("member");
    {
        let registry = WeakRegistry::new();
        registry.add(&member).unwrap();
    }
    // The member's lifeline no longer reaches a live table.
    drop(member);
}

#[test]
fn test_clear() {
    let registry = WeakRegistry::new();
    let members: Vec<Value> = (0..4).map(|i| skit(&format!("m{}", i))).collect();
    for member in &members {
        registry.add(member).unwrap();
    }
    registry.clear();
    assert!(registry.is_empty());
    assert!(members.iter().all(|member| !registry.contains(member)));

    // Re-adding after clear works and the old hooks do not interfere.
    registry.add(&members[0]).unwrap();
    drop(members);
    assert!(registry.is_empty());
}

#[test]
fn test_clones_share_members() {
    let registry = WeakRegistry::new();
    let view = registry.clone();
    let member = skit("member");
    registry.add(&member).unwrap();
    assert!(view.contains(&member));
    drop(member);
    assert!(view.is_empty());
}

// ===== Engine Values as Members =====

#[test]
fn test_proxies_and_sources_as_members() {
    let registry = WeakRegistry::new();
    let ctx = context("a");
    let x = skit("x");
    let proxy = wrap(&x, &ctx).unwrap();
    let s = source("b");
    let function = Value::function("f", |_| Ok(Value::None));

    registry.add(&proxy).unwrap();
    registry.add(&Value::Source(s.clone())).unwrap();
    registry.add(&function).unwrap();
    assert_eq!(registry.len(), 3);

    // A proxy is a member distinct from what it wraps.
    assert!(!registry.contains(&x));

    drop(proxy);
    drop(s);
    drop(function);
    assert!(registry.is_empty());
}
