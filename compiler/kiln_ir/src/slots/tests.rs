use crate::id::ValueId;

use super::*;

#[test]
fn insert_and_get() {
    let mut slots: Slots<ValueId, &str> = Slots::default();
    let a = slots.insert("a");
    let b = slots.insert("b");
    assert_eq!(slots.get(a), Some(&"a"));
    assert_eq!(slots.get(b), Some(&"b"));
    assert_eq!(slots.len(), 2);
}

#[test]
fn removed_key_is_stale() {
    let mut slots: Slots<ValueId, u32> = Slots::default();
    let a = slots.insert(1);
    assert_eq!(slots.remove(a), Some(1));
    assert_eq!(slots.get(a), None);
    assert_eq!(slots.remove(a), None);
    assert_eq!(slots.len(), 0);
}

#[test]
fn reused_slot_does_not_alias_stale_key() {
    let mut slots: Slots<ValueId, u32> = Slots::default();
    let a = slots.insert(1);
    slots.remove(a);
    let b = slots.insert(2);
    assert_eq!(a.index(), b.index());
    assert_ne!(a, b);
    assert_eq!(slots.get(a), None);
    assert_eq!(slots.get(b), Some(&2));
}

#[test]
fn removal_updates_the_live_count() {
    let mut slots: Slots<ValueId, u32> = Slots::default();
    let a = slots.insert(1);
    let b = slots.insert(2);
    let c = slots.insert(3);
    assert_eq!(slots.remove(a), Some(1));
    assert_eq!(slots.remove(a), None);
    assert_eq!(slots.len(), 2);
    assert!(!slots.contains(a));
    assert!(slots.contains(b) && slots.contains(c));
}
