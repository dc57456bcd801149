// Liveness tracking between wrappers
//
// Refable<R> is held by the owner of a resource. RawRef<R> observers see the
// owner's view value until the owner is dropped or invalidated.
// Reference<T> does the same for Arc-shared objects.

use parking_lot::RwLock;
use std::sync::{Arc, Weak};

type Slot<R> = Arc<RwLock<Option<R>>>;

/// Owner side of a liveness slot
pub struct Refable<R: Copy> {
    slot: Slot<R>,
}

impl<R: Copy> Refable<R> {
    pub fn new(value: R) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(value))),
        }
    }

    /// Hand out an observer of this slot
    pub fn reference(&self) -> RawRef<R> {
        RawRef {
            slot: Some(self.slot.clone()),
        }
    }

    pub fn get(&self) -> Option<R> {
        *self.slot.read()
    }

    /// Replace the observed value, observers see the update
    pub fn set(&self, value: R) {
        *self.slot.write() = Some(value);
    }

    /// Mark the resource as gone for every observer
    pub fn invalidate(&self) {
        *self.slot.write() = None;
    }

    pub fn observers(&self) -> usize {
        Arc::strong_count(&self.slot) - 1
    }
}

impl<R: Copy> Drop for Refable<R> {
    fn drop(&mut self) {
        self.invalidate();
    }
}

/// Observer side of a liveness slot
pub struct RawRef<R: Copy> {
    slot: Option<Slot<R>>,
}

impl<R: Copy> RawRef<R> {
    /// Observer that never had a value
    pub fn empty() -> Self {
        Self { slot: None }
    }

    pub fn has_value(&self) -> bool {
        self.raw().is_some()
    }

    pub fn raw(&self) -> Option<R> {
        self.slot.as_ref().and_then(|slot| *slot.read())
    }

    /// Whether this observes the given owner
    pub fn is(&self, owner: &Refable<R>) -> bool {
        self.slot
            .as_ref()
            .map(|slot| Arc::ptr_eq(slot, &owner.slot))
            .unwrap_or(false)
    }

    pub fn reset(&mut self) {
        self.slot = None;
    }
}

impl<R: Copy> Clone for RawRef<R> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<R: Copy> Default for RawRef<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: Copy + std::fmt::Debug> std::fmt::Debug for RawRef<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RawRef").field(&self.raw()).finish()
    }
}

/// Non-owning observer of an Arc-shared object
pub struct Reference<T> {
    target: Weak<T>,
}

impl<T> Reference<T> {
    pub fn new(target: &Arc<T>) -> Self {
        Self {
            target: Arc::downgrade(target),
        }
    }

    pub fn has_value(&self) -> bool {
        self.target.strong_count() > 0
    }

    pub fn upgrade(&self) -> Option<Arc<T>> {
        self.target.upgrade()
    }

    pub fn is(&self, other: &Arc<T>) -> bool {
        std::ptr::eq(self.target.as_ptr(), Arc::as_ptr(other))
    }
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<T> Default for Reference<T> {
    fn default() -> Self {
        Self { target: Weak::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_sees_value_until_owner_drops() {
        let owner = Refable::new(5u64);
        let observer = owner.reference();
        assert!(observer.has_value());
        assert_eq!(observer.raw(), Some(5));

        drop(owner);
        assert!(!observer.has_value());
        assert_eq!(observer.raw(), None);
    }

    #[test]
    fn invalidate_clears_all_observers() {
        let owner = Refable::new(1u32);
        let a = owner.reference();
        let b = a.clone();
        assert_eq!(owner.observers(), 2);

        owner.invalidate();
        assert!(!a.has_value());
        assert!(!b.has_value());
    }

    #[test]
    fn set_updates_observers() {
        let owner = Refable::new(1u32);
        let observer = owner.reference();
        owner.set(9);
        assert_eq!(observer.raw(), Some(9));
    }

    #[test]
    fn identity_survives_move() {
        let owner = Refable::new(3u8);
        let observer = owner.reference();
        let moved = owner;
        assert!(observer.is(&moved));
        assert_eq!(observer.raw(), Some(3));

        let other = Refable::new(3u8);
        assert!(!observer.is(&other));
    }

    #[test]
    fn empty_ref_has_no_value() {
        let mut observer: RawRef<u32> = RawRef::default();
        assert!(!observer.has_value());

        let owner = Refable::new(2u32);
        observer = owner.reference();
        observer.reset();
        assert!(!observer.has_value());
        assert!(!observer.is(&owner));
    }

    #[test]
    fn reference_tracks_arc() {
        let target = Arc::new(String::from("device"));
        let reference = Reference::new(&target);
        assert!(reference.has_value());
        assert!(reference.is(&target));
        assert_eq!(reference.upgrade().as_deref().map(String::as_str), Some("device"));

        drop(target);
        assert!(!reference.has_value());
        assert!(reference.upgrade().is_none());
    }
}
