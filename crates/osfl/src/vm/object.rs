//! The VM's object graph: a pool of refcounted objects with
//! insertion-ordered property tables.
//!
//! Creation appends to the pool with refcount 1; `release` decrements and
//! destroys the object exactly when the count reaches zero. There is no
//! cycle collector: the language surface has no syntax for building
//! back-references, and that precondition is what makes plain refcounting
//! sufficient.

use indexmap::IndexMap;
use std::rc::Rc;

use crate::value::Value;

/// Handle to an object in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

type PropertyTable = IndexMap<Rc<str>, Value, ahash::RandomState>;

/// One object: a property table looked up by string equality in insertion
/// order, plus its refcount.
#[derive(Debug, Default)]
pub struct Object {
    properties: PropertyTable,
    refcount: u32,
}

impl Object {
    /// Replaces an existing key in place or appends a new one.
    pub fn set_property(&mut self, key: &str, value: Value) {
        if let Some(slot) = self.properties.get_mut(key) {
            *slot = value;
        } else {
            self.properties.insert(Rc::from(key), value);
        }
    }

    #[must_use]
    pub fn get_property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    #[must_use]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.refcount
    }
}

/// The pool of live objects. Slots are never reused within one VM run, so
/// ids stay stable; destroyed objects leave a tombstone.
#[derive(Debug, Default)]
pub struct ObjectPool {
    slots: Vec<Option<Object>>,
}

impl ObjectPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh object with refcount 1 and returns its handle.
    pub fn create(&mut self) -> ObjectId {
        let id = ObjectId(self.slots.len() as u32);
        self.slots.push(Some(Object {
            properties: PropertyTable::default(),
            refcount: 1,
        }));
        id
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Increments the refcount of a live object.
    pub fn retain(&mut self, id: ObjectId) {
        if let Some(object) = self.get_mut(id) {
            object.refcount += 1;
        }
    }

    /// Decrements the refcount; destroys the object and returns `true` when
    /// it reaches zero.
    pub fn release(&mut self, id: ObjectId) -> bool {
        let Some(object) = self.get_mut(id) else {
            return false;
        };
        object.refcount -= 1;
        if object.refcount == 0 {
            self.slots[id.index()] = None;
            return true;
        }
        false
    }

    #[must_use]
    pub fn refcount(&self, id: ObjectId) -> Option<u32> {
        self.get(id).map(Object::refcount)
    }

    /// Number of objects still alive in the pool.
    #[must_use]
    pub fn live_objects(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}
