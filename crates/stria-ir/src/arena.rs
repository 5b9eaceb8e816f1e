//! Handle-indexed storage for IR entities.
//!
//! Entities are never removed from an [`Arena`]; instructions and values
//! carry their own liveness flag instead, so a [`Handle`] stays valid for
//! the lifetime of the module that created it.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A typed index into an [`Arena`] or [`UniqueArena`].
pub struct Handle<T> {
    index: u32,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.index)
    }
}

impl<T> Handle<T> {
    pub(crate) fn from_usize(index: usize) -> Self {
        let index = u32::try_from(index)
            .unwrap_or_else(|_| panic!("arena overflow: index {index} exceeds u32::MAX"));
        Self {
            index,
            _phantom: PhantomData,
        }
    }

    /// Returns the zero-based slot of this handle.
    pub fn index(self) -> usize {
        self.index as usize
    }
}

/// An append-only arena.
#[derive(Clone, Debug)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The handle the next [`append`](Self::append) will return.
    pub fn next_handle(&self) -> Handle<T> {
        Handle::from_usize(self.data.len())
    }

    /// Appends a value and returns its handle.
    pub fn append(&mut self, value: T) -> Handle<T> {
        let handle = Handle::from_usize(self.data.len());
        self.data.push(value);
        handle
    }

    /// Returns the value behind `handle`, or `None` if the handle was minted
    /// by a different arena.
    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    pub fn try_get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.data.get_mut(handle.index())
    }

    /// Iterates over `(handle, &value)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_usize(i), v))
    }
}

impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        &mut self.data[handle.index()]
    }
}

/// A hash-consing arena: inserting a value equal to one already present
/// returns the existing handle.
#[derive(Clone, Debug)]
pub struct UniqueArena<T> {
    data: Vec<T>,
    lookup: HashMap<T, u32>,
}

impl<T: Hash + Eq> Default for UniqueArena<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            lookup: HashMap::new(),
        }
    }
}

impl<T: Hash + Eq + Clone> UniqueArena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Interns `value`.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        if let Some(&index) = self.lookup.get(&value) {
            return Handle::from_usize(index as usize);
        }
        let handle = Handle::from_usize(self.data.len());
        self.lookup.insert(value.clone(), handle.index);
        self.data.push(value);
        handle
    }

    /// Returns the handle of an already interned value.
    pub fn find(&self, value: &T) -> Option<Handle<T>> {
        self.lookup
            .get(value)
            .map(|&index| Handle::from_usize(index as usize))
    }

    pub fn try_get(&self, handle: Handle<T>) -> Option<&T> {
        self.data.get(handle.index())
    }

    /// Iterates over `(handle, &value)` pairs in interning order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.data
            .iter()
            .enumerate()
            .map(|(i, v)| (Handle::from_usize(i), v))
    }
}

impl<T> Index<Handle<T>> for UniqueArena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        &self.data[handle.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_sequential_handles() {
        let mut arena = Arena::new();
        let a = arena.append("load");
        let b = arena.append("store");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena[b], "store");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn index_mut_updates_in_place() {
        let mut arena = Arena::new();
        let h = arena.append(1);
        arena[h] += 41;
        assert_eq!(arena.try_get(h), Some(&42));
    }

    #[test]
    fn foreign_handle_is_rejected_by_try_get() {
        let mut big = Arena::new();
        big.append(0u8);
        big.append(1u8);
        let foreign = big.append(2u8);
        let small = Arena::<u8>::new();
        assert!(small.try_get(foreign).is_none());
    }

    #[test]
    fn unique_arena_interns_equal_values() {
        let mut arena = UniqueArena::new();
        let a = arena.insert(String::from("vec4<f32>"));
        let b = arena.insert(String::from("mat3x2<f32>"));
        let c = arena.insert(String::from("vec4<f32>"));
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.find(&String::from("mat3x2<f32>")), Some(b));
        assert_eq!(arena.find(&String::from("f16")), None);
    }

    #[test]
    fn handles_order_by_allocation() {
        let mut arena = Arena::new();
        let first = arena.append(());
        let second = arena.append(());
        assert!(first < second);
        assert_eq!(format!("{first:?}"), "[0]");
    }
}
