//! Dense index arena keyed by typed ids.

use std::{
    marker::PhantomData,
    ops::{Index, IndexMut},
};

/// A `Vec`-backed arena. Ids are handed out in insertion order and are
/// never reused, so iteration order is insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct Arena<Id: IdLike, T> {
    inner: Vec<T>,
    _phantom: PhantomData<Id>,
}

impl<Id: IdLike, T> Arena<Id, T> {
    pub fn new() -> Self {
        Self {
            inner: Vec::new(),
            _phantom: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
            _phantom: PhantomData,
        }
    }

    /// An arena holding `len` clones of `value`, one per id.
    pub fn filled(len: usize, value: T) -> Self
    where
        T: Clone,
    {
        Self {
            inner: vec![value; len],
            _phantom: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn push(&mut self, x: T) -> Id {
        let id = Id::from_raw(self.inner.len());
        self.inner.push(x);
        id
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.inner.get(id.into_raw())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> {
        self.inner
            .iter()
            .enumerate()
            .map(|(i, v)| (Id::from_raw(i), v))
    }

    pub fn values(&self) -> std::slice::Iter<'_, T> {
        self.inner.iter()
    }
}

impl<Id: IdLike, T> Default for Arena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: IdLike, T> Index<Id> for Arena<Id, T> {
    type Output = T;

    fn index(&self, index: Id) -> &Self::Output {
        &self.inner[index.into_raw()]
    }
}

impl<Id: IdLike, T> IndexMut<Id> for Arena<Id, T> {
    fn index_mut(&mut self, index: Id) -> &mut Self::Output {
        &mut self.inner[index.into_raw()]
    }
}

pub trait IdLike: Copy {
    fn from_raw(index: usize) -> Self;
    fn into_raw(self) -> usize;
}

#[cfg(test)]
#[derive(Copy, Clone, Debug, PartialEq)]
struct TestId(usize);

#[cfg(test)]
impl IdLike for TestId {
    fn from_raw(index: usize) -> Self {
        Self(index)
    }

    fn into_raw(self) -> usize {
        self.0
    }
}

#[test]
fn ids_follow_insertion_order() {
    let mut arena: Arena<TestId, &str> = Arena::new();
    let a = arena.push("a");
    let b = arena.push("b");
    assert_eq!(a, TestId(0));
    assert_eq!(b, TestId(1));
    assert_eq!(arena[b], "b");
    assert_eq!(arena.get(TestId(2)), None);
    assert_eq!(
        arena.iter().map(|(id, v)| (id.0, *v)).collect::<Vec<_>>(),
        vec![(0, "a"), (1, "b")]
    );
}
