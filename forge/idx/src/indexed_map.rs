use super::index_trait::IndexRef;
use std::{marker::PhantomData, ops};

/// Primary storage for arena nodes. Keys are handed out by [IndexedMap::push]
/// and stay valid for the life of the map; nothing is ever removed.
#[derive(Debug, Clone)]
pub struct IndexedMap<K, D>
where
    K: IndexRef,
{
    data: Vec<D>,
    phantom: PhantomData<K>,
}

impl<K, D> ops::Index<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        &self.data[index.index()]
    }
}

impl<K, D> ops::IndexMut<K> for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn index_mut(&mut self, index: K) -> &mut Self::Output {
        &mut self.data[index.index()]
    }
}

impl<K, D> IndexedMap<K, D>
where
    K: IndexRef,
{
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
        }
    }

    pub fn with_capacity(size: usize) -> Self {
        Self {
            data: Vec::with_capacity(size),
            phantom: PhantomData,
        }
    }

    pub fn get(&self, index: K) -> Option<&D> {
        self.data.get(index.index())
    }

    pub fn get_mut(&mut self, index: K) -> Option<&mut D> {
        self.data.get_mut(index.index())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, item: D) -> K {
        self.data.push(item);
        K::new(self.data.len() - 1)
    }

    /// The key the next [IndexedMap::push] will return.
    pub fn peek_next_idx(&self) -> K {
        K::new(self.data.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut D)> {
        self.data
            .iter_mut()
            .enumerate()
            .map(|(i, v)| (K::new(i), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + use<K, D> {
        (0..self.data.len()).map(K::new)
    }

    pub fn values(&self) -> impl Iterator<Item = &D> {
        self.data.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut D> {
        self.data.iter_mut()
    }

    /// Two mutable references at once. Returns `None` if the indices are equal
    /// or out of bounds.
    pub fn get2_mut(&mut self, a: K, b: K) -> Option<(&mut D, &mut D)> {
        let (ia, ib) = (a.index(), b.index());
        if ia == ib || ia >= self.data.len() || ib >= self.data.len() {
            return None;
        }
        if ia < ib {
            let (lo, hi) = self.data.split_at_mut(ib);
            Some((&mut lo[ia], &mut hi[0]))
        } else {
            let (lo, hi) = self.data.split_at_mut(ia);
            Some((&mut hi[0], &mut lo[ib]))
        }
    }
}

impl<K, D> Default for IndexedMap<K, D>
where
    K: IndexRef,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Side table keyed by the indices of some [IndexedMap]. Reads of keys that
/// were never written return the default value.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone,
{
    data: Vec<D>,
    phantom: PhantomData<K>,
    default_value: D,
}

// Not IndexMut: writes must go through `insert` so the table can grow.
impl<K, D> ops::Index<K> for SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone,
{
    type Output = D;

    fn index(&self, index: K) -> &Self::Output {
        self.get(index)
    }
}

impl<K, D> SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone,
{
    pub fn new_with_default(default_value: D) -> Self {
        Self {
            data: Vec::new(),
            phantom: PhantomData,
            default_value,
        }
    }

    pub fn get(&self, index: K) -> &D {
        self.data.get(index.index()).unwrap_or(&self.default_value)
    }

    pub fn insert(&mut self, index: K, item: D) {
        if index.index() >= self.data.len() {
            self.data
                .resize(index.index() + 1, self.default_value.clone());
        }
        self.data[index.index()] = item;
    }

    /// Apply `upd` to the stored value, materializing the default first.
    pub fn update<F: FnOnce(&mut D)>(&mut self, index: K, upd: F) {
        if index.index() >= self.data.len() {
            self.data
                .resize(index.index() + 1, self.default_value.clone());
        }
        upd(&mut self.data[index.index()])
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(k, v)| (K::new(k), v))
    }
}

impl<K, D> SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone + Default,
{
    pub fn new() -> Self {
        Self::new_with_default(D::default())
    }
}

impl<K, D> Default for SecondaryMap<K, D>
where
    K: IndexRef,
    D: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{IndexedMap, SecondaryMap};
    use crate::{IndexRef, impl_index};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct NodeIdx(u32);
    impl_index!(NodeIdx);

    #[test]
    fn get2_mut_is_ordered() {
        let mut map: IndexedMap<NodeIdx, usize> = IndexedMap::new();
        for i in 0..10 {
            map.push(i);
        }
        let (a, b) = map.get2_mut(NodeIdx(7), NodeIdx(2)).unwrap();
        assert_eq!((*a, *b), (7, 2));
        *a = 70;
        *b = 20;
        assert_eq!(map[NodeIdx(7)], 70);
        assert_eq!(map[NodeIdx(2)], 20);
        assert!(map.get2_mut(NodeIdx(3), NodeIdx(3)).is_none());
        assert!(map.get2_mut(NodeIdx(3), NodeIdx(10)).is_none());
    }

    #[test]
    fn secondary_default() {
        let mut side: SecondaryMap<NodeIdx, u32> = SecondaryMap::new();
        assert_eq!(side[NodeIdx(40)], 0);
        side.update(NodeIdx(3), |v| *v += 5);
        assert_eq!(side[NodeIdx(3)], 5);
        assert_eq!(side[NodeIdx(2)], 0);
    }

    proptest! {
        #[test]
        fn secondary_matches_btree(
            writes in prop::collection::vec((0usize..512, any::<u32>()), 0..200)
        ) {
            let mut side: SecondaryMap<NodeIdx, u32> = SecondaryMap::new_with_default(u32::MAX);
            let mut model = BTreeMap::new();
            for (k, v) in writes.iter() {
                side.insert(NodeIdx::new(*k), *v);
                model.insert(*k, *v);
            }
            for k in 0..512usize {
                let expected = model.get(&k).copied().unwrap_or(u32::MAX);
                prop_assert_eq!(*side.get(NodeIdx::new(k)), expected);
            }
        }

        #[test]
        fn push_returns_dense_keys(count in 0usize..300) {
            let mut map: IndexedMap<NodeIdx, usize> = IndexedMap::new();
            for i in 0..count {
                let k = map.push(i * 2);
                prop_assert_eq!(k.index(), i);
            }
            prop_assert_eq!(map.keys().count(), count);
            for (k, v) in map.iter() {
                prop_assert_eq!(*v, k.index() * 2);
            }
        }
    }
}
