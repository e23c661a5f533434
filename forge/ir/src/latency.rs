//! Clock-cycle latencies and the partial order the scheduler uses to pick
//! the controlling signal of an entry.
use crate::ExitIdx;
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;
use std::hash::Hash;

/// The number of clocks between a GO and the matching DONE.
///
/// A closed latency has a known `[min, max]` range. An *open* latency only
/// knows its minimum and is measured relative to the completion of some
/// [Exit](crate::Exit) (its key); two open latencies are only comparable
/// when they share a key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Latency {
    min_clocks: u32,
    max_clocks: Option<u32>,
    key: Option<ExitIdx>,
}

impl Latency {
    pub const ZERO: Latency = Latency::fixed(0);
    pub const ONE: Latency = Latency::fixed(1);

    pub const fn fixed(clocks: u32) -> Self {
        Latency {
            min_clocks: clocks,
            max_clocks: Some(clocks),
            key: None,
        }
    }

    /// A closed range. Panics if `max < min`.
    pub fn get(min_clocks: u32, max_clocks: u32) -> Self {
        assert!(
            min_clocks <= max_clocks,
            "invalid latency range [{min_clocks}, {max_clocks}]"
        );
        Latency {
            min_clocks,
            max_clocks: Some(max_clocks),
            key: None,
        }
    }

    /// An unbounded latency of at least `min_clocks` after `key` completes.
    pub fn open_at(min_clocks: u32, key: ExitIdx) -> Self {
        Latency {
            min_clocks,
            max_clocks: None,
            key: Some(key),
        }
    }

    /// Forget the upper bound, measuring from `key` instead.
    pub fn open(self, key: ExitIdx) -> Self {
        Latency::open_at(self.min_clocks, key)
    }

    pub fn min_clocks(&self) -> u32 {
        self.min_clocks
    }

    /// The upper bound, or `None` for an open latency.
    pub fn max_clocks(&self) -> Option<u32> {
        self.max_clocks
    }

    pub fn key(&self) -> Option<ExitIdx> {
        self.key
    }

    pub fn is_open(&self) -> bool {
        self.max_clocks.is_none()
    }

    pub fn is_fixed(&self) -> bool {
        self.max_clocks == Some(self.min_clocks)
    }

    /// `self` happens no earlier than `other` on every path.
    pub fn is_ge(&self, other: &Latency) -> bool {
        if self == other {
            return true;
        }
        match (self.max_clocks, other.max_clocks) {
            (Some(max), Some(other_max)) => {
                self.min_clocks >= other.min_clocks && max >= other_max
            }
            // Whatever `self` is open against completes no earlier than
            // zero clocks, so its minimum is a lower bound.
            (None, Some(other_max)) => self.min_clocks >= other_max,
            (Some(_), None) => false,
            (None, None) => {
                self.key == other.key && self.min_clocks >= other.min_clocks
            }
        }
    }

    pub fn is_gt(&self, other: &Latency) -> bool {
        self != other && self.is_ge(other)
    }

    /// The latency of `self` when started after `base` has elapsed.
    pub fn add_to(&self, base: &Latency) -> Latency {
        let min_clocks = self.min_clocks + base.min_clocks;
        match (self.max_clocks, base.max_clocks) {
            (Some(max), Some(base_max)) => Latency {
                min_clocks,
                max_clocks: Some(max + base_max),
                key: None,
            },
            _ => Latency {
                min_clocks,
                max_clocks: None,
                key: base.key.or(self.key),
            },
        }
    }

    /// Latency of a join where any one of the paths completes the join.
    pub fn or(&self, other: &Latency) -> Latency {
        let min_clocks = self.min_clocks.min(other.min_clocks);
        match (self.max_clocks, other.max_clocks) {
            (Some(a), Some(b)) => Latency {
                min_clocks,
                max_clocks: Some(a.max(b)),
                key: None,
            },
            _ => Latency {
                min_clocks,
                max_clocks: None,
                key: self.key.or(other.key),
            },
        }
    }

    /// Latency of a join that waits for every path.
    pub fn and(&self, other: &Latency) -> Latency {
        let min_clocks = self.min_clocks.max(other.min_clocks);
        match (self.max_clocks, other.max_clocks) {
            (Some(a), Some(b)) => Latency {
                min_clocks,
                max_clocks: Some(a.max(b)),
                key: None,
            },
            _ => Latency {
                min_clocks,
                max_clocks: None,
                key: self.key.or(other.key),
            },
        }
    }

    /// [Latency::or] over a set. Returns `None` for an empty set.
    pub fn or_all<'a, I>(lats: I) -> Option<Latency>
    where
        I: IntoIterator<Item = &'a Latency>,
    {
        lats.into_iter().copied().reduce(|a, b| a.or(&b))
    }

    /// [Latency::and] over a set. Returns `None` for an empty set.
    pub fn and_all<'a, I>(lats: I) -> Option<Latency>
    where
        I: IntoIterator<Item = &'a Latency>,
    {
        lats.into_iter().copied().reduce(|a, b| a.and(&b))
    }

    /// Scale a closed latency by a known iteration count. Open latencies are
    /// returned unchanged.
    pub fn repeat(&self, iterations: u32) -> Latency {
        match self.max_clocks {
            Some(max) => Latency::get(
                self.min_clocks * iterations,
                max * iterations,
            ),
            None => *self,
        }
    }

    /// Select the latest entries of `input`.
    ///
    /// The result holds a set of mutually incomparable candidates, each no
    /// earlier than every input it displaced. When two candidates have equal
    /// latencies, an already selected key in `preferred` is kept; otherwise
    /// the later key replaces it.
    pub fn get_latest<K>(
        input: &LinkedHashMap<K, Latency>,
        preferred: &HashSet<K>,
    ) -> LinkedHashMap<K, Latency>
    where
        K: Copy + Eq + Hash,
    {
        let mut latest: Vec<(Latency, K)> = Vec::with_capacity(input.len());
        for (key, latency) in input.iter() {
            let mut add_current = false;
            let mut trash = Vec::new();
            for (idx, (saved, saved_key)) in latest.iter().enumerate() {
                if latency == saved {
                    add_current = !preferred.contains(saved_key);
                    if add_current {
                        trash.push(idx);
                    }
                    break;
                } else if latency.is_ge(saved) {
                    add_current = true;
                    trash.push(idx);
                } else if saved.is_ge(latency) {
                    add_current = false;
                    break;
                } else {
                    add_current = true;
                }
            }
            for idx in trash.into_iter().rev() {
                latest.remove(idx);
            }
            if add_current || latest.is_empty() {
                latest.push((*latency, *key));
            }
        }
        latest.into_iter().map(|(lat, key)| (key, lat)).collect()
    }
}

impl std::fmt::Display for Latency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.max_clocks, self.key) {
            (Some(max), _) if max == self.min_clocks => write!(f, "{max}"),
            (Some(max), _) => write!(f, "[{}, {max}]", self.min_clocks),
            (None, Some(key)) => write!(f, "[{}, ?)@{key}", self.min_clocks),
            (None, None) => write!(f, "[{}, ?)", self.min_clocks),
        }
    }
}

impl std::fmt::Debug for Latency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_idx::IndexRef;
    use proptest::prelude::*;

    fn exit(n: usize) -> ExitIdx {
        ExitIdx::new(n)
    }

    #[test]
    fn fixed_ordering() {
        assert!(Latency::ONE.is_gt(&Latency::ZERO));
        assert!(!Latency::ZERO.is_ge(&Latency::ONE));
        assert!(Latency::ONE.is_ge(&Latency::ONE));
        assert!(!Latency::ONE.is_gt(&Latency::ONE));
    }

    #[test]
    fn overlapping_ranges_are_incomparable() {
        let wide = Latency::get(1, 6);
        let narrow = Latency::get(2, 4);
        assert!(!wide.is_ge(&narrow));
        assert!(!narrow.is_ge(&wide));
    }

    #[test]
    fn open_latencies_compare_by_key() {
        let a = Latency::open_at(3, exit(0));
        let b = Latency::open_at(1, exit(0));
        let c = Latency::open_at(5, exit(1));
        assert!(a.is_gt(&b));
        assert!(!a.is_ge(&c));
        assert!(!c.is_ge(&a));
        assert!(a.is_gt(&Latency::fixed(2)));
        assert!(!Latency::fixed(9).is_ge(&a));
    }

    #[test]
    fn add_to_keeps_base_key() {
        let base = Latency::open_at(2, exit(4));
        let sum = Latency::ONE.add_to(&base);
        assert_eq!(sum, Latency::open_at(3, exit(4)));
        assert_eq!(Latency::get(1, 2).add_to(&Latency::fixed(3)), Latency::get(4, 5));
    }

    #[test]
    fn or_and_of_ranges() {
        let a = Latency::get(1, 3);
        let b = Latency::get(2, 5);
        assert_eq!(a.or(&b), Latency::get(1, 5));
        assert_eq!(a.and(&b), Latency::get(2, 5));
        assert!(a.or(&Latency::open_at(0, exit(2))).is_open());
    }

    #[test]
    fn latest_prefers_preferred_on_ties() {
        let mut input = LinkedHashMap::new();
        input.insert('a', Latency::ONE);
        input.insert('b', Latency::ONE);
        let latest = Latency::get_latest(&input, &HashSet::from(['b']));
        assert_eq!(latest.keys().copied().collect::<Vec<_>>(), vec!['b']);

        let latest = Latency::get_latest(&input, &HashSet::from(['a']));
        assert_eq!(latest.keys().copied().collect::<Vec<_>>(), vec!['a']);
    }

    #[test]
    fn latest_keeps_incomparable() {
        let mut input = LinkedHashMap::new();
        input.insert(0, Latency::ZERO);
        input.insert(1, Latency::open_at(1, exit(0)));
        input.insert(2, Latency::open_at(1, exit(1)));
        let latest = Latency::get_latest(&input, &HashSet::new());
        assert_eq!(latest.len(), 2);
        assert!(!latest.contains_key(&0));
    }

    fn closed() -> impl Strategy<Value = Latency> {
        (0u32..20, 0u32..20).prop_map(|(a, b)| Latency::get(a.min(b), a.max(b)))
    }

    fn any_latency() -> impl Strategy<Value = Latency> {
        prop_oneof![
            closed(),
            (0u32..20, 0usize..3).prop_map(|(m, k)| Latency::open_at(m, exit(k))),
        ]
    }

    proptest! {
        #[test]
        fn or_is_bounded_by_operands(a in closed(), b in closed()) {
            let joined = a.or(&b);
            prop_assert!(joined.min_clocks() <= a.min_clocks());
            prop_assert!(joined.min_clocks() <= b.min_clocks());
            prop_assert_eq!(
                joined.max_clocks(),
                Some(a.max_clocks().unwrap().max(b.max_clocks().unwrap()))
            );
        }

        #[test]
        fn and_dominates_operands(a in closed(), b in closed()) {
            let joined = a.and(&b);
            prop_assert!(joined.is_ge(&a));
            prop_assert!(joined.is_ge(&b));
        }

        #[test]
        fn add_to_is_monotone(a in any_latency(), base in closed()) {
            prop_assert!(a.add_to(&base).min_clocks() >= base.min_clocks());
            if !a.is_open() {
                prop_assert!(a.add_to(&base).is_ge(&base));
            }
        }

        #[test]
        fn latest_dominates_every_input(
            lats in prop::collection::vec(any_latency(), 1..8)
        ) {
            let input: LinkedHashMap<usize, Latency> =
                lats.iter().copied().enumerate().collect();
            let latest = Latency::get_latest(&input, &HashSet::new());
            prop_assert!(!latest.is_empty());
            // Survivors never dominate one another.
            for (ka, a) in latest.iter() {
                for (kb, b) in latest.iter() {
                    if ka != kb {
                        prop_assert!(!(a.is_ge(b) && b.is_ge(a)));
                    }
                }
            }
            // Every survivor was an input.
            for (k, lat) in latest.iter() {
                prop_assert_eq!(input[k], *lat);
            }
        }
    }
}
