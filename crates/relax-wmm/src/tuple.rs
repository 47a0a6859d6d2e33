use std::collections::BTreeSet;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use relax_ir::EventId;

/// An ordered pair of events: one directed candidate edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tuple {
    pub first: EventId,
    pub second: EventId,
}

impl Tuple {
    pub fn new(first: EventId, second: EventId) -> Self {
        Self { first, second }
    }

    pub fn inverse(self) -> Self {
        Self::new(self.second, self.first)
    }

    pub fn is_reflexive(self) -> bool {
        self.first == self.second
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.first, self.second)
    }
}

/// A set of unique tuples with deterministic (insertion-order) iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleSet {
    tuples: IndexSet<Tuple>,
}

impl TupleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tuple: Tuple) -> bool {
        self.tuples.insert(tuple)
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.tuples.contains(tuple)
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.tuples.iter()
    }

    /// Tuples in ascending `(first, second)` order.
    pub fn sorted(&self) -> Vec<Tuple> {
        let mut out: Vec<Tuple> = self.tuples.iter().copied().collect();
        out.sort_unstable();
        out
    }

    pub fn union_with(&mut self, other: &TupleSet) {
        self.tuples.extend(other.tuples.iter().copied());
    }

    pub fn intersection(&self, other: &TupleSet) -> TupleSet {
        self.filter(|t| other.contains(t))
    }

    pub fn difference(&self, other: &TupleSet) -> TupleSet {
        self.filter(|t| !other.contains(t))
    }

    pub fn filter(&self, mut pred: impl FnMut(&Tuple) -> bool) -> TupleSet {
        self.tuples.iter().filter(|t| pred(t)).copied().collect()
    }

    pub fn inverse(&self) -> TupleSet {
        self.tuples.iter().map(|t| t.inverse()).collect()
    }

    pub fn domain(&self) -> BTreeSet<EventId> {
        self.tuples.iter().map(|t| t.first).collect()
    }

    pub fn range(&self) -> BTreeSet<EventId> {
        self.tuples.iter().map(|t| t.second).collect()
    }

    /// Domain and range together.
    pub fn field(&self) -> BTreeSet<EventId> {
        let mut out = self.domain();
        out.extend(self.range());
        out
    }

    /// Successors of every event.
    pub fn by_first(&self) -> IndexMap<EventId, Vec<EventId>> {
        let mut out: IndexMap<EventId, Vec<EventId>> = IndexMap::new();
        for t in &self.tuples {
            out.entry(t.first).or_default().push(t.second);
        }
        out
    }

    /// Predecessors of every event.
    pub fn by_second(&self) -> IndexMap<EventId, Vec<EventId>> {
        let mut out: IndexMap<EventId, Vec<EventId>> = IndexMap::new();
        for t in &self.tuples {
            out.entry(t.second).or_default().push(t.first);
        }
        out
    }

    /// `(a,c)` for every `(a,b)` in `self` and `(b,c)` in `other`.
    pub fn compose(&self, other: &TupleSet) -> TupleSet {
        let succ = other.by_first();
        let mut out = TupleSet::new();
        for t in &self.tuples {
            if let Some(next) = succ.get(&t.second) {
                for &c in next {
                    out.insert(Tuple::new(t.first, c));
                }
            }
        }
        out
    }

    pub fn transitive_closure(&self) -> TupleSet {
        let mut closure = self.clone();
        loop {
            let step = closure.compose(self);
            let before = closure.len();
            closure.union_with(&step);
            if closure.len() == before {
                return closure;
            }
        }
    }

    pub fn is_subset(&self, other: &TupleSet) -> bool {
        self.tuples.iter().all(|t| other.contains(t))
    }
}

impl FromIterator<Tuple> for TupleSet {
    fn from_iter<I: IntoIterator<Item = Tuple>>(iter: I) -> Self {
        Self {
            tuples: iter.into_iter().collect(),
        }
    }
}

impl Extend<Tuple> for TupleSet {
    fn extend<I: IntoIterator<Item = Tuple>>(&mut self, iter: I) {
        self.tuples.extend(iter);
    }
}

impl<'a> IntoIterator for &'a TupleSet {
    type Item = &'a Tuple;
    type IntoIter = indexmap::set::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.tuples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(usize, usize)]) -> TupleSet {
        pairs.iter().map(|&(a, b)| Tuple::new(a, b)).collect()
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut s = TupleSet::new();
        assert!(s.insert(Tuple::new(1, 2)));
        assert!(!s.insert(Tuple::new(1, 2)));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn compose_joins_on_middle_event() {
        let r = set(&[(1, 2), (1, 3)]);
        let s = set(&[(2, 4), (5, 6)]);
        assert_eq!(r.compose(&s), set(&[(1, 4)]));
    }

    #[test]
    fn closure_reaches_fixpoint() {
        let r = set(&[(1, 2), (2, 3), (3, 1)]);
        let c = r.transitive_closure();
        assert_eq!(c.len(), 9);
        assert!(c.contains(&Tuple::new(2, 2)));
        assert!(r.is_subset(&c));
    }

    #[test]
    fn projections_and_inverse() {
        let r = set(&[(1, 2), (3, 2)]);
        assert_eq!(r.domain().into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(r.range().into_iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(r.inverse(), set(&[(2, 1), (2, 3)]));
        assert_eq!(r.by_second().get(&2), Some(&vec![1, 3]));
        assert_eq!(r.difference(&set(&[(1, 2)])), set(&[(3, 2)]));
    }
}
