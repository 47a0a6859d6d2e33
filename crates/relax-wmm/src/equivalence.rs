use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use relax_ir::{EventId, Program};
use relax_smt::solver::Model;
use relax_smt::terms::SmtTerm;

use crate::error::WmmError;
use crate::tuple::{Tuple, TupleSet};

/// Handle to a class of an [`Equivalence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

#[derive(Debug, Clone)]
struct Class<T> {
    members: IndexSet<T>,
    representative: Option<T>,
}

/// A partition of elements into disjoint classes.
///
/// Every element belongs to at most one class. A class may name one of its
/// members as representative; when that member leaves, the earliest
/// remaining member takes over. Passing a removed [`ClassId`] to any
/// accessor panics: it means the caller lost track of the partition.
#[derive(Debug, Clone)]
pub struct Equivalence<T: Eq + Hash + Clone> {
    classes: Vec<Option<Class<T>>>,
    class_of: HashMap<T, ClassId>,
    live: usize,
}

impl<T: Eq + Hash + Clone> Default for Equivalence<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Equivalence<T> {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            class_of: HashMap::new(),
            live: 0,
        }
    }

    pub fn with_capacity(elements: usize, classes: usize) -> Self {
        Self {
            classes: Vec::with_capacity(classes),
            class_of: HashMap::with_capacity(elements),
            live: 0,
        }
    }

    fn class(&self, c: ClassId) -> &Class<T> {
        match self.classes.get(c.0) {
            Some(Some(class)) => class,
            _ => panic!("equivalence class {c:?} is not live"),
        }
    }

    fn class_mut(&mut self, c: ClassId) -> &mut Class<T> {
        match self.classes.get_mut(c.0) {
            Some(Some(class)) => class,
            _ => panic!("equivalence class {c:?} is not live"),
        }
    }

    pub fn new_class(&mut self) -> ClassId {
        let id = ClassId(self.classes.len());
        self.classes.push(Some(Class {
            members: IndexSet::new(),
            representative: None,
        }));
        self.live += 1;
        id
    }

    pub fn class_of(&self, x: &T) -> Option<ClassId> {
        self.class_of.get(x).copied()
    }

    pub fn members(&self, c: ClassId) -> &IndexSet<T> {
        &self.class(c).members
    }

    pub fn representative(&self, c: ClassId) -> Option<&T> {
        self.class(c).representative.as_ref()
    }

    /// Make `x` the representative of `c`. No-op when `x` is not a member.
    pub fn set_representative(&mut self, c: ClassId, x: T) {
        let class = self.class_mut(c);
        if class.members.contains(&x) {
            class.representative = Some(x);
        }
    }

    fn detach(&mut self, x: &T, from: ClassId) {
        let class = self.class_mut(from);
        class.members.shift_remove(x);
        if class.representative.as_ref() == Some(x) {
            class.representative = class.members.first().cloned();
        }
    }

    /// Move `x` into `c`, leaving its previous class first. Returns false
    /// when `x` already belonged to `c`.
    pub fn add_internal(&mut self, x: T, c: ClassId) -> bool {
        // Validate the target before touching the source class.
        self.class(c);
        match self.class_of(&x) {
            Some(old) if old == c => return false,
            Some(old) => self.detach(&x, old),
            None => {}
        }
        let class = self.class_mut(c);
        class.members.insert(x.clone());
        if class.representative.is_none() {
            class.representative = Some(x.clone());
        }
        self.class_of.insert(x, c);
        true
    }

    pub fn add_all_internal(&mut self, xs: impl IntoIterator<Item = T>, c: ClassId) -> bool {
        let mut changed = false;
        for x in xs {
            changed |= self.add_internal(x, c);
        }
        changed
    }

    /// Move every member of `b` into `a` and drop `b`.
    pub fn merge_classes(&mut self, a: ClassId, b: ClassId) {
        if a == b {
            return;
        }
        self.class(a);
        let moved = match self.classes.get_mut(b.0).and_then(Option::take) {
            Some(class) => class,
            None => panic!("equivalence class {b:?} is not live"),
        };
        self.live -= 1;
        let target = self.class_mut(a);
        if target.representative.is_none() {
            target.representative = moved.representative.clone();
        }
        target.members.extend(moved.members.iter().cloned());
        for x in moved.members {
            self.class_of.insert(x, a);
        }
    }

    /// Drop `c` and forget its members. Returns false if `c` was already
    /// removed.
    pub fn remove_class(&mut self, c: ClassId) -> bool {
        let Some(class) = self.classes.get_mut(c.0).and_then(Option::take) else {
            return false;
        };
        self.live -= 1;
        for x in &class.members {
            self.class_of.remove(x);
        }
        true
    }

    pub fn remove_empty_classes(&mut self) -> bool {
        let empty: Vec<ClassId> = self
            .classes()
            .filter(|&c| self.members(c).is_empty())
            .collect();
        for &c in &empty {
            self.remove_class(c);
        }
        !empty.is_empty()
    }

    /// Live classes in creation order.
    pub fn classes(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.classes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| ClassId(i))
    }

    pub fn num_classes(&self) -> usize {
        self.live
    }

    pub fn len(&self) -> usize {
        self.class_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_of.is_empty()
    }

    /// Check that classes are disjoint, non-empty and agree with the
    /// element map, and that representatives are members.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut counted = 0;
        for c in self.classes() {
            let class = self.class(c);
            if class.members.is_empty() {
                return Err(format!("class {c:?} is empty"));
            }
            for x in &class.members {
                if self.class_of.get(x) != Some(&c) {
                    return Err(format!("member of {c:?} maps elsewhere"));
                }
            }
            if let Some(rep) = &class.representative {
                if !class.members.contains(rep) {
                    return Err(format!("representative of {c:?} is not a member"));
                }
            }
            counted += class.members.len();
        }
        if counted != self.class_of.len() {
            return Err(format!(
                "{} mapped elements but {counted} class members",
                self.class_of.len()
            ));
        }
        Ok(())
    }
}

/// Events grouped by syntactically identical `executes` guards.
///
/// All members of a class execute together, so decoding a model needs one
/// guard evaluation per class. Representatives are the lowest event id.
pub struct BranchEquivalence {
    partition: Equivalence<EventId>,
    guards: IndexMap<ClassId, SmtTerm>,
}

impl BranchEquivalence {
    pub fn new(program: &Program) -> Self {
        let mut partition = Equivalence::with_capacity(program.len(), program.len());
        let mut by_guard: HashMap<&SmtTerm, ClassId> = HashMap::new();
        let mut guards = IndexMap::new();
        for e in &program.events {
            let c = *by_guard.entry(e.executes()).or_insert_with(|| {
                let c = partition.new_class();
                guards.insert(c, e.executes().clone());
                c
            });
            partition.add_internal(e.id, c);
        }
        Self { partition, guards }
    }

    pub fn partition(&self) -> &Equivalence<EventId> {
        &self.partition
    }

    /// Which events execute under `model`, indexed by event id.
    pub fn executed(&self, model: &Model) -> Result<Vec<bool>, WmmError> {
        let mut out = vec![false; self.partition.len()];
        for (&c, guard) in &self.guards {
            let value = model.eval_bool(guard).ok_or_else(|| {
                let mut vars = Vec::new();
                guard.free_vars(&mut vars);
                WmmError::IncompleteModel(vars.join(", "))
            })?;
            if value {
                for &e in self.partition.members(c) {
                    out[e] = true;
                }
            }
        }
        Ok(out)
    }
}

/// Strongly connected components of a concrete relation graph.
///
/// Classes are built by merging per-event singletons along mutually
/// reachable pairs; events on no cycle are dropped, so `class_of(e)` is
/// `Some` exactly when `e` lies on a cycle. Each class is represented by its
/// lowest event id.
pub struct CycleEquivalence {
    partition: Equivalence<EventId>,
    edges: TupleSet,
}

impl CycleEquivalence {
    pub fn new(edges: &TupleSet) -> Self {
        let closure = edges.transitive_closure();
        let mut partition = Equivalence::new();
        for e in edges.field() {
            let c = partition.new_class();
            partition.add_internal(e, c);
        }
        for t in closure.sorted() {
            if t.first >= t.second || !closure.contains(&t.inverse()) {
                continue;
            }
            let (Some(ca), Some(cb)) = (partition.class_of(&t.first), partition.class_of(&t.second))
            else {
                continue;
            };
            if ca == cb {
                continue;
            }
            let rep = |c| partition.representative(c).copied().unwrap_or(usize::MAX);
            let (keep, drop) = if rep(ca) <= rep(cb) { (ca, cb) } else { (cb, ca) };
            partition.merge_classes(keep, drop);
        }
        let acyclic: Vec<ClassId> = partition
            .classes()
            .filter(|&c| {
                let members = partition.members(c);
                members.len() == 1
                    && members
                        .first()
                        .is_some_and(|&e| !closure.contains(&Tuple::new(e, e)))
            })
            .collect();
        for c in acyclic {
            partition.remove_class(c);
        }
        for c in partition.classes().collect::<Vec<_>>() {
            if let Some(&min) = partition.members(c).iter().min() {
                partition.set_representative(c, min);
            }
        }
        Self {
            partition,
            edges: edges.clone(),
        }
    }

    pub fn partition(&self) -> &Equivalence<EventId> {
        &self.partition
    }

    pub fn is_on_cycle(&self, e: EventId) -> bool {
        self.partition.class_of(&e).is_some()
    }

    /// Shortest cycle through the representative of the class with the lowest
    /// representative, exploring successors in ascending id order.
    pub fn witness(&self) -> Option<Vec<Tuple>> {
        let class = self
            .partition
            .classes()
            .min_by_key(|&c| self.partition.representative(c).copied())?;
        let start = *self.partition.representative(class)?;
        let members = self.partition.members(class);
        let mut succ: IndexMap<EventId, Vec<EventId>> = IndexMap::new();
        for t in self.edges.sorted() {
            if members.contains(&t.first) && members.contains(&t.second) {
                succ.entry(t.first).or_default().push(t.second);
            }
        }

        let mut parent: HashMap<EventId, EventId> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &next in succ.get(&node).into_iter().flatten() {
                if next == start {
                    let mut cycle = vec![Tuple::new(node, start)];
                    let mut cur = node;
                    while cur != start {
                        let prev = parent[&cur];
                        cycle.push(Tuple::new(prev, cur));
                        cur = prev;
                    }
                    cycle.reverse();
                    return Some(cycle);
                }
                if let std::collections::hash_map::Entry::Vacant(slot) = parent.entry(next) {
                    slot.insert(node);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relax_ir::ProgramBuilder;
    use relax_smt::solver::ModelValue;
    use relax_smt::sorts::SmtSort;

    #[test]
    fn moving_an_element_updates_both_classes() {
        let mut eq = Equivalence::new();
        let a = eq.new_class();
        let b = eq.new_class();
        assert!(eq.add_all_internal(["x", "y", "z"], a));
        assert_eq!(eq.representative(a), Some(&"x"));
        assert!(eq.add_internal("x", b));
        assert!(!eq.add_internal("x", b));
        assert_eq!(eq.class_of(&"x"), Some(b));
        assert_eq!(eq.representative(a), Some(&"y"));
        assert_eq!(eq.representative(b), Some(&"x"));
        assert_eq!(eq.check_invariants(), Ok(()));
    }

    #[test]
    fn set_representative_ignores_non_members() {
        let mut eq = Equivalence::new();
        let a = eq.new_class();
        eq.add_internal(1, a);
        eq.add_internal(2, a);
        eq.set_representative(a, 7);
        assert_eq!(eq.representative(a), Some(&1));
        eq.set_representative(a, 2);
        assert_eq!(eq.representative(a), Some(&2));
    }

    #[test]
    fn merge_and_remove() {
        let mut eq = Equivalence::new();
        let a = eq.new_class();
        let b = eq.new_class();
        let empty = eq.new_class();
        eq.add_internal(1, a);
        eq.add_all_internal([2, 3], b);
        eq.merge_classes(a, b);
        assert_eq!(eq.class_of(&3), Some(a));
        assert_eq!(eq.members(a).len(), 3);
        assert_eq!(eq.num_classes(), 2);
        assert!(eq.check_invariants().is_err());
        assert!(eq.remove_empty_classes());
        assert_eq!(eq.check_invariants(), Ok(()));
        assert!(eq.remove_class(a));
        assert!(!eq.remove_class(a));
        assert!(!eq.remove_class(empty));
        assert_eq!(eq.class_of(&1), None);
        assert!(eq.is_empty());
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn dead_class_handles_panic() {
        let mut eq = Equivalence::new();
        let a = eq.new_class();
        let b = eq.new_class();
        eq.add_internal(1, b);
        eq.merge_classes(a, b);
        eq.members(b);
    }

    #[test]
    fn branch_classes_share_guards() {
        let mut b = ProgramBuilder::new("branches");
        let x = b.location("x", 0);
        let t = b.thread();
        b.declare("c", SmtSort::Bool);
        b.store(t, x, SmtTerm::int(1));
        let (s1, s2) = b.with_guard(SmtTerm::var("c"), |b| {
            (b.store(t, x, SmtTerm::int(2)), b.store(t, x, SmtTerm::int(3)))
        });
        let p = b.build().unwrap();
        let branches = BranchEquivalence::new(&p);
        assert_eq!(branches.partition().num_classes(), 2);
        let c = branches.partition().class_of(&s1).unwrap();
        assert_eq!(branches.partition().class_of(&s2), Some(c));
        assert_eq!(branches.partition().representative(c), Some(&s1));

        let mut model = Model::default();
        model.values.insert("c".into(), ModelValue::Bool(false));
        assert_eq!(branches.executed(&model), Ok(vec![true, true, false, false]));
        assert!(matches!(
            branches.executed(&Model::default()),
            Err(WmmError::IncompleteModel(v)) if v == "c"
        ));
    }

    #[test]
    fn cycle_classes_are_sccs() {
        let edges: TupleSet = [(5, 3), (3, 4), (4, 5), (1, 2), (7, 7), (4, 1)]
            .into_iter()
            .map(|(a, b)| Tuple::new(a, b))
            .collect();
        let cycles = CycleEquivalence::new(&edges);
        assert!(cycles.is_on_cycle(3) && cycles.is_on_cycle(5) && cycles.is_on_cycle(7));
        assert!(!cycles.is_on_cycle(1) && !cycles.is_on_cycle(2));
        assert_eq!(cycles.partition().num_classes(), 2);
        assert_eq!(cycles.partition().check_invariants(), Ok(()));
        assert_eq!(
            cycles.witness(),
            Some(vec![Tuple::new(3, 4), Tuple::new(4, 5), Tuple::new(5, 3)])
        );
    }

    #[test]
    fn self_loop_is_its_own_witness() {
        let edges: TupleSet = [Tuple::new(2, 2), Tuple::new(1, 2)].into_iter().collect();
        let cycles = CycleEquivalence::new(&edges);
        assert_eq!(cycles.witness(), Some(vec![Tuple::new(2, 2)]));
        assert!(CycleEquivalence::new(&TupleSet::new()).witness().is_none());
    }
}
