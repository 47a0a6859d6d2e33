use indexmap::{IndexMap, IndexSet};

use crate::axiom::{Axiom, AxiomKind};
use crate::error::WmmError;
use crate::relation::{Relation, RelationId, RelationKind};

pub const PO: RelationId = 0;
pub const RF: RelationId = 1;
pub const CO: RelationId = 2;
pub const LOC: RelationId = 3;
pub const ID: RelationId = 4;
pub const INT: RelationId = 5;
pub const EXT: RelationId = 6;
pub const EMPTY: RelationId = 7;

/// A memory model: a relation arena, a name table and a list of axioms.
///
/// Relations are referenced by [`RelationId`]. Names can be declared ahead
/// of their definition; [`MemoryModel::validate`] rejects any that stay
/// unresolved, as well as recursive definitions.
#[derive(Debug, Clone)]
pub struct MemoryModel {
    pub name: String,
    relations: Vec<Relation>,
    names: IndexMap<String, RelationId>,
    pending: IndexSet<RelationId>,
    anonymous: IndexMap<RelationKind, RelationId>,
    axioms: Vec<Axiom>,
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryModel {
    pub fn new() -> Self {
        let mut model = Self {
            name: String::new(),
            relations: Vec::new(),
            names: IndexMap::new(),
            pending: IndexSet::new(),
            anonymous: IndexMap::new(),
            axioms: Vec::new(),
        };
        for (name, kind) in [
            ("po", RelationKind::ProgramOrder),
            ("rf", RelationKind::ReadsFrom),
            ("co", RelationKind::Coherence),
            ("loc", RelationKind::SameLocation),
            ("id", RelationKind::Identity),
            ("int", RelationKind::Internal),
            ("ext", RelationKind::External),
            ("0", RelationKind::EmptyRel),
        ] {
            model.push(name.to_string(), kind);
        }
        model
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn push(&mut self, name: String, kind: RelationKind) -> RelationId {
        let id = self.relations.len();
        self.names.insert(name.clone(), id);
        self.relations.push(Relation { id, name, kind });
        id
    }

    fn check_operands(&self, kind: &RelationKind) -> Result<(), WmmError> {
        match kind.operands().into_iter().find(|&op| op >= self.relations.len()) {
            Some(op) => Err(WmmError::DanglingRelation(op)),
            None => Ok(()),
        }
    }

    /// Reserve `name` for a later [`MemoryModel::define`].
    pub fn declare(&mut self, name: &str) -> Result<RelationId, WmmError> {
        match self.names.get(name) {
            Some(&id) if self.pending.contains(&id) => Ok(id),
            Some(_) => Err(WmmError::Redefinition(name.to_string())),
            None => {
                let id = self.push(name.to_string(), RelationKind::EmptyRel);
                self.pending.insert(id);
                Ok(id)
            }
        }
    }

    pub fn define(&mut self, name: &str, kind: RelationKind) -> Result<RelationId, WmmError> {
        self.check_operands(&kind)?;
        match self.names.get(name) {
            Some(&id) if self.pending.shift_remove(&id) => {
                self.relations[id].kind = kind;
                Ok(id)
            }
            Some(_) => Err(WmmError::Redefinition(name.to_string())),
            None => Ok(self.push(name.to_string(), kind)),
        }
    }

    /// Add an unnamed relation, labelled by its term. Structurally identical
    /// terms share one relation.
    pub fn add(&mut self, kind: RelationKind) -> Result<RelationId, WmmError> {
        self.check_operands(&kind)?;
        if let Some(&id) = self.anonymous.get(&kind) {
            return Ok(id);
        }
        let mut name = self.term(&kind);
        if self.names.contains_key(&name) {
            name = format!("{name}#{}", self.relations.len());
        }
        let id = self.push(name, kind.clone());
        self.anonymous.insert(kind, id);
        Ok(id)
    }

    fn term(&self, kind: &RelationKind) -> String {
        let n = |id: &RelationId| self.relations[*id].name.as_str();
        let join = |ops: &[RelationId], sep: &str| {
            let parts: Vec<&str> = ops.iter().map(n).collect();
            format!("({})", parts.join(sep))
        };
        match kind {
            RelationKind::ProgramOrder => "po".into(),
            RelationKind::ReadsFrom => "rf".into(),
            RelationKind::Coherence => "co".into(),
            RelationKind::SameLocation => "loc".into(),
            RelationKind::Identity => "id".into(),
            RelationKind::Internal => "int".into(),
            RelationKind::External => "ext".into(),
            RelationKind::EmptyRel => "0".into(),
            RelationKind::FenceRel(fence) => format!("fencerel({fence})"),
            RelationKind::Union(ops) => join(ops, " | "),
            RelationKind::Intersection(ops) => join(ops, " & "),
            RelationKind::Difference(a, b) => format!("({} \\ {})", n(a), n(b)),
            RelationKind::Inverse(r) => format!("{}^-1", n(r)),
            RelationKind::Composition(a, b) => format!("({} ; {})", n(a), n(b)),
            RelationKind::TransitiveClosure(r) => format!("{}^+", n(r)),
            RelationKind::Cartesian(f1, f2) => format!("({f1} * {f2})"),
        }
    }

    pub fn relation(&self, name: &str) -> Result<RelationId, WmmError> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| WmmError::UndefinedRelation(name.to_string()))
    }

    pub fn get(&self, id: RelationId) -> &Relation {
        &self.relations[id]
    }

    pub fn name_of(&self, id: RelationId) -> &str {
        &self.relations[id].name
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn axioms(&self) -> &[Axiom] {
        &self.axioms
    }

    /// Add an axiom over the relation called `relation`.
    pub fn axiom(&mut self, kind: AxiomKind, relation: &str, negate: bool) -> Result<(), WmmError> {
        let id = self.relation(relation)?;
        self.axiom_on(kind, id, negate)
    }

    pub fn axiom_on(
        &mut self,
        kind: AxiomKind,
        relation: RelationId,
        negate: bool,
    ) -> Result<(), WmmError> {
        let rel = self
            .relations
            .get(relation)
            .ok_or(WmmError::DanglingRelation(relation))?;
        self.axioms.push(Axiom {
            kind,
            relation,
            negate,
            label: rel.name.clone(),
        });
        Ok(())
    }

    /// True when the relation's edges never depend on `rf` or `co`.
    pub fn is_static(&self, id: RelationId) -> bool {
        let mut stack = vec![id];
        let mut seen = IndexSet::new();
        while let Some(r) = stack.pop() {
            if !seen.insert(r) {
                continue;
            }
            match &self.relations[r].kind {
                RelationKind::ReadsFrom | RelationKind::Coherence => return false,
                kind => stack.extend(kind.operands()),
            }
        }
        true
    }

    /// Check the model is encodable. Must succeed before analysis.
    pub fn validate(&self) -> Result<(), WmmError> {
        if let Some(&id) = self.pending.first() {
            return Err(WmmError::Unsupported(format!(
                "relation '{}' is declared but never defined",
                self.relations[id].name
            )));
        }
        for rel in &self.relations {
            self.check_operands(&rel.kind)?;
        }
        self.check_acyclic_definitions()?;
        for rel in &self.relations {
            match &rel.kind {
                RelationKind::Union(ops) | RelationKind::Intersection(ops) if ops.is_empty() => {
                    return Err(WmmError::IncompatibleOperands(rel.name.clone()));
                }
                RelationKind::Difference(_, sub) if !self.is_static(*sub) => {
                    return Err(WmmError::Unsupported(format!(
                        "'{}' subtracts '{}', which depends on rf or co",
                        rel.name,
                        self.name_of(*sub)
                    )));
                }
                _ => {}
            }
        }
        for axiom in &self.axioms {
            if axiom.relation >= self.relations.len() {
                return Err(WmmError::DanglingRelation(axiom.relation));
            }
        }
        Ok(())
    }

    fn check_acyclic_definitions(&self) -> Result<(), WmmError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }
        let mut marks = vec![Mark::New; self.relations.len()];
        for root in 0..self.relations.len() {
            if marks[root] != Mark::New {
                continue;
            }
            // (relation, operands already pushed)
            let mut stack = vec![(root, false)];
            while let Some((r, expanded)) = stack.pop() {
                if expanded {
                    marks[r] = Mark::Done;
                    continue;
                }
                match marks[r] {
                    Mark::Done => continue,
                    Mark::Active => {
                        return Err(WmmError::Unsupported(format!(
                            "recursive definition of '{}'",
                            self.relations[r].name
                        )))
                    }
                    Mark::New => {}
                }
                marks[r] = Mark::Active;
                stack.push((r, true));
                for op in self.relations[r].kind.operands() {
                    match marks[op] {
                        Mark::Active => {
                            return Err(WmmError::Unsupported(format!(
                                "recursive definition of '{}'",
                                self.relations[op].name
                            )))
                        }
                        Mark::New => stack.push((op, false)),
                        Mark::Done => {}
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relax_ir::EventFilter;

    #[test]
    fn base_relations_are_preregistered() {
        let m = MemoryModel::new();
        assert_eq!(m.relation("po"), Ok(PO));
        assert_eq!(m.relation("co"), Ok(CO));
        assert_eq!(m.relation("0"), Ok(EMPTY));
        assert_eq!(
            m.relation("hb"),
            Err(WmmError::UndefinedRelation("hb".into()))
        );
    }

    #[test]
    fn anonymous_relations_are_named_by_term_and_shared() {
        let mut m = MemoryModel::new();
        let a = m.add(RelationKind::Union(vec![PO, RF])).unwrap();
        let b = m.add(RelationKind::Union(vec![PO, RF])).unwrap();
        assert_eq!(a, b);
        assert_eq!(m.name_of(a), "(po | rf)");
        let inv = m.add(RelationKind::Inverse(RF)).unwrap();
        let fr = m.add(RelationKind::Composition(inv, CO)).unwrap();
        assert_eq!(m.name_of(fr), "(rf^-1 ; co)");
        let cart = m
            .add(RelationKind::Cartesian(EventFilter::Read, EventFilter::Memory))
            .unwrap();
        assert_eq!(m.name_of(cart), "(R * M)");
    }

    #[test]
    fn forward_declaration_then_definition() {
        let mut m = MemoryModel::new();
        let hb = m.declare("hb").unwrap();
        let closure = m.add(RelationKind::TransitiveClosure(hb)).unwrap();
        assert!(m.validate().is_err());
        assert_eq!(m.define("hb", RelationKind::Union(vec![PO, RF])), Ok(hb));
        m.axiom_on(AxiomKind::Acyclic, closure, false).unwrap();
        assert_eq!(m.validate(), Ok(()));
        assert_eq!(
            m.define("hb", RelationKind::EmptyRel),
            Err(WmmError::Redefinition("hb".into()))
        );
    }

    #[test]
    fn recursive_definition_is_unsupported() {
        let mut m = MemoryModel::new();
        let r = m.declare("r").unwrap();
        let seq = m.add(RelationKind::Composition(r, PO)).unwrap();
        m.define("r", RelationKind::Union(vec![PO, seq])).unwrap();
        assert!(matches!(m.validate(), Err(WmmError::Unsupported(msg)) if msg.contains("recursive")));
    }

    #[test]
    fn dynamic_subtrahend_is_unsupported() {
        let mut m = MemoryModel::new();
        m.define("bad", RelationKind::Difference(PO, RF)).unwrap();
        assert!(matches!(m.validate(), Err(WmmError::Unsupported(_))));

        let mut m = MemoryModel::new();
        m.define("ok", RelationKind::Difference(RF, INT)).unwrap();
        assert_eq!(m.validate(), Ok(()));
    }

    #[test]
    fn malformed_models_are_reported() {
        let mut m = MemoryModel::new();
        assert_eq!(
            m.axiom(AxiomKind::Acyclic, "hb", false),
            Err(WmmError::UndefinedRelation("hb".into()))
        );
        assert_eq!(
            m.add(RelationKind::Inverse(99)),
            Err(WmmError::DanglingRelation(99))
        );
        m.define("none", RelationKind::Union(vec![])).unwrap();
        assert_eq!(
            m.validate(),
            Err(WmmError::IncompatibleOperands("none".into()))
        );
    }

    #[test]
    fn static_relations_exclude_rf_and_co() {
        let mut m = MemoryModel::new();
        let po_loc = m.add(RelationKind::Intersection(vec![PO, LOC])).unwrap();
        let hb = m.add(RelationKind::Union(vec![po_loc, RF])).unwrap();
        assert!(m.is_static(po_loc));
        assert!(!m.is_static(hb));
    }
}
