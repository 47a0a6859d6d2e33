//! Property-based agreement between the eager and refinement strategies.

use proptest::prelude::*;
use relax_engine::{find_violation, verify, CheckMode, VerificationResult, VerifyOptions};
use relax_ir::proptest_generators::arb_program;
use relax_ir::Program;
use relax_smt::sorts::SmtSort;
use relax_smt::terms::SmtTerm;
use relax_wmm::model::{CO, PO, RF};
use relax_wmm::models::{sc, tso};
use relax_wmm::{AxiomKind, MemoryModel, RelationKind};

/// Ask for every register to hold the matching entry of `values`.
fn with_register_goal(mut program: Program, values: &[i64]) -> Program {
    let goal = program
        .declarations
        .iter()
        .filter(|(_, sort)| **sort == SmtSort::Int)
        .zip(values.iter().cycle())
        .map(|((reg, _), &v)| SmtTerm::var(reg.as_str()).eq(SmtTerm::int(v)));
    program.assertion = Some(SmtTerm::and_all(goal));
    program
}

/// Closure, difference and fencerel: `irreflexive (po | rf | co | fr)^+` and
/// `acyclic (po \ fencerel(Mfence)) | rf | co | fr`.
fn derived_model() -> MemoryModel {
    let mut m = MemoryModel::new().with_name("derived");
    let rf_inv = m.add(RelationKind::Inverse(RF)).unwrap();
    let fr = m.define("fr", RelationKind::Composition(rf_inv, CO)).unwrap();
    let com = m.add(RelationKind::Union(vec![PO, RF, CO, fr])).unwrap();
    let hb = m.define("hb", RelationKind::TransitiveClosure(com)).unwrap();
    m.axiom_on(AxiomKind::Irreflexive, hb, false).unwrap();
    let fence = m.add(RelationKind::FenceRel("Mfence".into())).unwrap();
    let unfenced = m.add(RelationKind::Difference(PO, fence)).unwrap();
    let ghb = m.add(RelationKind::Union(vec![unfenced, RF, CO, fr])).unwrap();
    m.axiom_on(AxiomKind::Acyclic, ghb, false).unwrap();
    m.validate().unwrap();
    m
}

/// `total co` and `~empty rf`.
fn ordering_model() -> MemoryModel {
    let mut m = MemoryModel::new().with_name("ordering");
    m.axiom(AxiomKind::Total, "co", false).unwrap();
    m.axiom(AxiomKind::Empty, "rf", true).unwrap();
    m.validate().unwrap();
    m
}

fn opts(mode: CheckMode) -> VerifyOptions {
    VerifyOptions {
        mode,
        timeout_secs: 60,
        ..VerifyOptions::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn eager_and_refinement_agree(
        program in arb_program(),
        values in proptest::collection::vec(0..=3i64, 1..=6),
    ) {
        let program = with_register_goal(program, &values);
        for model in [sc().unwrap(), tso().unwrap(), derived_model(), ordering_model()] {
            let eager = verify(&program, &model, &opts(CheckMode::Eager)).unwrap();
            let refined = verify(&program, &model, &opts(CheckMode::Refinement)).unwrap();
            prop_assert_eq!(eager.verdict_class(), refined.verdict_class(), "{}", model.name);
        }
    }

    /// Every SC execution is also a TSO execution.
    #[test]
    fn sc_reachable_implies_tso_reachable(
        program in arb_program(),
        values in proptest::collection::vec(0..=3i64, 1..=6),
    ) {
        let program = with_register_goal(program, &values);
        let under_sc = verify(&program, &sc().unwrap(), &opts(CheckMode::Refinement)).unwrap();
        if under_sc.is_reachable() {
            let under_tso = verify(&program, &tso().unwrap(), &opts(CheckMode::Refinement)).unwrap();
            prop_assert!(under_tso.is_reachable());
        }
    }

    /// The closure-based model is SC under another name.
    #[test]
    fn closure_model_matches_sc(
        program in arb_program(),
        values in proptest::collection::vec(0..=3i64, 1..=6),
    ) {
        let program = with_register_goal(program, &values);
        let mut closure_sc = MemoryModel::new().with_name("closure-sc");
        let rf_inv = closure_sc.add(RelationKind::Inverse(RF)).unwrap();
        let fr = closure_sc.define("fr", RelationKind::Composition(rf_inv, CO)).unwrap();
        let com = closure_sc.add(RelationKind::Union(vec![PO, RF, CO, fr])).unwrap();
        let hb = closure_sc.define("hb", RelationKind::TransitiveClosure(com)).unwrap();
        closure_sc.axiom_on(AxiomKind::Irreflexive, hb, false).unwrap();

        let under_sc = verify(&program, &sc().unwrap(), &opts(CheckMode::Eager)).unwrap();
        let under_closure = verify(&program, &closure_sc, &opts(CheckMode::Refinement)).unwrap();
        prop_assert_eq!(under_sc.verdict_class(), under_closure.verdict_class());
    }

    /// `po` alone is acyclic, so an SC violation needs communication edges.
    #[test]
    fn violations_involve_communication(program in arb_program()) {
        let model = sc().unwrap();
        let result = find_violation(&program, &model, &opts(CheckMode::Eager)).unwrap();
        if let VerificationResult::Reachable { witness } = &result {
            prop_assert!(!witness.rf.is_empty() || !witness.co.is_empty());
        }
    }
}
