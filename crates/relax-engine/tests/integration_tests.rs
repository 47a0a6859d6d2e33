use relax_engine::{
    find_violation, verify, verify_all, verify_with_cancel, CancelFlag, CheckMode, EngineError,
    SolverChoice, VerificationResult, VerificationTask, VerifyOptions,
};
use std::time::{Duration, Instant};

use relax_ir::{Program, ProgramBuilder};
use relax_smt::sorts::SmtSort;
use relax_smt::terms::SmtTerm;
use relax_wmm::models::{sc, tso};
use relax_wmm::{MemoryModel, Tuple, WmmError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn opts(mode: CheckMode) -> VerifyOptions {
    VerifyOptions {
        mode,
        timeout_secs: 60,
        ..VerifyOptions::default()
    }
}

fn reg_is(reg: &str, v: i64) -> SmtTerm {
    SmtTerm::var(reg).eq(SmtTerm::int(v))
}

/// Events: 0 init x, 1 init y, then per thread a store and a load (with an
/// `Mfence` in between when `fenced`).
fn store_buffering(fenced: bool) -> Program {
    let mut b = ProgramBuilder::new("SB");
    let x = b.location("x", 0);
    let y = b.location("y", 0);
    for (me, other, reg) in [(x, y, "r0"), (y, x, "r1")] {
        let t = b.thread();
        b.store(t, me, SmtTerm::int(1));
        if fenced {
            b.fence(t, "Mfence");
        }
        b.load(t, other, reg);
    }
    b.assert_reachable(SmtTerm::and_all([reg_is("r0", 0), reg_is("r1", 0)]));
    b.build().unwrap()
}

fn message_passing() -> Program {
    let mut b = ProgramBuilder::new("MP");
    let x = b.location("x", 0);
    let y = b.location("y", 0);
    let t0 = b.thread();
    let t1 = b.thread();
    b.store(t0, x, SmtTerm::int(1));
    b.store(t0, y, SmtTerm::int(1));
    b.load(t1, y, "r0");
    b.load(t1, x, "r1");
    b.assert_reachable(SmtTerm::and_all([reg_is("r0", 1), reg_is("r1", 0)]));
    b.build().unwrap()
}

fn verdict(program: &Program, model: &MemoryModel, mode: CheckMode) -> &'static str {
    verify(program, model, &opts(mode))
        .unwrap_or_else(|e| panic!("{}: {e}", program.name))
        .verdict_class()
}

#[test]
fn sb_verdicts_agree_across_strategies() {
    init_tracing();
    let cases = [
        (store_buffering(false), sc().unwrap(), "unreachable"),
        (store_buffering(false), tso().unwrap(), "reachable"),
        (store_buffering(true), tso().unwrap(), "unreachable"),
        (message_passing(), tso().unwrap(), "unreachable"),
        (message_passing(), MemoryModel::new(), "reachable"),
    ];
    for (program, model, expected) in &cases {
        for mode in [CheckMode::Eager, CheckMode::Refinement] {
            assert_eq!(
                verdict(program, model, mode),
                *expected,
                "{} under {} ({mode:?})",
                program.name,
                model.name
            );
        }
    }
}

#[test]
fn tso_witness_reads_both_initial_values() {
    init_tracing();
    let result = verify(&store_buffering(false), &tso().unwrap(), &opts(CheckMode::Refinement))
        .unwrap();
    let witness = result.witness().expect("SB is reachable under TSO");
    assert_eq!(witness.rf, vec![Tuple::new(0, 5), Tuple::new(1, 3)]);
    assert_eq!(witness.events.len(), 6);
    assert!(witness
        .final_values
        .iter()
        .all(|(name, v)| (name == "x" || name == "y") && *v == 1));
    assert!(result.to_string().starts_with("RESULT: REACHABLE"));
}

#[test]
fn refinement_reports_its_rounds() {
    init_tracing();
    let report = verify_with_cancel(
        &message_passing(),
        &sc().unwrap(),
        &opts(CheckMode::Refinement),
        &CancelFlag::new(),
    )
    .unwrap();
    assert!(matches!(report.result, VerificationResult::Unreachable));
    assert!(report.stats.rounds >= 1);
    assert_eq!(report.stats.rounds, report.stats.refinements + 1);
}

#[test]
fn find_violation_looks_for_forbidden_executions() {
    init_tracing();
    let options = opts(CheckMode::Eager);
    let sc = sc().unwrap();
    let sb = find_violation(&store_buffering(false), &sc, &options).unwrap();
    assert_eq!(sb.verdict_class(), "reachable");

    // Without axioms nothing can be violated.
    let none = find_violation(&message_passing(), &MemoryModel::new(), &options).unwrap();
    assert!(matches!(none, VerificationResult::Unreachable));
}

#[test]
fn cancelled_task_is_unknown() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let report = verify_with_cancel(
        &message_passing(),
        &tso().unwrap(),
        &opts(CheckMode::Refinement),
        &cancel,
    )
    .unwrap();
    match report.result {
        VerificationResult::Unknown { reason } => assert!(reason.contains("cancelled")),
        other => panic!("expected Unknown, got {other}"),
    }
}

/// MP whose side condition places 13 pigeons in 12 holes. Unsatisfiable,
/// and far beyond what the solver settles in a fraction of a second.
fn message_passing_with_pigeons() -> Program {
    let mut b = ProgramBuilder::new("MP+php");
    let x = b.location("x", 0);
    let y = b.location("y", 0);
    let t0 = b.thread();
    let t1 = b.thread();
    b.store(t0, x, SmtTerm::int(1));
    b.store(t0, y, SmtTerm::int(1));
    b.load(t1, y, "r0");
    b.load(t1, x, "r1");

    let (pigeons, holes) = (13, 12);
    let var = |p: usize, h: usize| format!("p{p}_h{h}");
    for p in 0..pigeons {
        for h in 0..holes {
            b.declare(&var(p, h), SmtSort::Bool);
        }
        b.constrain(SmtTerm::or_any((0..holes).map(|h| SmtTerm::var(var(p, h)))));
    }
    for h in 0..holes {
        for p in 0..pigeons {
            for q in (p + 1)..pigeons {
                b.constrain(
                    SmtTerm::and_all([SmtTerm::var(var(p, h)), SmtTerm::var(var(q, h))]).not(),
                );
            }
        }
    }
    b.build().unwrap()
}

#[test]
fn cancel_interrupts_a_running_solve() {
    init_tracing();
    let program = message_passing_with_pigeons();
    let model = sc().unwrap();
    for mode in [CheckMode::Eager, CheckMode::Refinement] {
        let cancel = CancelFlag::new();
        let started = Instant::now();
        // The solve gets its own thread, and with it a fresh solver context.
        let report = std::thread::scope(|scope| {
            let solving = scope.spawn(|| verify_with_cancel(&program, &model, &opts(mode), &cancel));
            std::thread::sleep(Duration::from_millis(300));
            cancel.cancel();
            solving.join().unwrap().unwrap()
        });
        assert!(started.elapsed() < Duration::from_secs(30), "{mode:?}");
        match report.result {
            VerificationResult::Unknown { reason } => {
                assert!(reason.contains("cancelled"), "{mode:?}: {reason}")
            }
            other => panic!("{mode:?}: expected Unknown, got {other}"),
        }
    }
}

#[test]
fn round_limit_yields_unknown() {
    let options = VerifyOptions {
        max_rounds: 0,
        ..opts(CheckMode::Refinement)
    };
    let result = verify(&message_passing(), &sc().unwrap(), &options).unwrap();
    assert_eq!(result.verdict_class(), "unknown");
}

#[test]
fn script_backend_dumps_the_query() {
    let path = std::env::temp_dir().join(format!("relax-sb-{}.smt2", std::process::id()));
    let options = VerifyOptions {
        solver: SolverChoice::Script,
        dump_smt: Some(path.clone()),
        ..opts(CheckMode::Eager)
    };
    let result = verify(&store_buffering(false), &sc().unwrap(), &options).unwrap();
    assert_eq!(result.verdict_class(), "unknown");

    let script = std::fs::read_to_string(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    assert!(script.starts_with("(set-logic QF_LIA)"));
    assert!(script.contains("(declare-const |rf(0,5)| Bool)"));
    assert!(script.trim_end().ends_with("(check-sat)"));
}

#[test]
fn invalid_inputs_fail_before_solving() {
    let mut model = MemoryModel::new();
    model.declare("hb").unwrap();
    let err = verify(&message_passing(), &model, &VerifyOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::Model(WmmError::Unsupported(_))));
}

#[test]
fn parallel_tasks_keep_their_order() {
    init_tracing();
    let tasks: Vec<VerificationTask> = [
        ("sb-sc", store_buffering(false), sc().unwrap()),
        ("sb-tso", store_buffering(false), tso().unwrap()),
        ("mp-tso", message_passing(), tso().unwrap()),
    ]
    .into_iter()
    .map(|(name, program, model)| VerificationTask {
        name: name.to_string(),
        program,
        model,
        options: opts(CheckMode::Refinement),
    })
    .collect();

    let outcomes = verify_all(&tasks, &CancelFlag::new());
    let verdicts: Vec<(&str, &str)> = outcomes
        .iter()
        .map(|o| {
            let report = o.outcome.as_ref().unwrap();
            (o.name.as_str(), report.result.verdict_class())
        })
        .collect();
    assert_eq!(
        verdicts,
        [
            ("sb-sc", "unreachable"),
            ("sb-tso", "reachable"),
            ("mp-tso", "unreachable")
        ]
    );
}
