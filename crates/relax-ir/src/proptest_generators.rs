//! Proptest strategies for generating well-formed `Program` instances.

use proptest::prelude::*;
use relax_smt::terms::SmtTerm;

use crate::program::{Program, ProgramBuilder};

/// One generated thread instruction.
#[derive(Debug, Clone)]
enum Op {
    Load(usize),
    Store(usize, i64),
    Fence,
}

/// Guard `r == value` over the `pick`-th earlier register of the thread,
/// modulo how many there are.
#[derive(Debug, Clone, Copy)]
struct Guard {
    pick: usize,
    value: i64,
}

fn arb_op(nlocs: usize) -> impl Strategy<Value = (Op, Option<Guard>)> {
    let op = prop_oneof![
        (0..nlocs).prop_map(Op::Load),
        (0..nlocs, 1..=3i64).prop_map(|(l, v)| Op::Store(l, v)),
        Just(Op::Fence),
    ];
    let guard = proptest::option::weighted(
        0.3,
        (0..4usize, 0..=3i64).prop_map(|(pick, value)| Guard { pick, value }),
    );
    (op, guard)
}

/// Strategy for a small well-formed `Program` suitable for property testing.
///
/// Generated programs have:
/// - 1–3 locations, all initialised to 0
/// - 1–3 threads with 1–4 events each
/// - loads into fresh registers `r{thread}_{index}`, stores of constants
///   1..=3, and `Mfence` fences
/// - some events guarded by `r == v` over an earlier register of the same
///   thread (a control dependency); the rest execute unconditionally
pub fn arb_program() -> impl Strategy<Value = Program> {
    (1..=3usize, 1..=3usize)
        .prop_flat_map(|(nlocs, nthreads)| {
            let threads = proptest::collection::vec(
                proptest::collection::vec(arb_op(nlocs), 1..=4),
                nthreads..=nthreads,
            );
            (Just(nlocs), threads)
        })
        .prop_map(|(nlocs, threads)| {
            let mut b = ProgramBuilder::new("generated");
            let locs: Vec<_> = (0..nlocs)
                .map(|i| b.location(format!("x{i}"), 0))
                .collect();
            for (t, ops) in threads.iter().enumerate() {
                let tid = b.thread();
                let mut registers: Vec<String> = Vec::new();
                for (i, (op, guard)) in ops.iter().enumerate() {
                    let condition = (*guard)
                        .filter(|_| !registers.is_empty())
                        .map(|g| {
                            let reg = &registers[g.pick % registers.len()];
                            SmtTerm::var(reg.as_str()).eq(SmtTerm::int(g.value))
                        })
                        .unwrap_or(SmtTerm::bool(true));
                    let reg = format!("r{t}_{i}");
                    b.with_guard(condition, |b| match op {
                        Op::Load(l) => {
                            b.load(tid, locs[*l], &reg);
                        }
                        Op::Store(l, v) => {
                            b.store(tid, locs[*l], SmtTerm::int(*v));
                        }
                        Op::Fence => {
                            b.fence(tid, "Mfence");
                        }
                    });
                    if matches!(op, Op::Load(_)) {
                        registers.push(reg);
                    }
                }
            }
            b.build().expect("generated program is well-formed")
        })
}
