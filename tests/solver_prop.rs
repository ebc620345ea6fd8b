//! Property tests for the unifier against a reference first-order
//! implementation, plus trail soundness and dereference idempotence.

use lamlog::api::Interpreter;
use lamlog::subst::deref;
use lamlog::term::TermId;
use lamlog::trail::Trail;
use lamlog::unify::{unify, Unified};
use proptest::prelude::*;
use std::collections::HashMap;

const MAX_VAR: u32 = 3;
const FUNCTOR_NAMES: [&str; 6] = ["a", "b", "c", "f", "g", "h"];

#[derive(Clone, Debug, PartialEq, Eq)]
enum RawTerm {
    Var(u32),
    App { f: usize, kids: Vec<RawTerm> },
}

fn raw_term_strategy() -> impl Strategy<Value = RawTerm> {
    let leaf = prop_oneof![
        (0..=MAX_VAR).prop_map(RawTerm::Var),
        Just(RawTerm::App { f: 0, kids: vec![] }),
        Just(RawTerm::App { f: 1, kids: vec![] }),
        Just(RawTerm::App { f: 2, kids: vec![] }),
    ];

    leaf.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| RawTerm::App {
                f: 3,
                kids: vec![t]
            }),
            (inner.clone(), inner.clone()).prop_map(|(x, y)| RawTerm::App {
                f: 4,
                kids: vec![x, y],
            }),
            (inner.clone(), inner).prop_map(|(x, y)| RawTerm::App {
                f: 5,
                kids: vec![x, y],
            }),
        ]
    })
}

struct Builder {
    vars: Vec<TermId>,
}

impl Builder {
    fn new(interp: &mut Interpreter) -> Self {
        let vars = (0..=MAX_VAR).map(|_| interp.heap.fresh_uvar(0)).collect();
        Self { vars }
    }

    fn build(&self, interp: &mut Interpreter, raw: &RawTerm) -> TermId {
        match raw {
            RawTerm::Var(i) => self.vars[*i as usize],
            RawTerm::App { f, kids } => {
                let func = interp.symbols.intern(FUNCTOR_NAMES[*f]);
                if kids.is_empty() {
                    interp.heap.terms.con(func)
                } else {
                    let kid_ids: Vec<TermId> =
                        kids.iter().map(|k| self.build(interp, k)).collect();
                    interp
                        .heap
                        .terms
                        .app(func, kid_ids.into_iter().collect())
                }
            }
        }
    }
}

// A textbook first-order unifier used as the oracle.

fn walk(t: &RawTerm, subst: &HashMap<u32, RawTerm>) -> RawTerm {
    let mut t = t.clone();
    while let RawTerm::Var(i) = t {
        match subst.get(&i) {
            Some(bound) => t = bound.clone(),
            None => return RawTerm::Var(i),
        }
    }
    t
}

fn occurs(i: u32, t: &RawTerm, subst: &HashMap<u32, RawTerm>) -> bool {
    match walk(t, subst) {
        RawTerm::Var(j) => i == j,
        RawTerm::App { kids, .. } => kids.iter().any(|k| occurs(i, k, subst)),
    }
}

fn ref_unify(a: &RawTerm, b: &RawTerm, subst: &mut HashMap<u32, RawTerm>) -> bool {
    let a = walk(a, subst);
    let b = walk(b, subst);
    match (a, b) {
        (RawTerm::Var(i), RawTerm::Var(j)) if i == j => true,
        (RawTerm::Var(i), t) | (t, RawTerm::Var(i)) => {
            if occurs(i, &t, subst) {
                return false;
            }
            subst.insert(i, t);
            true
        }
        (RawTerm::App { f: f1, kids: k1 }, RawTerm::App { f: f2, kids: k2 }) => {
            f1 == f2
                && k1.len() == k2.len()
                && k1.iter().zip(k2.iter()).all(|(x, y)| ref_unify(x, y, subst))
        }
    }
}

fn run_unify(interp: &mut Interpreter, trail: &mut Trail, a: TermId, b: TermId) -> Unified {
    unify(&mut interp.heap, trail, &interp.cdata, 0, a, b, true)
        .expect("first-order unification never errors")
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

    #[test]
    fn agrees_with_the_first_order_oracle(
        raw_a in raw_term_strategy(),
        raw_b in raw_term_strategy(),
    ) {
        let mut interp = Interpreter::new();
        let mut trail = Trail::new();
        let builder = Builder::new(&mut interp);
        let a = builder.build(&mut interp, &raw_a);
        let b = builder.build(&mut interp, &raw_b);

        let mut oracle_subst = HashMap::new();
        let oracle = ref_unify(&raw_a, &raw_b, &mut oracle_subst);

        match run_unify(&mut interp, &mut trail, a, b) {
            Unified::Ok => prop_assert!(oracle, "engine unified, oracle did not"),
            Unified::Fail => prop_assert!(!oracle, "oracle unified, engine did not"),
            Unified::Delay(_) => prop_assert!(false, "first-order problems never delay"),
        }
    }

    #[test]
    fn failing_unification_is_trail_sound(
        raw_a in raw_term_strategy(),
        raw_b in raw_term_strategy(),
    ) {
        let mut interp = Interpreter::new();
        let mut trail = Trail::new();
        let builder = Builder::new(&mut interp);
        let a = builder.build(&mut interp, &raw_a);
        let b = builder.build(&mut interp, &raw_b);

        let before = interp.heap.vars.snapshot();
        if run_unify(&mut interp, &mut trail, a, b) == Unified::Fail {
            prop_assert_eq!(
                &interp.heap.vars.snapshot()[..before.len()],
                &before[..],
                "failure must leave every pre-existing cell untouched"
            );
            prop_assert!(trail.is_empty());
        }
    }

    #[test]
    fn undo_restores_cells_bit_for_bit(
        raw_a in raw_term_strategy(),
        raw_b in raw_term_strategy(),
    ) {
        let mut interp = Interpreter::new();
        let mut trail = Trail::new();
        let builder = Builder::new(&mut interp);
        let a = builder.build(&mut interp, &raw_a);
        let b = builder.build(&mut interp, &raw_b);

        let before = interp.heap.vars.snapshot();
        let mark = trail.mark();
        let _ = run_unify(&mut interp, &mut trail, a, b);
        trail.undo_bindings_to(mark, &mut interp.heap.vars);

        prop_assert_eq!(&interp.heap.vars.snapshot()[..before.len()], &before[..]);
    }

    #[test]
    fn deref_is_idempotent_after_unification(
        raw_a in raw_term_strategy(),
        raw_b in raw_term_strategy(),
    ) {
        let mut interp = Interpreter::new();
        let mut trail = Trail::new();
        let builder = Builder::new(&mut interp);
        let a = builder.build(&mut interp, &raw_a);
        let b = builder.build(&mut interp, &raw_b);
        let _ = run_unify(&mut interp, &mut trail, a, b);

        for &v in &builder.vars {
            let once = deref(&mut interp.heap, &mut trail, 0, v).unwrap();
            let twice = deref(&mut interp.heap, &mut trail, 0, once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn occurs_check_never_builds_cyclic_terms(raw in raw_term_strategy()) {
        let mut interp = Interpreter::new();
        let mut trail = Trail::new();
        let builder = Builder::new(&mut interp);
        let g = interp.symbols.intern("g");
        let x = builder.vars[0];
        let inner = builder.build(&mut interp, &raw);
        // x occurs in the right-hand side by construction
        let rhs = interp.heap.terms.app2(g, inner, x);

        prop_assert_eq!(run_unify(&mut interp, &mut trail, x, rhs), Unified::Fail);
    }
}
