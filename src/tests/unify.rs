use super::*;
use crate::subst::{beta, deref};
use crate::test_utils::{int, setup};

fn unify_at(
    interp: &mut crate::api::Interpreter,
    trail: &mut Trail,
    depth: u32,
    a: TermId,
    b: TermId,
) -> Unified {
    unify(
        &mut interp.heap,
        trail,
        &interp.cdata,
        depth,
        a,
        b,
        true,
    )
    .expect("no fatal error")
}

// ========== RIGID / RIGID ==========

#[test]
fn equal_constants_unify() {
    let (mut interp, mut trail) = setup();
    let a = interp.symbols.intern("a");
    let at = interp.heap.terms.con(a);
    assert_eq!(unify_at(&mut interp, &mut trail, 0, at, at), Unified::Ok);
}

#[test]
fn different_constants_fail() {
    let (mut interp, mut trail) = setup();
    let a = interp.symbols.intern("a");
    let b = interp.symbols.intern("b");
    let at = interp.heap.terms.con(a);
    let bt = interp.heap.terms.con(b);
    assert_eq!(unify_at(&mut interp, &mut trail, 0, at, bt), Unified::Fail);
}

#[test]
fn head_and_arity_must_match() {
    let (mut interp, mut trail) = setup();
    let f = interp.symbols.intern("f");
    let g = interp.symbols.intern("g");
    let a = interp.symbols.intern("a");
    let at = interp.heap.terms.con(a);
    let fa = interp.heap.terms.app1(f, at);
    let ga = interp.heap.terms.app1(g, at);
    let faa = interp.heap.terms.app2(f, at, at);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, fa, ga), Unified::Fail);
    assert_eq!(unify_at(&mut interp, &mut trail, 0, fa, faa), Unified::Fail);
}

#[test]
fn lists_unify_structurally() {
    let (mut interp, mut trail) = setup();
    let one = int(&mut interp, 1);
    let x = interp.heap.fresh_uvar(0);
    let nil = interp.heap.terms.nil();
    let l1 = interp.heap.terms.cons(one, nil);
    let l2 = interp.heap.terms.cons(x, nil);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, l1, l2), Unified::Ok);
    assert_eq!(deref(&mut interp.heap, &mut trail, 0, x).unwrap(), one);
}

#[test]
fn cdata_uses_registry_equality() {
    let (mut interp, mut trail) = setup();
    let one_a = int(&mut interp, 1);
    let one_b = int(&mut interp, 1);
    let two = int(&mut interp, 2);
    let one_f = interp.cdata.float(1.0);
    let one_f = interp.heap.terms.cdata(one_f);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, one_a, one_b), Unified::Ok);
    assert_eq!(unify_at(&mut interp, &mut trail, 0, one_a, two), Unified::Fail);
    assert_eq!(
        unify_at(&mut interp, &mut trail, 0, one_a, one_f),
        Unified::Fail,
        "ints and floats never unify"
    );
}

#[test]
fn discard_matches_anything_without_binding() {
    let (mut interp, mut trail) = setup();
    let d = interp.heap.terms.discard();
    let one = int(&mut interp, 1);
    let x = interp.heap.fresh_uvar(0);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, d, one), Unified::Ok);
    assert_eq!(unify_at(&mut interp, &mut trail, 0, x, d), Unified::Ok);
    assert_eq!(
        deref(&mut interp.heap, &mut trail, 0, x).unwrap(),
        x,
        "discard binds nothing"
    );
}

// ========== FLEX / RIGID ==========

#[test]
fn variable_binds_to_ground_term() {
    let (mut interp, mut trail) = setup();
    let f = interp.symbols.intern("f");
    let a = interp.symbols.intern("a");
    let at = interp.heap.terms.con(a);
    let x = interp.heap.fresh_uvar(0);
    let fx = interp.heap.terms.app1(f, x);
    let fa = interp.heap.terms.app1(f, at);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, fx, fa), Unified::Ok);
    assert_eq!(deref(&mut interp.heap, &mut trail, 0, x).unwrap(), at);
}

#[test]
fn failing_unification_unwinds_the_trail() {
    let (mut interp, mut trail) = setup();
    let f = interp.symbols.intern("f");
    let a = interp.symbols.intern("a");
    let b = interp.symbols.intern("b");
    let at = interp.heap.terms.con(a);
    let bt = interp.heap.terms.con(b);
    let x = interp.heap.fresh_uvar(0);

    // f X a = f b b binds X before failing on the second argument
    let lhs = interp.heap.terms.app2(f, x, at);
    let rhs = interp.heap.terms.app2(f, bt, bt);

    let before = interp.heap.vars.snapshot();
    assert_eq!(unify_at(&mut interp, &mut trail, 0, lhs, rhs), Unified::Fail);
    assert_eq!(interp.heap.vars.snapshot(), before);
    assert!(trail.is_empty());
}

#[test]
fn occurs_check_rejects_cyclic_bindings() {
    let (mut interp, mut trail) = setup();
    let f = interp.symbols.intern("f");
    let x = interp.heap.fresh_uvar(0);
    let fx = interp.heap.terms.app1(f, x);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, x, fx), Unified::Fail);
    assert_eq!(
        deref(&mut interp.heap, &mut trail, 0, x).unwrap(),
        x,
        "the variable stays unbound"
    );
}

#[test]
fn occurs_check_sees_through_assignments() {
    let (mut interp, mut trail) = setup();
    let f = interp.symbols.intern("f");
    let x = interp.heap.fresh_uvar(0);
    let y = interp.heap.fresh_uvar(0);
    let fy = interp.heap.terms.app1(f, y);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, x, y), Unified::Ok);
    // x and y are now aliased; x = f y must fail the occurs check
    assert_eq!(unify_at(&mut interp, &mut trail, 0, x, fy), Unified::Fail);
}

// ========== ETA ==========

#[test]
fn lambda_unifies_with_its_eta_contraction() {
    let (mut interp, mut trail) = setup();
    let f = interp.symbols.intern("f");
    let x0 = interp.heap.terms.con(0);
    let body = interp.heap.terms.app1(f, x0);
    let lam = interp.heap.terms.lam(body);
    let ft = interp.heap.terms.con(f);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, lam, ft), Unified::Ok);
}

// ========== PATTERN FRAGMENT ==========

#[test]
fn pattern_equation_is_solved_by_abstraction() {
    let (mut interp, mut trail) = setup();
    let g = interp.symbols.intern("g");
    let v = interp.heap.vars.fresh();
    let x0 = interp.heap.terms.con(0);
    // F x0 = g x0 x0 under one binder
    let lhs = interp.heap.terms.app_uvar(v, 0, smallvec::smallvec![x0]);
    let rhs = interp.heap.terms.app2(g, x0, x0);

    assert_eq!(unify_at(&mut interp, &mut trail, 1, lhs, rhs), Unified::Ok);

    let vt = interp.heap.terms.uvar(v, 0, 0);
    let solution = deref(&mut interp.heap, &mut trail, 0, vt).unwrap();
    let expected_body = interp.heap.terms.app2(g, x0, x0);
    let expected = interp.heap.terms.lam(expected_body);
    assert_eq!(solution, expected, "F = x\\ g x x");
}

#[test]
fn pattern_solution_projects_visible_levels() {
    let (mut interp, mut trail) = setup();
    let v = interp.heap.vars.fresh();
    let x0 = interp.heap.terms.con(0);
    // F scoped under x0: F x1 = x0 keeps x0 free in the body
    let x1 = interp.heap.terms.con(1);
    let lhs = interp.heap.terms.app_uvar(v, 1, smallvec::smallvec![x1]);

    assert_eq!(unify_at(&mut interp, &mut trail, 2, lhs, x0), Unified::Ok);

    let vt = interp.heap.terms.uvar(v, 1, 0);
    let solution = deref(&mut interp.heap, &mut trail, 1, vt).unwrap();
    let expected = interp.heap.terms.lam(x0);
    assert_eq!(solution, expected, "F = y\\ x0");
}

#[test]
fn scope_extrusion_fails() {
    let (mut interp, mut trail) = setup();
    let v = interp.heap.vars.fresh();
    // F scoped at 0 cannot capture the bound variable x0
    let x = interp.heap.terms.uvar(v, 0, 0);
    let x0 = interp.heap.terms.con(0);
    assert_eq!(unify_at(&mut interp, &mut trail, 1, x, x0), Unified::Fail);
}

#[test]
fn occurs_check_applies_in_the_pattern_fragment() {
    let (mut interp, mut trail) = setup();
    let g = interp.symbols.intern("g");
    let v = interp.heap.vars.fresh();
    let x0 = interp.heap.terms.con(0);
    let lhs = interp.heap.terms.app_uvar(v, 0, smallvec::smallvec![x0]);
    let vt = interp.heap.terms.uvar(v, 0, 0);
    let rhs = interp.heap.terms.app2(g, x0, vt);

    assert_eq!(unify_at(&mut interp, &mut trail, 1, lhs, rhs), Unified::Fail);
}

#[test]
fn nested_variable_is_pruned_to_the_pattern_scope() {
    let (mut interp, mut trail) = setup();
    let g = interp.symbols.intern("g");
    let v = interp.heap.vars.fresh();
    let w = interp.heap.vars.fresh();
    let x0 = interp.heap.terms.con(0);
    let x1 = interp.heap.terms.con(1);
    // F x0 = g (W x0 x1) under two binders: x1 is outside F's fragment
    // and must be pruned out of W
    let lhs = interp.heap.terms.app_uvar(v, 0, smallvec::smallvec![x0]);
    let wapp = interp
        .heap
        .terms
        .app_uvar(w, 0, smallvec::smallvec![x0, x1]);
    let rhs = interp.heap.terms.app1(g, wapp);

    assert_eq!(unify_at(&mut interp, &mut trail, 2, lhs, rhs), Unified::Ok);
    assert!(interp.heap.vars.is_assigned(w), "W is pruned by assignment");
    assert!(interp.heap.vars.is_assigned(v));
}

// ========== OUTSIDE THE FRAGMENT ==========

#[test]
fn non_pattern_equation_delays_on_the_flex_head() {
    let (mut interp, mut trail) = setup();
    let g = interp.symbols.intern("g");
    let a = interp.symbols.intern("a");
    let at = interp.heap.terms.con(a);
    let v = interp.heap.vars.fresh();
    // F a = g a a: the argument is a global constant, not a bound variable
    let lhs = interp.heap.terms.app_uvar(v, 0, smallvec::smallvec![at]);
    let rhs = interp.heap.terms.app2(g, at, at);

    match unify_at(&mut interp, &mut trail, 0, lhs, rhs) {
        Unified::Delay(blockers) => assert_eq!(blockers.as_slice(), &[v]),
        other => panic!("expected a delay, got {:?}", other),
    }
    assert!(trail.is_empty(), "a delayed equation leaves no bindings");
}

#[test]
fn duplicate_pattern_arguments_are_outside_the_fragment() {
    let (mut interp, mut trail) = setup();
    let g = interp.symbols.intern("g");
    let v = interp.heap.vars.fresh();
    let x0 = interp.heap.terms.con(0);
    let lhs = interp
        .heap
        .terms
        .app_uvar(v, 0, smallvec::smallvec![x0, x0]);
    let rhs = interp.heap.terms.app1(g, x0);

    assert!(matches!(
        unify_at(&mut interp, &mut trail, 1, lhs, rhs),
        Unified::Delay(_)
    ));
}

#[test]
fn delay_disabled_is_a_hard_error() {
    let (mut interp, mut trail) = setup();
    let g = interp.symbols.intern("g");
    let a = interp.symbols.intern("a");
    let at = interp.heap.terms.con(a);
    let v = interp.heap.vars.fresh();
    let lhs = interp.heap.terms.app_uvar(v, 0, smallvec::smallvec![at]);
    let rhs = interp.heap.terms.app2(g, at, at);

    let err = unify(
        &mut interp.heap,
        &mut trail,
        &interp.cdata,
        0,
        lhs,
        rhs,
        false,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Runtime(_)));
}

// ========== FLEX / FLEX ==========

#[test]
fn plain_variables_alias() {
    let (mut interp, mut trail) = setup();
    let x = interp.heap.fresh_uvar(0);
    let y = interp.heap.fresh_uvar(0);
    let three = int(&mut interp, 3);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, x, y), Unified::Ok);
    assert_eq!(unify_at(&mut interp, &mut trail, 0, x, three), Unified::Ok);
    assert_eq!(deref(&mut interp.heap, &mut trail, 0, y).unwrap(), three);
}

#[test]
fn same_variable_same_arguments_is_trivial() {
    let (mut interp, mut trail) = setup();
    let v = interp.heap.vars.fresh();
    let t = interp.heap.terms.uvar(v, 0, 2);
    assert_eq!(unify_at(&mut interp, &mut trail, 2, t, t), Unified::Ok);
    assert!(!interp.heap.vars.is_assigned(v));
}

#[test]
fn distinct_variables_intersect_their_arguments() {
    let (mut interp, mut trail) = setup();
    let vx = interp.heap.vars.fresh();
    let vy = interp.heap.vars.fresh();
    let x0 = interp.heap.terms.con(0);
    let x1 = interp.heap.terms.con(1);
    // X x0 x1 = Y x1 under two binders: both project onto x1
    let lhs = interp
        .heap
        .terms
        .app_uvar(vx, 0, smallvec::smallvec![x0, x1]);
    let rhs = interp.heap.terms.app_uvar(vy, 0, smallvec::smallvec![x1]);

    assert_eq!(unify_at(&mut interp, &mut trail, 2, lhs, rhs), Unified::Ok);
    assert!(interp.heap.vars.is_assigned(vx));
    assert!(interp.heap.vars.is_assigned(vy));

    let lhs_val = deref(&mut interp.heap, &mut trail, 2, lhs).unwrap();
    let rhs_val = deref(&mut interp.heap, &mut trail, 2, rhs).unwrap();
    assert_eq!(lhs_val, rhs_val, "both sides reduce to the same projection");
}

#[test]
fn same_variable_disagreeing_arguments_prune() {
    let (mut interp, mut trail) = setup();
    let v = interp.heap.vars.fresh();
    let x0 = interp.heap.terms.con(0);
    let x1 = interp.heap.terms.con(1);
    // V x0 x1 = V x1 x0: no position agrees, V collapses to a constant
    // function of two arguments
    let lhs = interp
        .heap
        .terms
        .app_uvar(v, 0, smallvec::smallvec![x0, x1]);
    let rhs = interp
        .heap
        .terms
        .app_uvar(v, 0, smallvec::smallvec![x1, x0]);

    assert_eq!(unify_at(&mut interp, &mut trail, 2, lhs, rhs), Unified::Ok);
    assert!(interp.heap.vars.is_assigned(v));

    let lhs_val = deref(&mut interp.heap, &mut trail, 2, lhs).unwrap();
    let rhs_val = deref(&mut interp.heap, &mut trail, 2, rhs).unwrap();
    assert_eq!(lhs_val, rhs_val);
}

// ========== BETA THROUGH ASSIGNMENTS ==========

#[test]
fn application_of_an_assigned_variable_reduces() {
    let (mut interp, mut trail) = setup();
    let x = interp.heap.fresh_uvar(0);
    let x0 = interp.heap.terms.con(0);
    let id = interp.heap.terms.lam(x0);
    let five = int(&mut interp, 5);
    let y = interp.heap.fresh_uvar(0);

    assert_eq!(unify_at(&mut interp, &mut trail, 0, x, id), Unified::Ok);

    let applied = beta(&mut interp.heap, &mut trail, 0, x, &[five]).unwrap();
    assert_eq!(unify_at(&mut interp, &mut trail, 0, y, applied), Unified::Ok);
    assert_eq!(deref(&mut interp.heap, &mut trail, 0, y).unwrap(), five);
}
