//! Dereference and term motion.
//!
//! Terms carry de Bruijn levels, so placing a term at a different binding
//! depth rewrites the levels of its inner binders while leaving its free
//! levels alone. Three motions cover every case:
//!
//! - [`lift`]: move to a greater or equal depth; total.
//! - [`restrict`]: move to a smaller depth; partial. A bound level that
//!   cannot be represented at the target depth is a scope escape, except
//!   under a unification variable, where the variable is pruned instead.
//! - [`subst`]: contract a beta-redex, replacing a block of levels with
//!   argument terms and closing the gap left by the removed binders.
//!
//! [`deref`] removes indirections through assigned variables, contracting
//! the implicit redex of eta-expanded nodes on the way.

use crate::error::{type_error, Error};
use crate::heap::{Heap, VarId};
use crate::symbol::ConstId;
use crate::term::{Term, TermId};
use crate::trail::{assign, Trail};
use smallvec::SmallVec;

/// Why a [`restrict`] could not complete.
#[derive(Debug)]
pub enum MoveFail {
    /// A rigid bound variable would escape its scope.
    Scope(ConstId),
    /// Expansion of an assigned variable hit a fatal error.
    Fatal(Error),
}

impl From<Error> for MoveFail {
    fn from(err: Error) -> Self {
        MoveFail::Fatal(err)
    }
}

/// Remove indirections through assigned variables until the head of `t` is
/// not an assigned uvar. `depth` is the binding depth at which the result
/// is inspected.
pub fn deref(heap: &mut Heap, trail: &mut Trail, depth: u32, t: TermId) -> Result<TermId, Error> {
    let mut t = t;
    loop {
        match heap.terms.resolve(t) {
            Term::UVar { var, from, nargs } => {
                let (var, from, nargs) = (*var, *from, *nargs);
                match heap.vars.get(var) {
                    Some(val) => t = contract_eta(heap, trail, val, from, depth, nargs)?,
                    None => return Ok(t),
                }
            }
            Term::AppUVar { var, from, args } => {
                let (var, from) = (*var, *from);
                match heap.vars.get(var) {
                    Some(val) => {
                        let args = args.clone();
                        let lifted = lift(heap, from, depth, val);
                        t = beta(heap, trail, depth, lifted, &args)?;
                    }
                    None => return Ok(t),
                }
            }
            _ => return Ok(t),
        }
    }
}

/// Contract the implicit redex of an assigned eta-expanded node: `val` is
/// the stored body rooted at `from`, the node stands for `val` applied to
/// the bound variables `from .. from + nargs`, inspected at depth `to`.
fn contract_eta(
    heap: &mut Heap,
    trail: &mut Trail,
    val: TermId,
    from: u32,
    to: u32,
    nargs: u32,
) -> Result<TermId, Error> {
    if to < from + nargs {
        return Err(Error::Anomaly(format!(
            "eta-expanded node inspected above its own arguments (from {} nargs {} at depth {})",
            from, nargs, to
        )));
    }
    // Strip the lambda prefix; the stripped binders are exactly the node's
    // eta arguments, so their occurrences keep their levels.
    let mut body = val;
    let mut k = 0;
    while k < nargs {
        match heap.terms.resolve(body) {
            Term::Lam(inner) => {
                body = *inner;
                k += 1;
            }
            _ => break,
        }
    }
    let shifted = lift(heap, from + k, to, body);
    if k == nargs {
        Ok(shifted)
    } else {
        let rest: SmallVec<[TermId; 4]> = (from + k..from + nargs)
            .map(|l| heap.terms.con(l as ConstId))
            .collect();
        mkapp(heap, trail, to, shifted, &rest)
    }
}

/// Rewrite levels for a term moving from depth `from` to depth
/// `to >= from`: levels below `from` are free and stay, levels at or above
/// it belong to binders inside the moved term and shift by `to - from`.
pub fn lift(heap: &mut Heap, from: u32, to: u32, t: TermId) -> TermId {
    debug_assert!(to >= from);
    if to == from {
        return t;
    }
    shift_above(heap, from, to - from, t)
}

fn shift_above(heap: &mut Heap, cutoff: u32, delta: u32, t: TermId) -> TermId {
    let shift_const = |c: ConstId| -> ConstId {
        if c >= cutoff as ConstId {
            c + delta as ConstId
        } else {
            c
        }
    };
    match heap.terms.resolve(t).clone() {
        Term::Const(c) => {
            let c2 = shift_const(c);
            if c2 == c {
                t
            } else {
                heap.terms.con(c2)
            }
        }
        Term::Lam(body) => {
            let body = shift_above(heap, cutoff, delta, body);
            heap.terms.lam(body)
        }
        Term::App(head, args) => {
            let head = shift_const(head);
            let args = args
                .into_iter()
                .map(|a| shift_above(heap, cutoff, delta, a))
                .collect();
            heap.terms.app(head, args)
        }
        Term::Cons(hd, tl) => {
            let hd = shift_above(heap, cutoff, delta, hd);
            let tl = shift_above(heap, cutoff, delta, tl);
            heap.terms.cons(hd, tl)
        }
        Term::Builtin(bid, args) => {
            let args = args
                .into_iter()
                .map(|a| shift_above(heap, cutoff, delta, a))
                .collect();
            heap.terms.builtin(bid, args)
        }
        Term::UVar { var, from, nargs } => {
            // a variable scoped exactly at the cutoff is free, not inside
            // the lifted region, and keeps its scope
            if from > cutoff {
                heap.terms.uvar(var, from + delta, nargs)
            } else if from + nargs <= cutoff {
                t
            } else {
                // the eta arguments straddle the cutoff: spell them out
                let args = (from..from + nargs)
                    .map(|l| {
                        let l = shift_const(l as ConstId);
                        heap.terms.con(l)
                    })
                    .collect();
                heap.terms.app_uvar(var, from, args)
            }
        }
        Term::AppUVar { var, from, args } => {
            let from = if from > cutoff { from + delta } else { from };
            let args = args
                .into_iter()
                .map(|a| shift_above(heap, cutoff, delta, a))
                .collect();
            heap.terms.app_uvar(var, from, args)
        }
        Term::AppArg(slot, args) => {
            let args = args
                .into_iter()
                .map(|a| shift_above(heap, cutoff, delta, a))
                .collect();
            heap.terms.app_arg(slot, args)
        }
        Term::Nil | Term::CData(_) | Term::Discard | Term::Arg(_) => t,
    }
}

/// Move a term from depth `from` to depth `to`. Total when lifting,
/// partial when restricting: a rigid level in `[to, from)` fails with
/// [`MoveFail::Scope`], a variable whose scope or arguments reach into
/// that range is pruned.
pub fn move_term(
    heap: &mut Heap,
    trail: &mut Trail,
    from: u32,
    to: u32,
    t: TermId,
) -> Result<TermId, MoveFail> {
    if to >= from {
        Ok(lift(heap, from, to, t))
    } else {
        restrict(heap, trail, from, to, from, t)
    }
}

/// Allocate a fresh variable scoped at `to` and alias `var` to it. Later
/// occurrences of `var` in the same traversal dereference to the pruned
/// replacement, which reproduces the single-pass, in-place behavior of
/// simultaneous pruning.
fn decrease_depth(heap: &mut Heap, trail: &mut Trail, var: VarId, to: u32) -> VarId {
    let fresh = heap.vars.fresh();
    let alias = heap.terms.uvar(fresh, to, 0);
    assign(&mut heap.vars, trail, var, alias);
    fresh
}

/// Prune `var` (eta-expanded over `nargs` binders at `vfrom`) down to the
/// argument positions in `keep`. Assigns `var := \ .. \ (fresh kept-vars)`
/// and returns the fresh variable together with its scope depth.
fn prune_uvar(
    heap: &mut Heap,
    trail: &mut Trail,
    var: VarId,
    vfrom: u32,
    nargs: u32,
    keep: &[u32],
    scope: u32,
) -> (VarId, u32) {
    let fresh = heap.vars.fresh();
    let newfrom = vfrom.min(scope);
    let mut body = if keep.is_empty() {
        heap.terms.uvar(fresh, newfrom, 0)
    } else if keep.len() as u32 == keep[keep.len() - 1] - keep[0] + 1 && keep[0] == vfrom {
        // kept positions form the prefix: still an eta-expanded node
        heap.terms.uvar(fresh, vfrom, keep.len() as u32)
    } else {
        let args = keep
            .iter()
            .map(|&l| heap.terms.con(l as ConstId))
            .collect();
        heap.terms.app_uvar(fresh, newfrom, args)
    };
    for _ in 0..nargs {
        body = heap.terms.lam(body);
    }
    assign(&mut heap.vars, trail, var, body);
    (fresh, newfrom)
}

fn restrict(
    heap: &mut Heap,
    trail: &mut Trail,
    from: u32,
    to: u32,
    pos: u32,
    t: TermId,
) -> Result<TermId, MoveFail> {
    let delta = from - to;
    let map_const = |c: ConstId| -> Result<ConstId, MoveFail> {
        if c < to as ConstId {
            Ok(c)
        } else if c < from as ConstId {
            Err(MoveFail::Scope(c))
        } else {
            Ok(c - delta as ConstId)
        }
    };
    match heap.terms.resolve(t).clone() {
        Term::Const(c) => {
            let c2 = map_const(c)?;
            Ok(if c2 == c { t } else { heap.terms.con(c2) })
        }
        Term::Lam(body) => {
            let body = restrict(heap, trail, from, to, pos + 1, body)?;
            Ok(heap.terms.lam(body))
        }
        Term::App(head, args) => {
            let head = map_const(head)?;
            let args = args
                .into_iter()
                .map(|a| restrict(heap, trail, from, to, pos, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app(head, args))
        }
        Term::Cons(hd, tl) => {
            let hd = restrict(heap, trail, from, to, pos, hd)?;
            let tl = restrict(heap, trail, from, to, pos, tl)?;
            Ok(heap.terms.cons(hd, tl))
        }
        Term::Builtin(bid, args) => {
            let args = args
                .into_iter()
                .map(|a| restrict(heap, trail, from, to, pos, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.builtin(bid, args))
        }
        Term::UVar { var, from: vfrom, nargs } => {
            if let Some(val) = heap.vars.get(var) {
                let expanded = contract_eta(heap, trail, val, vfrom, pos, nargs)?;
                return restrict(heap, trail, from, to, pos, expanded);
            }
            if vfrom + nargs <= to {
                Ok(t)
            } else if vfrom >= from {
                Ok(heap.terms.uvar(var, vfrom - delta, nargs))
            } else {
                // keep the eta arguments that survive the restriction
                let mut keep = Vec::new();
                let mut mapped: SmallVec<[TermId; 4]> = SmallVec::new();
                for l in vfrom..vfrom + nargs {
                    if let Ok(m) = map_const(l as ConstId) {
                        keep.push(l);
                        mapped.push(heap.terms.con(m));
                    }
                }
                let prefix = keep.iter().enumerate().all(|(i, &l)| l == vfrom + i as u32);
                let (fresh, newfrom) = prune_uvar(heap, trail, var, vfrom, nargs, &keep, to);
                if mapped.is_empty() {
                    Ok(heap.terms.uvar(fresh, newfrom, 0))
                } else if prefix && newfrom == vfrom {
                    Ok(heap.terms.uvar(fresh, vfrom, keep.len() as u32))
                } else {
                    Ok(heap.terms.app_uvar(fresh, newfrom, mapped))
                }
            }
        }
        Term::AppUVar { var, from: vfrom, args } => {
            if let Some(val) = heap.vars.get(var) {
                let lifted = lift(heap, vfrom, pos, val);
                let expanded = beta(heap, trail, pos, lifted, &args)?;
                return restrict(heap, trail, from, to, pos, expanded);
            }
            let mut keep = Vec::new();
            let mut mapped: SmallVec<[TermId; 4]> = SmallVec::new();
            for (i, &arg) in args.iter().enumerate() {
                match restrict(heap, trail, from, to, pos, arg) {
                    Ok(m) => {
                        keep.push(i);
                        mapped.push(m);
                    }
                    Err(MoveFail::Scope(_)) => {}
                    Err(fatal @ MoveFail::Fatal(_)) => return Err(fatal),
                }
            }
            let all_kept = keep.len() == args.len();
            // the variable's own scope: it either rides along with the
            // moved region, stays put below the target, or must shrink
            let target_scope = if vfrom >= from {
                vfrom - delta
            } else {
                vfrom.min(to)
            };
            if all_kept && target_scope == vfrom {
                return Ok(heap.terms.app_uvar(var, vfrom, mapped));
            }
            if all_kept && vfrom >= from {
                return Ok(heap.terms.app_uvar(var, target_scope, mapped));
            }
            let keep_levels: Vec<u32> = keep.iter().map(|&i| vfrom + i as u32).collect();
            let (fresh, newfrom) = prune_uvar(
                heap,
                trail,
                var,
                vfrom,
                args.len() as u32,
                &keep_levels,
                target_scope,
            );
            if mapped.is_empty() {
                Ok(heap.terms.uvar(fresh, newfrom, 0))
            } else {
                Ok(heap.terms.app_uvar(fresh, newfrom, mapped))
            }
        }
        Term::AppArg(slot, args) => {
            let args = args
                .into_iter()
                .map(|a| restrict(heap, trail, from, to, pos, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app_arg(slot, args))
        }
        Term::Nil | Term::CData(_) | Term::Discard | Term::Arg(_) => Ok(t),
    }
}

/// Apply `t` (positioned at `depth`) to `args`, contracting beta-redexes.
pub fn beta(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    t: TermId,
    args: &[TermId],
) -> Result<TermId, Error> {
    if args.is_empty() {
        return Ok(t);
    }
    let mut body = t;
    let mut k = 0;
    while k < args.len() {
        match heap.terms.resolve(body) {
            Term::Lam(inner) => {
                body = *inner;
                k += 1;
            }
            _ => break,
        }
    }
    if k == 0 {
        return mkapp(heap, trail, depth, t, args);
    }
    let reduced = subst(heap, trail, depth, &args[..k], body)?;
    if k == args.len() {
        Ok(reduced)
    } else {
        mkapp(heap, trail, depth, reduced, &args[k..])
    }
}

/// Build an application of `head` to `rest`, without introducing a redex:
/// a lambda head is contracted, an applied head extends its argument
/// vector, and a non-applicable head is a type error.
pub fn mkapp(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    head: TermId,
    rest: &[TermId],
) -> Result<TermId, Error> {
    if rest.is_empty() {
        return Ok(head);
    }
    match heap.terms.resolve(head).clone() {
        Term::Lam(_) => beta(heap, trail, depth, head, rest),
        Term::Const(c) => Ok(heap.terms.app(c, rest.iter().copied().collect())),
        Term::App(c, mut args) => {
            args.extend(rest.iter().copied());
            Ok(heap.terms.app(c, args))
        }
        Term::UVar { var, from, nargs } => {
            let mut args: SmallVec<[TermId; 4]> = (from..from + nargs)
                .map(|l| heap.terms.con(l as ConstId))
                .collect();
            args.extend(rest.iter().copied());
            Ok(heap.terms.app_uvar(var, from, args))
        }
        Term::AppUVar { var, from, mut args } => {
            args.extend(rest.iter().copied());
            Ok(heap.terms.app_uvar(var, from, args))
        }
        Term::Builtin(bid, mut args) => {
            args.extend(rest.iter().copied());
            Ok(heap.terms.builtin(bid, args))
        }
        Term::Arg(slot) => Ok(heap.terms.app_arg(slot, rest.iter().copied().collect())),
        Term::AppArg(slot, mut args) => {
            args.extend(rest.iter().copied());
            Ok(heap.terms.app_arg(slot, args))
        }
        Term::Cons(_, _) | Term::Nil | Term::CData(_) | Term::Discard => {
            type_error("only constants, variables and lambdas can be applied")
        }
    }
}

/// Contract a redex: replace the levels `fromdepth .. fromdepth + n` of
/// `body` by `args` and shift the levels above the removed binders down by
/// `n`. Arguments are positioned at `fromdepth` and are lifted when
/// plugged under binders crossed inside `body`.
pub fn subst(
    heap: &mut Heap,
    trail: &mut Trail,
    fromdepth: u32,
    args: &[TermId],
    body: TermId,
) -> Result<TermId, Error> {
    subst_rec(heap, trail, fromdepth, args, 0, body)
}

fn subst_rec(
    heap: &mut Heap,
    trail: &mut Trail,
    fromdepth: u32,
    args: &[TermId],
    offset: u32,
    t: TermId,
) -> Result<TermId, Error> {
    let n = args.len() as u32;
    enum ConstClass {
        Keep,
        Plug(usize),
        Shift(ConstId),
    }
    let classify = |c: ConstId| -> ConstClass {
        if c < fromdepth as ConstId {
            ConstClass::Keep
        } else if c < (fromdepth + n) as ConstId {
            ConstClass::Plug((c - fromdepth as ConstId) as usize)
        } else {
            ConstClass::Shift(c - n as ConstId)
        }
    };
    match heap.terms.resolve(t).clone() {
        Term::Const(c) => match classify(c) {
            ConstClass::Keep => Ok(t),
            ConstClass::Plug(i) => Ok(lift(heap, fromdepth, fromdepth + offset, args[i])),
            ConstClass::Shift(c2) => Ok(heap.terms.con(c2)),
        },
        Term::Lam(body) => {
            let body = subst_rec(heap, trail, fromdepth, args, offset + 1, body)?;
            Ok(heap.terms.lam(body))
        }
        Term::App(head, app_args) => {
            let new_args = app_args
                .into_iter()
                .map(|a| subst_rec(heap, trail, fromdepth, args, offset, a))
                .collect::<Result<SmallVec<[TermId; 4]>, _>>()?;
            match classify(head) {
                ConstClass::Keep => Ok(heap.terms.app(head, new_args)),
                ConstClass::Shift(h2) => Ok(heap.terms.app(h2, new_args)),
                ConstClass::Plug(i) => {
                    // the head itself is substituted: a new redex appears
                    let plug = lift(heap, fromdepth, fromdepth + offset, args[i]);
                    beta(heap, trail, fromdepth + offset, plug, &new_args)
                }
            }
        }
        Term::Cons(hd, tl) => {
            let hd = subst_rec(heap, trail, fromdepth, args, offset, hd)?;
            let tl = subst_rec(heap, trail, fromdepth, args, offset, tl)?;
            Ok(heap.terms.cons(hd, tl))
        }
        Term::Builtin(bid, b_args) => {
            let b_args = b_args
                .into_iter()
                .map(|a| subst_rec(heap, trail, fromdepth, args, offset, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.builtin(bid, b_args))
        }
        Term::UVar { var, from, nargs } => {
            if from + nargs <= fromdepth {
                Ok(t)
            } else if from >= fromdepth + n {
                Ok(heap.terms.uvar(var, from - n, nargs))
            } else {
                // eta arguments overlap the substituted block
                let (var, vfrom) = if from > fromdepth {
                    (decrease_depth(heap, trail, var, fromdepth), fromdepth)
                } else {
                    (var, from)
                };
                let mut mapped: SmallVec<[TermId; 4]> = SmallVec::new();
                for l in from..from + nargs {
                    let c = heap.terms.con(l as ConstId);
                    mapped.push(subst_rec(heap, trail, fromdepth, args, offset, c)?);
                }
                if mapped.is_empty() {
                    Ok(heap.terms.uvar(var, vfrom, 0))
                } else {
                    Ok(heap.terms.app_uvar(var, vfrom, mapped))
                }
            }
        }
        Term::AppUVar { var, from, args: v_args } => {
            let mapped = v_args
                .into_iter()
                .map(|a| subst_rec(heap, trail, fromdepth, args, offset, a))
                .collect::<Result<SmallVec<[TermId; 4]>, _>>()?;
            let (var, vfrom) = if from >= fromdepth + n {
                (var, from - n)
            } else if from > fromdepth {
                (decrease_depth(heap, trail, var, fromdepth), fromdepth)
            } else {
                (var, from)
            };
            Ok(heap.terms.app_uvar(var, vfrom, mapped))
        }
        Term::AppArg(slot, a_args) => {
            let a_args = a_args
                .into_iter()
                .map(|a| subst_rec(heap, trail, fromdepth, args, offset, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app_arg(slot, a_args))
        }
        Term::Nil | Term::CData(_) | Term::Discard | Term::Arg(_) => Ok(t),
    }
}

/// Instantiate a compiled term: `Arg` slots become the terms of `env`
/// (fresh uvars when a clause is used, the query's variables at query
/// start).
pub fn instantiate(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    env: &[TermId],
    t: TermId,
) -> Result<TermId, Error> {
    match heap.terms.resolve(t).clone() {
        Term::Arg(slot) => Ok(env[slot as usize]),
        Term::AppArg(slot, args) => {
            let head = env[slot as usize];
            let args = args
                .into_iter()
                .map(|a| instantiate(heap, trail, depth, env, a))
                .collect::<Result<Vec<_>, _>>()?;
            mkapp(heap, trail, depth, head, &args)
        }
        Term::Lam(body) => {
            let body = instantiate(heap, trail, depth + 1, env, body)?;
            Ok(heap.terms.lam(body))
        }
        Term::App(head, args) => {
            let args = args
                .into_iter()
                .map(|a| instantiate(heap, trail, depth, env, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app(head, args))
        }
        Term::Cons(hd, tl) => {
            let hd = instantiate(heap, trail, depth, env, hd)?;
            let tl = instantiate(heap, trail, depth, env, tl)?;
            Ok(heap.terms.cons(hd, tl))
        }
        Term::Builtin(bid, args) => {
            let args = args
                .into_iter()
                .map(|a| instantiate(heap, trail, depth, env, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.builtin(bid, args))
        }
        Term::AppUVar { var, from, args } => {
            let args = args
                .into_iter()
                .map(|a| instantiate(heap, trail, depth, env, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app_uvar(var, from, args))
        }
        Term::Const(_) | Term::Nil | Term::CData(_) | Term::UVar { .. } | Term::Discard => Ok(t),
    }
}

/// Fully expand every assigned variable in `t`. Used when publishing
/// solutions.
pub fn full_deref(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    t: TermId,
) -> Result<TermId, Error> {
    let t = deref(heap, trail, depth, t)?;
    match heap.terms.resolve(t).clone() {
        Term::Lam(body) => {
            let body = full_deref(heap, trail, depth + 1, body)?;
            Ok(heap.terms.lam(body))
        }
        Term::App(head, args) => {
            let args = args
                .into_iter()
                .map(|a| full_deref(heap, trail, depth, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app(head, args))
        }
        Term::Cons(hd, tl) => {
            let hd = full_deref(heap, trail, depth, hd)?;
            let tl = full_deref(heap, trail, depth, tl)?;
            Ok(heap.terms.cons(hd, tl))
        }
        Term::Builtin(bid, args) => {
            let args = args
                .into_iter()
                .map(|a| full_deref(heap, trail, depth, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.builtin(bid, args))
        }
        Term::AppUVar { var, from, args } => {
            let args = args
                .into_iter()
                .map(|a| full_deref(heap, trail, depth, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app_uvar(var, from, args))
        }
        _ => Ok(t),
    }
}

#[cfg(test)]
#[path = "tests/subst.rs"]
mod tests;
