//! First-order and higher-order pattern unification.
//!
//! The entry point [`unify`] dereferences both sides and descends
//! structurally. Equations between a variable applied to distinct bound
//! variables and an arbitrary term are solved by abstraction
//! ([`Unified::Ok`] with a trailed assignment); equations outside that
//! fragment are reported as [`Unified::Delay`] so the solver can suspend
//! them, or fail hard when delaying is disabled. A failing or delayed
//! unification leaves the trail unwound to the mark taken at entry.

use crate::cdata::CDataRegistry;
use crate::error::Error;
use crate::heap::{Heap, VarId};
use crate::subst::{deref, mkapp};
use crate::symbol::ConstId;
use crate::term::{Term, TermId};
use crate::trail::{assign, Trail};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::{debug_span, trace};

/// Variables a delayed equation blocks on.
pub type Blockers = SmallVec<[VarId; 2]>;

/// Outcome of a unification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unified {
    /// The terms unify; assignments are on the trail.
    Ok,
    /// The terms do not unify; the trail is back at the entry mark.
    Fail,
    /// The equation is outside the pattern fragment; suspend it on the
    /// given unbound variables.
    Delay(Blockers),
}

enum UErr {
    Fail,
    Delay(Blockers),
    Fatal(Error),
}

impl From<Error> for UErr {
    fn from(err: Error) -> Self {
        UErr::Fatal(err)
    }
}

/// Unify two terms at the given depth.
///
/// `delay_outside` selects the treatment of equations outside the pattern
/// fragment: suspend when set, fail the query with a runtime error when
/// not (this is a solver error, not a logical failure).
pub fn unify(
    heap: &mut Heap,
    trail: &mut Trail,
    cdata: &CDataRegistry,
    depth: u32,
    a: TermId,
    b: TermId,
    delay_outside: bool,
) -> Result<Unified, Error> {
    #[cfg(feature = "tracing")]
    let _span = debug_span!("unify", ?a, ?b, depth).entered();

    let mark = trail.mark();
    match unif(heap, trail, cdata, depth, a, b) {
        Ok(()) => Ok(Unified::Ok),
        Err(UErr::Fail) => {
            trail.undo_bindings_to(mark, &mut heap.vars);
            Ok(Unified::Fail)
        }
        Err(UErr::Delay(blockers)) => {
            trail.undo_bindings_to(mark, &mut heap.vars);
            if delay_outside {
                Ok(Unified::Delay(blockers))
            } else {
                Err(Error::Runtime(
                    "higher-order unification outside the pattern fragment".to_string(),
                ))
            }
        }
        Err(UErr::Fatal(err)) => Err(err),
    }
}

/// A flex head together with its arguments seen as bound-variable levels.
struct FlexView {
    var: VarId,
    from: u32,
    args: SmallVec<[u32; 4]>,
}

/// View a flex term as a pattern: a variable applied to distinct bound
/// variables in scope. Returns `None` outside the fragment.
fn pattern_view(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    t: TermId,
) -> Result<Option<FlexView>, Error> {
    match heap.terms.resolve(t).clone() {
        Term::UVar { var, from, nargs } => Ok(Some(FlexView {
            var,
            from,
            args: (from..from + nargs).collect(),
        })),
        Term::AppUVar { var, from, args } => {
            let mut levels: SmallVec<[u32; 4]> = SmallVec::new();
            for arg in args {
                let arg = deref(heap, trail, depth, arg)?;
                match heap.terms.resolve(arg) {
                    Term::Const(c) if *c >= 0 && (*c as u32) < depth => {
                        let level = *c as u32;
                        if levels.contains(&level) {
                            return Ok(None);
                        }
                        levels.push(level);
                    }
                    _ => return Ok(None),
                }
            }
            Ok(Some(FlexView {
                var,
                from,
                args: levels,
            }))
        }
        _ => Ok(None),
    }
}

fn flex_head(heap: &Heap, t: TermId) -> Option<VarId> {
    match heap.terms.resolve(t) {
        Term::UVar { var, .. } | Term::AppUVar { var, .. } => Some(*var),
        _ => None,
    }
}

fn is_flex(heap: &Heap, t: TermId) -> bool {
    flex_head(heap, t).is_some()
}

fn delay_on(heap: &Heap, a: TermId, b: TermId) -> UErr {
    let mut blockers: Blockers = SmallVec::new();
    if let Some(v) = flex_head(heap, a) {
        blockers.push(v);
    }
    if let Some(v) = flex_head(heap, b) {
        if !blockers.contains(&v) {
            blockers.push(v);
        }
    }
    UErr::Delay(blockers)
}

fn unif(
    heap: &mut Heap,
    trail: &mut Trail,
    cdata: &CDataRegistry,
    depth: u32,
    a: TermId,
    b: TermId,
) -> Result<(), UErr> {
    let a = deref(heap, trail, depth, a)?;
    let b = deref(heap, trail, depth, b)?;
    if a == b {
        return Ok(());
    }

    let ra = heap.terms.resolve(a).clone();
    let rb = heap.terms.resolve(b).clone();

    if matches!(&ra, Term::Arg(_) | Term::AppArg(_, _))
        || matches!(&rb, Term::Arg(_) | Term::AppArg(_, _))
    {
        return Err(UErr::Fatal(Error::Anomaly(
            "compiled Arg node reached the unifier".to_string(),
        )));
    }

    if matches!(&ra, Term::Discard) || matches!(&rb, Term::Discard) {
        return Ok(());
    }

    // flex cases first: after deref both heads are unassigned
    match (is_flex(heap, a), is_flex(heap, b)) {
        (true, true) => return flex_flex(heap, trail, depth, a, b),
        (true, false) => return flex_rigid(heap, trail, depth, a, b),
        (false, true) => return flex_rigid(heap, trail, depth, b, a),
        (false, false) => {}
    }

    match (ra, rb) {
        (Term::Const(c1), Term::Const(c2)) => {
            if c1 == c2 {
                Ok(())
            } else {
                Err(UErr::Fail)
            }
        }
        (Term::App(h1, args1), Term::App(h2, args2)) => {
            if h1 != h2 || args1.len() != args2.len() {
                #[cfg(feature = "tracing")]
                trace!("rigid_head_mismatch");
                return Err(UErr::Fail);
            }
            for (x, y) in args1.iter().zip(args2.iter()) {
                unif(heap, trail, cdata, depth, *x, *y)?;
            }
            Ok(())
        }
        (Term::Cons(h1, t1), Term::Cons(h2, t2)) => {
            unif(heap, trail, cdata, depth, h1, h2)?;
            unif(heap, trail, cdata, depth, t1, t2)
        }
        (Term::Nil, Term::Nil) => Ok(()),
        (Term::CData(d1), Term::CData(d2)) => {
            if cdata.eq(d1, d2) {
                Ok(())
            } else {
                Err(UErr::Fail)
            }
        }
        (Term::Builtin(b1, args1), Term::Builtin(b2, args2)) => {
            if b1 != b2 || args1.len() != args2.len() {
                return Err(UErr::Fail);
            }
            for (x, y) in args1.iter().zip(args2.iter()) {
                unif(heap, trail, cdata, depth, *x, *y)?;
            }
            Ok(())
        }
        (Term::Lam(b1), Term::Lam(b2)) => unif(heap, trail, cdata, depth + 1, b1, b2),
        (Term::Lam(body), _) => {
            // eta: l = t  iff  l's body = t applied to the bound variable
            let x = heap.terms.con(depth as ConstId);
            let expanded = mkapp(heap, trail, depth + 1, b, &[x]).map_err(UErr::Fatal)?;
            unif(heap, trail, cdata, depth + 1, body, expanded)
        }
        (_, Term::Lam(body)) => {
            let x = heap.terms.con(depth as ConstId);
            let expanded = mkapp(heap, trail, depth + 1, a, &[x]).map_err(UErr::Fatal)?;
            unif(heap, trail, cdata, depth + 1, expanded, body)
        }
        _ => Err(UErr::Fail),
    }
}

fn flex_rigid(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    flex: TermId,
    rigid: TermId,
) -> Result<(), UErr> {
    match pattern_view(heap, trail, depth, flex)? {
        Some(view) => bind(heap, trail, depth, &view, rigid),
        None => Err(delay_on(heap, flex, rigid)),
    }
}

fn flex_flex(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    a: TermId,
    b: TermId,
) -> Result<(), UErr> {
    let va = pattern_view(heap, trail, depth, a)?;
    let vb = pattern_view(heap, trail, depth, b)?;
    let (va, vb) = match (va, vb) {
        (Some(va), Some(vb)) => (va, vb),
        // one side a pattern, the other not: try solving for the pattern side
        (Some(va), None) => return bind(heap, trail, depth, &va, b),
        (None, Some(vb)) => return bind(heap, trail, depth, &vb, a),
        (None, None) => return Err(delay_on(heap, a, b)),
    };

    if va.var == vb.var {
        // same cell: keep the argument positions on which both sides agree
        if va.args.len() != vb.args.len() {
            return Err(UErr::Fail);
        }
        if va.args == vb.args {
            return Ok(());
        }
        let keep: Vec<u32> = va
            .args
            .iter()
            .zip(vb.args.iter())
            .enumerate()
            .filter(|(_, (x, y))| x == y)
            .map(|(i, _)| va.from + i as u32)
            .collect();
        let n = va.args.len() as u32;
        prune_node(heap, trail, va.var, va.from, n, &keep, va.from);
        return Ok(());
    }

    let (older, younger) = if va.var.older_than(vb.var) {
        (&va, &vb)
    } else {
        (&vb, &va)
    };

    // identical argument lists and a compatible scope: alias the younger
    // cell to the older one
    if older.args == younger.args && older.from <= younger.from {
        let n = younger.args.len() as u32;
        let mut body = if n == 0 {
            heap.terms.uvar(older.var, older.from, 0)
        } else {
            let args = (younger.from..younger.from + n)
                .map(|l| heap.terms.con(l as ConstId))
                .collect();
            heap.terms.app_uvar(older.var, older.from, args)
        };
        for _ in 0..n {
            body = heap.terms.lam(body);
        }
        assign(&mut heap.vars, trail, younger.var, body);
        return Ok(());
    }

    // distinct cells: project both onto the intersection of their
    // arguments through one fresh variable scoped at the smaller depth
    let zfrom = va.from.min(vb.from);
    let z = heap.vars.fresh();
    let common: Vec<u32> = va
        .args
        .iter()
        .copied()
        .filter(|l| vb.args.contains(l))
        .collect();

    for view in [older, younger] {
        let z_args: SmallVec<[TermId; 4]> = common
            .iter()
            .map(|l| {
                let i = view.args.iter().position(|x| x == l).unwrap_or_else(|| {
                    unreachable!("common levels occur in both argument lists")
                });
                heap.terms.con((view.from + i as u32) as ConstId)
            })
            .collect();
        let mut body = if z_args.is_empty() {
            heap.terms.uvar(z, zfrom, 0)
        } else {
            heap.terms.app_uvar(z, zfrom, z_args)
        };
        for _ in 0..view.args.len() {
            body = heap.terms.lam(body);
        }
        assign(&mut heap.vars, trail, view.var, body);
    }
    Ok(())
}

/// Solve `X a1 .. an = rhs` in the pattern fragment: build the body
/// `\ .. \ rhs[ai -> position i]`, failing on occurrences of `X` (occurs
/// check) and on bound levels outside `{a1 .. an}` and `X`'s scope, and
/// pruning variables of `rhs` whose scope or arguments escape.
fn bind(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    view: &FlexView,
    rhs: TermId,
) -> Result<(), UErr> {
    let n = view.args.len() as u32;
    let mut map: FxHashMap<u32, u32> = FxHashMap::default();
    for (i, &l) in view.args.iter().enumerate() {
        map.insert(l, view.from + i as u32);
    }
    let mut body = bind_rec(heap, trail, view.var, view.from, n, &map, depth, depth, rhs)?;
    for _ in 0..n {
        body = heap.terms.lam(body);
    }
    assign(&mut heap.vars, trail, view.var, body);
    Ok(())
}

/// Map one bound level of the right-hand side into the body being built.
/// `vfrom`/`n` delimit the abstraction, `depth` is where the equation
/// lives, `pos` the current traversal depth inside the rhs.
fn map_level(
    vfrom: u32,
    n: u32,
    map: &FxHashMap<u32, u32>,
    depth: u32,
    c: u32,
) -> Result<u32, UErr> {
    if let Some(&target) = map.get(&c) {
        Ok(target)
    } else if c < vfrom {
        Ok(c)
    } else if c < depth {
        // visible where the equation lives, but not to the variable
        Err(UErr::Fail)
    } else {
        // bound inside the rhs: renumber under the new abstraction
        Ok(c - depth + vfrom + n)
    }
}

#[allow(clippy::too_many_arguments)]
fn bind_rec(
    heap: &mut Heap,
    trail: &mut Trail,
    var: VarId,
    vfrom: u32,
    n: u32,
    map: &FxHashMap<u32, u32>,
    depth: u32,
    pos: u32,
    t: TermId,
) -> Result<TermId, UErr> {
    let t = deref(heap, trail, pos, t)?;
    match heap.terms.resolve(t).clone() {
        Term::Const(c) => {
            if c < 0 {
                Ok(t)
            } else {
                let c2 = map_level(vfrom, n, map, depth, c as u32)?;
                Ok(heap.terms.con(c2 as ConstId))
            }
        }
        Term::Lam(body) => {
            let body = bind_rec(heap, trail, var, vfrom, n, map, depth, pos + 1, body)?;
            Ok(heap.terms.lam(body))
        }
        Term::App(head, args) => {
            let head = if head < 0 {
                head
            } else {
                map_level(vfrom, n, map, depth, head as u32)? as ConstId
            };
            let args = args
                .into_iter()
                .map(|a| bind_rec(heap, trail, var, vfrom, n, map, depth, pos, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.app(head, args))
        }
        Term::Cons(hd, tl) => {
            let hd = bind_rec(heap, trail, var, vfrom, n, map, depth, pos, hd)?;
            let tl = bind_rec(heap, trail, var, vfrom, n, map, depth, pos, tl)?;
            Ok(heap.terms.cons(hd, tl))
        }
        Term::Builtin(bid, args) => {
            let args = args
                .into_iter()
                .map(|a| bind_rec(heap, trail, var, vfrom, n, map, depth, pos, a))
                .collect::<Result<_, _>>()?;
            Ok(heap.terms.builtin(bid, args))
        }
        Term::UVar { var: w, from: wf, nargs: wn } => {
            if w == var {
                #[cfg(feature = "tracing")]
                trace!("occurs_check_failed");
                return Err(UErr::Fail);
            }
            // fast path: fully below the abstraction and none of its
            // arguments are abstracted
            if wf + wn <= vfrom && (wf..wf + wn).all(|l| !map.contains_key(&l)) {
                return Ok(t);
            }
            if wf > depth {
                // scoped inside the rhs: the whole node renumbers
                return Ok(heap.terms.uvar(w, wf - depth + vfrom + n, wn));
            }
            let mut keep: Vec<u32> = Vec::new();
            let mut mapped: SmallVec<[TermId; 4]> = SmallVec::new();
            for l in wf..wf + wn {
                if let Ok(m) = map_level(vfrom, n, map, depth, l) {
                    keep.push(l);
                    mapped.push(heap.terms.con(m as ConstId));
                }
            }
            if wf <= vfrom && keep.len() == wn as usize {
                // every argument survives: no pruning, just remap
                return Ok(heap.terms.app_uvar(w, wf, mapped));
            }
            let scope = wf.min(vfrom);
            let (fresh, newfrom) = prune_node(heap, trail, w, wf, wn, &keep, scope);
            if mapped.is_empty() {
                Ok(heap.terms.uvar(fresh, newfrom, 0))
            } else {
                Ok(heap.terms.app_uvar(fresh, newfrom, mapped))
            }
        }
        Term::AppUVar { var: w, from: wf, args } => {
            if w == var {
                #[cfg(feature = "tracing")]
                trace!("occurs_check_failed");
                return Err(UErr::Fail);
            }
            let total = args.len() as u32;
            let mut keep: Vec<u32> = Vec::new();
            let mut mapped: SmallVec<[TermId; 4]> = SmallVec::new();
            for (i, &arg) in args.iter().enumerate() {
                match bind_rec(heap, trail, var, vfrom, n, map, depth, pos, arg) {
                    Ok(m) => {
                        keep.push(wf + i as u32);
                        mapped.push(m);
                    }
                    Err(UErr::Fail) => {}
                    Err(other) => return Err(other),
                }
            }
            if wf <= vfrom && keep.len() == args.len() {
                return Ok(heap.terms.app_uvar(w, wf, mapped));
            }
            let scope = wf.min(vfrom);
            let (fresh, newfrom) = prune_node(heap, trail, w, wf, total, &keep, scope);
            if mapped.is_empty() {
                Ok(heap.terms.uvar(fresh, newfrom, 0))
            } else {
                Ok(heap.terms.app_uvar(fresh, newfrom, mapped))
            }
        }
        Term::Nil | Term::CData(_) | Term::Discard => Ok(t),
        Term::Arg(_) | Term::AppArg(_, _) => Err(UErr::Fatal(Error::Anomaly(
            "compiled Arg node reached the unifier".to_string(),
        ))),
    }
}

/// Prune `w` (with `total` arguments at lambda positions `wf ..`) down to
/// the kept positions, scoping the replacement at `scope`.
fn prune_node(
    heap: &mut Heap,
    trail: &mut Trail,
    w: VarId,
    wf: u32,
    total: u32,
    keep: &[u32],
    scope: u32,
) -> (VarId, u32) {
    let fresh = heap.vars.fresh();
    let newfrom = wf.min(scope);
    let mut body = if keep.is_empty() {
        heap.terms.uvar(fresh, newfrom, 0)
    } else {
        let args = keep
            .iter()
            .map(|&l| heap.terms.con(l as ConstId))
            .collect();
        heap.terms.app_uvar(fresh, newfrom, args)
    };
    for _ in 0..total {
        body = heap.terms.lam(body);
    }
    assign(&mut heap.vars, trail, w, body);
    (fresh, newfrom)
}

#[cfg(test)]
#[path = "tests/unify.rs"]
mod tests;
