//! The foreign-predicate registry and the standard builtins.
//!
//! A builtin is a named handler invoked by the solver on a `Builtin` goal.
//! It sees the current depth, hypotheses, constraint store and state map,
//! and returns extra goals to run (typically equalities asserting its
//! outputs). It signals logical failure with [`Response::NoClause`], which
//! backtracks, and fatal conditions with [`Error`], which aborts the
//! query.

use crate::cdata::CDataRegistry;
use crate::clause::ProgCtx;
use crate::constraint::{ConstraintStore, Suspended};
use crate::error::{runtime_error, type_error, Error};
use crate::eval::{compare, eval, EvalRegistry, StreamTables};
use crate::heap::Heap;
use crate::state::State;
use crate::subst::deref;
use crate::symbol::{global, SymbolTable};
use crate::term::{format_term, Term, TermId};
use crate::trail::Trail;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::rc::Rc;

/// Identifier of a registered builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuiltinId(pub u32);

/// What a handler asks the solver to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Push these goals (possibly none) and continue.
    Goals(SmallVec<[TermId; 2]>),
    /// Behave like "no matching clause": backtrack.
    NoClause,
}

impl Response {
    pub fn done() -> Self {
        Response::Goals(SmallVec::new())
    }
}

/// Everything a handler may touch. Assignments made through `heap`/`trail`
/// are rolled back on backtrack like any other binding.
pub struct Ctx<'a> {
    pub depth: u32,
    pub heap: &'a mut Heap,
    pub trail: &'a mut Trail,
    pub state: &'a mut State,
    pub constraints: &'a mut ConstraintStore,
    pub streams: &'a mut StreamTables,
    pub symbols: &'a SymbolTable,
    pub cdata: &'a mut CDataRegistry,
    pub evals: &'a EvalRegistry,
    pub hyps: &'a ProgCtx,
}

pub type Handler = Rc<dyn Fn(&mut Ctx<'_>, &[TermId]) -> Result<Response, Error>>;

/// A registered builtin.
pub struct BuiltinDecl {
    pub name: String,
    /// Enforced by the solver when present; variadic builtins leave it
    /// unset and check their own arguments.
    pub arity: Option<usize>,
    pub doc: String,
    pub handler: Handler,
}

/// Registry of foreign predicates. Registration is a construction-time
/// step; the compiler resolves builtin names to ids when lowering.
#[derive(Default)]
pub struct BuiltinRegistry {
    entries: Vec<BuiltinDecl>,
    by_name: FxHashMap<String, BuiltinId>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decl: BuiltinDecl) -> BuiltinId {
        let id = BuiltinId(self.entries.len() as u32);
        self.by_name.insert(decl.name.clone(), id);
        self.entries.push(decl);
        id
    }

    pub fn get(&self, id: BuiltinId) -> Option<&BuiltinDecl> {
        self.entries.get(id.0 as usize)
    }

    pub fn lookup(&self, name: &str) -> Option<BuiltinId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BuiltinId, &BuiltinDecl)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, decl)| (BuiltinId(i as u32), decl))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn register(
    reg: &mut BuiltinRegistry,
    name: &str,
    arity: Option<usize>,
    doc: &str,
    handler: impl Fn(&mut Ctx<'_>, &[TermId]) -> Result<Response, Error> + 'static,
) {
    reg.register(BuiltinDecl {
        name: name.to_string(),
        arity,
        doc: doc.to_string(),
        handler: Rc::new(handler),
    });
}

/// The standard builtin set.
pub fn standard() -> BuiltinRegistry {
    let mut reg = BuiltinRegistry::new();

    register(&mut reg, "is", Some(2), "X is Expr: evaluate Expr and unify with X", |ctx, args| {
        let value = eval(
            ctx.heap, ctx.trail, ctx.cdata, ctx.evals, ctx.depth, args[1],
        )?;
        let value = ctx.heap.terms.cdata(value);
        let goal = ctx.heap.terms.app2(global::EQ, args[0], value);
        Ok(Response::Goals(smallvec::smallvec![goal]))
    });

    comparison(&mut reg, "<", "A < B: arithmetic less-than", |ord| {
        ord == Ordering::Less
    });
    comparison(&mut reg, "=<", "A =< B: arithmetic less-or-equal", |ord| {
        ord != Ordering::Greater
    });
    comparison(&mut reg, ">", "A > B: arithmetic greater-than", |ord| {
        ord == Ordering::Greater
    });
    comparison(&mut reg, ">=", "A >= B: arithmetic greater-or-equal", |ord| {
        ord != Ordering::Less
    });

    register(&mut reg, "var", Some(1), "var X: X is an unassigned variable", |ctx, args| {
        let t = deref(ctx.heap, ctx.trail, ctx.depth, args[0])?;
        match ctx.heap.terms.resolve(t) {
            Term::UVar { .. } | Term::AppUVar { .. } => Ok(Response::done()),
            _ => Ok(Response::NoClause),
        }
    });

    register(&mut reg, "not_var", Some(1), "not_var X: X is not a variable", |ctx, args| {
        let t = deref(ctx.heap, ctx.trail, ctx.depth, args[0])?;
        match ctx.heap.terms.resolve(t) {
            Term::UVar { .. } | Term::AppUVar { .. } => Ok(Response::NoClause),
            _ => Ok(Response::done()),
        }
    });

    register(&mut reg, "print", None, "print Args: render terms to stdout", |ctx, args| {
        let mut line = String::new();
        for (i, &arg) in args.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&format_term(
                ctx.heap, ctx.trail, ctx.symbols, ctx.cdata, ctx.depth, arg,
            ));
        }
        line.push('\n');
        ctx.streams.output(1, &line)?;
        Ok(Response::done())
    });

    register(&mut reg, "output", Some(2), "output Handle Text: write a string to a stream", |ctx, args| {
        let handle = int_arg(ctx, args[0], "output")?;
        let text = str_arg(ctx, args[1], "output")?;
        ctx.streams.output(handle, &text)?;
        Ok(Response::done())
    });

    register(&mut reg, "flush", Some(1), "flush Handle: flush an output stream", |ctx, args| {
        let handle = int_arg(ctx, args[0], "flush")?;
        ctx.streams.flush(handle)?;
        Ok(Response::done())
    });

    register(&mut reg, "open_in", Some(2), "open_in Path Handle: open a file for reading", |ctx, args| {
        let path = str_arg(ctx, args[0], "open_in")?;
        let handle = ctx.streams.open_in(&path)?;
        let handle = ctx.cdata.int(handle);
        let handle = ctx.heap.terms.cdata(handle);
        let goal = ctx.heap.terms.app2(global::EQ, args[1], handle);
        Ok(Response::Goals(smallvec::smallvec![goal]))
    });

    register(&mut reg, "open_out", Some(2), "open_out Path Handle: open a file for writing", |ctx, args| {
        let path = str_arg(ctx, args[0], "open_out")?;
        let handle = ctx.streams.open_out(&path)?;
        let handle = ctx.cdata.int(handle);
        let handle = ctx.heap.terms.cdata(handle);
        let goal = ctx.heap.terms.app2(global::EQ, args[1], handle);
        Ok(Response::Goals(smallvec::smallvec![goal]))
    });

    register(&mut reg, "input_line", Some(2), "input_line Handle Line: read one line", |ctx, args| {
        let handle = int_arg(ctx, args[0], "input_line")?;
        let line = ctx.streams.input_line(handle)?;
        let line = ctx.cdata.str(&line);
        let line = ctx.heap.terms.cdata(line);
        let goal = ctx.heap.terms.app2(global::EQ, args[1], line);
        Ok(Response::Goals(smallvec::smallvec![goal]))
    });

    register(&mut reg, "close_in", Some(1), "close_in Handle: close an input stream", |ctx, args| {
        let handle = int_arg(ctx, args[0], "close_in")?;
        ctx.streams.close_in(handle)?;
        Ok(Response::done())
    });

    register(&mut reg, "close_out", Some(1), "close_out Handle: close an output stream", |ctx, args| {
        let handle = int_arg(ctx, args[0], "close_out")?;
        ctx.streams.close_out(handle)?;
        Ok(Response::done())
    });

    register(
        &mut reg,
        "declare_constraint",
        Some(2),
        "declare_constraint Goal Vars: suspend Goal until one of Vars is assigned",
        |ctx, args| {
            let blockers = blocker_list(ctx, args[1])?;
            if blockers.is_empty() {
                // nothing to wait on: run the goal now
                return Ok(Response::Goals(smallvec::smallvec![args[0]]));
            }
            ctx.constraints.add(
                ctx.trail,
                Suspended {
                    goal: args[0],
                    depth: ctx.depth,
                    prog: ctx.hyps.clone(),
                    blockers,
                },
            );
            Ok(Response::done())
        },
    );

    reg
}

fn comparison(
    reg: &mut BuiltinRegistry,
    name: &'static str,
    doc: &str,
    holds: fn(Ordering) -> bool,
) {
    register(reg, name, Some(2), doc, move |ctx, args| {
        let a = eval(
            ctx.heap, ctx.trail, ctx.cdata, ctx.evals, ctx.depth, args[0],
        )?;
        let b = eval(
            ctx.heap, ctx.trail, ctx.cdata, ctx.evals, ctx.depth, args[1],
        )?;
        match compare(ctx.cdata, a, b) {
            Some(ord) if holds(ord) => Ok(Response::done()),
            Some(_) => Ok(Response::NoClause),
            None => type_error(format!(
                "{} expects two ints, two floats or two strings",
                name
            )),
        }
    });
}

fn int_arg(ctx: &mut Ctx<'_>, t: TermId, who: &str) -> Result<i64, Error> {
    let t = deref(ctx.heap, ctx.trail, ctx.depth, t)?;
    match ctx.heap.terms.resolve(t) {
        Term::CData(id) => match ctx.cdata.as_int(*id) {
            Some(n) => Ok(n),
            None => type_error(format!("{} expects an int", who)),
        },
        _ => type_error(format!("{} expects an int", who)),
    }
}

fn str_arg(ctx: &mut Ctx<'_>, t: TermId, who: &str) -> Result<String, Error> {
    let t = deref(ctx.heap, ctx.trail, ctx.depth, t)?;
    match ctx.heap.terms.resolve(t) {
        Term::CData(id) => match ctx.cdata.as_str(*id) {
            Some(s) => Ok(s.to_string()),
            None => type_error(format!("{} expects a string", who)),
        },
        _ => type_error(format!("{} expects a string", who)),
    }
}

/// Collect the unbound variables of a list term. Assigned or rigid
/// elements no longer block and are skipped.
fn blocker_list(
    ctx: &mut Ctx<'_>,
    list: TermId,
) -> Result<SmallVec<[crate::heap::VarId; 2]>, Error> {
    let mut blockers: SmallVec<[crate::heap::VarId; 2]> = SmallVec::new();
    let mut rest = deref(ctx.heap, ctx.trail, ctx.depth, list)?;
    loop {
        match ctx.heap.terms.resolve(rest).clone() {
            Term::Nil => return Ok(blockers),
            Term::Cons(hd, tl) => {
                let hd = deref(ctx.heap, ctx.trail, ctx.depth, hd)?;
                match ctx.heap.terms.resolve(hd) {
                    Term::UVar { var, .. } | Term::AppUVar { var, .. } => {
                        if !blockers.contains(var) {
                            blockers.push(*var);
                        }
                    }
                    _ => {}
                }
                rest = deref(ctx.heap, ctx.trail, ctx.depth, tl)?;
            }
            _ => return runtime_error("declare_constraint expects a list of variables"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_assigns_sequential_ids() {
        let reg = standard();
        let is = reg.lookup("is").unwrap();
        let lt = reg.lookup("<").unwrap();
        assert_ne!(is, lt);
        assert_eq!(reg.get(is).unwrap().name, "is");
    }

    #[test]
    fn lookup_unknown_name_is_none() {
        let reg = standard();
        assert_eq!(reg.lookup("no_such_builtin"), None);
    }

    #[test]
    fn standard_set_is_documented() {
        let reg = standard();
        for (_, decl) in reg.iter() {
            assert!(
                !decl.doc.is_empty(),
                "builtin {} has no doc line",
                decl.name
            );
        }
    }

    #[test]
    fn declared_arities() {
        let reg = standard();
        let is = reg.get(reg.lookup("is").unwrap()).unwrap();
        assert_eq!(is.arity, Some(2));
        let print = reg.get(reg.lookup("print").unwrap()).unwrap();
        assert_eq!(print.arity, None, "print is variadic");
    }
}
