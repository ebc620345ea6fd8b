//! Compiled clauses, programs, queries, and the stacked clause context
//! built by implication goals.

use crate::error::{runtime_error, type_error, Error};
use crate::heap::Heap;
use crate::subst::{deref, subst};
use crate::symbol::{global, ConstId};
use crate::term::{Term, TermId};
use crate::trail::Trail;
use smallvec::SmallVec;
use std::rc::Rc;

/// Placement annotation for a clause relative to a named one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Graft {
    Before(String),
    After(String),
}

/// A compiled clause. `Arg` slots `0 .. nvars` stand for the clause
/// variables and are instantiated to fresh uvars on each use.
#[derive(Debug, Clone)]
pub struct Clause {
    /// Head predicate: a global constant, or a bound level for clauses
    /// assumed under `pi`.
    pub head_const: ConstId,
    pub head_args: SmallVec<[TermId; 4]>,
    /// Body goal; the `true` constant when the clause is a fact.
    pub body: TermId,
    pub nvars: u32,
    /// Label other clauses can graft onto.
    pub name: Option<String>,
    pub graft: Option<Graft>,
}

/// An ordered list of compiled clauses, produced by the external compiler.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub clauses: Vec<Clause>,
}

/// A compiled query.
#[derive(Debug, Clone)]
pub struct Query {
    pub nvars: u32,
    /// User-visible variable names and their `Arg` slots.
    pub var_names: Vec<(String, u32)>,
    pub goal: TermId,
}

/// Hypothetical clauses stacked above the global database by `=>`.
///
/// Layers are shared, never mutated: a choice point holds the context it
/// saw, and backtracking past the implication simply drops the reference.
/// Lookup consults the newest layer first, source order within a layer.
#[derive(Debug, Clone, Default)]
pub struct ProgCtx(Option<Rc<Layer>>);

#[derive(Debug)]
struct Layer {
    clauses: Vec<Clause>,
    parent: ProgCtx,
}

impl ProgCtx {
    pub fn empty() -> Self {
        ProgCtx(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Stack a new layer of clauses above this context.
    pub fn push_layer(&self, clauses: Vec<Clause>) -> ProgCtx {
        ProgCtx(Some(Rc::new(Layer {
            clauses,
            parent: self.clone(),
        })))
    }

    /// Collect the hypothetical candidates for a predicate, newest layer
    /// first.
    pub fn candidates(&self, pred: ConstId, out: &mut Vec<Clause>) {
        let mut layer = &self.0;
        while let Some(l) = layer {
            for clause in &l.clauses {
                if clause.head_const == pred {
                    out.push(clause.clone());
                }
            }
            layer = &l.parent.0;
        }
    }

    /// All hypothetical clauses, newest layer first. Builtins receive
    /// this as their view of the current hypotheses.
    pub fn iter(&self) -> ProgCtxIter<'_> {
        ProgCtxIter {
            layer: &self.0,
            idx: 0,
        }
    }
}

pub struct ProgCtxIter<'a> {
    layer: &'a Option<Rc<Layer>>,
    idx: usize,
}

impl<'a> Iterator for ProgCtxIter<'a> {
    type Item = &'a Clause;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let l = self.layer.as_ref()?;
            if self.idx < l.clauses.len() {
                let clause = &l.clauses[self.idx];
                self.idx += 1;
                return Some(clause);
            }
            self.layer = &l.parent.0;
            self.idx = 0;
        }
    }
}

/// Convert a runtime term into clauses, for `=>` and for host-side clause
/// loading. Conjunctions split, `pi` binders become clause variables,
/// `H :- B` and `B => H` give bodies.
pub fn clause_of_term(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    t: TermId,
) -> Result<Vec<Clause>, Error> {
    let mut out = Vec::new();
    let mut nvars = 0;
    convert(heap, trail, depth, t, &mut nvars, &mut out)?;
    // clause variables introduced by pi share one numbering per source term
    for clause in &mut out {
        clause.nvars = nvars;
    }
    Ok(out)
}

fn convert(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    t: TermId,
    nvars: &mut u32,
    out: &mut Vec<Clause>,
) -> Result<(), Error> {
    let t = deref(heap, trail, depth, t)?;
    match heap.terms.resolve(t).clone() {
        Term::App(global::AND, args) | Term::App(global::CONJ, args) => {
            for arg in args {
                convert(heap, trail, depth, arg, nvars, out)?;
            }
            Ok(())
        }
        Term::App(global::PI, args) if args.len() == 1 => {
            let slot = *nvars;
            *nvars += 1;
            let arg = heap.terms.arg(slot);
            let f = deref(heap, trail, depth, args[0])?;
            let body = match heap.terms.resolve(f).clone() {
                Term::Lam(b) => subst(heap, trail, depth, &[arg], b)?,
                other => {
                    return type_error(format!(
                        "pi expects an abstraction in a clause, got {:?}",
                        std::mem::discriminant(&other)
                    ))
                }
            };
            convert(heap, trail, depth, body, nvars, out)
        }
        Term::App(global::RIMPL, args) if args.len() == 2 => {
            head_clause(heap, trail, depth, args[0], args[1], out)
        }
        Term::App(global::IMPL, args) if args.len() == 2 => {
            head_clause(heap, trail, depth, args[1], args[0], out)
        }
        _ => {
            let body = heap.terms.con(global::TRUE);
            head_clause(heap, trail, depth, t, body, out)
        }
    }
}

fn head_clause(
    heap: &mut Heap,
    trail: &mut Trail,
    depth: u32,
    head: TermId,
    body: TermId,
    out: &mut Vec<Clause>,
) -> Result<(), Error> {
    let head = deref(heap, trail, depth, head)?;
    let (head_const, head_args) = match heap.terms.resolve(head).clone() {
        Term::Const(c) => (c, SmallVec::new()),
        Term::App(c, args) => (c, args),
        Term::Arg(_) | Term::AppArg(_, _) => {
            return Err(Error::Anomaly(
                "compiled Arg node in a runtime clause head".to_string(),
            ))
        }
        Term::UVar { .. } | Term::AppUVar { .. } => {
            return runtime_error("cannot assume a clause with a flexible head")
        }
        Term::Builtin(_, _) => return runtime_error("cannot add clauses to a builtin predicate"),
        _ => return type_error("clause head is not a predicate application"),
    };
    out.push(Clause {
        head_const,
        head_args,
        body,
        nvars: 0,
        name: None,
        graft: None,
    });
    Ok(())
}
