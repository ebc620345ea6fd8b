use crate::builtin::BuiltinId;
use crate::cdata::{CDataId, CDataRegistry};
use crate::heap::{Heap, VarId};
use crate::symbol::{ConstId, SymbolTable};
use crate::trail::Trail;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

/// Unique identifier for a term node in the term store.
/// TermIds are stable and can be compared for equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Get the raw u32 value (for debugging/display).
    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        TermId(raw)
    }
}

/// A term node. Nodes are immutable; the only mutable runtime state lives
/// in the unification-variable heap, which `UVar`/`AppUVar` reference by
/// stable index.
///
/// `Arg`/`AppArg` are compile-time-only placeholders for clause and query
/// variables; they are instantiated to fresh uvars each time a clause is
/// used and must never reach the solver or the unifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Global symbol (`< 0`) or bound variable given as a de Bruijn level
    /// (`>= 0`).
    Const(ConstId),
    /// Abstraction. The body refers to the bound variable as `Const d`
    /// where `d` is the depth at which the lambda is entered.
    Lam(TermId),
    /// Application of a constant head to at least one argument.
    App(ConstId, SmallVec<[TermId; 4]>),
    /// List cell.
    Cons(TermId, TermId),
    /// Empty list.
    Nil,
    /// Call to a registered foreign predicate.
    Builtin(BuiltinId, SmallVec<[TermId; 4]>),
    /// Opaque host datum.
    CData(CDataId),
    /// Unification variable eta-expanded over the `nargs` bound variables
    /// `from .. from + nargs`. `from` is the binding depth at creation and
    /// is kept current by term motion.
    UVar { var: VarId, from: u32, nargs: u32 },
    /// Unification variable applied to arbitrary arguments.
    AppUVar {
        var: VarId,
        from: u32,
        args: SmallVec<[TermId; 4]>,
    },
    /// The anonymous "don't care" pattern.
    Discard,
    /// Compiled clause/query variable slot.
    Arg(u32),
    /// Compiled clause/query variable slot applied to arguments.
    AppArg(u32, SmallVec<[TermId; 4]>),
}

/// Hashconsing store of term nodes.
///
/// Guarantees:
/// - Structurally equal nodes get the same TermId
/// - A TermId resolves back to its node
///
/// Hashconsing is sound here because nodes never mutate: a uvar assignment
/// changes the heap cell a node points at, not the node.
pub struct TermStore {
    nodes: Vec<Term>,
    map: HashMap<Term, TermId, FxBuildHasher>,
}

impl TermStore {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            map: HashMap::default(),
        }
    }

    fn intern(&mut self, term: Term) -> TermId {
        if let Some(&id) = self.map.get(&term) {
            return id;
        }
        let id = TermId(self.nodes.len() as u32);
        self.nodes.push(term.clone());
        self.map.insert(term, id);
        id
    }

    /// Resolve a TermId to its node.
    pub fn resolve(&self, id: TermId) -> &Term {
        &self.nodes[id.0 as usize]
    }

    pub fn con(&mut self, c: ConstId) -> TermId {
        self.intern(Term::Const(c))
    }

    pub fn lam(&mut self, body: TermId) -> TermId {
        self.intern(Term::Lam(body))
    }

    /// Create an application node. The argument vector must be non-empty;
    /// a zero-argument "application" is just the head constant.
    pub fn app(&mut self, head: ConstId, args: SmallVec<[TermId; 4]>) -> TermId {
        debug_assert!(!args.is_empty(), "App requires at least one argument");
        self.intern(Term::App(head, args))
    }

    pub fn app1(&mut self, head: ConstId, a: TermId) -> TermId {
        self.app(head, smallvec::smallvec![a])
    }

    pub fn app2(&mut self, head: ConstId, a: TermId, b: TermId) -> TermId {
        self.app(head, smallvec::smallvec![a, b])
    }

    pub fn cons(&mut self, hd: TermId, tl: TermId) -> TermId {
        self.intern(Term::Cons(hd, tl))
    }

    pub fn nil(&mut self) -> TermId {
        self.intern(Term::Nil)
    }

    pub fn builtin(&mut self, bid: BuiltinId, args: SmallVec<[TermId; 4]>) -> TermId {
        self.intern(Term::Builtin(bid, args))
    }

    pub fn cdata(&mut self, data: CDataId) -> TermId {
        self.intern(Term::CData(data))
    }

    pub fn uvar(&mut self, var: VarId, from: u32, nargs: u32) -> TermId {
        self.intern(Term::UVar { var, from, nargs })
    }

    pub fn app_uvar(&mut self, var: VarId, from: u32, args: SmallVec<[TermId; 4]>) -> TermId {
        debug_assert!(!args.is_empty(), "AppUVar requires at least one argument");
        self.intern(Term::AppUVar { var, from, args })
    }

    pub fn discard(&mut self) -> TermId {
        self.intern(Term::Discard)
    }

    pub fn arg(&mut self, slot: u32) -> TermId {
        self.intern(Term::Arg(slot))
    }

    pub fn app_arg(&mut self, slot: u32, args: SmallVec<[TermId; 4]>) -> TermId {
        debug_assert!(!args.is_empty(), "AppArg requires at least one argument");
        self.intern(Term::AppArg(slot, args))
    }

    /// Build a list term from items.
    pub fn list(&mut self, items: &[TermId]) -> TermId {
        let mut out = self.nil();
        for &item in items.iter().rev() {
            out = self.cons(item, out);
        }
        out
    }

    /// Number of interned nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for TermStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a term for diagnostics and solution display, chasing uvar
/// assignments. Bound levels print as `x<level>`, unbound uvars as
/// `X<index>`.
pub fn format_term(
    heap: &mut Heap,
    trail: &mut Trail,
    symbols: &SymbolTable,
    cdata: &CDataRegistry,
    depth: u32,
    term: TermId,
) -> String {
    let mut out = String::new();
    render(heap, trail, symbols, cdata, depth, term, &mut out);
    out
}

fn render(
    heap: &mut Heap,
    trail: &mut Trail,
    symbols: &SymbolTable,
    cdata: &CDataRegistry,
    depth: u32,
    term: TermId,
    out: &mut String,
) {
    let term = crate::subst::deref(heap, trail, depth, term).unwrap_or(term);
    match heap.terms.resolve(term).clone() {
        Term::Const(c) => render_const(symbols, c, out),
        Term::Lam(body) => {
            out.push_str(&format!("x{}\\ ", depth));
            render(heap, trail, symbols, cdata, depth + 1, body, out);
        }
        Term::App(head, args) => {
            out.push('(');
            render_const(symbols, head, out);
            for arg in args {
                out.push(' ');
                render(heap, trail, symbols, cdata, depth, arg, out);
            }
            out.push(')');
        }
        Term::Cons(hd, tl) => {
            out.push('[');
            render(heap, trail, symbols, cdata, depth, hd, out);
            let mut rest = crate::subst::deref(heap, trail, depth, tl).unwrap_or(tl);
            loop {
                match heap.terms.resolve(rest).clone() {
                    Term::Nil => break,
                    Term::Cons(h, t) => {
                        out.push_str(", ");
                        render(heap, trail, symbols, cdata, depth, h, out);
                        rest = crate::subst::deref(heap, trail, depth, t).unwrap_or(t);
                    }
                    _ => {
                        out.push('|');
                        render(heap, trail, symbols, cdata, depth, rest, out);
                        break;
                    }
                }
            }
            out.push(']');
        }
        Term::Nil => out.push_str("[]"),
        Term::Builtin(bid, args) => {
            out.push_str(&format!("(<builtin:{}>", bid.0));
            for arg in args {
                out.push(' ');
                render(heap, trail, symbols, cdata, depth, arg, out);
            }
            out.push(')');
        }
        Term::CData(id) => out.push_str(&cdata.pp(id)),
        Term::UVar { var, nargs, from } => {
            out.push_str(&format!("X{}", var.raw()));
            for i in 0..nargs {
                out.push_str(&format!(" x{}", from + i));
            }
        }
        Term::AppUVar { var, args, .. } => {
            out.push_str(&format!("(X{}", var.raw()));
            for arg in args {
                out.push(' ');
                render(heap, trail, symbols, cdata, depth, arg, out);
            }
            out.push(')');
        }
        Term::Discard => out.push('_'),
        Term::Arg(slot) => out.push_str(&format!("A{}", slot)),
        Term::AppArg(slot, args) => {
            out.push_str(&format!("(A{}", slot));
            for arg in args {
                out.push(' ');
                render(heap, trail, symbols, cdata, depth, arg, out);
            }
            out.push(')');
        }
    }
}

fn render_const(symbols: &SymbolTable, c: ConstId, out: &mut String) {
    if c >= 0 {
        out.push_str(&format!("x{}", c));
    } else {
        match symbols.resolve(c) {
            Some(name) => out.push_str(name),
            None => out.push_str(&format!("c{}", c)),
        }
    }
}
