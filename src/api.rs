//! Embedder-facing context: construction-time registries plus the runtime
//! stores, and the solve entry points.
//!
//! The interpreter folds what the original design kept as process-wide
//! singletons (symbols, CData types, streams, builtin and evaluable
//! tables) into one explicit context. Registration is a construction-time
//! step; during solving the registries are read-only and only the heap,
//! trail and stores mutate.

use crate::builtin::{BuiltinDecl, BuiltinId, BuiltinRegistry};
use crate::cdata::CDataRegistry;
use crate::clause::{Program, Query};
use crate::error::{Error, Loc, WarnSink};
use crate::eval::{EvalRegistry, StreamTables};
use crate::heap::Heap;
use crate::index::Db;
use crate::solver::{Opts, Outcome, Solver};
use crate::state::{ComponentId, State, StateDecl};
use crate::symbol::SymbolTable;
use crate::term::TermId;
use rustc_hash::FxHashMap;
use std::io::Write;
use std::rc::Rc;

/// A registered quotation: lowers an embedded DSL fragment to a term
/// during compilation.
pub type Quotation = Rc<
    dyn Fn(&mut Heap, &mut SymbolTable, &mut State, u32, &Loc, &str) -> Result<TermId, Error>,
>;

/// The interpreter context. One instance hosts one program database and
/// one heap; queries run against it single-threadedly.
pub struct Interpreter {
    pub symbols: SymbolTable,
    pub cdata: CDataRegistry,
    pub heap: Heap,
    pub db: Db,
    pub builtins: BuiltinRegistry,
    pub evals: EvalRegistry,
    pub streams: StreamTables,
    pub state_decls: Vec<StateDecl>,
    pub warn: WarnSink,
    quotations: FxHashMap<String, Quotation>,
}

impl Interpreter {
    /// A context with the standard builtins and evaluables registered.
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        let evals = EvalRegistry::standard(&mut symbols);
        Self {
            symbols,
            cdata: CDataRegistry::new(),
            heap: Heap::new(),
            db: Db::new(),
            builtins: crate::builtin::standard(),
            evals,
            streams: StreamTables::new(),
            state_decls: Vec::new(),
            warn: WarnSink::new(),
            quotations: FxHashMap::default(),
        }
    }

    /// Load a compiled program into the database.
    pub fn load(&mut self, program: Program) -> Result<(), Error> {
        self.db.load(&self.heap, &self.cdata, program)
    }

    /// Register a foreign predicate.
    pub fn register_builtin(&mut self, decl: BuiltinDecl) -> BuiltinId {
        self.builtins.register(decl)
    }

    /// Declare a state component; returns the id used to read and update
    /// it from builtins.
    pub fn declare_state(&mut self, decl: StateDecl) -> ComponentId {
        let id = ComponentId(self.state_decls.len() as u32);
        self.state_decls.push(decl);
        id
    }

    /// Register a quotation under a name the compiler resolves.
    pub fn register_quotation(&mut self, name: &str, quotation: Quotation) {
        self.quotations.insert(name.to_string(), quotation);
    }

    pub fn quotation(&self, name: &str) -> Option<Quotation> {
        self.quotations.get(name).cloned()
    }

    /// Run a query to its first outcome.
    pub fn solve(&mut self, query: &Query, opts: Opts) -> Result<Outcome, Error> {
        let mut solver = Solver::new(self, query, opts)?;
        solver.run()
    }

    /// A resumable solver for enumerating solutions.
    pub fn solver<'a>(&'a mut self, query: &Query, opts: Opts) -> Result<Solver<'a>, Error> {
        Solver::new(self, query, opts)
    }

    /// Print every registered builtin with its doc line.
    pub fn document_builtins(&self, out: &mut impl Write) -> std::io::Result<()> {
        for (_, decl) in self.builtins.iter() {
            let arity = match decl.arity {
                Some(n) => n.to_string(),
                None => "variadic".to_string(),
            };
            writeln!(out, "{} ({}): {}", decl.name, arity, decl.doc)?;
        }
        Ok(())
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
