//! Two-level clause indexing: head constant, then the first argument's
//! top constructor. Lookups return candidate positions in source order;
//! clauses with a flexible first argument appear in every bucket.

use crate::cdata::{CClass, CDataRegistry};
use crate::clause::{Clause, Graft, Program};
use crate::error::{runtime_error, Error};
use crate::heap::Heap;
use crate::subst::deref;
use crate::symbol::ConstId;
use crate::term::{Term, TermId};
use crate::trail::Trail;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;

/// Index key derived from a first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKey {
    /// Flexible (or no first argument): matches every bucket.
    Flex,
    /// Constant head (global or bound level).
    Const(ConstId),
    /// Primitive data, keyed by class rather than value.
    Data(CClass),
    Nil,
    Cons,
    Lam,
}

/// Key of a runtime call argument.
pub fn arg_key(
    heap: &mut Heap,
    trail: &mut Trail,
    cdata: &CDataRegistry,
    depth: u32,
    t: TermId,
) -> Result<ArgKey, Error> {
    let t = deref(heap, trail, depth, t)?;
    Ok(match heap.terms.resolve(t) {
        Term::Const(c) => ArgKey::Const(*c),
        Term::App(h, _) => ArgKey::Const(*h),
        Term::CData(id) => ArgKey::Data(cdata.class_of(*id)),
        Term::Nil => ArgKey::Nil,
        Term::Cons(_, _) => ArgKey::Cons,
        Term::Lam(_) => ArgKey::Lam,
        Term::UVar { .. } | Term::AppUVar { .. } | Term::Discard | Term::Builtin(_, _) => {
            ArgKey::Flex
        }
        Term::Arg(_) | Term::AppArg(_, _) => {
            return Err(Error::Anomaly(
                "compiled Arg node in a call argument".to_string(),
            ))
        }
    })
}

/// Key of a compiled clause's first head argument. Compiled terms are
/// never assigned, so no dereference happens here.
fn clause_key(heap: &Heap, cdata: &CDataRegistry, args: &[TermId]) -> ArgKey {
    let Some(&first) = args.first() else {
        return ArgKey::Flex;
    };
    match heap.terms.resolve(first) {
        Term::Const(c) => ArgKey::Const(*c),
        Term::App(h, _) => ArgKey::Const(*h),
        Term::CData(id) => ArgKey::Data(cdata.class_of(*id)),
        Term::Nil => ArgKey::Nil,
        Term::Cons(_, _) => ArgKey::Cons,
        Term::Lam(_) => ArgKey::Lam,
        _ => ArgKey::Flex,
    }
}

/// Per-predicate index. Buckets are pre-merged with the flex clauses so a
/// lookup is a single slice in source order.
#[derive(Debug, Default)]
struct PredIndex {
    all: Vec<u32>,
    flex: Vec<u32>,
    by_key: HashMap<ArgKey, Vec<u32>, FxBuildHasher>,
}

impl PredIndex {
    fn insert(&mut self, pos: u32, key: ArgKey) {
        self.all.push(pos);
        match key {
            ArgKey::Flex => {
                self.flex.push(pos);
                for bucket in self.by_key.values_mut() {
                    bucket.push(pos);
                }
            }
            key => {
                let flex = &self.flex;
                self.by_key
                    .entry(key)
                    .or_insert_with(|| flex.clone())
                    .push(pos);
            }
        }
    }

    fn lookup(&self, key: ArgKey) -> &[u32] {
        match key {
            ArgKey::Flex => &self.all,
            key => self.by_key.get(&key).map(Vec::as_slice).unwrap_or(&self.flex),
        }
    }
}

/// The global clause database: an ordered clause list (grafts spliced at
/// load time) plus the two-level index.
#[derive(Debug, Default)]
pub struct Db {
    clauses: Vec<Clause>,
    preds: HashMap<ConstId, PredIndex, FxBuildHasher>,
}

impl Db {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a program, splicing `:before`/`:after` clauses next to their
    /// named anchors, then rebuild the index.
    pub fn load(
        &mut self,
        heap: &Heap,
        cdata: &CDataRegistry,
        program: Program,
    ) -> Result<(), Error> {
        for clause in program.clauses {
            match &clause.graft {
                None => self.clauses.push(clause),
                Some(Graft::Before(name)) => {
                    let at = self.position_of(name)?;
                    self.clauses.insert(at, clause);
                }
                Some(Graft::After(name)) => {
                    let at = self.position_of(name)?;
                    self.clauses.insert(at + 1, clause);
                }
            }
        }
        self.rebuild(heap, cdata);
        Ok(())
    }

    fn position_of(&self, name: &str) -> Result<usize, Error> {
        match self
            .clauses
            .iter()
            .position(|c| c.name.as_deref() == Some(name))
        {
            Some(pos) => Ok(pos),
            None => runtime_error(format!("no clause named {:?} to graft onto", name)),
        }
    }

    fn rebuild(&mut self, heap: &Heap, cdata: &CDataRegistry) {
        self.preds.clear();
        for (pos, clause) in self.clauses.iter().enumerate() {
            let key = clause_key(heap, cdata, &clause.head_args);
            self.preds
                .entry(clause.head_const)
                .or_default()
                .insert(pos as u32, key);
        }
    }

    /// Candidate clauses for a call, in source order.
    pub fn candidates(&self, pred: ConstId, key: ArgKey, out: &mut Vec<Clause>) {
        if let Some(index) = self.preds.get(&pred) {
            for &pos in index.lookup(key) {
                out.push(self.clauses[pos as usize].clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}
