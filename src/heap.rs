use crate::term::{TermId, TermStore};

/// Stable index of a unification-variable body in the [`VarStore`] arena.
/// Two term nodes alias the same variable iff they carry the same index,
/// which stands in for pointer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Allocation order: a smaller index was allocated earlier. Flex/flex
    /// unification assigns the younger variable to the older one.
    pub fn older_than(self, other: VarId) -> bool {
        self.0 < other.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw_for_tests(raw: u32) -> Self {
        VarId(raw)
    }
}

/// Arena of unification-variable bodies. A cell is either unbound (`None`,
/// a sentinel no term equals) or assigned to a term whose free bound-variable
/// levels are all below the binding depth recorded on the referencing nodes.
///
/// Cells are never deallocated; backtracking restores their prior value
/// through the trail. Fresh cells allocated along an abandoned branch are
/// simply left unbound and unreferenced.
pub struct VarStore {
    cells: Vec<Option<TermId>>,
}

impl VarStore {
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    /// Allocate a fresh unbound variable.
    pub fn fresh(&mut self) -> VarId {
        let id = VarId(self.cells.len() as u32);
        self.cells.push(None);
        id
    }

    /// Current value of a cell, `None` when unbound.
    pub fn get(&self, var: VarId) -> Option<TermId> {
        self.cells[var.0 as usize]
    }

    pub fn is_assigned(&self, var: VarId) -> bool {
        self.get(var).is_some()
    }

    /// Raw cell write. Callers go through [`crate::trail::assign`] so the
    /// mutation is paired with exactly one trail entry; the trail itself
    /// uses this to restore prior states.
    pub(crate) fn set(&mut self, var: VarId, value: Option<TermId>) {
        self.cells[var.0 as usize] = value;
    }

    /// Number of allocated cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Snapshot of every cell, for trail-soundness checks.
    pub fn snapshot(&self) -> Vec<Option<TermId>> {
        self.cells.clone()
    }
}

impl Default for VarStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The mutable term state threaded through dereference, motion,
/// unification and the solver: immutable hashconsed nodes plus the
/// variable arena they point into.
pub struct Heap {
    pub terms: TermStore,
    pub vars: VarStore,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            terms: TermStore::new(),
            vars: VarStore::new(),
        }
    }

    /// Allocate a fresh variable and return its eta-expanded node at the
    /// given binding depth.
    pub fn fresh_uvar(&mut self, depth: u32) -> TermId {
        let var = self.vars.fresh();
        self.terms.uvar(var, depth, 0)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
