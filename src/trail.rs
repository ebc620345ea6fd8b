use crate::constraint::{ConstraintStore, SuspId, Suspended};
use crate::heap::{VarId, VarStore};
use crate::state::{ComponentId, State, Value};
use crate::term::TermId;
use smallvec::SmallVec;

/// Position in the trail, taken at choice points and at unifier entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TrailMark(usize);

/// One undoable mutation.
#[derive(Debug, Clone)]
pub enum TrailEntry {
    /// A uvar cell changed; holds the prior value.
    Assign { var: VarId, prior: Option<TermId> },
    /// A suspended goal entered the constraint store.
    SuspAdded(SuspId),
    /// A suspended goal left the constraint store; holds it for re-insertion.
    SuspRemoved(SuspId, Suspended),
    /// A state component changed; holds the prior value.
    StateSet {
        component: ComponentId,
        prior: Option<Value>,
    },
}

/// Stack of undo records. The trail is the only mechanism by which the
/// solver backtracks: all other solver state is either stack-allocated or
/// captured in the choice point itself.
pub struct Trail {
    entries: Vec<TrailEntry>,
}

impl Trail {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record the current trail length.
    pub fn mark(&self) -> TrailMark {
        TrailMark(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn push(&mut self, entry: TrailEntry) {
        self.entries.push(entry);
    }

    /// Pop entries back to `mark`, restoring each mutation in reverse
    /// order.
    pub fn undo_to(
        &mut self,
        mark: TrailMark,
        vars: &mut VarStore,
        store: &mut ConstraintStore,
        state: &mut State,
    ) {
        while self.entries.len() > mark.0 {
            match self.entries.pop().unwrap_or_else(|| unreachable!()) {
                TrailEntry::Assign { var, prior } => vars.set(var, prior),
                TrailEntry::SuspAdded(id) => store.revoke(id),
                TrailEntry::SuspRemoved(id, susp) => store.reinstate(id, susp),
                TrailEntry::StateSet { component, prior } => state.restore(component, prior),
            }
        }
    }

    /// Pop entries back to `mark` in a window known to contain only uvar
    /// assignments. Used by the unifier, which never touches the
    /// constraint store or the state map.
    pub fn undo_bindings_to(&mut self, mark: TrailMark, vars: &mut VarStore) {
        while self.entries.len() > mark.0 {
            match self.entries.pop().unwrap_or_else(|| unreachable!()) {
                TrailEntry::Assign { var, prior } => vars.set(var, prior),
                other => unreachable!("non-binding trail entry in a unifier window: {:?}", other),
            }
        }
    }

    /// Variables assigned since `mark`, oldest first. Used by the solver
    /// to wake suspensions after a unification step.
    pub fn assigned_since(&self, mark: TrailMark) -> SmallVec<[VarId; 4]> {
        let mut out = SmallVec::new();
        for entry in &self.entries[mark.0..] {
            if let TrailEntry::Assign { var, .. } = entry {
                out.push(*var);
            }
        }
        out
    }
}

impl Default for Trail {
    fn default() -> Self {
        Self::new()
    }
}

/// Assign a uvar cell, trailing the prior state. This is the only
/// assignment path in non-test code, so every mutation of a cell is paired
/// with exactly one trail entry.
pub fn assign(vars: &mut VarStore, trail: &mut Trail, var: VarId, value: TermId) {
    trail.push(TrailEntry::Assign {
        var,
        prior: vars.get(var),
    });
    vars.set(var, Some(value));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::TermId;

    fn undo(trail: &mut Trail, mark: TrailMark, vars: &mut VarStore) {
        let mut store = ConstraintStore::new();
        let mut state = State::new();
        trail.undo_to(mark, vars, &mut store, &mut state);
    }

    // ========== ASSIGNMENT ==========

    #[test]
    fn assign_sets_cell_and_trails() {
        let mut vars = VarStore::new();
        let mut trail = Trail::new();
        let v = vars.fresh();

        assign(&mut vars, &mut trail, v, TermId::from_raw(7));
        assert_eq!(vars.get(v), Some(TermId::from_raw(7)));
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn undo_restores_unbound_state() {
        let mut vars = VarStore::new();
        let mut trail = Trail::new();
        let v = vars.fresh();

        let mark = trail.mark();
        assign(&mut vars, &mut trail, v, TermId::from_raw(7));
        undo(&mut trail, mark, &mut vars);

        assert_eq!(vars.get(v), None);
        assert_eq!(trail.len(), 0);
    }

    #[test]
    fn undo_restores_in_reverse_order() {
        let mut vars = VarStore::new();
        let mut trail = Trail::new();
        let v = vars.fresh();

        assign(&mut vars, &mut trail, v, TermId::from_raw(1));
        let mark = trail.mark();
        assign(&mut vars, &mut trail, v, TermId::from_raw(2));
        assign(&mut vars, &mut trail, v, TermId::from_raw(3));

        undo(&mut trail, mark, &mut vars);
        assert_eq!(
            vars.get(v),
            Some(TermId::from_raw(1)),
            "undo must land on the value at the mark, not the initial one"
        );
    }

    #[test]
    fn undo_to_partial_mark() {
        let mut vars = VarStore::new();
        let mut trail = Trail::new();
        let v1 = vars.fresh();
        let v2 = vars.fresh();

        assign(&mut vars, &mut trail, v1, TermId::from_raw(1));
        let mark = trail.mark();
        assign(&mut vars, &mut trail, v2, TermId::from_raw(2));

        undo(&mut trail, mark, &mut vars);
        assert_eq!(vars.get(v1), Some(TermId::from_raw(1)));
        assert_eq!(vars.get(v2), None);
    }

    #[test]
    fn undo_is_bit_identical() {
        let mut vars = VarStore::new();
        let mut trail = Trail::new();
        for _ in 0..8 {
            vars.fresh();
        }
        assign(&mut vars, &mut trail, VarId::from_raw_for_tests(0), TermId::from_raw(9));

        let before = vars.snapshot();
        let mark = trail.mark();
        for i in 0..8 {
            assign(
                &mut vars,
                &mut trail,
                VarId::from_raw_for_tests(i),
                TermId::from_raw(i),
            );
        }
        undo(&mut trail, mark, &mut vars);
        assert_eq!(vars.snapshot(), before);
    }

    // ========== ASSIGNED-SINCE ==========

    #[test]
    fn assigned_since_reports_new_assignments() {
        let mut vars = VarStore::new();
        let mut trail = Trail::new();
        let v1 = vars.fresh();
        let v2 = vars.fresh();

        assign(&mut vars, &mut trail, v1, TermId::from_raw(1));
        let mark = trail.mark();
        assign(&mut vars, &mut trail, v2, TermId::from_raw(2));

        let assigned = trail.assigned_since(mark);
        assert_eq!(assigned.as_slice(), &[v2]);
    }

    #[test]
    fn assigned_since_empty_segment() {
        let trail = Trail::new();
        assert!(trail.assigned_since(trail.mark()).is_empty());
    }
}
