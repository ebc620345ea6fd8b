//! The constraint store: goals the solver cannot dispatch yet, parked on
//! the unification variables they block on.
//!
//! Insertions and removals go through the trail, so the store follows the
//! solver through backtracking exactly like the uvar heap does. Wake-up is
//! driven synchronously by assignment: after each unification step the
//! solver re-enqueues every suspension blocked on a variable assigned in
//! that step, before any new choice point is installed.

use crate::clause::ProgCtx;
use crate::heap::VarId;
use crate::term::TermId;
use crate::trail::{Trail, TrailEntry};
use smallvec::SmallVec;

/// Identifier of a suspension slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuspId(pub u32);

/// A goal waiting for one of its blockers to be assigned.
#[derive(Debug, Clone)]
pub struct Suspended {
    pub goal: TermId,
    pub depth: u32,
    /// The hypothetical clauses in scope where the goal suspended.
    pub prog: ProgCtx,
    pub blockers: SmallVec<[VarId; 2]>,
}

/// Slot-addressed store of suspended goals. Slots are never reused within
/// a query; a removed suspension leaves a hole the trail can refill.
#[derive(Debug, Default)]
pub struct ConstraintStore {
    slots: Vec<Option<Suspended>>,
}

impl ConstraintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a goal, trailing the insertion.
    pub fn add(&mut self, trail: &mut Trail, susp: Suspended) -> SuspId {
        let id = SuspId(self.slots.len() as u32);
        self.slots.push(Some(susp));
        trail.push(TrailEntry::SuspAdded(id));
        id
    }

    /// Remove and return every suspension blocked on `var`, trailing each
    /// removal, in insertion order.
    pub fn wake_on(&mut self, trail: &mut Trail, var: VarId) -> SmallVec<[Suspended; 2]> {
        let mut woken = SmallVec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            let blocked = match slot {
                Some(susp) => susp.blockers.contains(&var),
                None => false,
            };
            if blocked {
                let susp = slot.take().unwrap_or_else(|| unreachable!());
                trail.push(TrailEntry::SuspRemoved(SuspId(idx as u32), susp.clone()));
                woken.push(susp);
            }
        }
        woken
    }

    /// Undo an insertion.
    pub(crate) fn revoke(&mut self, id: SuspId) {
        self.slots[id.0 as usize] = None;
    }

    /// Undo a removal.
    pub(crate) fn reinstate(&mut self, id: SuspId, susp: Suspended) {
        self.slots[id.0 as usize] = Some(susp);
    }

    /// Number of live suspensions.
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Store position, recorded in choice points for consistency checks.
    pub fn mark(&self) -> usize {
        self.slots.len()
    }

    pub fn is_quiet(&self) -> bool {
        self.live() == 0
    }

    /// True when every slot past `mark` is empty, i.e. the store matches
    /// the state recorded at a choice point after a trail unwind.
    pub fn quiet_beyond(&self, mark: usize) -> bool {
        self.slots[mark.min(self.slots.len())..]
            .iter()
            .all(Option::is_none)
    }

    /// Clones of the live suspensions, in insertion order. This is the
    /// solution-contract view of the store.
    pub fn snapshot(&self) -> Vec<Suspended> {
        self.slots.iter().flatten().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::VarStore;
    use crate::state::State;
    use crate::term::TermId;

    fn susp(goal: u32, blockers: &[VarId]) -> Suspended {
        Suspended {
            goal: TermId::from_raw(goal),
            depth: 0,
            prog: ProgCtx::empty(),
            blockers: blockers.iter().copied().collect(),
        }
    }

    #[test]
    fn add_and_snapshot() {
        let mut vars = VarStore::new();
        let v = vars.fresh();
        let mut store = ConstraintStore::new();
        let mut trail = Trail::new();

        store.add(&mut trail, susp(1, &[v]));
        assert_eq!(store.live(), 1);
        assert_eq!(store.snapshot().len(), 1);
        assert!(!store.is_quiet());
    }

    #[test]
    fn wake_removes_matching_suspensions() {
        let mut vars = VarStore::new();
        let v1 = vars.fresh();
        let v2 = vars.fresh();
        let mut store = ConstraintStore::new();
        let mut trail = Trail::new();

        store.add(&mut trail, susp(1, &[v1]));
        store.add(&mut trail, susp(2, &[v2]));
        store.add(&mut trail, susp(3, &[v1, v2]));

        let woken = store.wake_on(&mut trail, v1);
        assert_eq!(woken.len(), 2, "both suspensions blocked on v1 wake");
        assert_eq!(store.live(), 1);
        assert_eq!(woken[0].goal, TermId::from_raw(1));
        assert_eq!(woken[1].goal, TermId::from_raw(3));
    }

    #[test]
    fn wake_on_unrelated_var_is_a_noop() {
        let mut vars = VarStore::new();
        let v1 = vars.fresh();
        let v2 = vars.fresh();
        let mut store = ConstraintStore::new();
        let mut trail = Trail::new();

        store.add(&mut trail, susp(1, &[v1]));
        let woken = store.wake_on(&mut trail, v2);
        assert!(woken.is_empty());
        assert_eq!(store.live(), 1);
    }

    #[test]
    fn undo_restores_the_store_exactly() {
        let mut vars = VarStore::new();
        let v = vars.fresh();
        let mut store = ConstraintStore::new();
        let mut trail = Trail::new();
        let mut state = State::new();

        store.add(&mut trail, susp(1, &[v]));
        let mark = trail.mark();
        let live_before = store.live();

        store.add(&mut trail, susp(2, &[v]));
        let _ = store.wake_on(&mut trail, v);
        assert_eq!(store.live(), 0);

        trail.undo_to(mark, &mut vars, &mut store, &mut state);
        assert_eq!(store.live(), live_before);
        assert_eq!(store.snapshot()[0].goal, TermId::from_raw(1));
    }
}
