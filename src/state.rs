//! Host-declared state components, threaded through every reduction step
//! and rolled back by the trail.

use crate::trail::{Trail, TrailEntry};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Identifier of a declared state component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub u32);

/// An opaque component value. Updates replace the whole value; the trail
/// keeps the previous one.
#[derive(Clone)]
pub struct Value(pub Rc<dyn Any>);

impl Value {
    pub fn new<T: 'static>(value: T) -> Self {
        Value(Rc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<state value>")
    }
}

/// Declaration of a state component.
pub struct StateDecl {
    pub name: String,
    pub init: Box<dyn Fn() -> Value>,
    pub pp: Box<dyn Fn(&Value) -> String>,
}

/// The component map carried by a running solver. Every update is
/// functional at the component granularity and is undone on backtrack.
#[derive(Debug, Default)]
pub struct State {
    map: FxHashMap<u32, Value>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the initial map from the host's declarations.
    pub fn init_from(decls: &[StateDecl]) -> Self {
        let mut map = FxHashMap::default();
        for (idx, decl) in decls.iter().enumerate() {
            map.insert(idx as u32, (decl.init)());
        }
        Self { map }
    }

    pub fn get(&self, component: ComponentId) -> Option<&Value> {
        self.map.get(&component.0)
    }

    /// Update a component, trailing the prior value.
    pub fn set(&mut self, trail: &mut Trail, component: ComponentId, value: Value) {
        let prior = self.map.insert(component.0, value);
        trail.push(TrailEntry::StateSet { component, prior });
    }

    /// Trail-only entry point restoring a prior value.
    pub(crate) fn restore(&mut self, component: ComponentId, prior: Option<Value>) {
        match prior {
            Some(value) => {
                self.map.insert(component.0, value);
            }
            None => {
                self.map.remove(&component.0);
            }
        }
    }

    /// Clone of the live map, for publishing solutions.
    pub fn snapshot(&self) -> Vec<(ComponentId, Value)> {
        let mut out: Vec<_> = self
            .map
            .iter()
            .map(|(&k, v)| (ComponentId(k), v.clone()))
            .collect();
        out.sort_by_key(|(k, _)| k.0);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintStore;
    use crate::heap::VarStore;

    fn counter_decl() -> StateDecl {
        StateDecl {
            name: "counter".to_string(),
            init: Box::new(|| Value::new(0i64)),
            pp: Box::new(|v| format!("{}", v.downcast_ref::<i64>().unwrap_or(&-1))),
        }
    }

    #[test]
    fn init_from_runs_initializers() {
        let decls = vec![counter_decl()];
        let state = State::init_from(&decls);
        let value = state.get(ComponentId(0)).unwrap();
        assert_eq!(value.downcast_ref::<i64>(), Some(&0));
    }

    #[test]
    fn set_replaces_and_trails() {
        let decls = vec![counter_decl()];
        let mut state = State::init_from(&decls);
        let mut trail = Trail::new();

        state.set(&mut trail, ComponentId(0), Value::new(5i64));
        assert_eq!(
            state.get(ComponentId(0)).unwrap().downcast_ref::<i64>(),
            Some(&5)
        );
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn undo_restores_prior_component_value() {
        let decls = vec![counter_decl()];
        let mut state = State::init_from(&decls);
        let mut trail = Trail::new();
        let mut vars = VarStore::new();
        let mut store = ConstraintStore::new();

        let mark = trail.mark();
        state.set(&mut trail, ComponentId(0), Value::new(5i64));
        state.set(&mut trail, ComponentId(0), Value::new(9i64));
        trail.undo_to(mark, &mut vars, &mut store, &mut state);

        assert_eq!(
            state.get(ComponentId(0)).unwrap().downcast_ref::<i64>(),
            Some(&0),
            "backtracking restores the initial value"
        );
    }

    #[test]
    fn snapshot_is_ordered() {
        let decls = vec![counter_decl(), counter_decl()];
        let state = State::init_from(&decls);
        let snap = state.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].0, ComponentId(0));
        assert_eq!(snap[1].0, ComponentId(1));
    }
}
