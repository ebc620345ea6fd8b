use hashbrown::HashMap;
use lasso::{Rodeo, Spur};
use rustc_hash::FxBuildHasher;

/// A constant id. Negative ids denote globally interned symbols; ids `>= 0`
/// are bound variables given as de Bruijn levels (distance from the root of
/// the containing term, growing inward).
pub type ConstId = i32;

/// Ids reserved for the language's logical constants. The symbol table
/// interns these names first, in this order, so the ids are stable.
pub mod global {
    use super::ConstId;

    pub const EQ: ConstId = -1;
    pub const AND: ConstId = -2;
    pub const OR: ConstId = -3;
    pub const CONJ: ConstId = -4;
    pub const RIMPL: ConstId = -5;
    pub const IMPL: ConstId = -6;
    pub const PI: ConstId = -7;
    pub const SIGMA: ConstId = -8;
    pub const CUT: ConstId = -9;
    pub const TRUE: ConstId = -10;
    pub const FAIL: ConstId = -11;
    pub const CTYPE: ConstId = -12;
    pub const SPILL: ConstId = -13;

    /// Reserved names, positionally aligned with the ids above.
    pub const NAMES: &[&str] = &[
        "=", ",", ";", "&", ":-", "=>", "pi", "sigma", "!", "true", "fail", "ctype", "spill",
    ];
}

/// Bidirectional interning of constant names.
///
/// Guarantees:
/// - Same string always produces the same (negative) ConstId
/// - Ids resolve back to the original string
/// - The ids in [`global`] are reserved at construction
pub struct SymbolTable {
    rodeo: Rodeo,
    /// Spur for global id `-(k+1)` at index `k`.
    spurs: Vec<Spur>,
    ids: HashMap<Spur, ConstId, FxBuildHasher>,
}

impl SymbolTable {
    /// Create a table with the reserved logical constants interned.
    pub fn new() -> Self {
        let mut table = Self {
            rodeo: Rodeo::new(),
            spurs: Vec::new(),
            ids: HashMap::default(),
        };
        for name in global::NAMES {
            table.intern(name);
        }
        debug_assert_eq!(table.get("="), Some(global::EQ));
        debug_assert_eq!(table.get("spill"), Some(global::SPILL));
        table
    }

    /// Intern a global symbol, returning its negative id. Re-interning
    /// returns the existing id.
    pub fn intern(&mut self, name: &str) -> ConstId {
        let spur = self.rodeo.get_or_intern(name);
        if let Some(&id) = self.ids.get(&spur) {
            return id;
        }
        let id = -(self.spurs.len() as ConstId) - 1;
        self.spurs.push(spur);
        self.ids.insert(spur, id);
        id
    }

    /// Resolve a global id back to its name. Bound-variable levels and
    /// unknown ids resolve to `None`.
    pub fn resolve(&self, id: ConstId) -> Option<&str> {
        if id >= 0 {
            return None;
        }
        let idx = (-id - 1) as usize;
        self.spurs.get(idx).map(|spur| self.rodeo.resolve(spur))
    }

    /// Get the id of a symbol without interning it.
    pub fn get(&self, name: &str) -> Option<ConstId> {
        let spur = self.rodeo.get(name)?;
        self.ids.get(&spur).copied()
    }

    /// Number of interned globals.
    pub fn len(&self) -> usize {
        self.spurs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spurs.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// True iff the id denotes a globally interned symbol.
pub fn is_global(id: ConstId) -> bool {
    id < 0
}

/// True iff the id denotes a bound variable level.
pub fn is_bound(id: ConstId) -> bool {
    id >= 0
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== RESERVED TABLE ==========

    #[test]
    fn reserved_ids_are_stable() {
        let table = SymbolTable::new();
        assert_eq!(table.get("="), Some(global::EQ));
        assert_eq!(table.get(","), Some(global::AND));
        assert_eq!(table.get(";"), Some(global::OR));
        assert_eq!(table.get("&"), Some(global::CONJ));
        assert_eq!(table.get(":-"), Some(global::RIMPL));
        assert_eq!(table.get("=>"), Some(global::IMPL));
        assert_eq!(table.get("pi"), Some(global::PI));
        assert_eq!(table.get("sigma"), Some(global::SIGMA));
        assert_eq!(table.get("!"), Some(global::CUT));
        assert_eq!(table.get("true"), Some(global::TRUE));
        assert_eq!(table.get("fail"), Some(global::FAIL));
        assert_eq!(table.get("ctype"), Some(global::CTYPE));
    }

    #[test]
    fn reserved_names_resolve() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve(global::PI), Some("pi"));
        assert_eq!(table.resolve(global::CUT), Some("!"));
    }

    // ========== INTERNING ==========

    #[test]
    fn intern_allocates_downward() {
        let mut table = SymbolTable::new();
        let n = table.len() as ConstId;
        let id = table.intern("append");
        assert_eq!(id, -n - 1, "fresh globals extend the negative range");
    }

    #[test]
    fn intern_same_name_returns_same_id() {
        let mut table = SymbolTable::new();
        let id1 = table.intern("append");
        let id2 = table.intern("append");
        assert_eq!(id1, id2);
    }

    #[test]
    fn intern_different_names_differ() {
        let mut table = SymbolTable::new();
        assert_ne!(table.intern("append"), table.intern("member"));
    }

    #[test]
    fn resolve_round_trips() {
        let mut table = SymbolTable::new();
        let id = table.intern("rev");
        assert_eq!(table.resolve(id), Some("rev"));
    }

    #[test]
    fn get_does_not_intern() {
        let table = SymbolTable::new();
        assert_eq!(table.get("no-such-symbol"), None);
    }

    // ========== LEVELS ==========

    #[test]
    fn bound_levels_never_resolve() {
        let table = SymbolTable::new();
        assert_eq!(table.resolve(0), None);
        assert_eq!(table.resolve(7), None);
    }

    #[test]
    fn global_and_bound_predicates() {
        assert!(is_global(-3));
        assert!(!is_global(0));
        assert!(is_bound(0));
        assert!(is_bound(12));
        assert!(!is_bound(-1));
    }
}
