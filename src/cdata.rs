use crate::error::Loc;
use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use std::any::Any;
use std::rc::Rc;

/// Identifier of a host-declared opaque data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CTypeId(pub u32);

/// Identifier of an injected primitive datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CDataId(pub u32);

/// Class of a primitive datum, used by clause indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CClass {
    Int,
    Float,
    Str,
    Loc,
    Ext(CTypeId),
}

/// An injected primitive value. Floats are stored by bit pattern so the
/// registry stays `Eq`/`Hash`-clean.
#[derive(Debug, Clone)]
pub enum CVal {
    Int(i64),
    Float(u64),
    Str(Box<str>),
    Loc(Loc),
    Ext { ty: CTypeId, value: Rc<dyn Any> },
}

/// Descriptor for a host-declared opaque type.
///
/// `eq` and `hash` must be pure: they are called during unification and
/// interning and must not touch any solver state.
pub struct CTypeDecl {
    pub name: String,
    pub pp: fn(&dyn Any) -> String,
    pub eq: fn(&dyn Any, &dyn Any) -> bool,
    pub hash: fn(&dyn Any) -> u64,
    /// When set, injections of this type go through an intern table keyed
    /// on `eq`/`hash`, so equal values share one id.
    pub hconsed: bool,
}

/// Registry of primitive data: the built-in int/float/string/location
/// leaves plus host-declared opaque types.
///
/// The built-in leaves are always interned, so id equality decides their
/// term equality. Opaque values are interned only when declared `hconsed`.
pub struct CDataRegistry {
    types: Vec<CTypeDecl>,
    vals: Vec<CVal>,
    ints: HashMap<i64, CDataId, FxBuildHasher>,
    floats: HashMap<u64, CDataId, FxBuildHasher>,
    strs: HashMap<Box<str>, CDataId, FxBuildHasher>,
    locs: HashMap<Loc, CDataId, FxBuildHasher>,
    /// Buckets of hconsed opaque values, keyed by (type, user hash).
    ext: HashMap<(u32, u64), SmallVec<[CDataId; 1]>, FxBuildHasher>,
}

impl CDataRegistry {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            vals: Vec::new(),
            ints: HashMap::default(),
            floats: HashMap::default(),
            strs: HashMap::default(),
            locs: HashMap::default(),
            ext: HashMap::default(),
        }
    }

    /// Declare an opaque type. Registration is a construction-time step;
    /// the registry is read-mostly during solving.
    pub fn declare(&mut self, decl: CTypeDecl) -> CTypeId {
        let id = CTypeId(self.types.len() as u32);
        self.types.push(decl);
        id
    }

    pub fn type_decl(&self, ty: CTypeId) -> Option<&CTypeDecl> {
        self.types.get(ty.0 as usize)
    }

    fn push(&mut self, val: CVal) -> CDataId {
        let id = CDataId(self.vals.len() as u32);
        self.vals.push(val);
        id
    }

    pub fn int(&mut self, n: i64) -> CDataId {
        if let Some(&id) = self.ints.get(&n) {
            return id;
        }
        let id = self.push(CVal::Int(n));
        self.ints.insert(n, id);
        id
    }

    pub fn float(&mut self, x: f64) -> CDataId {
        let bits = x.to_bits();
        if let Some(&id) = self.floats.get(&bits) {
            return id;
        }
        let id = self.push(CVal::Float(bits));
        self.floats.insert(bits, id);
        id
    }

    pub fn str(&mut self, s: &str) -> CDataId {
        if let Some(&id) = self.strs.get(s) {
            return id;
        }
        let id = self.push(CVal::Str(s.into()));
        self.strs.insert(s.into(), id);
        id
    }

    pub fn loc(&mut self, loc: Loc) -> CDataId {
        if let Some(&id) = self.locs.get(&loc) {
            return id;
        }
        let id = self.push(CVal::Loc(loc.clone()));
        self.locs.insert(loc, id);
        id
    }

    /// Inject an opaque value of a declared type.
    pub fn ext(&mut self, ty: CTypeId, value: Rc<dyn Any>) -> CDataId {
        let decl = &self.types[ty.0 as usize];
        if !decl.hconsed {
            return self.push(CVal::Ext { ty, value });
        }
        let key = (ty.0, (decl.hash)(value.as_ref()));
        let eq = decl.eq;
        if let Some(bucket) = self.ext.get(&key) {
            for &id in bucket {
                if let CVal::Ext { value: old, .. } = &self.vals[id.0 as usize] {
                    if eq(old.as_ref(), value.as_ref()) {
                        return id;
                    }
                }
            }
        }
        let id = self.push(CVal::Ext { ty, value });
        self.ext.entry(key).or_default().push(id);
        id
    }

    pub fn get(&self, id: CDataId) -> &CVal {
        &self.vals[id.0 as usize]
    }

    pub fn as_int(&self, id: CDataId) -> Option<i64> {
        match self.get(id) {
            CVal::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self, id: CDataId) -> Option<f64> {
        match self.get(id) {
            CVal::Float(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    pub fn as_str(&self, id: CDataId) -> Option<&str> {
        match self.get(id) {
            CVal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn class_of(&self, id: CDataId) -> CClass {
        match self.get(id) {
            CVal::Int(_) => CClass::Int,
            CVal::Float(_) => CClass::Float,
            CVal::Str(_) => CClass::Str,
            CVal::Loc(_) => CClass::Loc,
            CVal::Ext { ty, .. } => CClass::Ext(*ty),
        }
    }

    /// Equality between injected values. Pure: dispatches to the declared
    /// `eq` for opaque types, id/value comparison otherwise.
    pub fn eq(&self, a: CDataId, b: CDataId) -> bool {
        if a == b {
            return true;
        }
        match (self.get(a), self.get(b)) {
            // interned leaves: distinct ids are distinct values
            (CVal::Int(_), CVal::Int(_))
            | (CVal::Float(_), CVal::Float(_))
            | (CVal::Str(_), CVal::Str(_))
            | (CVal::Loc(_), CVal::Loc(_)) => false,
            (CVal::Ext { ty: t1, value: v1 }, CVal::Ext { ty: t2, value: v2 }) if t1 == t2 => {
                (self.types[t1.0 as usize].eq)(v1.as_ref(), v2.as_ref())
            }
            _ => false,
        }
    }

    /// Render a value for diagnostics and solution display.
    pub fn pp(&self, id: CDataId) -> String {
        match self.get(id) {
            CVal::Int(n) => n.to_string(),
            CVal::Float(bits) => format!("{:?}", f64::from_bits(*bits)),
            CVal::Str(s) => format!("{:?}", s),
            CVal::Loc(loc) => loc.to_string(),
            CVal::Ext { ty, value } => (self.types[ty.0 as usize].pp)(value.as_ref()),
        }
    }
}

impl Default for CDataRegistry {
    fn default() -> Self {
        Self::new()
    }
}
