//! Side-effect-free evaluation of arithmetic and string expressions, used
//! by `is` and the comparison builtins, plus the stream tables backing the
//! I/O builtins.
//!
//! Evaluable symbols form their own table, separate from the predicate
//! database. Dispatch is exact on argument types: mixed numeric arguments
//! are a type error, never an implicit coercion.

use crate::cdata::{CDataId, CDataRegistry, CVal};
use crate::error::{runtime_error, type_error, Error};
use crate::heap::Heap;
use crate::subst::deref;
use crate::symbol::{ConstId, SymbolTable};
use crate::term::{Term, TermId};
use crate::trail::Trail;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

/// An evaluable primitive: fixed arity, exact type dispatch.
pub type EvalFn = fn(&mut CDataRegistry, &[CDataId]) -> Result<CDataId, Error>;

struct EvalEntry {
    name: String,
    arity: usize,
    f: EvalFn,
}

/// Table of evaluable symbols, keyed by the interned head constant.
#[derive(Default)]
pub struct EvalRegistry {
    by_const: FxHashMap<ConstId, EvalEntry>,
}

impl EvalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, symbols: &mut SymbolTable, name: &str, arity: usize, f: EvalFn) {
        let id = symbols.intern(name);
        self.by_const.insert(
            id,
            EvalEntry {
                name: name.to_string(),
                arity,
                f,
            },
        );
    }

    fn get(&self, id: ConstId) -> Option<&EvalEntry> {
        self.by_const.get(&id)
    }

    /// The standard arithmetic and string primitives.
    pub fn standard(symbols: &mut SymbolTable) -> Self {
        let mut reg = Self::new();
        reg.register(symbols, "+", 2, eval_add);
        reg.register(symbols, "-", 2, eval_sub);
        reg.register(symbols, "*", 2, eval_mul);
        reg.register(symbols, "/", 2, eval_div);
        reg.register(symbols, "mod", 2, eval_mod);
        reg.register(symbols, "abs", 1, eval_abs);
        reg.register(symbols, "min", 2, eval_min);
        reg.register(symbols, "max", 2, eval_max);
        reg.register(symbols, "int_to_real", 1, eval_int_to_real);
        reg.register(symbols, "^", 2, eval_concat);
        reg.register(symbols, "size", 1, eval_size);
        reg.register(symbols, "sub", 3, eval_substring);
        reg
    }
}

/// Evaluate a closed expression to a primitive datum.
pub fn eval(
    heap: &mut Heap,
    trail: &mut Trail,
    cdata: &mut CDataRegistry,
    evals: &EvalRegistry,
    depth: u32,
    t: TermId,
) -> Result<CDataId, Error> {
    let t = deref(heap, trail, depth, t)?;
    match heap.terms.resolve(t).clone() {
        Term::CData(id) => Ok(id),
        Term::App(head, args) => {
            let (arity, f, name) = match evals.get(head) {
                Some(entry) => (entry.arity, entry.f, entry.name.clone()),
                None => return type_error("head of an arithmetic expression is not evaluable"),
            };
            if args.len() != arity {
                return type_error(format!(
                    "evaluable {:?} expects {} arguments, got {}",
                    name,
                    arity,
                    args.len()
                ));
            }
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(heap, trail, cdata, evals, depth, arg)?);
            }
            f(cdata, &values)
        }
        Term::UVar { .. } | Term::AppUVar { .. } => {
            runtime_error("evaluating a non-closed expression")
        }
        Term::Const(_) => type_error("constant is not evaluable"),
        _ => type_error("term is not an arithmetic expression"),
    }
}

fn two_ints(cdata: &CDataRegistry, args: &[CDataId]) -> Option<(i64, i64)> {
    Some((cdata.as_int(args[0])?, cdata.as_int(args[1])?))
}

fn two_floats(cdata: &CDataRegistry, args: &[CDataId]) -> Option<(f64, f64)> {
    Some((cdata.as_float(args[0])?, cdata.as_float(args[1])?))
}

fn numeric_type_error<T>(op: &str) -> Result<T, Error> {
    type_error(format!(
        "{} expects two ints or two floats; mixed numeric arguments are not coerced",
        op
    ))
}

fn eval_add(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    if let Some((a, b)) = two_ints(cdata, args) {
        Ok(cdata.int(a.wrapping_add(b)))
    } else if let Some((a, b)) = two_floats(cdata, args) {
        Ok(cdata.float(a + b))
    } else {
        numeric_type_error("+")
    }
}

fn eval_sub(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    if let Some((a, b)) = two_ints(cdata, args) {
        Ok(cdata.int(a.wrapping_sub(b)))
    } else if let Some((a, b)) = two_floats(cdata, args) {
        Ok(cdata.float(a - b))
    } else {
        numeric_type_error("-")
    }
}

fn eval_mul(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    if let Some((a, b)) = two_ints(cdata, args) {
        Ok(cdata.int(a.wrapping_mul(b)))
    } else if let Some((a, b)) = two_floats(cdata, args) {
        Ok(cdata.float(a * b))
    } else {
        numeric_type_error("*")
    }
}

fn eval_div(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    if let Some((a, b)) = two_ints(cdata, args) {
        if b == 0 {
            return runtime_error("division by zero");
        }
        Ok(cdata.int(a.wrapping_div(b)))
    } else if let Some((a, b)) = two_floats(cdata, args) {
        Ok(cdata.float(a / b))
    } else {
        numeric_type_error("/")
    }
}

fn eval_mod(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    match two_ints(cdata, args) {
        Some((_, 0)) => runtime_error("mod by zero"),
        Some((a, b)) => Ok(cdata.int(a.wrapping_rem(b))),
        None => type_error("mod expects two ints"),
    }
}

fn eval_abs(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    if let Some(a) = cdata.as_int(args[0]) {
        Ok(cdata.int(a.wrapping_abs()))
    } else if let Some(a) = cdata.as_float(args[0]) {
        Ok(cdata.float(a.abs()))
    } else {
        type_error("abs expects an int or a float")
    }
}

fn eval_min(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    if let Some((a, b)) = two_ints(cdata, args) {
        Ok(cdata.int(a.min(b)))
    } else if let Some((a, b)) = two_floats(cdata, args) {
        Ok(cdata.float(a.min(b)))
    } else {
        numeric_type_error("min")
    }
}

fn eval_max(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    if let Some((a, b)) = two_ints(cdata, args) {
        Ok(cdata.int(a.max(b)))
    } else if let Some((a, b)) = two_floats(cdata, args) {
        Ok(cdata.float(a.max(b)))
    } else {
        numeric_type_error("max")
    }
}

fn eval_int_to_real(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    match cdata.as_int(args[0]) {
        Some(a) => Ok(cdata.float(a as f64)),
        None => type_error("int_to_real expects an int"),
    }
}

fn eval_concat(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    match (cdata.as_str(args[0]), cdata.as_str(args[1])) {
        (Some(a), Some(b)) => {
            let joined = format!("{}{}", a, b);
            Ok(cdata.str(&joined))
        }
        _ => type_error("^ expects two strings"),
    }
}

fn eval_size(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    match cdata.as_str(args[0]) {
        Some(s) => {
            let n = s.chars().count() as i64;
            Ok(cdata.int(n))
        }
        None => type_error("size expects a string"),
    }
}

fn eval_substring(cdata: &mut CDataRegistry, args: &[CDataId]) -> Result<CDataId, Error> {
    let (s, start, len) = match (
        cdata.as_str(args[0]),
        cdata.as_int(args[1]),
        cdata.as_int(args[2]),
    ) {
        (Some(s), Some(start), Some(len)) => (s.to_string(), start, len),
        _ => return type_error("sub expects a string and two ints"),
    };
    if start < 0 || len < 0 {
        return runtime_error("sub with a negative index");
    }
    let out: String = s
        .chars()
        .skip(start as usize)
        .take(len as usize)
        .collect();
    if out.chars().count() < len as usize {
        return runtime_error("sub past the end of the string");
    }
    Ok(cdata.str(&out))
}

/// Numeric/string comparison with exact type dispatch. Returns `None` on
/// incomparable classes so callers report their own type error.
pub fn compare(cdata: &CDataRegistry, a: CDataId, b: CDataId) -> Option<std::cmp::Ordering> {
    match (cdata.get(a), cdata.get(b)) {
        (CVal::Int(x), CVal::Int(y)) => Some(x.cmp(y)),
        (CVal::Float(x), CVal::Float(y)) => {
            f64::from_bits(*x).partial_cmp(&f64::from_bits(*y))
        }
        (CVal::Str(x), CVal::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// One open stream.
pub enum Stream {
    In(Box<dyn BufRead>),
    Out(Box<dyn Write>),
}

/// Handle-indexed stream tables. Handles 0, 1 and 2 are pre-registered as
/// stdin, stdout and stderr. Opening and closing are explicit: nothing is
/// finalised on backtrack, side effects are outside the logical model.
pub struct StreamTables {
    slots: Vec<Option<Stream>>,
}

impl StreamTables {
    pub fn new() -> Self {
        Self {
            slots: vec![
                Some(Stream::In(Box::new(BufReader::new(std::io::stdin())))),
                Some(Stream::Out(Box::new(std::io::stdout()))),
                Some(Stream::Out(Box::new(std::io::stderr()))),
            ],
        }
    }

    pub fn open_in(&mut self, path: &str) -> Result<i64, Error> {
        let file = File::open(path)
            .map_err(|err| Error::Runtime(format!("open_in {:?}: {}", path, err)))?;
        self.slots
            .push(Some(Stream::In(Box::new(BufReader::new(file)))));
        Ok(self.slots.len() as i64 - 1)
    }

    pub fn open_out(&mut self, path: &str) -> Result<i64, Error> {
        let file = File::create(path)
            .map_err(|err| Error::Runtime(format!("open_out {:?}: {}", path, err)))?;
        self.slots.push(Some(Stream::Out(Box::new(file))));
        Ok(self.slots.len() as i64 - 1)
    }

    fn slot(&mut self, handle: i64) -> Result<&mut Stream, Error> {
        self.slots
            .get_mut(handle.max(0) as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::Runtime(format!("unknown stream handle {}", handle)))
    }

    pub fn output(&mut self, handle: i64, text: &str) -> Result<(), Error> {
        match self.slot(handle)? {
            Stream::Out(w) => w
                .write_all(text.as_bytes())
                .map_err(|err| Error::Runtime(format!("output: {}", err))),
            Stream::In(_) => runtime_error("output to an input stream"),
        }
    }

    pub fn flush(&mut self, handle: i64) -> Result<(), Error> {
        match self.slot(handle)? {
            Stream::Out(w) => w
                .flush()
                .map_err(|err| Error::Runtime(format!("flush: {}", err))),
            Stream::In(_) => runtime_error("flush of an input stream"),
        }
    }

    pub fn input_line(&mut self, handle: i64) -> Result<String, Error> {
        match self.slot(handle)? {
            Stream::In(r) => {
                let mut line = String::new();
                r.read_line(&mut line)
                    .map_err(|err| Error::Runtime(format!("input_line: {}", err)))?;
                if line.ends_with('\n') {
                    line.pop();
                }
                Ok(line)
            }
            Stream::Out(_) => runtime_error("input_line on an output stream"),
        }
    }

    pub fn close_in(&mut self, handle: i64) -> Result<(), Error> {
        match self.slot(handle)? {
            Stream::In(_) => {
                self.slots[handle as usize] = None;
                Ok(())
            }
            Stream::Out(_) => runtime_error("close_in on an output stream"),
        }
    }

    pub fn close_out(&mut self, handle: i64) -> Result<(), Error> {
        match self.slot(handle)? {
            Stream::Out(_) => {
                self.slots[handle as usize] = None;
                Ok(())
            }
            Stream::In(_) => runtime_error("close_out on an input stream"),
        }
    }
}

impl Default for StreamTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/eval.rs"]
mod tests;
