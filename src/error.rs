use std::fmt;

/// A source location carried by compiled terms and error reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Loc {
    /// Source name (file path or synthetic origin).
    pub source: String,
    /// 1-based line number.
    pub line: u32,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

/// Fatal error kinds. Logical failure is not an error: builtins and the
/// unifier report it through their own result variants, and the solver
/// answers it by backtracking.
///
/// A fatal error unwinds past all choice points and returns control to the
/// host; the core does not attempt partial recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A builtin or the evaluator received arguments violating its
    /// declared signature.
    Type { msg: String, loc: Option<Loc> },
    /// Well-formed but illegal program state at run time (unification
    /// outside the pattern fragment with delay disabled, evaluating a
    /// non-closed term, I/O failure).
    Runtime(String),
    /// Violated internal invariant (a compiled `Arg` node reached the
    /// solver, a non-heap term reached `deref`). Indicates a bug.
    Anomaly(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Type { msg, loc: Some(loc) } => write!(f, "type error at {}: {}", loc, msg),
            Error::Type { msg, loc: None } => write!(f, "type error: {}", msg),
            Error::Runtime(msg) => write!(f, "error: {}", msg),
            Error::Anomaly(msg) => write!(f, "anomaly: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Build a type error without a location.
pub fn type_error<T>(msg: impl Into<String>) -> Result<T, Error> {
    Err(Error::Type {
        msg: msg.into(),
        loc: None,
    })
}

/// Build a runtime ("regular") error.
pub fn runtime_error<T>(msg: impl Into<String>) -> Result<T, Error> {
    Err(Error::Runtime(msg.into()))
}

/// Build an anomaly.
pub fn anomaly<T>(msg: impl Into<String>) -> Result<T, Error> {
    Err(Error::Anomaly(msg.into()))
}

/// Overridable sink for non-fatal warnings. The default writes to stderr;
/// embedders replace it to route diagnostics elsewhere.
pub struct WarnSink {
    sink: Box<dyn Fn(&str)>,
}

impl WarnSink {
    pub fn new() -> Self {
        Self {
            sink: Box::new(|msg| eprintln!("warning: {}", msg)),
        }
    }

    /// Replace the sink callback.
    pub fn set(&mut self, sink: impl Fn(&str) + 'static) {
        self.sink = Box::new(sink);
    }

    pub fn warn(&self, msg: &str) {
        (self.sink)(msg)
    }
}

impl Default for WarnSink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WarnSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WarnSink")
    }
}
