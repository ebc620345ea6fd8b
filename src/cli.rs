//! Option parsing for the reference driver.
//!
//! Recognised flags configure the solver; anything else is handed back to
//! the host unmodified. Exit codes of the driver: 0 success, 1 failure,
//! 2 usage error.

use crate::solver::Opts;
use std::fmt;

/// A malformed recognised flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError {
    pub msg: String,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usage error: {}", self.msg)
    }
}

impl std::error::Error for UsageError {}

/// Parse recognised flags out of `args`. Returns the options and the
/// arguments that were not recognised, in their original order.
pub fn parse_args(args: &[String]) -> Result<(Opts, Vec<String>), UsageError> {
    let mut opts = Opts::default();
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-trace" => opts.trace = true,
            "-delay-outside-fragment" => opts.delay_outside_fragment = true,
            "-document-builtins" => opts.document_builtins = true,
            "-max-steps" => {
                let value = iter.next().ok_or_else(|| UsageError {
                    msg: "-max-steps expects a number".to_string(),
                })?;
                let steps: u64 = value.parse().map_err(|_| UsageError {
                    msg: format!("-max-steps expects a number, got {:?}", value),
                })?;
                opts.max_steps = Some(steps);
            }
            _ => rest.push(arg.clone()),
        }
    }
    Ok((opts, rest))
}

/// Usage text for the reference driver.
pub fn usage() -> &'static str {
    "usage: lamlog [options]\n\
     \n\
     options:\n\
     \x20 -trace                    enable execution tracing\n\
     \x20 -delay-outside-fragment   suspend unification problems outside\n\
     \x20                           the pattern fragment instead of failing\n\
     \x20 -max-steps N              give up after N goal dispatches\n\
     \x20 -document-builtins        print the registered builtins and exit\n\
     \n\
     unrecognised arguments are reported back unmodified\n"
}
