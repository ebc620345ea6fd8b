//! lamlog reference driver.
//!
//! The core is an embedded runtime: programs and queries come in compiled
//! form from a host. The driver exposes the option surface and the builtin
//! documentation; anything it does not recognise is reported back.
//!
//! Exit codes: 0 success, 1 failure, 2 usage error.

use lamlog::api::Interpreter;
use lamlog::cli::{parse_args, usage};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (opts, rest) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{}", err);
            eprint!("{}", usage());
            return ExitCode::from(2);
        }
    };

    if opts.trace {
        lamlog::trace::init_subscriber();
    }

    if opts.document_builtins {
        let interp = Interpreter::new();
        let mut stdout = std::io::stdout();
        if let Err(err) = interp.document_builtins(&mut stdout) {
            eprintln!("error: {}", err);
            return ExitCode::from(1);
        }
        return ExitCode::SUCCESS;
    }

    if !rest.is_empty() {
        eprintln!("unrecognised arguments: {}", rest.join(" "));
        eprint!("{}", usage());
        return ExitCode::from(2);
    }

    print!("{}", usage());
    ExitCode::SUCCESS
}
