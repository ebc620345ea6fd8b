use crate::api::Interpreter;
use crate::clause::{Clause, Program, Query};
use crate::solver::{Opts, Outcome, Solution};
use crate::symbol::{global, ConstId};
use crate::term::TermId;
use crate::trail::Trail;
use smallvec::SmallVec;

pub(crate) fn setup() -> (Interpreter, Trail) {
    (Interpreter::new(), Trail::new())
}

pub(crate) fn int(interp: &mut Interpreter, n: i64) -> TermId {
    let id = interp.cdata.int(n);
    interp.heap.terms.cdata(id)
}

pub(crate) fn fact(interp: &mut Interpreter, pred: ConstId, args: &[TermId]) -> Clause {
    let body = interp.heap.terms.con(global::TRUE);
    Clause {
        head_const: pred,
        head_args: args.iter().copied().collect(),
        body,
        nvars: 0,
        name: None,
        graft: None,
    }
}

pub(crate) fn rule(
    pred: ConstId,
    args: &[TermId],
    body: TermId,
    nvars: u32,
) -> Clause {
    Clause {
        head_const: pred,
        head_args: args.iter().copied().collect(),
        body,
        nvars,
        name: None,
        graft: None,
    }
}

/// Load the standard append clause pair and return its head constant.
///
/// ```text
/// append [] Ys Ys.
/// append [X|Xs] Ys [X|Zs] :- append Xs Ys Zs.
/// ```
pub(crate) fn load_append(interp: &mut Interpreter) -> ConstId {
    let append = interp.symbols.intern("append");
    let nil = interp.heap.terms.nil();
    let ys = interp.heap.terms.arg(0);
    let base = rule(append, &[nil, ys, ys], interp.heap.terms.con(global::TRUE), 1);

    let x = interp.heap.terms.arg(0);
    let xs = interp.heap.terms.arg(1);
    let ys = interp.heap.terms.arg(2);
    let zs = interp.heap.terms.arg(3);
    let head1 = interp.heap.terms.cons(x, xs);
    let head3 = interp.heap.terms.cons(x, zs);
    let rec_args: SmallVec<[TermId; 4]> = smallvec::smallvec![xs, ys, zs];
    let body = interp.heap.terms.app(append, rec_args);
    let step = rule(append, &[head1, ys, head3], body, 4);

    interp
        .load(Program {
            clauses: vec![base, step],
        })
        .expect("append program loads");
    append
}

/// A query with one named variable per entry of `names`.
pub(crate) fn query(names: &[&str], goal: TermId) -> Query {
    Query {
        nvars: names.len() as u32,
        var_names: names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i as u32))
            .collect(),
        goal,
    }
}

/// Collect up to `limit` solutions by re-running the solver.
pub(crate) fn solutions(
    interp: &mut Interpreter,
    q: &Query,
    opts: Opts,
    limit: usize,
) -> Vec<Solution> {
    let mut solver = interp.solver(q, opts).expect("query instantiates");
    let mut out = Vec::new();
    while out.len() < limit {
        match solver.run().expect("no fatal error") {
            Outcome::Success(solution) => out.push(solution),
            Outcome::Failure | Outcome::NoMoreSteps => break,
        }
    }
    out
}

/// The named assignment of a solution.
pub(crate) fn assignment(solution: &Solution, name: &str) -> TermId {
    solution
        .assignments
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, t)| *t)
        .unwrap_or_else(|| panic!("no assignment for {}", name))
}
