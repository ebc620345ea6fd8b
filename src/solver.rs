//! SLD resolution with chronological backtracking.
//!
//! The solver runs a goal stack of frames against the indexed clause
//! database and the hypothetical layers stacked by `=>`. Choice points
//! snapshot the goal stack and a trail mark; backtracking unwinds the
//! trail and resumes the saved alternative. Cut prunes the choice stack
//! back to the barrier captured when the enclosing clause was entered.

use crate::builtin::{BuiltinId, Ctx, Response};
use crate::clause::{clause_of_term, Clause, ProgCtx, Query};
use crate::constraint::{ConstraintStore, Suspended};
use crate::error::{runtime_error, type_error, Error};
use crate::index::{arg_key, ArgKey};
use crate::state::{State, Value};
use crate::subst::{beta, deref, full_deref, instantiate, mkapp};
use crate::symbol::{global, ConstId};
use crate::term::{Term, TermId};
use crate::trail::Trail;
use crate::unify::{unify, Unified};
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::{debug_span, trace};

/// Solver options. `document_builtins` is driver-facing and ignored here.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    pub trace: bool,
    pub delay_outside_fragment: bool,
    pub max_steps: Option<u64>,
    pub document_builtins: bool,
}

/// One pending goal with the context it runs in.
#[derive(Debug, Clone)]
pub struct Frame {
    pub depth: u32,
    pub prog: ProgCtx,
    pub goal: TermId,
    /// Choice-stack height cut prunes back to.
    pub cut_to: usize,
}

#[derive(Debug)]
enum Alternative {
    /// Remaining candidate clauses of a predicate call.
    Clauses {
        args: SmallVec<[TermId; 4]>,
        cands: Vec<Clause>,
        next: usize,
    },
    /// The right branch of a disjunction.
    OrBranch { goal: TermId },
}

#[derive(Debug)]
struct ChoicePoint {
    trail_mark: crate::trail::TrailMark,
    goals: Vec<Frame>,
    frame: Frame,
    alt: Alternative,
    constraint_mark: usize,
}

/// What a query run produced.
#[derive(Debug)]
pub enum Outcome {
    Success(Solution),
    /// The search space is exhausted.
    Failure,
    /// The step bound was hit between two dispatches; the heap, trail and
    /// constraints are consistent but the run can only be restarted.
    NoMoreSteps,
}

/// The solution contract: named assignments, the live constraint store,
/// and the host state components.
#[derive(Debug)]
pub struct Solution {
    pub assignments: Vec<(String, TermId)>,
    pub constraints: Vec<Suspended>,
    pub state: Vec<(String, Value)>,
}

enum Flow {
    Continue,
    Backtrack,
}

/// A running query over an interpreter.
pub struct Solver<'a> {
    interp: &'a mut crate::api::Interpreter,
    opts: Opts,
    goals: Vec<Frame>,
    cps: Vec<ChoicePoint>,
    trail: Trail,
    store: ConstraintStore,
    state: State,
    steps: u64,
    query_vars: Vec<(String, TermId)>,
    awaiting_next: bool,
    done: bool,
}

impl<'a> Solver<'a> {
    pub fn new(
        interp: &'a mut crate::api::Interpreter,
        query: &Query,
        opts: Opts,
    ) -> Result<Self, Error> {
        let mut trail = Trail::new();
        let state = State::init_from(&interp.state_decls);
        let env: Vec<TermId> = (0..query.nvars)
            .map(|_| interp.heap.fresh_uvar(0))
            .collect();
        let goal = instantiate(&mut interp.heap, &mut trail, 0, &env, query.goal)?;
        let query_vars = query
            .var_names
            .iter()
            .map(|(name, slot)| (name.clone(), env[*slot as usize]))
            .collect();
        Ok(Self {
            interp,
            opts,
            goals: vec![Frame {
                depth: 0,
                prog: ProgCtx::empty(),
                goal,
                cut_to: 0,
            }],
            cps: Vec::new(),
            trail,
            store: ConstraintStore::new(),
            state,
            steps: 0,
            query_vars,
            awaiting_next: false,
            done: false,
        })
    }

    /// Produce the next outcome: the first call searches from the start,
    /// later calls backtrack into the remaining alternatives. After
    /// `Failure` or `NoMoreSteps` the solver stays exhausted.
    pub fn run(&mut self) -> Result<Outcome, Error> {
        if self.done {
            return Ok(Outcome::Failure);
        }
        if self.awaiting_next {
            self.awaiting_next = false;
            if !self.backtrack()? {
                self.done = true;
                return Ok(Outcome::Failure);
            }
        }
        loop {
            if let Some(max) = self.opts.max_steps {
                if self.steps >= max {
                    self.done = true;
                    return Ok(Outcome::NoMoreSteps);
                }
            }
            let Some(frame) = self.goals.pop() else {
                return Ok(Outcome::Success(self.publish()?));
            };
            self.steps += 1;
            match self.dispatch(frame) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Backtrack) => {
                    if !self.backtrack()? {
                        self.done = true;
                        return Ok(Outcome::Failure);
                    }
                }
                Err(err) => {
                    // fatal: unwind past every choice point
                    self.done = true;
                    return Err(err);
                }
            }
        }
    }

    /// Steps taken so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Live suspended goals, for inspection between solutions.
    pub fn constraints(&self) -> Vec<Suspended> {
        self.store.snapshot()
    }

    fn dispatch(&mut self, frame: Frame) -> Result<Flow, Error> {
        let interp = &mut *self.interp;
        let goal = deref(&mut interp.heap, &mut self.trail, frame.depth, frame.goal)?;

        #[cfg(feature = "tracing")]
        let _span = debug_span!("dispatch", ?goal, depth = frame.depth).entered();

        match interp.heap.terms.resolve(goal).clone() {
            Term::Const(global::TRUE) => Ok(Flow::Continue),
            Term::Const(global::FAIL) => Ok(Flow::Backtrack),
            Term::Const(global::CUT) => {
                #[cfg(feature = "tracing")]
                trace!(cut_to = frame.cut_to, "cut");
                self.cps.truncate(frame.cut_to);
                Ok(Flow::Continue)
            }
            Term::Const(global::SPILL) => runtime_error("spilling must be resolved by the compiler"),
            Term::Const(c) => self.call(frame, c, SmallVec::new()),
            Term::App(global::AND, args) | Term::App(global::CONJ, args) => {
                for &g in args.iter().rev() {
                    self.goals.push(Frame { goal: g, ..frame.clone() });
                }
                Ok(Flow::Continue)
            }
            Term::App(global::OR, args) if args.len() >= 2 => {
                let first = args[0];
                let rest = if args.len() == 2 {
                    args[1]
                } else {
                    let tail: SmallVec<[TermId; 4]> = args[1..].iter().copied().collect();
                    interp.heap.terms.app(global::OR, tail)
                };
                self.cps.push(ChoicePoint {
                    trail_mark: self.trail.mark(),
                    goals: self.goals.clone(),
                    frame: frame.clone(),
                    alt: Alternative::OrBranch { goal: rest },
                    constraint_mark: self.store.mark(),
                });
                self.goals.push(Frame { goal: first, ..frame });
                Ok(Flow::Continue)
            }
            Term::App(global::IMPL, args) if args.len() == 2 => {
                let clauses =
                    clause_of_term(&mut interp.heap, &mut self.trail, frame.depth, args[0])?;
                let prog = frame.prog.push_layer(clauses);
                self.goals.push(Frame {
                    depth: frame.depth,
                    prog,
                    goal: args[1],
                    cut_to: frame.cut_to,
                });
                Ok(Flow::Continue)
            }
            Term::App(global::RIMPL, _) => runtime_error("':-' cannot be used as a goal"),
            Term::App(global::PI, args) if args.len() == 1 => {
                let arg = deref(&mut interp.heap, &mut self.trail, frame.depth, args[0])?;
                let body = match interp.heap.terms.resolve(arg).clone() {
                    Term::Lam(b) => b,
                    _ => {
                        // not an abstraction: apply it to the fresh constant
                        let x = interp.heap.terms.con(frame.depth as ConstId);
                        mkapp(&mut interp.heap, &mut self.trail, frame.depth + 1, arg, &[x])?
                    }
                };
                self.goals.push(Frame {
                    depth: frame.depth + 1,
                    prog: frame.prog,
                    goal: body,
                    cut_to: frame.cut_to,
                });
                Ok(Flow::Continue)
            }
            Term::App(global::SIGMA, args) if args.len() == 1 => {
                let fresh = interp.heap.fresh_uvar(frame.depth);
                let body = beta(
                    &mut interp.heap,
                    &mut self.trail,
                    frame.depth,
                    args[0],
                    &[fresh],
                )?;
                self.goals.push(Frame { goal: body, ..frame });
                Ok(Flow::Continue)
            }
            Term::App(global::EQ, args) if args.len() == 2 => {
                self.solve_eq(&frame, goal, args[0], args[1])
            }
            Term::App(global::SPILL, _) => {
                runtime_error("spilling must be resolved by the compiler")
            }
            Term::App(c, args) => self.call(frame, c, args),
            Term::Builtin(bid, args) => self.call_builtin(&frame, bid, args),
            Term::UVar { .. } | Term::AppUVar { .. } => {
                runtime_error("the goal is a flexible term")
            }
            Term::Arg(_) | Term::AppArg(_, _) => Err(Error::Anomaly(
                "compiled Arg node reached the solver".to_string(),
            )),
            Term::Lam(_) | Term::Cons(_, _) | Term::Nil | Term::CData(_) | Term::Discard => {
                type_error("the goal is not a predicate application")
            }
        }
    }

    fn solve_eq(
        &mut self,
        frame: &Frame,
        goal: TermId,
        a: TermId,
        b: TermId,
    ) -> Result<Flow, Error> {
        let interp = &mut *self.interp;
        let mark = self.trail.mark();
        match unify(
            &mut interp.heap,
            &mut self.trail,
            &interp.cdata,
            frame.depth,
            a,
            b,
            self.opts.delay_outside_fragment,
        )? {
            Unified::Ok => {
                self.wake(mark);
                Ok(Flow::Continue)
            }
            Unified::Fail => Ok(Flow::Backtrack),
            Unified::Delay(blockers) => {
                #[cfg(feature = "tracing")]
                trace!(blockers = blockers.len(), "suspend_equation");
                self.store.add(
                    &mut self.trail,
                    Suspended {
                        goal,
                        depth: frame.depth,
                        prog: frame.prog.clone(),
                        blockers,
                    },
                );
                Ok(Flow::Continue)
            }
        }
    }

    /// Re-enqueue every suspension blocked on a variable assigned since
    /// `mark`. Runs before any further dispatch or choice point, so the
    /// store is quiescent for the assigned variables.
    fn wake(&mut self, mark: crate::trail::TrailMark) {
        let assigned = self.trail.assigned_since(mark);
        for var in assigned {
            let woken = self.store.wake_on(&mut self.trail, var);
            for susp in woken {
                #[cfg(feature = "tracing")]
                trace!(?var, "resume_suspended_goal");
                self.goals.push(Frame {
                    depth: susp.depth,
                    prog: susp.prog,
                    goal: susp.goal,
                    cut_to: self.cps.len(),
                });
            }
        }
    }

    fn call(
        &mut self,
        frame: Frame,
        pred: ConstId,
        args: SmallVec<[TermId; 4]>,
    ) -> Result<Flow, Error> {
        if (global::SPILL..=global::EQ).contains(&pred) {
            return type_error("malformed logical connective");
        }
        let interp = &mut *self.interp;
        let mut cands = Vec::new();
        frame.prog.candidates(pred, &mut cands);
        let key = if args.is_empty() {
            ArgKey::Flex
        } else {
            arg_key(
                &mut interp.heap,
                &mut self.trail,
                &interp.cdata,
                frame.depth,
                args[0],
            )?
        };
        interp.db.candidates(pred, key, &mut cands);
        if cands.is_empty() {
            #[cfg(feature = "tracing")]
            trace!(pred, "no_clause");
            return Ok(Flow::Backtrack);
        }
        let cp = ChoicePoint {
            trail_mark: self.trail.mark(),
            goals: self.goals.clone(),
            frame,
            alt: Alternative::Clauses {
                args,
                cands,
                next: 0,
            },
            constraint_mark: self.store.mark(),
        };
        if self.try_clauses(cp)? {
            Ok(Flow::Continue)
        } else {
            Ok(Flow::Backtrack)
        }
    }

    /// Try the remaining candidates of a choice point in order. On a head
    /// match, push the renamed body (and the choice point back, when
    /// alternatives remain) and return true.
    fn try_clauses(&mut self, mut cp: ChoicePoint) -> Result<bool, Error> {
        let barrier = self.cps.len();
        let Alternative::Clauses { args, cands, next } = &mut cp.alt else {
            return Err(Error::Anomaly("or-branch in clause retry".to_string()));
        };
        let args = args.clone();
        let mut k = *next;
        while k < cands.len() {
            let clause = cands[k].clone();
            if clause.head_args.len() != args.len() {
                k += 1;
                continue;
            }
            let interp = &mut *self.interp;
            let mark = self.trail.mark();
            let env: Vec<TermId> = (0..clause.nvars)
                .map(|_| interp.heap.fresh_uvar(cp.frame.depth))
                .collect();
            let mut matched = true;
            for (i, &call_arg) in args.iter().enumerate() {
                let head_arg = instantiate(
                    &mut interp.heap,
                    &mut self.trail,
                    cp.frame.depth,
                    &env,
                    clause.head_args[i],
                )?;
                match unify(
                    &mut interp.heap,
                    &mut self.trail,
                    &interp.cdata,
                    cp.frame.depth,
                    call_arg,
                    head_arg,
                    self.opts.delay_outside_fragment,
                )? {
                    Unified::Ok => {}
                    Unified::Fail => {
                        matched = false;
                        break;
                    }
                    Unified::Delay(blockers) => {
                        // accept the candidate, leave the residual equation
                        let eq = interp.heap.terms.app2(global::EQ, call_arg, head_arg);
                        self.store.add(
                            &mut self.trail,
                            Suspended {
                                goal: eq,
                                depth: cp.frame.depth,
                                prog: cp.frame.prog.clone(),
                                blockers,
                            },
                        );
                    }
                }
            }
            if !matched {
                self.trail.undo_to(
                    mark,
                    &mut interp.heap.vars,
                    &mut self.store,
                    &mut self.state,
                );
                k += 1;
                continue;
            }
            let body = instantiate(
                &mut interp.heap,
                &mut self.trail,
                cp.frame.depth,
                &env,
                clause.body,
            )?;
            let depth = cp.frame.depth;
            let prog = cp.frame.prog.clone();
            if k + 1 < cands.len() {
                *next = k + 1;
                self.cps.push(cp);
            }
            self.goals.push(Frame {
                depth,
                prog,
                goal: body,
                cut_to: barrier,
            });
            self.wake(mark);
            return Ok(true);
        }
        Ok(false)
    }

    fn call_builtin(
        &mut self,
        frame: &Frame,
        bid: BuiltinId,
        args: SmallVec<[TermId; 4]>,
    ) -> Result<Flow, Error> {
        let interp = &mut *self.interp;
        let (handler, name, arity) = match interp.builtins.get(bid) {
            Some(decl) => (decl.handler.clone(), decl.name.clone(), decl.arity),
            None => {
                return Err(Error::Anomaly(format!(
                    "call to unregistered builtin {}",
                    bid.0
                )))
            }
        };
        if let Some(arity) = arity {
            if args.len() != arity {
                return Err(Error::Type {
                    msg: format!("{} expects {} arguments, got {}", name, arity, args.len()),
                    loc: None,
                });
            }
        }
        let mark = self.trail.mark();
        let mut ctx = Ctx {
            depth: frame.depth,
            heap: &mut interp.heap,
            trail: &mut self.trail,
            state: &mut self.state,
            constraints: &mut self.store,
            streams: &mut interp.streams,
            symbols: &interp.symbols,
            cdata: &mut interp.cdata,
            evals: &interp.evals,
            hyps: &frame.prog,
        };
        match handler(&mut ctx, &args)? {
            Response::Goals(goals) => {
                for &g in goals.iter().rev() {
                    self.goals.push(Frame {
                        depth: frame.depth,
                        prog: frame.prog.clone(),
                        goal: g,
                        cut_to: frame.cut_to,
                    });
                }
                self.wake(mark);
                Ok(Flow::Continue)
            }
            Response::NoClause => Ok(Flow::Backtrack),
        }
    }

    fn backtrack(&mut self) -> Result<bool, Error> {
        loop {
            let Some(cp) = self.cps.pop() else {
                return Ok(false);
            };
            self.trail.undo_to(
                cp.trail_mark,
                &mut self.interp.heap.vars,
                &mut self.store,
                &mut self.state,
            );
            debug_assert!(
                self.store.quiet_beyond(cp.constraint_mark),
                "constraint store out of sync with its choice-point mark"
            );
            match cp.alt {
                Alternative::OrBranch { goal } => {
                    self.goals = cp.goals;
                    self.goals.push(Frame {
                        depth: cp.frame.depth,
                        prog: cp.frame.prog,
                        goal,
                        cut_to: cp.frame.cut_to,
                    });
                    return Ok(true);
                }
                Alternative::Clauses { .. } => {
                    self.goals = cp.goals.clone();
                    if self.try_clauses(cp)? {
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn publish(&mut self) -> Result<Solution, Error> {
        let interp = &mut *self.interp;
        let mut assignments = Vec::new();
        for (name, term) in &self.query_vars {
            let term = full_deref(&mut interp.heap, &mut self.trail, 0, *term)?;
            assignments.push((name.clone(), term));
        }
        let state = self
            .state
            .snapshot()
            .into_iter()
            .map(|(comp, value)| {
                let name = interp
                    .state_decls
                    .get(comp.0 as usize)
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| format!("component-{}", comp.0));
                (name, value)
            })
            .collect();
        self.awaiting_next = true;
        Ok(Solution {
            assignments,
            constraints: self.store.snapshot(),
            state,
        })
    }
}

#[cfg(test)]
#[path = "tests/solver.rs"]
mod tests;
