//! The narrow interface to the SMT solver.
//!
//! Everything the engine asks of Z3 goes through [`Backend`]: `push`,
//! `pop`, `add`, and `check_sat`. Consequence finding is layered on top by
//! the implication checker's batched queries. A backend owns its solver;
//! the surrounding Z3 context is owned by the caller and scoped per query
//! (see [`crate::checker`]).

use z3::ast::Bool;
use z3::{Context, SatResult, Solver};

use crate::error::{EngineError, EngineResult};

/// The verdict of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatVerdict {
    Sat,
    Unsat,
    Unknown,
}

/// A thin wrapper around one Z3 solver.
pub struct Backend<'ctx> {
    solver: Solver<'ctx>,
    retry_on_unknown: bool,
}

impl<'ctx> Backend<'ctx> {
    pub fn new(ctx: &'ctx Context, retry_on_unknown: bool) -> Self {
        Backend {
            solver: Solver::new(ctx),
            retry_on_unknown,
        }
    }

    pub fn push(&self) {
        self.solver.push();
    }

    pub fn pop(&self) {
        self.solver.pop(1);
    }

    pub fn add(&self, assertion: &Bool<'ctx>) {
        self.solver.assert(assertion);
    }

    /// Checks satisfiability of the asserted formulas.
    ///
    /// A spurious UNKNOWN is retried once when the retry policy is set.
    pub fn check_sat(&self) -> SatVerdict {
        let mut verdict = self.solver.check();
        if verdict == SatResult::Unknown && self.retry_on_unknown {
            verdict = self.solver.check();
        }
        match verdict {
            SatResult::Sat => SatVerdict::Sat,
            SatResult::Unsat => SatVerdict::Unsat,
            SatResult::Unknown => SatVerdict::Unknown,
        }
    }

    /// `true` iff the asserted formulas plus `extra` are unsatisfiable.
    ///
    /// UNKNOWN raises [`EngineError::solver_unknown`] under `strict`,
    /// otherwise conservatively answers `false`.
    pub fn is_unsat_with(&self, extra: &Bool<'ctx>, strict: bool) -> EngineResult<bool> {
        self.push();
        self.add(extra);
        let verdict = self.check_sat();
        self.pop();
        match verdict {
            SatVerdict::Unsat => Ok(true),
            SatVerdict::Sat => Ok(false),
            SatVerdict::Unknown if strict => Err(EngineError::solver_unknown()),
            SatVerdict::Unknown => Ok(false),
        }
    }
}
