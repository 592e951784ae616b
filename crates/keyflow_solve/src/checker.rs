//! The implication checker.
//!
//! A checker owns one Z3 solver over a caller-scoped context and a
//! premise accumulated through `add_premise_*`. `implies(X)` answers
//! whether `premise ∧ ¬X` is unsatisfiable. Two cheap layers sit in front
//! of the SMT query:
//!
//! - conclusions syntactically contained in the recorded premise
//!   conjuncts are discharged without solving;
//! - batched queries ([`ImplicationChecker::compute_implied`]) reuse one
//!   solver with push/pop instead of fresh solvers per conclusion, and the
//!   `holistic_check` flag collapses them into a single disjunctive query.
//!
//! UNKNOWN verdicts follow the configured policy: retried once when
//! `retry_on_unknown` is set, then either raised as
//! [`EngineError::solver_unknown`] (strict) or conservatively treated as
//! "not implied".

use z3::ast::Bool;

use keyflow_logic::{equal, Conjunct, Conjunction, SymbolPool};

use crate::backend::Backend;
use crate::encoding::{Encoding, Epoch};
use crate::error::{EngineError, EngineResult};

/// A stateful implication checker over a premise.
pub struct ImplicationChecker<'ctx, 'a, 'e> {
    encoding: &'e Encoding<'ctx, 'a>,
    backend: Backend<'ctx>,
    /// Premise conjuncts recorded per epoch, for the quick discharge.
    recorded: Vec<(Epoch, Conjunct)>,
    strict: bool,
}

impl<'ctx, 'a, 'e> ImplicationChecker<'ctx, 'a, 'e> {
    pub fn new(encoding: &'e Encoding<'ctx, 'a>) -> Self {
        let config = encoding.config();
        let checker = ImplicationChecker {
            backend: Backend::new(encoding.context(), config.retry_on_unknown),
            encoding,
            recorded: Vec::new(),
            strict: config.strict_unknown,
        };
        checker.drain_pending();
        checker
    }

    fn drain_pending(&self) {
        for axiom in self.encoding.take_pending() {
            self.backend.add(&axiom);
        }
    }

    pub fn push(&self) {
        self.backend.push();
    }

    pub fn pop(&self) {
        self.backend.pop();
    }

    /// Asserts a raw term as part of the premise.
    pub fn add_premise_term(&self, term: &Bool<'ctx>) {
        self.backend.add(term);
        self.drain_pending();
    }

    /// Asserts a conjunction as part of the premise and records its
    /// conjuncts for the quick discharge.
    pub fn add_premise_formula(
        &mut self,
        formula: &Conjunction,
        epoch: Epoch,
        pool: &SymbolPool,
    ) -> EngineResult<()> {
        let encoded = self.encoding.conjunction(formula, epoch, pool)?;
        self.backend.add(&encoded);
        self.drain_pending();
        for conjunct in &formula.conjuncts {
            self.recorded.push((epoch, conjunct.clone()));
        }
        Ok(())
    }

    /// `true` iff the premise entails the term.
    pub fn implies_term(&self, term: &Bool<'ctx>) -> EngineResult<bool> {
        self.drain_pending();
        self.backend.is_unsat_with(&term.not(), self.strict)
    }

    /// `true` iff the premise is unsatisfiable.
    pub fn implies_false(&self) -> EngineResult<bool> {
        self.implies_term(&self.encoding.bool_val(false))
    }

    /// `true` iff the premise entails every conjunct of the formula in
    /// the given epoch.
    pub fn implies_formula(
        &self,
        formula: &Conjunction,
        epoch: Epoch,
        pool: &SymbolPool,
    ) -> EngineResult<bool> {
        // Quick discharge first.
        let mut open: Vec<&Conjunct> = Vec::new();
        for conjunct in &formula.conjuncts {
            let contained = self
                .recorded
                .iter()
                .any(|(e, c)| *e == epoch && equal::conjuncts_equal(c, conjunct));
            if !contained {
                open.push(conjunct);
            }
        }
        if open.is_empty() {
            return Ok(true);
        }

        let encoded: Vec<Bool> = open
            .iter()
            .map(|c| {
                let one = Conjunction {
                    conjuncts: vec![(*c).clone()],
                };
                self.encoding.conjunction(&one, epoch, pool)
            })
            .collect::<EngineResult<_>>()?;
        self.drain_pending();

        if self.encoding.config().holistic_check {
            // One query: premise ∧ (¬c₁ ∨ … ∨ ¬cₙ) unsat.
            let negated: Vec<Bool> = encoded.iter().map(|c| c.not()).collect();
            let refs: Vec<&Bool> = negated.iter().collect();
            let disjunct = Bool::or(self.encoding.context(), &refs);
            self.backend.is_unsat_with(&disjunct, self.strict)
        } else {
            for term in &encoded {
                if !self.implies_term(term)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }

    /// Batched entailment: one verdict per candidate term.
    pub fn compute_implied(&self, candidates: &[Bool<'ctx>]) -> EngineResult<Vec<bool>> {
        self.drain_pending();
        let mut verdicts = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            verdicts.push(self.backend.is_unsat_with(&candidate.not(), self.strict)?);
        }
        Ok(verdicts)
    }

    /// Convenience access to the encoding behind this checker.
    pub fn encoding(&self) -> &'e Encoding<'ctx, 'a> {
        self.encoding
    }
}

// Checker construction helpers used across the engine.

/// Builds a checker whose premise is the annotation's `now` at `Now`,
/// instantiated with the structural background rules:
///
/// - the shared-node invariant holds of every known shared cell;
/// - between known cells linked by a pointer field, the flow domain's
///   edge rule applies (what the predecessor sends, the successor
///   receives).
pub fn checker_for_now<'ctx, 'a, 'e>(
    encoding: &'e Encoding<'ctx, 'a>,
    now: &Conjunction,
    pool: &SymbolPool,
) -> EngineResult<ImplicationChecker<'ctx, 'a, 'e>> {
    let mut checker = ImplicationChecker::new(encoding);
    checker.add_premise_formula(now, Epoch::Now, pool)?;

    for mem in now.shared_memories() {
        let node = encoding
            .symbol(mem.node, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("pointer symbol of non-integer sort"))?;
        let invariant = encoding.invariant(&node, Epoch::Now)?;
        checker.add_premise_term(&invariant);
    }

    // Edge rules apply to the live structure only: a still-local cell is
    // unlinked and sends nothing, whatever its fields say.
    let memories: Vec<_> = now.memories().collect();
    for mem in now.shared_memories() {
        let node = encoding
            .symbol(mem.node, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("pointer symbol of non-integer sort"))?;
        for (field, outflow) in encoding.config().pointer_fields() {
            let Some(successor_sym) = mem.field(field) else {
                continue;
            };
            let points_at_known = memories.iter().any(|m| m.node == successor_sym);
            if !points_at_known {
                continue;
            }
            let successor = encoding
                .symbol(successor_sym, pool)?
                .as_int()
                .ok_or_else(|| EngineError::internal("pointer symbol of non-integer sort"))?;
            let rule =
                crate::graph::edge_flow_rule(encoding, &node, outflow, &successor, Epoch::Now)?;
            checker.add_premise_term(&rule);
        }
    }
    Ok(checker)
}
