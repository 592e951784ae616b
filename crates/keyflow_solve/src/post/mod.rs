//! The post-image engine.
//!
//! Computes the strongest annotation holding after one primitive command,
//! and the effects other threads may observe. One module per command
//! shape:
//!
//! - [`assume`] — conjoin a condition, record read evidence, try pure
//!   linearization
//! - [`malloc`] — fresh local cell with empty flow
//! - [`assign_var`] — rebind a variable
//! - [`assign_deref`] — the atomic heap step: footprint exploration,
//!   invariant and purity checks, effect emission
//!
//! plus [`candidates`] (the implied-fact harvest that reconstructs a post
//! state from the two-state solver) and [`linearize`] (pure
//! linearization of read-only operations).

pub mod assign_deref;
pub mod assign_var;
pub mod assume;
pub mod candidates;
pub mod linearize;
pub mod malloc;

use keyflow_language::{Expr, Program, Sort, VarId};
use keyflow_logic::{
    Annotation, Axiom, Comparator, Conjunction, Effect, StackAxiom, SymbolFactory, SymbolId,
    SymbolPool, SymbolicExpr,
};

use crate::config::SolverConfig;
use crate::error::{EngineError, EngineResult};

/// The result of a post-image computation.
#[derive(Debug, Clone)]
pub struct PostImage {
    pub post: Annotation,
    pub effects: Vec<Effect>,
}

impl PostImage {
    pub fn pure(post: Annotation) -> Self {
        PostImage {
            post,
            effects: Vec::new(),
        }
    }
}

/// The command shapes the engine computes post-images for.
#[derive(Debug, Clone, Copy)]
pub enum PostCommand<'s> {
    Assume(&'s Expr),
    Malloc(VarId),
    Assign { lhs: &'s Expr, rhs: &'s Expr },
}

/// Shared context of one post computation.
pub(crate) struct PostCx<'a> {
    pub program: &'a Program,
    pub config: &'a SolverConfig,
}

/// Dispatches a command to its post-image computation.
pub fn post(
    program: &Program,
    config: &SolverConfig,
    pool: &mut SymbolPool,
    pre: Annotation,
    command: PostCommand<'_>,
) -> EngineResult<PostImage> {
    let cx = PostCx { program, config };
    if pre.is_bottom() {
        // Nothing is reachable; skip the work.
        return Ok(PostImage::pure(pre));
    }
    match command {
        PostCommand::Assume(cond) => assume::post_assume(&cx, pool, pre, cond),
        PostCommand::Malloc(var) => malloc::post_malloc(&cx, pool, pre, var),
        PostCommand::Assign { lhs, rhs } => match lhs {
            Expr::Var(var) => assign_var::post_assign_var(&cx, pool, pre, *var, rhs),
            Expr::Deref { expr, field } => {
                assign_deref::post_assign_deref(&cx, pool, pre, expr, field, rhs)
            }
            other => Err(EngineError::unsupported(format!(
                "assignment target {:?}",
                other
            ))),
        },
    }
}

impl<'a> PostCx<'a> {
    /// The symbol a variable is bound to in the state.
    pub(crate) fn binding(&self, now: &Conjunction, var: VarId) -> EngineResult<SymbolId> {
        now.value_of(var).ok_or_else(|| {
            EngineError::internal(format!(
                "variable '{}' has no binding in the current state",
                self.program.var(var).name
            ))
        })
    }

    /// Evaluates a program expression to a symbolic expression, reading
    /// heap cells through the state's memory axioms.
    ///
    /// Dereferenced cells must already be present; callers that may touch
    /// unknown shared cells materialize them first (see
    /// [`PostCx::ensure_memory`]).
    pub(crate) fn eval(&self, now: &Conjunction, expr: &Expr) -> EngineResult<SymbolicExpr> {
        Ok(match expr {
            Expr::Bool(true) => SymbolicExpr::True,
            Expr::Bool(false) => SymbolicExpr::False,
            Expr::Null => SymbolicExpr::Null,
            Expr::Min => SymbolicExpr::Min,
            Expr::Max => SymbolicExpr::Max,
            Expr::Var(var) => SymbolicExpr::Symbol(self.binding(now, *var)?),
            Expr::Deref { expr, field } => {
                let node = self
                    .eval(now, expr)?
                    .symbol()
                    .ok_or_else(|| EngineError::unsupported("dereference of a constant"))?;
                let mem = now.memory_at(node).ok_or_else(|| {
                    EngineError::internal("dereference of a cell without a memory axiom")
                })?;
                SymbolicExpr::Symbol(mem.field(field).ok_or_else(|| {
                    EngineError::internal(format!("memory axiom lacks field '{}'", field))
                })?)
            }
            Expr::Not(_) | Expr::Binary { .. } => {
                return Err(EngineError::unsupported(
                    "boolean expression in a value position",
                ))
            }
        })
    }

    /// Makes sure the state carries a memory axiom for the addressed
    /// shared cell, materializing one from the node invariant if needed.
    ///
    /// Sound because the shared-node invariant holds of every allocated
    /// cell at every quiescent moment; a cell the thread can address is
    /// either already known or a shared cell satisfying the invariant.
    pub(crate) fn ensure_memory(
        &self,
        pool: &mut SymbolPool,
        now: &mut Conjunction,
        node: SymbolId,
    ) -> EngineResult<()> {
        if now.memory_at(node).is_some() {
            return Ok(());
        }
        let node_type = self.program.types.get(self.config.flow_domain.node_type);
        let mut fields = Vec::new();
        let flow = {
            let mut factory = SymbolFactory::new(pool);
            for (name, ty) in &node_type.fields {
                let sort = self.program.types.sort(*ty);
                fields.push((name.clone(), factory.fresh_value(sort)));
            }
            factory.fresh_flow()
        };
        let mem = keyflow_logic::MemoryAxiom::new(node, flow, fields, pool)?;

        let invariant = self
            .config
            .shared_node_invariant
            .on_memory(&mem, None, pool)?;
        now.push(Axiom::SharedMemory(mem));
        now.push(Axiom::Stack(StackAxiom::new(
            Comparator::Neq,
            SymbolicExpr::Symbol(node),
            SymbolicExpr::Null,
            pool,
        )?));
        for conjunct in invariant {
            now.conjuncts.push(conjunct);
        }
        Ok(())
    }

    /// Evaluates an expression to a *symbol*, introducing a fresh symbol
    /// with a defining axiom for constants.
    pub(crate) fn eval_to_symbol(
        &self,
        pool: &mut SymbolPool,
        now: &mut Conjunction,
        expr: &Expr,
    ) -> EngineResult<SymbolId> {
        // Materialize any shared cell the expression reads.
        self.materialize_reads(pool, now, expr)?;
        let value = self.eval(now, expr)?;
        if let SymbolicExpr::Symbol(sym) = value {
            return Ok(sym);
        }
        let sort = match value {
            SymbolicExpr::True | SymbolicExpr::False => Sort::Bool,
            SymbolicExpr::Null => Sort::Ptr,
            SymbolicExpr::Min | SymbolicExpr::Max => Sort::Data,
            SymbolicExpr::Symbol(_) => unreachable!(),
        };
        let fresh = {
            let mut factory = SymbolFactory::new(pool);
            factory.fresh_value(sort)
        };
        now.push(Axiom::Stack(StackAxiom::new(
            Comparator::Eq,
            SymbolicExpr::Symbol(fresh),
            value,
            pool,
        )?));
        Ok(fresh)
    }

    /// Materializes memory axioms for every cell the expression reads,
    /// and refreshes shared-variable bindings dropped by interference: a
    /// re-read of a shared variable observes *some* current value
    /// satisfying the variable's invariant.
    pub(crate) fn materialize_reads(
        &self,
        pool: &mut SymbolPool,
        now: &mut Conjunction,
        expr: &Expr,
    ) -> EngineResult<()> {
        match expr {
            Expr::Var(var) => self.refresh_shared_binding(pool, now, *var),
            Expr::Deref { expr: base, field: _ } => {
                self.materialize_reads(pool, now, base)?;
                let node = self
                    .eval(now, base)?
                    .symbol()
                    .ok_or_else(|| EngineError::unsupported("dereference of a constant"))?;
                self.ensure_memory(pool, now, node)
            }
            Expr::Not(inner) => self.materialize_reads(pool, now, inner),
            Expr::Binary { lhs, rhs, .. } => {
                self.materialize_reads(pool, now, lhs)?;
                self.materialize_reads(pool, now, rhs)
            }
            _ => Ok(()),
        }
    }

    /// Restores the binding of a shared variable after interference
    /// dropped it, re-establishing the variable's invariant on the cell
    /// it points at.
    pub(crate) fn refresh_shared_binding(
        &self,
        pool: &mut SymbolPool,
        now: &mut Conjunction,
        var: VarId,
    ) -> EngineResult<()> {
        if now.value_of(var).is_some() || !self.program.var(var).shared {
            return Ok(());
        }
        let sort = self.program.types.sort(self.program.var(var).ty);
        let value = {
            let mut factory = SymbolFactory::new(pool);
            factory.fresh_value(sort)
        };
        now.push(Axiom::EqualsTo { var, value });

        let invariant = self
            .config
            .variable_invariants
            .iter()
            .find(|(v, _)| *v == var)
            .map(|(_, p)| p.clone());
        if let Some(invariant) = invariant {
            if sort == Sort::Ptr {
                self.ensure_memory(pool, now, value)?;
                let mem = now
                    .memory_at(value)
                    .ok_or_else(|| EngineError::internal("materialization lost the cell"))?
                    .clone();
                for conjunct in invariant.on_memory(&mem, None, pool)? {
                    now.conjuncts.push(conjunct);
                }
            }
        }
        Ok(())
    }

    /// The effect context another thread may assume when checking
    /// stability: the stack and inflow knowledge surrounding the updated
    /// cell. Restricted to conjuncts sharing symbols with the cell — a
    /// tight context keeps effects comparable across iterations, which
    /// is what lets consolidation reach its fixed point.
    pub(crate) fn effect_context(
        &self,
        now: &Conjunction,
        cell_symbols: &std::collections::BTreeSet<SymbolId>,
    ) -> Conjunction {
        let mut context = Conjunction::new();
        for conjunct in &now.conjuncts {
            let eligible = match conjunct {
                keyflow_logic::Conjunct::Axiom(axiom) => !matches!(
                    axiom,
                    Axiom::EqualsTo { .. }
                        | Axiom::LocalMemory(_)
                        | Axiom::SharedMemory(_)
                        | Axiom::Obligation { .. }
                        | Axiom::Fulfillment { .. }
                ),
                keyflow_logic::Conjunct::Implication(_) => true,
            };
            if !eligible {
                continue;
            }
            let mut symbols = std::collections::BTreeSet::new();
            keyflow_logic::collect::conjunct_symbols(conjunct, &mut symbols);
            if symbols.iter().any(|s| cell_symbols.contains(s)) {
                context.conjuncts.push(conjunct.clone());
            }
        }
        context
    }

    pub(crate) fn node_type_check(&self, effects_on: &Expr) -> EngineResult<()> {
        let ty = self
            .program
            .type_of(effects_on)
            .map_err(|e| EngineError::internal(e.to_string()))?;
        if ty != self.config.flow_domain.node_type {
            return Err(EngineError::config(format!(
                "flow domain is defined over '{}', but the update touches '{}'",
                self.program
                    .types
                    .get(self.config.flow_domain.node_type)
                    .name,
                self.program.types.get(ty).name
            )));
        }
        Ok(())
    }
}

