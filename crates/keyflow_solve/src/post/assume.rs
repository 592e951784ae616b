//! Post-image of `assume`.
//!
//! The condition is translated literal by literal over the symbolic
//! state: variables resolve to their bound symbols and dereferences to
//! the field symbols of the addressed cell (materialized from the node
//! invariant when the cell is new to this thread). Conditions arrive in
//! simplifier normal form — conjunctions of possibly negated comparisons;
//! disjunctions are rejected.
//!
//! Shared cells read by the condition are snapshotted into a past
//! predicate: interference may later destroy the memory axiom in `now`,
//! but the observation that the cell looked this way at some point on
//! this thread's timeline remains, and pure linearization feeds on it.

use tracing::trace;
use z3::{Config, Context};

use keyflow_language::{BinaryOp, Expr};
use keyflow_logic::{
    Annotation, Axiom, Comparator, Conjunction, PastPredicate, StackAxiom, SymbolPool,
};

use crate::checker::checker_for_now;
use crate::encoding::Encoding;
use crate::error::{EngineError, EngineResult};
use crate::post::{candidates, linearize, PostCx, PostImage};

/// One translated literal.
fn literal(
    cx: &PostCx<'_>,
    pool: &mut SymbolPool,
    now: &mut Conjunction,
    expr: &Expr,
) -> EngineResult<Axiom> {
    match expr {
        Expr::Bool(true) => Ok(Axiom::Stack(StackAxiom {
            op: Comparator::Eq,
            lhs: keyflow_logic::SymbolicExpr::True,
            rhs: keyflow_logic::SymbolicExpr::True,
        })),
        Expr::Bool(false) => Ok(Axiom::contradiction()),
        // A bare boolean read: the bound (or field) symbol is true.
        Expr::Var(_) | Expr::Deref { .. } => {
            cx.materialize_reads(pool, now, expr)?;
            let value = cx.eval(now, expr)?;
            Ok(Axiom::Stack(StackAxiom::new(
                Comparator::Eq,
                value,
                keyflow_logic::SymbolicExpr::True,
                pool,
            )?))
        }
        Expr::Not(inner) => match inner.as_ref() {
            // A negated boolean read: the symbol is false.
            Expr::Var(_) | Expr::Deref { .. } => {
                cx.materialize_reads(pool, now, inner)?;
                let value = cx.eval(now, inner)?;
                Ok(Axiom::Stack(StackAxiom::new(
                    Comparator::Eq,
                    value,
                    keyflow_logic::SymbolicExpr::False,
                    pool,
                )?))
            }
            other => {
                let negated = other.clone().negate();
                if matches!(negated, Expr::Not(_)) {
                    return Err(EngineError::unsupported(
                        "negated connective in an assume condition",
                    ));
                }
                literal(cx, pool, now, &negated)
            }
        },
        Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
            cx.materialize_reads(pool, now, lhs)?;
            cx.materialize_reads(pool, now, rhs)?;
            let l = cx.eval(now, lhs)?;
            let r = cx.eval(now, rhs)?;
            let cmp = match op {
                BinaryOp::Eq => Comparator::Eq,
                BinaryOp::Neq => Comparator::Neq,
                BinaryOp::Leq => Comparator::Leq,
                BinaryOp::Lt => Comparator::Lt,
                BinaryOp::Geq => Comparator::Geq,
                BinaryOp::Gt => Comparator::Gt,
                BinaryOp::And | BinaryOp::Or => unreachable!(),
            };
            Ok(Axiom::Stack(StackAxiom::new(cmp, l, r, pool)?))
        }
        Expr::Binary { .. } => Err(EngineError::unsupported(
            "disjunctive assume condition (the simplifier splits these)",
        )),
        other => Err(EngineError::unsupported(format!(
            "assume condition {:?}",
            other
        ))),
    }
}

/// Splits a condition into its conjunctive literals.
fn conjuncts_of<'s>(expr: &'s Expr, out: &mut Vec<&'s Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => {
            conjuncts_of(lhs, out);
            conjuncts_of(rhs, out);
        }
        other => out.push(other),
    }
}

pub fn post_assume(
    cx: &PostCx<'_>,
    pool: &mut SymbolPool,
    mut pre: Annotation,
    cond: &Expr,
) -> EngineResult<PostImage> {
    trace!(?cond, "post: assume");

    let mut literals = Vec::new();
    conjuncts_of(cond, &mut literals);

    let mut added = Vec::new();
    for lit in literals {
        let axiom = literal(cx, pool, &mut pre.now, lit)?;
        added.push(axiom.clone());
        pre.now.push(axiom);
    }

    // Snapshot of what the condition observed, for pure linearization
    // after interference has struck.
    let read_memories: Vec<Axiom> = pre
        .now
        .axioms()
        .filter_map(|a| match a {
            Axiom::SharedMemory(mem) if cond.has_deref() => {
                Some(Axiom::SharedMemory(mem.clone()))
            }
            _ => None,
        })
        .collect();
    if !read_memories.is_empty() {
        let mut snapshot = Conjunction::from_axioms(read_memories);
        snapshot
            .conjuncts
            .extend(added.iter().cloned().map(Into::into));
        pre.past.push(PastPredicate { formula: snapshot });
    }

    keyflow_logic::simplify::simplify_annotation(&mut pre);
    if pre.is_bottom() {
        return Ok(PostImage::pure(Annotation::bottom()));
    }

    // Prune branches whose guard contradicts the state.
    {
        let z3_config = Config::new();
        let ctx = Context::new(&z3_config);
        let encoding = Encoding::new(&ctx, cx.program, cx.config);
        let checker = checker_for_now(&encoding, &pre.now, pool)?;
        if checker.implies_false()? {
            trace!("assume is infeasible; pruning");
            return Ok(PostImage::pure(Annotation::bottom()));
        }
    }

    // Capture the flow knowledge visible through the edges just read; it
    // is knowledge about immutable set values and outlives interference.
    if cond.has_deref() {
        let flows: Vec<_> = pre.now.memories().map(|m| m.flow).collect();
        candidates::enrich_with_flow_facts(cx, pool, &mut pre.now, &flows)?;
        if let Some(snapshot) = pre.past.last_mut() {
            for axiom in pre.now.axioms() {
                if matches!(
                    axiom,
                    Axiom::InflowHasValue { .. }
                        | Axiom::InflowHasRange { .. }
                        | Axiom::InflowEmpty { .. }
                ) {
                    let conjunct = keyflow_logic::Conjunct::Axiom(axiom.clone());
                    if !keyflow_logic::equal::syntactically_contains(&snapshot.formula, &conjunct)
                    {
                        snapshot.formula.conjuncts.push(conjunct);
                    }
                }
            }
        }
    }

    let post = linearize::try_pure_linearization(cx, pool, pre)?;
    Ok(PostImage::pure(post))
}
