//! Post-image of variable assignment `x = e`.
//!
//! Rebinding only: the old binding axiom of `x` disappears, a binding to
//! the evaluation of `e` takes its place. The previous symbol remains a
//! valid value — anything else known about it stays true. No effect is
//! emitted: variable writes are pure steps (a shared variable's binding
//! is transient knowledge anyway; stabilization drops it, see the solver
//! facade).

use tracing::trace;
use z3::ast::Ast;

use keyflow_language::{Expr, VarId};
use keyflow_logic::{
    Annotation, Axiom, Comparator, Conjunct, Implication, StackAxiom, SymbolFactory, SymbolPool,
    SymbolicExpr,
};

use crate::error::{EngineError, EngineResult};
use crate::post::{PostCx, PostImage};

pub fn post_assign_var(
    cx: &PostCx<'_>,
    pool: &mut SymbolPool,
    mut pre: Annotation,
    var: VarId,
    rhs: &Expr,
) -> EngineResult<PostImage> {
    trace!(var = %cx.program.var(var).name, "post: assignment");

    let value = match rhs {
        // Boolean-valued comparison on the right-hand side: bind a fresh
        // boolean symbol and constrain it in both directions.
        Expr::Binary { op, lhs, rhs: r } if op.is_comparison() => {
            cx.materialize_reads(pool, &mut pre.now, lhs)?;
            cx.materialize_reads(pool, &mut pre.now, r)?;
            let l = cx.eval(&pre.now, lhs)?;
            let r = cx.eval(&pre.now, r)?;
            let cmp = comparison_of(*op)?;
            let fresh = {
                let mut factory = SymbolFactory::new(pool);
                factory.fresh_value(keyflow_language::Sort::Bool)
            };
            let holds = StackAxiom::new(cmp, l, r, pool)?;
            let fails = StackAxiom::new(cmp.negated(), l, r, pool)?;
            pre.now.push(Conjunct::Implication(Implication {
                premise: vec![Axiom::Stack(holds)],
                conclusion: vec![Axiom::Stack(StackAxiom::new(
                    Comparator::Eq,
                    fresh.into(),
                    SymbolicExpr::True,
                    pool,
                )?)],
            }));
            pre.now.push(Conjunct::Implication(Implication {
                premise: vec![Axiom::Stack(fails)],
                conclusion: vec![Axiom::Stack(StackAxiom::new(
                    Comparator::Eq,
                    fresh.into(),
                    SymbolicExpr::False,
                    pool,
                )?)],
            }));
            fresh
        }
        Expr::Not(_) => {
            return Err(EngineError::unsupported(
                "negated expression on the right-hand side of an assignment",
            ))
        }
        simple => {
            let value = cx.eval_to_symbol(pool, &mut pre.now, simple)?;
            // Reading a pointer field is the moment the edge is visible:
            // materialize the target and capture the flow it receives.
            if matches!(simple, Expr::Deref { .. })
                && pool.sort(value) == Some(keyflow_language::Sort::Ptr)
            {
                let not_null = {
                    let z3_config = z3::Config::new();
                    let ctx = z3::Context::new(&z3_config);
                    let encoding = crate::encoding::Encoding::new(&ctx, cx.program, cx.config);
                    let checker =
                        crate::checker::checker_for_now(&encoding, &pre.now, pool)?;
                    let target = encoding
                        .symbol(value, pool)?
                        .as_int()
                        .ok_or_else(|| EngineError::internal("non-integer pointer symbol"))?;
                    checker.implies_term(&target._eq(&encoding.null()).not())?
                };
                if not_null {
                    cx.ensure_memory(pool, &mut pre.now, value)?;
                    let flows: Vec<_> = pre.now.memories().map(|m| m.flow).collect();
                    crate::post::candidates::enrich_with_flow_facts(
                        cx,
                        pool,
                        &mut pre.now,
                        &flows,
                    )?;
                }
            }
            value
        }
    };

    pre.now.conjuncts.retain(|c| {
        !matches!(c, Conjunct::Axiom(Axiom::EqualsTo { var: v, .. }) if *v == var)
    });
    pre.now.push(Axiom::EqualsTo { var, value });

    Ok(PostImage::pure(pre))
}

fn comparison_of(op: keyflow_language::BinaryOp) -> EngineResult<Comparator> {
    use keyflow_language::BinaryOp;
    Ok(match op {
        BinaryOp::Eq => Comparator::Eq,
        BinaryOp::Neq => Comparator::Neq,
        BinaryOp::Leq => Comparator::Leq,
        BinaryOp::Lt => Comparator::Lt,
        BinaryOp::Geq => Comparator::Geq,
        BinaryOp::Gt => Comparator::Gt,
        BinaryOp::And | BinaryOp::Or => {
            return Err(EngineError::unsupported(
                "boolean connective on the right-hand side of an assignment",
            ))
        }
    })
}
