//! The implied-fact harvest.
//!
//! After a heap step, the two-state solver knows the `Next` state exactly
//! — but the post annotation must describe it in the logic. The harvest
//! reconstructs inflow knowledge for the re-symbolized flows: a bounded
//! candidate space (emptiness, membership of the data values in scope,
//! ranges against the extremal constants) is generated and every
//! candidate entailed by the solver is kept.

use tracing::trace;

use keyflow_logic::{Axiom, SymbolId, SymbolPool, SymbolicExpr};

use crate::checker::ImplicationChecker;
use crate::error::{EngineError, EngineResult};

/// Candidate inflow facts for one fresh flow symbol.
fn candidates_for(flow: SymbolId, data_terms: &[SymbolicExpr]) -> Vec<Axiom> {
    let mut out = vec![
        Axiom::InflowEmpty {
            flow,
            is_empty: true,
        },
        Axiom::InflowEmpty {
            flow,
            is_empty: false,
        },
    ];
    for term in data_terms {
        out.push(Axiom::InflowHasValue { flow, value: *term });
        out.push(Axiom::InflowHasRange {
            flow,
            low: *term,
            high: SymbolicExpr::Max,
        });
        out.push(Axiom::InflowHasRange {
            flow,
            low: SymbolicExpr::Min,
            high: *term,
        });
    }
    out
}

/// Harvests the entailed inflow facts for freshly introduced flows.
///
/// `data_terms` are the data-sorted values in scope, plus `MIN`/`MAX`.
pub(crate) fn harvest_inflow_facts(
    checker: &ImplicationChecker<'_, '_, '_>,
    pool: &SymbolPool,
    flows: &[SymbolId],
    data_terms: &[SymbolicExpr],
) -> EngineResult<Vec<Axiom>> {
    let encoding = checker.encoding();
    let mut candidates = Vec::new();
    for flow in flows {
        candidates.extend(candidates_for(*flow, data_terms));
    }

    let mut terms = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        // Inflow axioms are epoch-independent; the epoch argument is
        // irrelevant here.
        terms.push(encoding.axiom(candidate, crate::encoding::Epoch::Next, pool)?);
    }
    let verdicts = checker.compute_implied(&terms)?;

    let kept: Vec<Axiom> = candidates
        .into_iter()
        .zip(verdicts)
        .filter_map(|(candidate, implied)| implied.then_some(candidate))
        .collect();
    trace!(kept = kept.len(), "inflow harvest");

    // Consistency: entailment of both emptiness verdicts means the
    // premise is degenerate.
    for flow in flows {
        let empty = kept.iter().any(
            |a| matches!(a, Axiom::InflowEmpty { flow: f, is_empty: true } if f == flow),
        );
        let nonempty = kept.iter().any(
            |a| matches!(a, Axiom::InflowEmpty { flow: f, is_empty: false } if f == flow),
        );
        if empty && nonempty {
            return Err(EngineError::internal(
                "inconsistent two-state premise during harvest",
            ));
        }
    }

    Ok(kept)
}

/// The data-sorted values in scope of an annotation: its data symbols
/// plus the extremal constants.
pub(crate) fn data_terms_in(
    annotation: &keyflow_logic::Annotation,
    pool: &SymbolPool,
) -> Vec<SymbolicExpr> {
    let mut out = vec![SymbolicExpr::Min, SymbolicExpr::Max];
    for symbol in keyflow_logic::collect::annotation_symbols(annotation) {
        if pool.sort(symbol) == Some(keyflow_language::Sort::Data) {
            out.push(SymbolicExpr::Symbol(symbol));
        }
    }
    out
}

/// Enriches a state with the inflow facts its cells entail right now.
///
/// Reads capture flow knowledge at the moment the heap edges are still
/// visible; stored as inflow axioms over the cells' flow symbols, the
/// knowledge is about immutable set values and survives interference —
/// this is what pure linearization later feeds on.
pub(crate) fn enrich_with_flow_facts(
    cx: &crate::post::PostCx<'_>,
    pool: &SymbolPool,
    now: &mut keyflow_logic::Conjunction,
    flows: &[SymbolId],
) -> EngineResult<()> {
    if flows.is_empty() {
        return Ok(());
    }
    let z3_config = z3::Config::new();
    let ctx = z3::Context::new(&z3_config);
    let encoding = crate::encoding::Encoding::new(&ctx, cx.program, cx.config);
    let checker = crate::checker::checker_for_now(&encoding, now, pool)?;
    if checker.implies_false()? {
        return Ok(());
    }

    let annotation = keyflow_logic::Annotation::from_now(now.clone());
    let data_terms = data_terms_in(&annotation, pool);
    let facts = harvest_inflow_facts(&checker, pool, flows, &data_terms)?;
    for fact in facts {
        let conjunct = keyflow_logic::Conjunct::Axiom(fact);
        if !keyflow_logic::equal::syntactically_contains(now, &conjunct) {
            now.conjuncts.push(conjunct);
        }
    }
    Ok(())
}
