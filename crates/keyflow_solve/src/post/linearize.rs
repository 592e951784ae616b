//! Pure linearization.
//!
//! Read-only operations take effect at a step that changes nothing: a
//! `contains(k)` linearizes at any moment the structure's content at `k`
//! is decided, and failing `insert`/`delete` calls (key already present /
//! already absent) linearize the same way. The decision procedure rests
//! on keysets: if `k ∈ keyset(n)`, then node `n` alone decides whether
//! the structure contains `k` — keysets of distinct nodes are disjoint.
//!
//! Evidence may come from the current state or from a past predicate:
//! a moment on this thread's timeline at which the cell was observed is a
//! legal linearization point for a pure operation.

use tracing::{debug, trace};
use z3::{Config, Context};

use keyflow_language::OperationKind;
use keyflow_logic::{
    Annotation, Axiom, Conjunct, Conjunction, MemoryAxiom, SymbolId, SymbolPool,
};

use crate::checker::{checker_for_now, ImplicationChecker};
use crate::encoding::{Encoding, Epoch};
use crate::error::{EngineError, EngineResult};
use crate::post::PostCx;

/// What a piece of evidence shows about one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Content {
    Present,
    Absent,
}

/// Checks whether a premise decides the membership of `key` at some cell.
fn decide_content(
    checker: &ImplicationChecker<'_, '_, '_>,
    memories: &[&MemoryAxiom],
    key: SymbolId,
    pool: &SymbolPool,
) -> EngineResult<Option<Content>> {
    let encoding = checker.encoding();
    let key_term = encoding
        .symbol(key, pool)?
        .as_int()
        .ok_or_else(|| EngineError::internal("non-data obligation key"))?;
    for mem in memories {
        let node = encoding
            .symbol(mem.node, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("non-integer node symbol"))?;
        let owns = encoding.keyset_contains(&node, &key_term, Epoch::Now)?;
        let holds = encoding.predicate(
            &encoding.config().contains_key,
            &node,
            Some(&key_term),
            Epoch::Now,
        )?;

        let present = z3::ast::Bool::and(encoding.context(), &[&owns, &holds]);
        if checker.implies_term(&present)? {
            return Ok(Some(Content::Present));
        }
        let absent = z3::ast::Bool::and(encoding.context(), &[&owns, &holds.not()]);
        if checker.implies_term(&absent)? {
            return Ok(Some(Content::Absent));
        }
    }
    Ok(None)
}

/// The conjuncts of a state that stay true forever: facts about symbol
/// values, never about the evolving heap.
fn eternal_facts(now: &Conjunction) -> Conjunction {
    let mut out = Conjunction::new();
    for conjunct in &now.conjuncts {
        let keep = match conjunct {
            Conjunct::Axiom(axiom) => matches!(
                axiom,
                Axiom::Stack(_)
                    | Axiom::InflowEmpty { .. }
                    | Axiom::InflowHasValue { .. }
                    | Axiom::InflowHasRange { .. }
            ),
            Conjunct::Implication(_) => false,
        };
        if keep {
            out.conjuncts.push(conjunct.clone());
        }
    }
    out
}

/// Attempts to discharge outstanding obligations by a pure linearization
/// point, in the current state or in the past.
pub fn try_pure_linearization(
    cx: &PostCx<'_>,
    pool: &mut SymbolPool,
    mut annotation: Annotation,
) -> EngineResult<Annotation> {
    let obligations: Vec<(OperationKind, SymbolId)> = annotation
        .now
        .axioms()
        .filter_map(|a| match a {
            Axiom::Obligation { kind, key } => Some((*kind, *key)),
            _ => None,
        })
        .collect();
    if obligations.is_empty() {
        return Ok(annotation);
    }

    let z3_config = Config::new();
    let ctx = Context::new(&z3_config);
    let encoding = Encoding::new(&ctx, cx.program, cx.config);

    let mut decided: Vec<(OperationKind, SymbolId, Content)> = Vec::new();
    for (kind, key) in obligations {
        // Evidence in the current state.
        let verdict = {
            let checker = checker_for_now(&encoding, &annotation.now, pool)?;
            let memories: Vec<&MemoryAxiom> = annotation.now.shared_memories().collect();
            decide_content(&checker, &memories, key, pool)?
        };

        // Evidence at an earlier point of this thread.
        let verdict = match verdict {
            Some(v) => Some(v),
            None => {
                let mut found = None;
                for past in &annotation.past {
                    let mut premise = past.formula.clone();
                    premise.extend(eternal_facts(&annotation.now));
                    let checker = checker_for_now(&encoding, &premise, pool)?;
                    let memories: Vec<&MemoryAxiom> = premise.shared_memories().collect();
                    if let Some(v) = decide_content(&checker, &memories, key, pool)? {
                        found = Some(v);
                        break;
                    }
                }
                found
            }
        };

        let Some(content) = verdict else {
            trace!(?kind, "no pure linearization evidence");
            continue;
        };
        match (kind, content) {
            (OperationKind::Contains, Content::Present) => {
                decided.push((kind, key, Content::Present))
            }
            (OperationKind::Contains, Content::Absent) => {
                decided.push((kind, key, Content::Absent))
            }
            // A failing insert/delete linearizes purely.
            (OperationKind::Insert, Content::Present) => {
                decided.push((kind, key, Content::Present))
            }
            (OperationKind::Delete, Content::Absent) => {
                decided.push((kind, key, Content::Absent))
            }
            // Succeeding inserts/deletes need an impure step; keep the
            // obligation open.
            _ => {}
        }
    }

    for (kind, key, content) in decided {
        debug!(%kind, ?content, "pure linearization point");
        let return_value = match (kind, content) {
            (OperationKind::Contains, Content::Present) => true,
            (OperationKind::Contains, Content::Absent) => false,
            (OperationKind::Insert, Content::Present) => false,
            (OperationKind::Delete, Content::Absent) => false,
            _ => unreachable!("filtered above"),
        };
        for conjunct in &mut annotation.now.conjuncts {
            if let Conjunct::Axiom(axiom) = conjunct {
                if matches!(axiom, Axiom::Obligation { kind: k, key: s } if *k == kind && *s == key)
                {
                    *axiom = Axiom::Fulfillment {
                        kind,
                        key,
                        return_value,
                    };
                }
            }
        }
    }

    Ok(annotation)
}
