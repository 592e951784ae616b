//! Local simplification of conjunctions and annotations.
//!
//! Simplification is purely syntactic and total:
//!
//! - trivially true conjuncts are dropped;
//! - a trivially false conjunct collapses the whole conjunction to the
//!   canonical contradiction;
//! - duplicate conjuncts (up to syntactic equality) are removed;
//! - implications with an empty or trivially true premise are spliced into
//!   plain axioms, implications with a false premise are dropped, and
//!   implications with an empty conclusion vanish.
//!
//! There is no negation node to push around: negation of comparisons is an
//! operator rewrite performed at construction ([`Comparator::negated`]).
//!
//! [`Comparator::negated`]: crate::ast::Comparator::negated

use crate::ast::{Annotation, Axiom, Conjunct, Conjunction};
use crate::equal;

fn simplify_implication_conjunct(conjunct: Conjunct) -> Option<Vec<Conjunct>> {
    let implication = match conjunct {
        Conjunct::Implication(imp) => imp,
        axiom => return Some(vec![axiom]),
    };

    // A false premise makes the implication vacuous.
    if implication.premise.iter().any(Axiom::is_contradiction) {
        return None;
    }
    let premise: Vec<Axiom> = implication
        .premise
        .into_iter()
        .filter(|a| !a.is_trivial())
        .collect();
    let conclusion: Vec<Axiom> = implication
        .conclusion
        .into_iter()
        .filter(|a| !a.is_trivial())
        .collect();
    if conclusion.is_empty() {
        return None;
    }
    if premise.is_empty() {
        // Premise holds trivially; splice the conclusion.
        return Some(conclusion.into_iter().map(Conjunct::Axiom).collect());
    }
    Some(vec![Conjunct::Implication(crate::ast::Implication {
        premise,
        conclusion,
    })])
}

/// Simplifies a conjunction in place.
pub fn simplify_conjunction(conjunction: &mut Conjunction) {
    let conjuncts = std::mem::take(&mut conjunction.conjuncts);
    let mut out: Vec<Conjunct> = Vec::with_capacity(conjuncts.len());

    for conjunct in conjuncts {
        for piece in simplify_implication_conjunct(conjunct).into_iter().flatten() {
            match &piece {
                Conjunct::Axiom(axiom) => {
                    if axiom.is_trivial() {
                        continue;
                    }
                    if axiom.is_contradiction() {
                        conjunction.conjuncts = vec![Conjunct::Axiom(Axiom::contradiction())];
                        return;
                    }
                }
                Conjunct::Implication(_) => {}
            }
            if !out.iter().any(|c| equal::conjuncts_equal(c, &piece)) {
                out.push(piece);
            }
        }
    }

    conjunction.conjuncts = out;
}

/// Simplifies every part of an annotation in place.
pub fn simplify_annotation(annotation: &mut Annotation) {
    simplify_conjunction(&mut annotation.now);
    for past in &mut annotation.past {
        simplify_conjunction(&mut past.formula);
    }
    for future in &mut annotation.future {
        simplify_conjunction(&mut future.pre);
        simplify_conjunction(&mut future.post);
    }
    // A contradictory now subsumes the temporal predicates.
    if annotation.now.has_contradiction() {
        annotation.past.clear();
        annotation.future.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Comparator, Implication, StackAxiom, SymbolicExpr};
    use crate::symbols::{SymbolFactory, SymbolPool};
    use keyflow_language::Sort;

    fn truth(value: bool) -> Axiom {
        Axiom::Stack(StackAxiom {
            op: Comparator::Eq,
            lhs: SymbolicExpr::True,
            rhs: if value {
                SymbolicExpr::True
            } else {
                SymbolicExpr::False
            },
        })
    }

    #[test]
    fn drops_trivially_true_conjuncts() {
        let mut c = Conjunction::from_axioms(vec![truth(true), truth(true)]);
        simplify_conjunction(&mut c);
        assert!(c.is_empty());
    }

    #[test]
    fn collapses_on_contradiction() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let mut c = Conjunction::from_axioms(vec![
            Axiom::Stack(StackAxiom {
                op: Comparator::Lt,
                lhs: a.into(),
                rhs: SymbolicExpr::Max,
            }),
            truth(false),
        ]);
        simplify_conjunction(&mut c);
        assert_eq!(c.len(), 1);
        assert!(c.has_contradiction());
    }

    #[test]
    fn removes_duplicates() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let b = factory.fresh_value(Sort::Data);
        let axiom = Axiom::Stack(StackAxiom {
            op: Comparator::Eq,
            lhs: a.into(),
            rhs: b.into(),
        });
        let mirrored = Axiom::Stack(StackAxiom {
            op: Comparator::Eq,
            lhs: b.into(),
            rhs: a.into(),
        });
        let mut c = Conjunction::from_axioms(vec![axiom.clone(), axiom, mirrored]);
        simplify_conjunction(&mut c);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn splices_implication_with_true_premise() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let conclusion = Axiom::Stack(StackAxiom {
            op: Comparator::Leq,
            lhs: a.into(),
            rhs: SymbolicExpr::Max,
        });
        let mut c = Conjunction {
            conjuncts: vec![Conjunct::Implication(Implication {
                premise: vec![truth(true)],
                conclusion: vec![conclusion.clone()],
            })],
        };
        simplify_conjunction(&mut c);
        assert_eq!(c.conjuncts, vec![Conjunct::Axiom(conclusion)]);
    }

    #[test]
    fn drops_implication_with_false_premise() {
        let mut c = Conjunction {
            conjuncts: vec![Conjunct::Implication(Implication {
                premise: vec![truth(false)],
                conclusion: vec![truth(false)],
            })],
        };
        simplify_conjunction(&mut c);
        assert!(c.is_empty());
    }

    #[test]
    fn contradictory_now_clears_temporal_predicates() {
        let mut annotation = Annotation::bottom();
        annotation.past.push(crate::ast::PastPredicate {
            formula: Conjunction::new(),
        });
        simplify_annotation(&mut annotation);
        assert!(annotation.past.is_empty());
    }
}
