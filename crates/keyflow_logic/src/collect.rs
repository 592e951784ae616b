//! Symbol collection and reachability.
//!
//! All queries are index-set computations over [`SymbolId`]s; there is no
//! graph walking beyond the formula tree itself.

use std::collections::BTreeSet;

use crate::ast::{
    Annotation, Axiom, Conjunct, Conjunction, Effect, FuturePredicate, Implication, MemoryAxiom,
    PastPredicate, StackAxiom, SymbolicExpr,
};
use crate::symbols::SymbolId;

fn expr_symbols(expr: &SymbolicExpr, out: &mut BTreeSet<SymbolId>) {
    if let SymbolicExpr::Symbol(id) = expr {
        out.insert(*id);
    }
}

fn memory_symbols(mem: &MemoryAxiom, out: &mut BTreeSet<SymbolId>) {
    out.insert(mem.node);
    out.insert(mem.flow);
    for (_, value) in mem.fields() {
        out.insert(*value);
    }
}

pub fn axiom_symbols(axiom: &Axiom, out: &mut BTreeSet<SymbolId>) {
    match axiom {
        Axiom::EqualsTo { value, .. } => {
            out.insert(*value);
        }
        Axiom::SharedMemory(mem) | Axiom::LocalMemory(mem) => memory_symbols(mem, out),
        Axiom::Stack(StackAxiom { lhs, rhs, .. }) => {
            expr_symbols(lhs, out);
            expr_symbols(rhs, out);
        }
        Axiom::InflowEmpty { flow, .. } => {
            out.insert(*flow);
        }
        Axiom::InflowHasValue { flow, value } => {
            out.insert(*flow);
            expr_symbols(value, out);
        }
        Axiom::InflowHasRange { flow, low, high } => {
            out.insert(*flow);
            expr_symbols(low, out);
            expr_symbols(high, out);
        }
        Axiom::Obligation { key, .. } => {
            out.insert(*key);
        }
        Axiom::Fulfillment { key, .. } => {
            out.insert(*key);
        }
    }
}

pub fn conjunct_symbols(conjunct: &Conjunct, out: &mut BTreeSet<SymbolId>) {
    match conjunct {
        Conjunct::Axiom(axiom) => axiom_symbols(axiom, out),
        Conjunct::Implication(Implication {
            premise,
            conclusion,
        }) => {
            for axiom in premise.iter().chain(conclusion) {
                axiom_symbols(axiom, out);
            }
        }
    }
}

pub fn conjunction_symbols(conjunction: &Conjunction, out: &mut BTreeSet<SymbolId>) {
    for conjunct in &conjunction.conjuncts {
        conjunct_symbols(conjunct, out);
    }
}

/// All symbols mentioned anywhere in the annotation.
pub fn annotation_symbols(annotation: &Annotation) -> BTreeSet<SymbolId> {
    let mut out = BTreeSet::new();
    conjunction_symbols(&annotation.now, &mut out);
    for PastPredicate { formula } in &annotation.past {
        conjunction_symbols(formula, &mut out);
    }
    for FuturePredicate { pre, post, .. } in &annotation.future {
        conjunction_symbols(pre, &mut out);
        conjunction_symbols(post, &mut out);
    }
    out
}

/// All symbols mentioned in an effect.
pub fn effect_symbols(effect: &Effect) -> BTreeSet<SymbolId> {
    let mut out = BTreeSet::new();
    memory_symbols(&effect.pre, &mut out);
    memory_symbols(&effect.post, &mut out);
    conjunction_symbols(&effect.context, &mut out);
    out
}

/// The symbols anchored by a conjunction: values of `EqualsTo` bindings
/// (stack-reachable), everything inside memory axioms (heap-reachable),
/// and the keys of specification ghosts.
///
/// A symbol outside this set is *dangling*: nothing ties it to the program
/// state, and normalization prunes conjuncts that mention it.
pub fn anchored_symbols(conjunction: &Conjunction) -> BTreeSet<SymbolId> {
    let mut out = BTreeSet::new();
    for axiom in conjunction.axioms() {
        match axiom {
            Axiom::EqualsTo { value, .. } => {
                out.insert(*value);
            }
            Axiom::SharedMemory(mem) | Axiom::LocalMemory(mem) => memory_symbols(mem, &mut out),
            Axiom::Obligation { key, .. } | Axiom::Fulfillment { key, .. } => {
                out.insert(*key);
            }
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Comparator;
    use crate::symbols::{SymbolFactory, SymbolPool};
    use keyflow_language::{Sort, VarId};

    #[test]
    fn annotation_symbols_cover_all_parts() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let b = factory.fresh_value(Sort::Data);

        let mut annotation = Annotation::from_now(Conjunction::from_axioms(vec![
            Axiom::EqualsTo {
                var: VarId::from_index(0),
                value: a,
            },
        ]));
        annotation.past.push(PastPredicate {
            formula: Conjunction::from_axioms(vec![Axiom::Stack(
                StackAxiom::new(Comparator::Lt, b.into(), SymbolicExpr::Max, &pool).unwrap(),
            )]),
        });

        let symbols = annotation_symbols(&annotation);
        assert!(symbols.contains(&a));
        assert!(symbols.contains(&b));
    }

    #[test]
    fn anchored_excludes_floating_comparisons() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let bound = factory.fresh_value(Sort::Data);
        let floating = factory.fresh_value(Sort::Data);

        let now = Conjunction::from_axioms(vec![
            Axiom::EqualsTo {
                var: VarId::from_index(0),
                value: bound,
            },
            Axiom::Stack(
                StackAxiom::new(Comparator::Lt, floating.into(), bound.into(), &pool).unwrap(),
            ),
        ]);

        let anchored = anchored_symbols(&now);
        assert!(anchored.contains(&bound));
        assert!(!anchored.contains(&floating));
    }
}
