//! Syntactic and alpha equality.
//!
//! Syntactic equality is structural equality up to: commutativity of the
//! symmetric comparison operators, reordering of conjuncts (multiset
//! semantics), and the canonical field pairing of memory axioms (enforced
//! at construction). Alpha equality additionally abstracts from symbol
//! identity through a bijection, and is what the verifier uses to detect
//! loop fixed points between normalized annotations.

use std::collections::HashMap;

use crate::ast::{
    Annotation, Axiom, Conjunct, Conjunction, Implication, MemoryAxiom, StackAxiom, SymbolicExpr,
};
use crate::symbols::SymbolId;

/// Equality of stack axioms up to commutativity of `=` and `≠`.
pub fn stack_axioms_equal(a: &StackAxiom, b: &StackAxiom) -> bool {
    if a.op == b.op && a.lhs == b.lhs && a.rhs == b.rhs {
        return true;
    }
    a.op.is_symmetric() && a.op == b.op && a.lhs == b.rhs && a.rhs == b.lhs
}

/// Syntactic equality of axioms.
pub fn axioms_equal(a: &Axiom, b: &Axiom) -> bool {
    match (a, b) {
        (Axiom::Stack(x), Axiom::Stack(y)) => stack_axioms_equal(x, y),
        _ => a == b,
    }
}

/// Syntactic equality of conjuncts.
pub fn conjuncts_equal(a: &Conjunct, b: &Conjunct) -> bool {
    match (a, b) {
        (Conjunct::Axiom(x), Conjunct::Axiom(y)) => axioms_equal(x, y),
        (Conjunct::Implication(x), Conjunct::Implication(y)) => {
            axiom_multiset_equal(&x.premise, &y.premise)
                && axiom_multiset_equal(&x.conclusion, &y.conclusion)
        }
        _ => false,
    }
}

fn axiom_multiset_equal(a: &[Axiom], b: &[Axiom]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for x in a {
        for (i, y) in b.iter().enumerate() {
            if !used[i] && axioms_equal(x, y) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// Syntactic equality of conjunctions, with multiset semantics.
pub fn conjunctions_equal(a: &Conjunction, b: &Conjunction) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    'outer: for x in &a.conjuncts {
        for (i, y) in b.conjuncts.iter().enumerate() {
            if !used[i] && conjuncts_equal(x, y) {
                used[i] = true;
                continue 'outer;
            }
        }
        return false;
    }
    true
}

/// `true` if some conjunct of the conjunction is syntactically equal to
/// the given one. The quick-discharge step of implication checking.
pub fn syntactically_contains(conjunction: &Conjunction, conjunct: &Conjunct) -> bool {
    conjunction
        .conjuncts
        .iter()
        .any(|c| conjuncts_equal(c, conjunct))
}

/// Syntactic equality of annotations.
pub fn annotations_equal(a: &Annotation, b: &Annotation) -> bool {
    conjunctions_equal(&a.now, &b.now)
        && a.past.len() == b.past.len()
        && a.future.len() == b.future.len()
        && a.past
            .iter()
            .zip(&b.past)
            .all(|(x, y)| conjunctions_equal(&x.formula, &y.formula))
        && a.future.iter().zip(&b.future).all(|(x, y)| {
            x.command == y.command
                && conjunctions_equal(&x.pre, &y.pre)
                && conjunctions_equal(&x.post, &y.post)
        })
}

/// Builds symbol bijections while comparing structures.
#[derive(Default)]
struct Matching {
    forward: HashMap<SymbolId, SymbolId>,
    backward: HashMap<SymbolId, SymbolId>,
}

impl Matching {
    fn pair(&mut self, a: SymbolId, b: SymbolId) -> bool {
        match (self.forward.get(&a), self.backward.get(&b)) {
            (None, None) => {
                self.forward.insert(a, b);
                self.backward.insert(b, a);
                true
            }
            (Some(&fb), Some(&ba)) => fb == b && ba == a,
            _ => false,
        }
    }

    fn pair_exprs(&mut self, a: &SymbolicExpr, b: &SymbolicExpr) -> bool {
        match (a, b) {
            (SymbolicExpr::Symbol(x), SymbolicExpr::Symbol(y)) => self.pair(*x, *y),
            _ => a == b,
        }
    }

    fn pair_memories(&mut self, a: &MemoryAxiom, b: &MemoryAxiom) -> bool {
        if a.fields().len() != b.fields().len() {
            return false;
        }
        if !self.pair(a.node, b.node) || !self.pair(a.flow, b.flow) {
            return false;
        }
        a.fields()
            .iter()
            .zip(b.fields())
            .all(|((fa, va), (fb, vb))| fa == fb && self.pair(*va, *vb))
    }

    fn pair_axioms(&mut self, a: &Axiom, b: &Axiom) -> bool {
        match (a, b) {
            (
                Axiom::EqualsTo { var: va, value: xa },
                Axiom::EqualsTo { var: vb, value: xb },
            ) => va == vb && self.pair(*xa, *xb),
            (Axiom::SharedMemory(ma), Axiom::SharedMemory(mb))
            | (Axiom::LocalMemory(ma), Axiom::LocalMemory(mb)) => self.pair_memories(ma, mb),
            (Axiom::Stack(sa), Axiom::Stack(sb)) => {
                sa.op == sb.op
                    && self.pair_exprs(&sa.lhs, &sb.lhs)
                    && self.pair_exprs(&sa.rhs, &sb.rhs)
            }
            (
                Axiom::InflowEmpty { flow: fa, is_empty: ea },
                Axiom::InflowEmpty { flow: fb, is_empty: eb },
            ) => ea == eb && self.pair(*fa, *fb),
            (
                Axiom::InflowHasValue { flow: fa, value: xa },
                Axiom::InflowHasValue { flow: fb, value: xb },
            ) => self.pair(*fa, *fb) && self.pair_exprs(xa, xb),
            (
                Axiom::InflowHasRange {
                    flow: fa,
                    low: la,
                    high: ha,
                },
                Axiom::InflowHasRange {
                    flow: fb,
                    low: lb,
                    high: hb,
                },
            ) => self.pair(*fa, *fb) && self.pair_exprs(la, lb) && self.pair_exprs(ha, hb),
            (
                Axiom::Obligation { kind: ka, key: xa },
                Axiom::Obligation { kind: kb, key: xb },
            ) => ka == kb && self.pair(*xa, *xb),
            (
                Axiom::Fulfillment {
                    kind: ka,
                    key: xa,
                    return_value: ra,
                },
                Axiom::Fulfillment {
                    kind: kb,
                    key: xb,
                    return_value: rb,
                },
            ) => ka == kb && ra == rb && self.pair(*xa, *xb),
            _ => false,
        }
    }

    fn pair_conjuncts(&mut self, a: &Conjunct, b: &Conjunct) -> bool {
        match (a, b) {
            (Conjunct::Axiom(x), Conjunct::Axiom(y)) => self.pair_axioms(x, y),
            (
                Conjunct::Implication(Implication {
                    premise: pa,
                    conclusion: ca,
                }),
                Conjunct::Implication(Implication {
                    premise: pb,
                    conclusion: cb,
                }),
            ) => {
                pa.len() == pb.len()
                    && ca.len() == cb.len()
                    && pa.iter().zip(pb).all(|(x, y)| self.pair_axioms(x, y))
                    && ca.iter().zip(cb).all(|(x, y)| self.pair_axioms(x, y))
            }
            _ => false,
        }
    }

    fn pair_conjunctions(&mut self, a: &Conjunction, b: &Conjunction) -> bool {
        a.len() == b.len()
            && a.conjuncts
                .iter()
                .zip(&b.conjuncts)
                .all(|(x, y)| self.pair_conjuncts(x, y))
    }
}

/// Alpha equivalence of effects: the pre/post cells and the contexts
/// match under one symbol bijection.
///
/// Contexts are compared in order; effects produced by the same engine
/// pipeline keep their conjuncts in a stable order, which is what the
/// interference consolidation needs this fast path for. A mismatch only
/// means "not obviously equal" — the caller falls back to the semantic
/// subsumption check.
pub fn effects_alpha_equal(a: &crate::ast::Effect, b: &crate::ast::Effect) -> bool {
    let mut matching = Matching::default();
    matching.pair_memories(&a.pre, &b.pre)
        && matching.pair_memories(&a.post, &b.post)
        && matching.pair_conjunctions(&a.context, &b.context)
}

/// Alpha equivalence of annotations: structural equality in traversal
/// order under a bijective renaming of symbols.
///
/// Intended for *normalized* annotations, whose conjunct order is
/// canonical; on unnormalized inputs it may report false negatives, never
/// false positives.
pub fn alpha_equivalent(a: &Annotation, b: &Annotation) -> bool {
    let mut matching = Matching::default();
    if !matching.pair_conjunctions(&a.now, &b.now) {
        return false;
    }
    if a.past.len() != b.past.len() || a.future.len() != b.future.len() {
        return false;
    }
    for (x, y) in a.past.iter().zip(&b.past) {
        if !matching.pair_conjunctions(&x.formula, &y.formula) {
            return false;
        }
    }
    for (x, y) in a.future.iter().zip(&b.future) {
        if x.command != y.command
            || !matching.pair_conjunctions(&x.pre, &y.pre)
            || !matching.pair_conjunctions(&x.post, &y.post)
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Comparator;
    use crate::symbols::{SymbolFactory, SymbolPool};
    use keyflow_language::{Sort, VarId};

    fn two_data_symbols() -> (SymbolPool, SymbolId, SymbolId) {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let b = factory.fresh_value(Sort::Data);
        (pool, a, b)
    }

    #[test]
    fn equality_is_commutative_for_eq() {
        let (_, a, b) = two_data_symbols();
        let x = StackAxiom {
            op: Comparator::Eq,
            lhs: a.into(),
            rhs: b.into(),
        };
        let y = StackAxiom {
            op: Comparator::Eq,
            lhs: b.into(),
            rhs: a.into(),
        };
        assert!(stack_axioms_equal(&x, &y));
    }

    #[test]
    fn equality_is_not_commutative_for_lt() {
        let (_, a, b) = two_data_symbols();
        let x = StackAxiom {
            op: Comparator::Lt,
            lhs: a.into(),
            rhs: b.into(),
        };
        let y = StackAxiom {
            op: Comparator::Lt,
            lhs: b.into(),
            rhs: a.into(),
        };
        assert!(!stack_axioms_equal(&x, &y));
    }

    #[test]
    fn conjunctions_compare_as_multisets() {
        let (_, a, b) = two_data_symbols();
        let lt = Axiom::Stack(StackAxiom {
            op: Comparator::Lt,
            lhs: a.into(),
            rhs: b.into(),
        });
        let ne = Axiom::Stack(StackAxiom {
            op: Comparator::Neq,
            lhs: a.into(),
            rhs: b.into(),
        });
        let x = Conjunction::from_axioms(vec![lt.clone(), ne.clone()]);
        let y = Conjunction::from_axioms(vec![ne, lt]);
        assert!(conjunctions_equal(&x, &y));
    }

    #[test]
    fn alpha_equivalence_abstracts_symbol_identity() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let b = factory.fresh_value(Sort::Data);
        let var = VarId::from_index(0);

        let mk = |sym: SymbolId| {
            Annotation::from_now(Conjunction::from_axioms(vec![
                Axiom::EqualsTo { var, value: sym },
                Axiom::Stack(StackAxiom {
                    op: Comparator::Lt,
                    lhs: sym.into(),
                    rhs: SymbolicExpr::Max,
                }),
            ]))
        };

        assert!(alpha_equivalent(&mk(a), &mk(b)));
    }

    #[test]
    fn alpha_equivalence_requires_consistency() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let b = factory.fresh_value(Sort::Data);
        let var0 = VarId::from_index(0);
        let var1 = VarId::from_index(1);

        // a bound to both variables vs. two different symbols
        let x = Annotation::from_now(Conjunction::from_axioms(vec![
            Axiom::EqualsTo { var: var0, value: a },
            Axiom::EqualsTo { var: var1, value: a },
        ]));
        let y = Annotation::from_now(Conjunction::from_axioms(vec![
            Axiom::EqualsTo { var: var0, value: a },
            Axiom::EqualsTo { var: var1, value: b },
        ]));
        assert!(!alpha_equivalent(&x, &y));
    }
}
