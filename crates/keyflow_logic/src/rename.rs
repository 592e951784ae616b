//! Symbol renaming and avoidance.
//!
//! A [`SymbolRenaming`] is a partial function on symbols with an identity
//! default. Renaming is applied bottom-up over the formula tree; because
//! symbols are free everywhere (there are no binders), the application is
//! capture-avoiding as long as the targets are fresh — which
//! [`rename_to_avoid`] guarantees by drawing them from a factory.

use std::collections::HashMap;

use crate::ast::{
    Annotation, Axiom, Conjunct, Conjunction, Effect, FuturePredicate, Implication, MemoryAxiom,
    PastPredicate, SymbolicExpr,
};
use crate::collect;
use crate::symbols::{SymbolFactory, SymbolId};

/// A partial map on symbols; unmapped symbols rename to themselves.
#[derive(Debug, Clone, Default)]
pub struct SymbolRenaming {
    map: HashMap<SymbolId, SymbolId>,
}

impl SymbolRenaming {
    pub fn new() -> Self {
        SymbolRenaming {
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, from: SymbolId, to: SymbolId) {
        self.map.insert(from, to);
    }

    pub fn get(&self, id: SymbolId) -> SymbolId {
        self.map.get(&id).copied().unwrap_or(id)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn apply_expr(&self, expr: &mut SymbolicExpr) {
        if let SymbolicExpr::Symbol(id) = expr {
            *id = self.get(*id);
        }
    }

    fn apply_memory(&self, mem: &mut MemoryAxiom) {
        mem.node = self.get(mem.node);
        mem.flow = self.get(mem.flow);
        for (_, value) in mem.fields_mut() {
            *value = self.get(*value);
        }
    }

    pub fn apply_axiom(&self, axiom: &mut Axiom) {
        match axiom {
            Axiom::EqualsTo { value, .. } => *value = self.get(*value),
            Axiom::SharedMemory(mem) | Axiom::LocalMemory(mem) => self.apply_memory(mem),
            Axiom::Stack(stack) => {
                self.apply_expr(&mut stack.lhs);
                self.apply_expr(&mut stack.rhs);
            }
            Axiom::InflowEmpty { flow, .. } => *flow = self.get(*flow),
            Axiom::InflowHasValue { flow, value } => {
                *flow = self.get(*flow);
                self.apply_expr(value);
            }
            Axiom::InflowHasRange { flow, low, high } => {
                *flow = self.get(*flow);
                self.apply_expr(low);
                self.apply_expr(high);
            }
            Axiom::Obligation { key, .. } => *key = self.get(*key),
            Axiom::Fulfillment { key, .. } => *key = self.get(*key),
        }
    }

    pub fn apply_conjunction(&self, conjunction: &mut Conjunction) {
        for conjunct in &mut conjunction.conjuncts {
            match conjunct {
                Conjunct::Axiom(axiom) => self.apply_axiom(axiom),
                Conjunct::Implication(Implication {
                    premise,
                    conclusion,
                }) => {
                    for axiom in premise.iter_mut().chain(conclusion) {
                        self.apply_axiom(axiom);
                    }
                }
            }
        }
    }

    pub fn apply_annotation(&self, annotation: &mut Annotation) {
        self.apply_conjunction(&mut annotation.now);
        for PastPredicate { formula } in &mut annotation.past {
            self.apply_conjunction(formula);
        }
        for FuturePredicate { pre, post, .. } in &mut annotation.future {
            self.apply_conjunction(pre);
            self.apply_conjunction(post);
        }
    }

    pub fn apply_effect(&self, effect: &mut Effect) {
        self.apply_memory(&mut effect.pre);
        self.apply_memory(&mut effect.post);
        self.apply_conjunction(&mut effect.context);
    }
}

/// Alpha-renames the annotation so it mentions no symbol in the factory's
/// avoid-set. Idempotent: a second application with the same avoid-set is
/// the identity.
pub fn rename_to_avoid(annotation: &mut Annotation, factory: &mut SymbolFactory<'_>) {
    let mut renaming = SymbolRenaming::new();
    for symbol in collect::annotation_symbols(annotation) {
        if factory.is_avoided(symbol) {
            let fresh = factory.fresh_like(symbol);
            renaming.insert(symbol, fresh);
        } else {
            factory.avoid(symbol);
        }
    }
    if !renaming.is_empty() {
        renaming.apply_annotation(annotation);
    }
}

/// Alpha-renames an effect away from the factory's avoid-set.
pub fn rename_effect_to_avoid(effect: &mut Effect, factory: &mut SymbolFactory<'_>) {
    let mut renaming = SymbolRenaming::new();
    for symbol in collect::effect_symbols(effect) {
        if factory.is_avoided(symbol) {
            let fresh = factory.fresh_like(symbol);
            renaming.insert(symbol, fresh);
        } else {
            factory.avoid(symbol);
        }
    }
    if !renaming.is_empty() {
        renaming.apply_effect(effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Comparator, StackAxiom};
    use crate::symbols::SymbolPool;
    use keyflow_language::{Sort, VarId};

    #[test]
    fn renaming_defaults_to_identity() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let a = factory.fresh_value(Sort::Data);
        let renaming = SymbolRenaming::new();
        assert_eq!(renaming.get(a), a);
    }

    #[test]
    fn rename_to_avoid_clears_the_avoid_set() {
        let mut pool = SymbolPool::new();
        let (a, b) = {
            let mut factory = SymbolFactory::new(&mut pool);
            (
                factory.fresh_value(Sort::Data),
                factory.fresh_value(Sort::Data),
            )
        };
        let mut annotation = Annotation::from_now(Conjunction::from_axioms(vec![
            Axiom::EqualsTo {
                var: VarId::from_index(0),
                value: a,
            },
            Axiom::Stack(StackAxiom {
                op: Comparator::Lt,
                lhs: a.into(),
                rhs: b.into(),
            }),
        ]));

        let mut factory = SymbolFactory::avoiding(&mut pool, [a]);
        rename_to_avoid(&mut annotation, &mut factory);

        let symbols = collect::annotation_symbols(&annotation);
        assert!(!symbols.contains(&a), "avoided symbol must be renamed");
        assert!(symbols.contains(&b), "unavoided symbol must survive");
    }

    #[test]
    fn rename_to_avoid_is_idempotent() {
        let mut pool = SymbolPool::new();
        let a = {
            let mut factory = SymbolFactory::new(&mut pool);
            factory.fresh_value(Sort::Data)
        };
        let mut annotation = Annotation::from_now(Conjunction::from_axioms(vec![
            Axiom::EqualsTo {
                var: VarId::from_index(0),
                value: a,
            },
        ]));

        let mut factory = SymbolFactory::avoiding(&mut pool, [a]);
        rename_to_avoid(&mut annotation, &mut factory);
        let first = annotation.clone();
        rename_to_avoid(&mut annotation, &mut factory);
        assert_eq!(first, annotation);
    }

    #[test]
    fn renaming_reaches_memory_fields() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let node = factory.fresh_value(Sort::Ptr);
        let flow = factory.fresh_flow();
        let val = factory.fresh_value(Sort::Data);
        let fresh = factory.fresh_value(Sort::Data);

        let mem = MemoryAxiom::new(node, flow, vec![("val".to_string(), val)], &pool).unwrap();
        let mut axiom = Axiom::SharedMemory(mem);

        let mut renaming = SymbolRenaming::new();
        renaming.insert(val, fresh);
        renaming.apply_axiom(&mut axiom);

        let mem = axiom.as_memory().unwrap();
        assert_eq!(mem.field("val"), Some(fresh));
    }
}
