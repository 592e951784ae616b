//! Canonical representatives of annotations.
//!
//! Normalization makes annotations comparable across loop iterations:
//!
//! 1. simplify (see [`crate::simplify`]);
//! 2. prune dangling conjuncts — anything mentioning a symbol that is
//!    neither stack- nor heap-reachable;
//! 3. orient stack axioms (symmetric operators order their operands,
//!    `≥`/`>` mirror to `≤`/`<`);
//! 4. stable-sort conjuncts by a rank bucket and a lexicographic
//!    sub-order in which symbols compare by first-encounter position;
//! 5. rename all symbols to a fresh dense sequence in traversal order.
//!
//! Steps 3–4 feed back into each other (sorting changes encounter
//! positions); the loop is bounded by [`MAX_NORMALIZE_ROUNDS`] and returns
//! the last iterate if it has not stabilized. The result is canonical up
//! to alpha equivalence: `normalize(normalize(a))` is alpha-equivalent to
//! `normalize(a)`.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{
    Annotation, Axiom, Conjunct, Conjunction, Implication, MemoryAxiom, StackAxiom, SymbolicExpr,
};
use crate::collect;
use crate::rename::SymbolRenaming;
use crate::simplify;
use crate::symbols::{SymbolFactory, SymbolId, SymbolPool};

/// Bound on the orient/sort feedback loop.
pub const MAX_NORMALIZE_ROUNDS: usize = 12;

/// First-encounter positions of symbols in traversal order.
#[derive(Default)]
struct Ranks {
    position: HashMap<SymbolId, usize>,
}

impl Ranks {
    fn of(annotation: &Annotation) -> Self {
        let mut ranks = Ranks::default();
        let mut visit = |id: SymbolId| {
            let next = ranks.position.len();
            ranks.position.entry(id).or_insert(next);
        };
        for_each_symbol(annotation, &mut visit);
        ranks
    }

    fn get(&self, id: SymbolId) -> usize {
        // Symbols outside the annotation sort last; they only occur while
        // comparing candidate orders mid-round.
        self.position.get(&id).copied().unwrap_or(usize::MAX)
    }
}

fn for_each_symbol(annotation: &Annotation, visit: &mut impl FnMut(SymbolId)) {
    let walk_conjunction = |conjunction: &Conjunction, visit: &mut dyn FnMut(SymbolId)| {
        for conjunct in &conjunction.conjuncts {
            conjunct_symbols_in_order(conjunct, visit);
        }
    };
    walk_conjunction(&annotation.now, visit);
    for past in &annotation.past {
        walk_conjunction(&past.formula, visit);
    }
    for future in &annotation.future {
        walk_conjunction(&future.pre, visit);
        walk_conjunction(&future.post, visit);
    }
}

fn expr_symbol(expr: &SymbolicExpr, visit: &mut dyn FnMut(SymbolId)) {
    if let SymbolicExpr::Symbol(id) = expr {
        visit(*id);
    }
}

fn memory_symbols_in_order(mem: &MemoryAxiom, visit: &mut dyn FnMut(SymbolId)) {
    visit(mem.node);
    visit(mem.flow);
    for (_, value) in mem.fields() {
        visit(*value);
    }
}

fn axiom_symbols_in_order(axiom: &Axiom, visit: &mut dyn FnMut(SymbolId)) {
    match axiom {
        Axiom::EqualsTo { value, .. } => visit(*value),
        Axiom::SharedMemory(mem) | Axiom::LocalMemory(mem) => memory_symbols_in_order(mem, visit),
        Axiom::Stack(StackAxiom { lhs, rhs, .. }) => {
            expr_symbol(lhs, visit);
            expr_symbol(rhs, visit);
        }
        Axiom::InflowEmpty { flow, .. } => visit(*flow),
        Axiom::InflowHasValue { flow, value } => {
            visit(*flow);
            expr_symbol(value, visit);
        }
        Axiom::InflowHasRange { flow, low, high } => {
            visit(*flow);
            expr_symbol(low, visit);
            expr_symbol(high, visit);
        }
        Axiom::Obligation { key, .. } | Axiom::Fulfillment { key, .. } => visit(*key),
    }
}

fn conjunct_symbols_in_order(conjunct: &Conjunct, visit: &mut dyn FnMut(SymbolId)) {
    match conjunct {
        Conjunct::Axiom(axiom) => axiom_symbols_in_order(axiom, visit),
        Conjunct::Implication(Implication {
            premise,
            conclusion,
        }) => {
            for axiom in premise.iter().chain(conclusion) {
                axiom_symbols_in_order(axiom, visit);
            }
        }
    }
}

//
// Ordering
//

fn expr_key(expr: &SymbolicExpr, ranks: &Ranks) -> (usize, usize) {
    match expr {
        SymbolicExpr::True => (0, 0),
        SymbolicExpr::False => (1, 0),
        SymbolicExpr::Min => (2, 0),
        SymbolicExpr::Max => (3, 0),
        SymbolicExpr::Null => (4, 0),
        SymbolicExpr::Symbol(id) => (5, ranks.get(*id)),
    }
}

fn comparator_key(op: crate::ast::Comparator) -> usize {
    use crate::ast::Comparator::*;
    match op {
        Eq => 0,
        Neq => 1,
        Leq => 2,
        Lt => 3,
        Geq => 4,
        Gt => 5,
    }
}

fn axiom_bucket(axiom: &Axiom) -> usize {
    match axiom {
        Axiom::EqualsTo { .. } => 210,
        Axiom::LocalMemory(_) => 220,
        Axiom::SharedMemory(_) => 230,
        Axiom::Obligation { .. } => 240,
        Axiom::Fulfillment { .. } => 250,
        Axiom::Stack(_) => 260,
        Axiom::InflowEmpty { .. } => 270,
        Axiom::InflowHasValue { .. } => 280,
        Axiom::InflowHasRange { .. } => 290,
    }
}

fn conjunct_bucket(conjunct: &Conjunct) -> usize {
    match conjunct {
        Conjunct::Axiom(axiom) => axiom_bucket(axiom),
        Conjunct::Implication(_) => 300,
    }
}

fn compare_axioms(a: &Axiom, b: &Axiom, ranks: &Ranks) -> Ordering {
    let bucket = axiom_bucket(a).cmp(&axiom_bucket(b));
    if bucket != Ordering::Equal {
        return bucket;
    }
    match (a, b) {
        (
            Axiom::EqualsTo { var: va, value: xa },
            Axiom::EqualsTo { var: vb, value: xb },
        ) => va.cmp(vb).then(ranks.get(*xa).cmp(&ranks.get(*xb))),
        (Axiom::LocalMemory(ma), Axiom::LocalMemory(mb))
        | (Axiom::SharedMemory(ma), Axiom::SharedMemory(mb)) => {
            compare_memories(ma, mb, ranks)
        }
        (
            Axiom::Obligation { kind: ka, key: xa },
            Axiom::Obligation { kind: kb, key: xb },
        ) => ka.cmp(kb).then(ranks.get(*xa).cmp(&ranks.get(*xb))),
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
        ) => ka
            .cmp(kb)
            .then(ra.cmp(rb))
            .then(ranks.get(*xa).cmp(&ranks.get(*xb))),
        (Axiom::Stack(sa), Axiom::Stack(sb)) => comparator_key(sa.op)
            .cmp(&comparator_key(sb.op))
            .then_with(|| expr_key(&sa.lhs, ranks).cmp(&expr_key(&sb.lhs, ranks)))
            .then_with(|| expr_key(&sa.rhs, ranks).cmp(&expr_key(&sb.rhs, ranks))),
        (
            Axiom::InflowEmpty { flow: fa, is_empty: ea },
            Axiom::InflowEmpty { flow: fb, is_empty: eb },
        ) => ea
            .cmp(eb)
            .then(ranks.get(*fa).cmp(&ranks.get(*fb))),
        (
            Axiom::InflowHasValue { flow: fa, value: xa },
            Axiom::InflowHasValue { flow: fb, value: xb },
        ) => ranks
            .get(*fa)
            .cmp(&ranks.get(*fb))
            .then_with(|| expr_key(xa, ranks).cmp(&expr_key(xb, ranks))),
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
        ) => ranks
            .get(*fa)
            .cmp(&ranks.get(*fb))
            .then_with(|| expr_key(la, ranks).cmp(&expr_key(lb, ranks)))
            .then_with(|| expr_key(ha, ranks).cmp(&expr_key(hb, ranks))),
        _ => Ordering::Equal,
    }
}

fn compare_memories(a: &MemoryAxiom, b: &MemoryAxiom, ranks: &Ranks) -> Ordering {
    ranks
        .get(a.node)
        .cmp(&ranks.get(b.node))
        .then(ranks.get(a.flow).cmp(&ranks.get(b.flow)))
        .then_with(|| {
            for ((fa, va), (fb, vb)) in a.fields().iter().zip(b.fields()) {
                let ord = fa
                    .cmp(fb)
                    .then(ranks.get(*va).cmp(&ranks.get(*vb)));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.fields().len().cmp(&b.fields().len())
        })
}

fn compare_conjuncts(a: &Conjunct, b: &Conjunct, ranks: &Ranks) -> Ordering {
    let bucket = conjunct_bucket(a).cmp(&conjunct_bucket(b));
    if bucket != Ordering::Equal {
        return bucket;
    }
    match (a, b) {
        (Conjunct::Axiom(x), Conjunct::Axiom(y)) => compare_axioms(x, y, ranks),
        (Conjunct::Implication(x), Conjunct::Implication(y)) => x
            .premise
            .len()
            .cmp(&y.premise.len())
            .then(x.conclusion.len().cmp(&y.conclusion.len()))
            .then_with(|| {
                for (xa, ya) in x
                    .premise
                    .iter()
                    .chain(&x.conclusion)
                    .zip(y.premise.iter().chain(&y.conclusion))
                {
                    let ord = compare_axioms(xa, ya, ranks);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }),
        _ => Ordering::Equal,
    }
}

//
// Orientation
//

fn orient_stack_axiom(stack: &mut StackAxiom, ranks: &Ranks) {
    if stack.op.is_symmetric() {
        if expr_key(&stack.rhs, ranks) < expr_key(&stack.lhs, ranks) {
            std::mem::swap(&mut stack.lhs, &mut stack.rhs);
        }
    } else if matches!(
        stack.op,
        crate::ast::Comparator::Geq | crate::ast::Comparator::Gt
    ) {
        stack.op = stack.op.mirrored();
        std::mem::swap(&mut stack.lhs, &mut stack.rhs);
    }
}

fn orient_conjunction(conjunction: &mut Conjunction, ranks: &Ranks) {
    for conjunct in &mut conjunction.conjuncts {
        match conjunct {
            Conjunct::Axiom(Axiom::Stack(stack)) => orient_stack_axiom(stack, ranks),
            Conjunct::Implication(Implication {
                premise,
                conclusion,
            }) => {
                for axiom in premise.iter_mut().chain(conclusion) {
                    if let Axiom::Stack(stack) = axiom {
                        orient_stack_axiom(stack, ranks);
                    }
                }
            }
            _ => {}
        }
    }
}

//
// Pruning
//

fn prune_conjunction(conjunction: &mut Conjunction, anchored: &std::collections::BTreeSet<SymbolId>) {
    conjunction.conjuncts.retain(|conjunct| {
        let mut symbols = std::collections::BTreeSet::new();
        collect::conjunct_symbols(conjunct, &mut symbols);
        symbols.iter().all(|s| anchored.contains(s))
    });
}

fn prune_dangling(annotation: &mut Annotation) {
    let anchored = collect::anchored_symbols(&annotation.now);
    prune_conjunction(&mut annotation.now, &anchored);
    for past in &mut annotation.past {
        let mut local = anchored.clone();
        local.extend(collect::anchored_symbols(&past.formula));
        prune_conjunction(&mut past.formula, &local);
    }
    annotation.past.retain(|p| !p.formula.is_empty());
}

fn sort_annotation(annotation: &mut Annotation, ranks: &Ranks) {
    annotation
        .now
        .conjuncts
        .sort_by(|a, b| compare_conjuncts(a, b, ranks));
    for past in &mut annotation.past {
        past.formula
            .conjuncts
            .sort_by(|a, b| compare_conjuncts(a, b, ranks));
    }
    annotation.past.sort_by(|a, b| {
        a.formula
            .len()
            .cmp(&b.formula.len())
            .then_with(|| first_difference(&a.formula, &b.formula, ranks))
    });
}

fn first_difference(a: &Conjunction, b: &Conjunction, ranks: &Ranks) -> Ordering {
    for (x, y) in a.conjuncts.iter().zip(&b.conjuncts) {
        let ord = compare_conjuncts(x, y, ranks);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn is_sorted(annotation: &Annotation, ranks: &Ranks) -> bool {
    let sorted = |conjuncts: &[Conjunct]| {
        conjuncts
            .windows(2)
            .all(|w| compare_conjuncts(&w[0], &w[1], ranks) != Ordering::Greater)
    };
    sorted(&annotation.now.conjuncts)
        && annotation.past.iter().all(|p| sorted(&p.formula.conjuncts))
}

/// Renames every symbol to a fresh dense sequence in traversal order.
fn apply_dense_renaming(annotation: &mut Annotation, pool: &mut SymbolPool) {
    let mut order: Vec<SymbolId> = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    for_each_symbol(annotation, &mut |id| {
        if seen.insert(id) {
            order.push(id);
        }
    });

    let mut factory = SymbolFactory::new(pool);
    let mut renaming = SymbolRenaming::new();
    for symbol in order {
        let fresh = factory.fresh_like(symbol);
        renaming.insert(symbol, fresh);
    }
    renaming.apply_annotation(annotation);
}

/// Returns the canonical representative of an annotation.
///
/// Idempotent up to alpha equivalence within [`MAX_NORMALIZE_ROUNDS`]
/// orient/sort rounds; if the feedback loop has not stabilized by then,
/// the last iterate is returned.
pub fn normalize(mut annotation: Annotation, pool: &mut SymbolPool) -> Annotation {
    simplify::simplify_annotation(&mut annotation);
    prune_dangling(&mut annotation);

    let mut rounds = 0;
    loop {
        let ranks = Ranks::of(&annotation);
        orient_conjunction(&mut annotation.now, &ranks);
        for past in &mut annotation.past {
            orient_conjunction(&mut past.formula, &ranks);
        }
        sort_annotation(&mut annotation, &ranks);

        let ranks = Ranks::of(&annotation);
        rounds += 1;
        if is_sorted(&annotation, &ranks) || rounds >= MAX_NORMALIZE_ROUNDS {
            break;
        }
    }

    apply_dense_renaming(&mut annotation, pool);
    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Comparator;
    use crate::equal::alpha_equivalent;
    use keyflow_language::{Sort, VarId};

    fn sample(pool: &mut SymbolPool) -> Annotation {
        let mut factory = SymbolFactory::new(pool);
        let k = factory.fresh_value(Sort::Data);
        let node = factory.fresh_value(Sort::Ptr);
        let flow = factory.fresh_flow();
        let val = factory.fresh_value(Sort::Data);
        drop(factory);

        let mem =
            MemoryAxiom::new(node, flow, vec![("val".to_string(), val)], pool).unwrap();
        Annotation::from_now(Conjunction::from_axioms(vec![
            Axiom::Stack(StackAxiom {
                op: Comparator::Gt,
                lhs: SymbolicExpr::Max,
                rhs: k.into(),
            }),
            Axiom::SharedMemory(mem),
            Axiom::EqualsTo {
                var: VarId::from_index(0),
                value: k,
            },
            Axiom::EqualsTo {
                var: VarId::from_index(1),
                value: node,
            },
        ]))
    }

    #[test]
    fn normalize_orients_and_buckets() {
        let mut pool = SymbolPool::new();
        let annotation = sample(&mut pool);
        let normalized = normalize(annotation, &mut pool);

        // EqualsTo axioms come first, the stack axiom last.
        assert!(matches!(
            normalized.now.conjuncts.first(),
            Some(Conjunct::Axiom(Axiom::EqualsTo { .. }))
        ));
        match normalized.now.conjuncts.last() {
            Some(Conjunct::Axiom(Axiom::Stack(stack))) => {
                // MAX > k was mirrored to k < MAX.
                assert_eq!(stack.op, Comparator::Lt);
                assert_eq!(stack.rhs, SymbolicExpr::Max);
            }
            other => panic!("expected a stack axiom last, got {:?}", other),
        }
    }

    #[test]
    fn normalize_is_idempotent_up_to_alpha() {
        let mut pool = SymbolPool::new();
        let annotation = sample(&mut pool);
        let once = normalize(annotation, &mut pool);
        let twice = normalize(once.clone(), &mut pool);
        assert!(alpha_equivalent(&once, &twice));
    }

    #[test]
    fn normalize_identifies_alpha_variants() {
        let mut pool = SymbolPool::new();
        let a = sample(&mut pool);
        let b = sample(&mut pool); // same shape, different symbols
        let na = normalize(a, &mut pool);
        let nb = normalize(b, &mut pool);
        assert!(alpha_equivalent(&na, &nb));
    }

    #[test]
    fn normalize_prunes_dangling_symbols() {
        let mut pool = SymbolPool::new();
        let mut annotation = sample(&mut pool);
        let dangling = {
            let mut factory = SymbolFactory::new(&mut pool);
            factory.fresh_value(Sort::Data)
        };
        annotation.now.push(Axiom::Stack(StackAxiom {
            op: Comparator::Lt,
            lhs: dangling.into(),
            rhs: SymbolicExpr::Max,
        }));
        let len_with_dangling = annotation.now.len();
        let normalized = normalize(annotation, &mut pool);
        assert_eq!(normalized.now.len(), len_with_dangling - 1);
    }
}
