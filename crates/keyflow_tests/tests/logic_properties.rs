//! Cross-module laws of the logic IR: copy/equality, normalization,
//! renaming, simplification. Solver-free.

mod common;

use keyflow_language::{Sort, VarId};
use keyflow_logic::{
    collect, equal, normalize, rename, simplify, Annotation, Axiom, Comparator, Conjunction,
    MemoryAxiom, StackAxiom, SymbolFactory, SymbolPool, SymbolicExpr,
};

fn sample_annotation(pool: &mut SymbolPool) -> Annotation {
    let mut factory = SymbolFactory::new(pool);
    let key = factory.fresh_value(Sort::Data);
    let node = factory.fresh_value(Sort::Ptr);
    let flow = factory.fresh_flow();
    let val = factory.fresh_value(Sort::Data);
    let next = factory.fresh_value(Sort::Ptr);
    drop(factory);

    let mem = MemoryAxiom::new(
        node,
        flow,
        vec![("next".to_string(), next), ("val".to_string(), val)],
        pool,
    )
    .unwrap();
    Annotation::from_now(Conjunction::from_axioms(vec![
        Axiom::EqualsTo {
            var: VarId::from_index(0),
            value: key,
        },
        Axiom::EqualsTo {
            var: VarId::from_index(1),
            value: node,
        },
        Axiom::SharedMemory(mem),
        Axiom::Stack(StackAxiom::new(Comparator::Gt, SymbolicExpr::Max, key.into(), pool).unwrap()),
        Axiom::InflowHasValue {
            flow,
            value: val.into(),
        },
    ]))
}

#[test]
fn copies_are_syntactically_equal() {
    common::init();
    let mut pool = SymbolPool::new();
    let annotation = sample_annotation(&mut pool);
    let copy = annotation.clone();
    assert!(equal::annotations_equal(&annotation, &copy));

    // Copying the copy changes nothing either.
    let copy_of_copy = copy.clone();
    assert!(equal::annotations_equal(&copy, &copy_of_copy));
}

#[test]
fn copies_do_not_alias() {
    common::init();
    let mut pool = SymbolPool::new();
    let annotation = sample_annotation(&mut pool);
    let mut copy = annotation.clone();
    copy.now.conjuncts.pop();
    assert!(!equal::annotations_equal(&annotation, &copy));
}

#[test]
fn normalization_is_idempotent_up_to_alpha() {
    common::init();
    let mut pool = SymbolPool::new();
    let annotation = sample_annotation(&mut pool);
    let once = normalize::normalize(annotation, &mut pool);
    let twice = normalize::normalize(once.clone(), &mut pool);
    assert!(equal::alpha_equivalent(&once, &twice));
}

#[test]
fn normalization_canonicalizes_conjunct_order() {
    common::init();
    let mut pool = SymbolPool::new();
    let annotation = sample_annotation(&mut pool);
    let mut shuffled = annotation.clone();
    shuffled.now.conjuncts.reverse();

    let a = normalize::normalize(annotation, &mut pool);
    let b = normalize::normalize(shuffled, &mut pool);
    assert!(equal::alpha_equivalent(&a, &b));
}

#[test]
fn rename_to_avoid_avoids_and_preserves_shape() {
    common::init();
    let mut pool = SymbolPool::new();
    let annotation = sample_annotation(&mut pool);
    let forbidden = collect::annotation_symbols(&annotation);

    let mut renamed = annotation.clone();
    let mut factory = SymbolFactory::avoiding(&mut pool, forbidden.iter().copied());
    rename::rename_to_avoid(&mut renamed, &mut factory);

    let fresh = collect::annotation_symbols(&renamed);
    assert!(
        fresh.intersection(&forbidden).count() == 0,
        "no renamed symbol may remain in the avoid set"
    );
    assert!(equal::alpha_equivalent(&annotation, &renamed));
}

#[test]
fn simplification_discharges_trivialities() {
    common::init();
    let mut pool = SymbolPool::new();
    let mut factory = SymbolFactory::new(&mut pool);
    let a = factory.fresh_value(Sort::Data);
    drop(factory);

    let mut annotation = Annotation::from_now(Conjunction::from_axioms(vec![
        Axiom::Stack(StackAxiom {
            op: Comparator::Leq,
            lhs: a.into(),
            rhs: a.into(),
        }),
        Axiom::Stack(StackAxiom {
            op: Comparator::Lt,
            lhs: SymbolicExpr::Min,
            rhs: SymbolicExpr::Max,
        }),
        Axiom::EqualsTo {
            var: VarId::from_index(0),
            value: a,
        },
    ]));
    simplify::simplify_annotation(&mut annotation);
    assert_eq!(annotation.now.len(), 1, "only the binding should remain");
}

#[test]
fn contradiction_collapses_the_annotation() {
    common::init();
    let mut annotation = Annotation::from_now(Conjunction::from_axioms(vec![
        Axiom::Stack(StackAxiom {
            op: Comparator::Gt,
            lhs: SymbolicExpr::Min,
            rhs: SymbolicExpr::Max,
        }),
    ]));
    simplify::simplify_annotation(&mut annotation);
    assert!(annotation.is_bottom());
}
