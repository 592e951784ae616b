//! Solver-backed properties of the engine: the SMT round trip, join
//! soundness, stabilization, and effect consolidation.

mod common;

use keyflow_language::Sort;
use keyflow_logic::{
    Annotation, Axiom, Comparator, Conjunct, Conjunction, Effect, MemoryAxiom, StackAxiom,
    SymbolFactory, SymbolPool, SymbolicExpr,
};
use keyflow_solve::Solver;
use keyflow_tests::sorted_list_fixture;

#[test]
fn smt_round_trip() {
    common::init();
    let fixture = sorted_list_fixture(2);
    let solver = Solver::new(&fixture.program, &fixture.config).unwrap();
    let mut pool = SymbolPool::new();

    let d = {
        let mut factory = SymbolFactory::new(&mut pool);
        factory.fresh_value(Sort::Data)
    };
    let formula = Conjunction::from_axioms(vec![Axiom::Stack(
        StackAxiom::new(Comparator::Lt, d.into(), SymbolicExpr::Max, &pool).unwrap(),
    )]);
    let negated = Conjunction::from_axioms(vec![Axiom::Stack(
        StackAxiom::new(Comparator::Geq, d.into(), SymbolicExpr::Max, &pool).unwrap(),
    )]);

    // F ⇒ F holds; F ⇒ ¬F does not.
    assert!(solver.entails_formula_raw(&pool, &formula, &formula).unwrap());
    assert!(!solver.entails_formula_raw(&pool, &formula, &negated).unwrap());
}

#[test]
fn join_is_implied_by_every_input() {
    common::init();
    let fixture = sorted_list_fixture(2);
    let solver = Solver::new(&fixture.program, &fixture.config).unwrap();
    let mut pool = SymbolPool::new();

    let (a, b) = {
        let mut factory = SymbolFactory::new(&mut pool);
        (
            factory.fresh_value(Sort::Data),
            factory.fresh_value(Sort::Data),
        )
    };
    let shared = Axiom::Stack(StackAxiom::new(Comparator::Lt, a.into(), b.into(), &pool).unwrap());
    let only_left =
        Axiom::Stack(StackAxiom::new(Comparator::Lt, SymbolicExpr::Min, a.into(), &pool).unwrap());
    let only_right =
        Axiom::Stack(StackAxiom::new(Comparator::Lt, b.into(), SymbolicExpr::Max, &pool).unwrap());

    let left = Annotation::from_now(Conjunction::from_axioms(vec![
        shared.clone(),
        only_left.clone(),
    ]));
    let right = Annotation::from_now(Conjunction::from_axioms(vec![
        shared.clone(),
        only_right.clone(),
    ]));

    let joined = solver
        .join(&pool, vec![left.clone(), right.clone()])
        .unwrap();

    // The shared fact survives, the one-sided facts cannot.
    assert!(joined
        .now
        .conjuncts
        .iter()
        .any(|c| matches!(c, Conjunct::Axiom(x) if *x == shared)));
    assert!(!joined
        .now
        .conjuncts
        .iter()
        .any(|c| matches!(c, Conjunct::Axiom(x) if *x == only_left)));

    // Soundness: each input entails the join.
    for input in [&left, &right] {
        assert!(solver
            .entails_formula_raw(&pool, &input.now, &joined.now)
            .unwrap());
    }
}

fn cell(pool: &mut SymbolPool) -> (MemoryAxiom, keyflow_logic::SymbolId) {
    let mut factory = SymbolFactory::new(pool);
    let node = factory.fresh_value(Sort::Ptr);
    let flow = factory.fresh_flow();
    let val = factory.fresh_value(Sort::Data);
    let next = factory.fresh_value(Sort::Ptr);
    drop(factory);
    let mem = MemoryAxiom::new(
        node,
        flow,
        vec![("val".to_string(), val), ("next".to_string(), next)],
        pool,
    )
    .unwrap();
    (mem, val)
}

/// An effect that rewires a cell's `next` but never touches `val`.
fn next_write_effect(pool: &mut SymbolPool) -> Effect {
    let (pre, _) = cell(pool);
    let mut post = pre.clone();
    let (fresh_next, fresh_flow) = {
        let mut factory = SymbolFactory::new(pool);
        (factory.fresh_value(Sort::Ptr), factory.fresh_flow())
    };
    post.set_field("next", fresh_next);
    post.flow = fresh_flow;
    Effect {
        pre,
        post,
        context: Conjunction::new(),
    }
}

#[test]
fn stabilization_keeps_values_and_havocs_pointers() {
    common::init();
    let fixture = sorted_list_fixture(2);
    let solver = Solver::new(&fixture.program, &fixture.config).unwrap();
    let mut pool = SymbolPool::new();

    let effect = next_write_effect(&mut pool);
    let (observed, observed_val) = cell(&mut pool);
    let observed_next = observed.field("next").unwrap();

    let pinned = Axiom::Stack(
        StackAxiom::new(Comparator::Lt, observed_val.into(), SymbolicExpr::Max, &pool).unwrap(),
    );
    let annotation = Annotation::from_now(Conjunction::from_axioms(vec![
        Axiom::SharedMemory(observed.clone()),
        pinned.clone(),
    ]));

    let stabilized = solver
        .make_stable(&mut pool, annotation, &[effect])
        .unwrap();

    let weakened = stabilized
        .now
        .shared_memories()
        .next()
        .expect("the cell itself survives stabilization");
    assert_eq!(
        weakened.field("val"),
        Some(observed_val),
        "no effect writes val, so the symbol must be preserved"
    );
    assert_ne!(
        weakened.field("next"),
        Some(observed_next),
        "the next field is destructible and must be havocked"
    );
    // Knowledge about the immutable value symbol survives.
    assert!(stabilized
        .now
        .conjuncts
        .iter()
        .any(|c| matches!(c, Conjunct::Axiom(x) if *x == pinned)));
}

#[test]
fn stabilization_drops_shared_variable_bindings() {
    common::init();
    let fixture = sorted_list_fixture(2);
    let solver = Solver::new(&fixture.program, &fixture.config).unwrap();
    let mut pool = SymbolPool::new();

    let head = fixture
        .program
        .shared_vars()
        .next()
        .map(|(id, _)| id)
        .unwrap();
    let binding = {
        let mut factory = SymbolFactory::new(&mut pool);
        factory.fresh_value(Sort::Ptr)
    };
    let annotation = Annotation::from_now(Conjunction::from_axioms(vec![Axiom::EqualsTo {
        var: head,
        value: binding,
    }]));

    let effect = next_write_effect(&mut pool);
    let stabilized = solver
        .make_stable(&mut pool, annotation, &[effect])
        .unwrap();
    assert!(
        stabilized.now.value_of(head).is_none(),
        "shared-variable bindings are transient"
    );
}

#[test]
fn consolidation_reaches_a_fixed_point_on_equal_effects() {
    common::init();
    let fixture = sorted_list_fixture(2);
    let solver = Solver::new(&fixture.program, &fixture.config).unwrap();
    let mut pool = SymbolPool::new();

    let first = next_write_effect(&mut pool);
    let second = next_write_effect(&mut pool); // alpha-variant of the first

    let mut interference = keyflow_prove::interference::Interference::new();
    let grew = interference
        .consolidate(&solver, &mut pool, vec![first])
        .unwrap();
    assert!(grew);
    assert_eq!(interference.len(), 1);

    let grew = interference
        .consolidate(&solver, &mut pool, vec![second])
        .unwrap();
    assert!(!grew, "an alpha-equal effect must be subsumed");
    assert_eq!(interference.len(), 1);
}
