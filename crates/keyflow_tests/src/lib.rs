//! Test harness for the keyflow workspace.
//!
//! Builds the benchmark programs and flow-domain configurations the
//! end-to-end suites verify: a sorted linked-list set, a Treiber-style
//! stack, a Michael–Scott-style queue, and lock-coupled variants. Each
//! fixture is a complete [`Program`] plus a matching [`SolverConfig`].
//!
//! The programs arrive in simplified form, the shape the verifier
//! expects: conditional loops are unconditional loops with internal
//! breaks, and CAS appears as `atomic { assume(..); update }`.

use keyflow_language::{
    Expr, Function, FunctionKind, OperationKind, OperationSpec, Program, Scope, Stmt, TypeTable,
    VarId,
};
use keyflow_logic::Comparator;
use keyflow_solve::{FlowDomain, Pred, Predicate, SolverConfig, TermPattern};

/// A complete verification input.
pub struct Fixture {
    pub program: Program,
    pub config: SolverConfig,
}

fn field(name: &str) -> TermPattern {
    TermPattern::Field(name.to_string())
}

/// The sorted singly-linked list set: `contains`, `insert`, `delete`
/// with `MIN`/`MAX` sentinels, keys travelling along `next` when greater
/// than the node's value.
pub fn sorted_list_fixture(depth: usize) -> Fixture {
    let mut types = TypeTable::new();
    let node = types.declare("Node", vec![("val".to_string(), TypeTable::DATA)]);
    types.add_field(node, "next", node);

    let mut program = Program::new("sorted-list-set", types);
    let head = program.declare_var("Head", node, true);

    // contains(k)
    {
        let k = program.declare_var("k", TypeTable::DATA, false);
        let cur = program.declare_var("cur", node, false);
        let body = Stmt::seq(vec![
            Stmt::assign(Expr::var(cur), Expr::var(head)),
            Stmt::loop_(Stmt::seq(vec![
                Stmt::Assume(Expr::neq(Expr::var(cur), Expr::Null)),
                Stmt::if_else(
                    Expr::lt(Expr::var_deref(cur, "val"), Expr::var(k)),
                    Stmt::assign(Expr::var(cur), Expr::var_deref(cur, "next")),
                    Stmt::Break,
                ),
            ])),
            Stmt::if_else(
                Expr::eq(Expr::var_deref(cur, "val"), Expr::var(k)),
                Stmt::Return(vec![Expr::Bool(true)]),
                Stmt::Return(vec![Expr::Bool(false)]),
            ),
        ]);
        program.add_function(Function {
            name: "contains".to_string(),
            kind: FunctionKind::Interface,
            params: vec![k],
            returns: vec![],
            spec: Some(OperationSpec {
                kind: OperationKind::Contains,
                key_param: 0,
            }),
            body: Scope::new(vec![cur], body),
        });
    }

    // insert(k)
    {
        let k = program.declare_var("k", TypeTable::DATA, false);
        let l = program.declare_var("l", node, false);
        let r = program.declare_var("r", node, false);
        let n = program.declare_var("n", node, false);
        let body = Stmt::seq(vec![
            Stmt::assign(Expr::var(l), Expr::var(head)),
            Stmt::assign(Expr::var(r), Expr::var_deref(l, "next")),
            traversal_loop(k, l, r),
            Stmt::if_else(
                Expr::eq(Expr::var_deref(r, "val"), Expr::var(k)),
                Stmt::Return(vec![Expr::Bool(false)]),
                Stmt::seq(vec![
                    Stmt::Malloc(n),
                    Stmt::assign(Expr::var_deref(n, "val"), Expr::var(k)),
                    Stmt::assign(Expr::var_deref(n, "next"), Expr::var(r)),
                    Stmt::atomic(Stmt::seq(vec![
                        Stmt::Assume(Expr::eq(Expr::var_deref(l, "next"), Expr::var(r))),
                        Stmt::Assume(Expr::lt(Expr::var_deref(l, "val"), Expr::var(k))),
                        Stmt::Assume(Expr::lt(Expr::var(k), Expr::var_deref(r, "val"))),
                        Stmt::assign(Expr::var_deref(l, "next"), Expr::var(n)),
                    ])),
                    Stmt::Return(vec![Expr::Bool(true)]),
                ]),
            ),
        ]);
        program.add_function(Function {
            name: "insert".to_string(),
            kind: FunctionKind::Interface,
            params: vec![k],
            returns: vec![],
            spec: Some(OperationSpec {
                kind: OperationKind::Insert,
                key_param: 0,
            }),
            body: Scope::new(vec![l, r, n], body),
        });
    }

    // delete(k)
    {
        let k = program.declare_var("k", TypeTable::DATA, false);
        let l = program.declare_var("l", node, false);
        let r = program.declare_var("r", node, false);
        let rn = program.declare_var("rn", node, false);
        let body = Stmt::seq(vec![
            Stmt::assign(Expr::var(l), Expr::var(head)),
            Stmt::assign(Expr::var(r), Expr::var_deref(l, "next")),
            traversal_loop(k, l, r),
            Stmt::if_else(
                Expr::neq(Expr::var_deref(r, "val"), Expr::var(k)),
                Stmt::Return(vec![Expr::Bool(false)]),
                Stmt::seq(vec![
                    Stmt::atomic(Stmt::seq(vec![
                        Stmt::Assume(Expr::eq(Expr::var_deref(l, "next"), Expr::var(r))),
                        Stmt::Assume(Expr::lt(Expr::var_deref(l, "val"), Expr::var(k))),
                        Stmt::Assume(Expr::eq(Expr::var_deref(r, "val"), Expr::var(k))),
                        Stmt::assign(Expr::var(rn), Expr::var_deref(r, "next")),
                        Stmt::Assume(Expr::neq(Expr::var(rn), Expr::Null)),
                        Stmt::Assume(Expr::lt(Expr::var(k), Expr::var_deref(rn, "val"))),
                        Stmt::assign(Expr::var_deref(l, "next"), Expr::var(rn)),
                    ])),
                    Stmt::Return(vec![Expr::Bool(true)]),
                ]),
            ),
        ]);
        program.add_function(Function {
            name: "delete".to_string(),
            kind: FunctionKind::Interface,
            params: vec![k],
            returns: vec![],
            spec: Some(OperationSpec {
                kind: OperationKind::Delete,
                key_param: 0,
            }),
            body: Scope::new(vec![l, r, rn], body),
        });
    }

    let config = list_config(node, head, depth);

    Fixture { program, config }
}

/// The sorted-list flow domain: keys greater than a node's value travel
/// along `next`, a node contains exactly its own value, and the root
/// variable feeds `[MIN, MAX]` into the structure.
fn list_config(
    node: keyflow_language::TypeId,
    head: VarId,
    depth: usize,
) -> SolverConfig {
    SolverConfig {
        variable_invariants: vec![(
            head,
            Predicate::new(
                "head-root",
                Pred::And(vec![
                    Pred::Compare(Comparator::Eq, field("val"), TermPattern::Min),
                    Pred::RangeInFlow(TermPattern::Min, TermPattern::Max),
                ]),
            ),
        )],
        ..SolverConfig::new(
            depth,
            FlowDomain {
                node_type: node,
                decreasing: true,
                outflow: vec![(
                    "next".to_string(),
                    Predicate::new(
                        "outflow-next",
                        Pred::Compare(Comparator::Gt, TermPattern::Key, field("val")),
                    ),
                )],
            },
            Predicate::new(
                "contains",
                Pred::Compare(Comparator::Eq, field("val"), TermPattern::Key),
            ),
            Predicate::trivial("shared-node"),
            Predicate::trivial("local-node"),
        )
    }
}

/// The common `(l, r)` traversal: advance while `r->val < k`.
fn traversal_loop(k: VarId, l: VarId, r: VarId) -> Stmt {
    Stmt::loop_(Stmt::seq(vec![
        Stmt::Assume(Expr::neq(Expr::var(r), Expr::Null)),
        Stmt::if_else(
            Expr::lt(Expr::var_deref(r, "val"), Expr::var(k)),
            Stmt::seq(vec![
                Stmt::assign(Expr::var(l), Expr::var(r)),
                Stmt::assign(Expr::var(r), Expr::var_deref(r, "next")),
            ]),
            Stmt::Break,
        ),
    ]))
}

/// A Treiber-style stack: push/pop through a shared `Top` pointer with
/// CAS retry loops. No flow reasoning (empty outflow), no sequential set
/// specification — the scenario exercises the engine loop, interference,
/// and joins.
pub fn treiber_stack_fixture() -> Fixture {
    let mut types = TypeTable::new();
    let node = types.declare("Node", vec![("val".to_string(), TypeTable::DATA)]);
    types.add_field(node, "next", node);

    let mut program = Program::new("treiber-stack", types);
    let top = program.declare_var("Top", node, true);

    // push(v)
    {
        let v = program.declare_var("v", TypeTable::DATA, false);
        let n = program.declare_var("n", node, false);
        let t = program.declare_var("t", node, false);
        let body = Stmt::seq(vec![
            Stmt::Malloc(n),
            Stmt::assign(Expr::var_deref(n, "val"), Expr::var(v)),
            Stmt::loop_(Stmt::seq(vec![
                Stmt::assign(Expr::var(t), Expr::var(top)),
                Stmt::assign(Expr::var_deref(n, "next"), Expr::var(t)),
                Stmt::atomic(Stmt::seq(vec![
                    Stmt::Assume(Expr::eq(Expr::var(top), Expr::var(t))),
                    Stmt::assign(Expr::var(top), Expr::var(n)),
                ])),
                Stmt::Break,
            ])),
            Stmt::Return(vec![]),
        ]);
        program.add_function(Function {
            name: "push".to_string(),
            kind: FunctionKind::Interface,
            params: vec![v],
            returns: vec![],
            spec: None,
            body: Scope::new(vec![n, t], body),
        });
    }

    // pop()
    {
        let t = program.declare_var("t", node, false);
        let s = program.declare_var("s", node, false);
        let out = program.declare_var("out", TypeTable::DATA, false);
        let body = Stmt::seq(vec![
            Stmt::loop_(Stmt::seq(vec![
                Stmt::assign(Expr::var(t), Expr::var(top)),
                Stmt::if_else(
                    Expr::eq(Expr::var(t), Expr::Null),
                    Stmt::Return(vec![]),
                    Stmt::seq(vec![
                        Stmt::assign(Expr::var(s), Expr::var_deref(t, "next")),
                        Stmt::atomic(Stmt::seq(vec![
                            Stmt::Assume(Expr::eq(Expr::var(top), Expr::var(t))),
                            Stmt::assign(Expr::var(top), Expr::var(s)),
                        ])),
                        Stmt::Break,
                    ]),
                ),
            ])),
            Stmt::assign(Expr::var(out), Expr::var_deref(t, "val")),
            Stmt::Return(vec![]),
        ]);
        program.add_function(Function {
            name: "pop".to_string(),
            kind: FunctionKind::Interface,
            params: vec![],
            returns: vec![],
            spec: None,
            body: Scope::new(vec![t, s, out], body),
        });
    }

    let config = SolverConfig::new(
        1,
        FlowDomain {
            node_type: node,
            decreasing: true,
            outflow: vec![("next".to_string(), Predicate::empty("outflow-none"))],
        },
        Predicate::empty("contains-none"),
        Predicate::trivial("shared-node"),
        Predicate::trivial("local-node"),
    );

    Fixture { program, config }
}

/// A Michael–Scott-style queue: enqueue appends at `Tail` with a heap
/// CAS, dequeue advances `Head`. The outflow forwards every key along
/// `next`; there is no set specification.
pub fn michael_scott_queue_fixture() -> Fixture {
    let mut types = TypeTable::new();
    let node = types.declare("Node", vec![("val".to_string(), TypeTable::DATA)]);
    types.add_field(node, "next", node);

    let mut program = Program::new("michael-scott-queue", types);
    let head = program.declare_var("Head", node, true);
    let tail = program.declare_var("Tail", node, true);

    // enqueue(v)
    {
        let v = program.declare_var("v", TypeTable::DATA, false);
        let n = program.declare_var("n", node, false);
        let t = program.declare_var("t", node, false);
        let s = program.declare_var("s", node, false);
        let body = Stmt::seq(vec![
            Stmt::Malloc(n),
            Stmt::assign(Expr::var_deref(n, "val"), Expr::var(v)),
            Stmt::assign(Expr::var_deref(n, "next"), Expr::Null),
            Stmt::loop_(Stmt::seq(vec![
                Stmt::assign(Expr::var(t), Expr::var(tail)),
                Stmt::assign(Expr::var(s), Expr::var_deref(t, "next")),
                Stmt::if_else(
                    Expr::eq(Expr::var(s), Expr::Null),
                    Stmt::seq(vec![
                        Stmt::atomic(Stmt::seq(vec![
                            Stmt::Assume(Expr::eq(
                                Expr::var_deref(t, "next"),
                                Expr::Null,
                            )),
                            Stmt::assign(Expr::var_deref(t, "next"), Expr::var(n)),
                        ])),
                        Stmt::Break,
                    ]),
                    Stmt::atomic(Stmt::seq(vec![
                        Stmt::Assume(Expr::eq(Expr::var(tail), Expr::var(t))),
                        Stmt::assign(Expr::var(tail), Expr::var(s)),
                    ])),
                ),
            ])),
            Stmt::atomic(Stmt::seq(vec![
                Stmt::Assume(Expr::eq(Expr::var(tail), Expr::var(t))),
                Stmt::assign(Expr::var(tail), Expr::var(n)),
            ])),
            Stmt::Return(vec![]),
        ]);
        program.add_function(Function {
            name: "enqueue".to_string(),
            kind: FunctionKind::Interface,
            params: vec![v],
            returns: vec![],
            spec: None,
            body: Scope::new(vec![n, t, s], body),
        });
    }

    // dequeue()
    {
        let h = program.declare_var("h", node, false);
        let s = program.declare_var("s", node, false);
        let out = program.declare_var("out", TypeTable::DATA, false);
        let body = Stmt::seq(vec![
            Stmt::loop_(Stmt::seq(vec![
                Stmt::assign(Expr::var(h), Expr::var(head)),
                Stmt::assign(Expr::var(s), Expr::var_deref(h, "next")),
                Stmt::if_else(
                    Expr::eq(Expr::var(s), Expr::Null),
                    Stmt::Return(vec![]),
                    Stmt::seq(vec![
                        Stmt::assign(Expr::var(out), Expr::var_deref(s, "val")),
                        Stmt::atomic(Stmt::seq(vec![
                            Stmt::Assume(Expr::eq(Expr::var(head), Expr::var(h))),
                            Stmt::assign(Expr::var(head), Expr::var(s)),
                        ])),
                        Stmt::Break,
                    ]),
                ),
            ])),
            Stmt::Return(vec![]),
        ]);
        program.add_function(Function {
            name: "dequeue".to_string(),
            kind: FunctionKind::Interface,
            params: vec![],
            returns: vec![],
            spec: None,
            body: Scope::new(vec![h, s, out], body),
        });
    }

    let config = SolverConfig {
        variable_invariants: vec![
            (head, Predicate::trivial("head-cell")),
            (tail, Predicate::trivial("tail-cell")),
        ],
        ..SolverConfig::new(
            2,
            FlowDomain {
                node_type: node,
                decreasing: true,
                outflow: vec![("next".to_string(), Predicate::trivial("outflow-all"))],
            },
            Predicate::empty("contains-none"),
            Predicate::trivial("shared-node"),
            Predicate::trivial("local-node"),
        )
    };

    Fixture { program, config }
}

/// The lock-coupling set: the sorted list with per-node atomic sections
/// around every traversal step (hand-over-hand locking rendered as
/// atomicity).
pub fn lock_coupling_fixture() -> Fixture {
    let mut fixture = sorted_list_fixture(2);
    let program = &mut fixture.program;

    // Rebuild the traversal loops with each step inside an atomic block.
    for function in &mut program.functions {
        wrap_traversals(&mut function.body.body);
    }
    fixture
}

fn wrap_traversals(stmt: &mut Stmt) {
    match stmt {
        Stmt::Seq(stmts) => stmts.iter_mut().for_each(wrap_traversals),
        Stmt::Loop(scope) => {
            let body = std::mem::replace(&mut scope.body, Stmt::Skip);
            scope.body = Stmt::atomic(body);
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            wrap_traversals(&mut then_branch.body);
            wrap_traversals(&mut else_branch.body);
        }
        Stmt::Scope(scope) | Stmt::Atomic(scope) => wrap_traversals(&mut scope.body),
        _ => {}
    }
}

/// The Vechev-style DCAS set: a sorted list whose updates are
/// double-compare-and-swap steps. Insert swings `l->next` after
/// validating the edge and both adjacent values in one atomic section;
/// delete unlinks `r` with a DCAS over the word pair
/// `(l->next, r->next)`. Runs under the sorted-list flow domain with
/// footprint depth 1: the update's whole footprint is the root and its
/// two successors, and nothing beyond it changes flow.
pub fn dcas_set_fixture() -> Fixture {
    let mut types = TypeTable::new();
    let node = types.declare("Node", vec![("val".to_string(), TypeTable::DATA)]);
    types.add_field(node, "next", node);

    let mut program = Program::new("dcas-set", types);
    let head = program.declare_var("Head", node, true);

    // contains(k): plain traversal; linearizes at the moment the
    // deciding edge was read.
    {
        let k = program.declare_var("k", TypeTable::DATA, false);
        let cur = program.declare_var("cur", node, false);
        let body = Stmt::seq(vec![
            Stmt::assign(Expr::var(cur), Expr::var(head)),
            Stmt::loop_(Stmt::seq(vec![
                Stmt::Assume(Expr::neq(Expr::var(cur), Expr::Null)),
                Stmt::if_else(
                    Expr::lt(Expr::var_deref(cur, "val"), Expr::var(k)),
                    Stmt::assign(Expr::var(cur), Expr::var_deref(cur, "next")),
                    Stmt::Break,
                ),
            ])),
            Stmt::if_else(
                Expr::eq(Expr::var_deref(cur, "val"), Expr::var(k)),
                Stmt::Return(vec![Expr::Bool(true)]),
                Stmt::Return(vec![Expr::Bool(false)]),
            ),
        ]);
        program.add_function(Function {
            name: "contains".to_string(),
            kind: FunctionKind::Interface,
            params: vec![k],
            returns: vec![],
            spec: Some(OperationSpec {
                kind: OperationKind::Contains,
                key_param: 0,
            }),
            body: Scope::new(vec![cur], body),
        });
    }

    // insert(k): DCAS comparing the edge and the neighbour values, then
    // swinging `l->next` to the initialized node.
    {
        let k = program.declare_var("k", TypeTable::DATA, false);
        let l = program.declare_var("l", node, false);
        let r = program.declare_var("r", node, false);
        let n = program.declare_var("n", node, false);
        let body = Stmt::seq(vec![
            Stmt::assign(Expr::var(l), Expr::var(head)),
            Stmt::assign(Expr::var(r), Expr::var_deref(l, "next")),
            traversal_loop(k, l, r),
            Stmt::if_else(
                Expr::eq(Expr::var_deref(r, "val"), Expr::var(k)),
                Stmt::Return(vec![Expr::Bool(false)]),
                Stmt::seq(vec![
                    Stmt::Malloc(n),
                    Stmt::assign(Expr::var_deref(n, "val"), Expr::var(k)),
                    Stmt::assign(Expr::var_deref(n, "next"), Expr::var(r)),
                    Stmt::atomic(Stmt::seq(vec![
                        Stmt::Assume(Expr::eq(Expr::var_deref(l, "next"), Expr::var(r))),
                        Stmt::Assume(Expr::lt(Expr::var_deref(l, "val"), Expr::var(k))),
                        Stmt::Assume(Expr::lt(Expr::var(k), Expr::var_deref(r, "val"))),
                        Stmt::assign(Expr::var_deref(l, "next"), Expr::var(n)),
                    ])),
                    Stmt::Return(vec![Expr::Bool(true)]),
                ]),
            ),
        ]);
        program.add_function(Function {
            name: "insert".to_string(),
            kind: FunctionKind::Interface,
            params: vec![k],
            returns: vec![],
            spec: Some(OperationSpec {
                kind: OperationKind::Insert,
                key_param: 0,
            }),
            body: Scope::new(vec![l, r, n], body),
        });
    }

    // delete(k): DCAS over the word pair `(l->next, r->next)`; both
    // edges are compared in the same atomic step that unlinks `r`.
    {
        let k = program.declare_var("k", TypeTable::DATA, false);
        let l = program.declare_var("l", node, false);
        let r = program.declare_var("r", node, false);
        let rn = program.declare_var("rn", node, false);
        let body = Stmt::seq(vec![
            Stmt::assign(Expr::var(l), Expr::var(head)),
            Stmt::assign(Expr::var(r), Expr::var_deref(l, "next")),
            traversal_loop(k, l, r),
            Stmt::if_else(
                Expr::neq(Expr::var_deref(r, "val"), Expr::var(k)),
                Stmt::Return(vec![Expr::Bool(false)]),
                Stmt::seq(vec![
                    Stmt::assign(Expr::var(rn), Expr::var_deref(r, "next")),
                    Stmt::atomic(Stmt::seq(vec![
                        Stmt::Assume(Expr::eq(Expr::var_deref(l, "next"), Expr::var(r))),
                        Stmt::Assume(Expr::eq(Expr::var_deref(r, "next"), Expr::var(rn))),
                        Stmt::Assume(Expr::lt(Expr::var_deref(l, "val"), Expr::var(k))),
                        Stmt::Assume(Expr::eq(Expr::var_deref(r, "val"), Expr::var(k))),
                        Stmt::Assume(Expr::neq(Expr::var(rn), Expr::Null)),
                        Stmt::Assume(Expr::lt(Expr::var(k), Expr::var_deref(rn, "val"))),
                        Stmt::assign(Expr::var_deref(l, "next"), Expr::var(rn)),
                    ])),
                    Stmt::Return(vec![Expr::Bool(true)]),
                ]),
            ),
        ]);
        program.add_function(Function {
            name: "delete".to_string(),
            kind: FunctionKind::Interface,
            params: vec![k],
            returns: vec![],
            spec: Some(OperationSpec {
                kind: OperationKind::Delete,
                key_param: 0,
            }),
            body: Scope::new(vec![l, r, rn], body),
        });
    }

    let config = list_config(node, head, 1);

    Fixture { program, config }
}
