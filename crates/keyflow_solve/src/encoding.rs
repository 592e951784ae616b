//! The two-state SMT encoding.
//!
//! Every heap-dependent term is tagged with an [`Epoch`]: `Now` is the
//! state before the atomic step under consideration, `Next` the state
//! after it. The two epochs share quantifiers and value symbols but use
//! disjoint function symbols for the heap, the per-node flow, ownership,
//! and the specification ghosts. Frame conditions equate the two epochs
//! outside an update's footprint.
//!
//! Sorts: pointers and data values map to Z3 integers, booleans to Z3
//! booleans. `NULL`, `MIN`, and `MAX` are reserved constants; `MIN < MAX`
//! and `NULL` sits outside the data range.
//!
//! First-order symbols map to constants. Second-order (flow) symbols map
//! to unary predicates with range bounds (`∀x. x < MIN ∨ x > MAX →
//! ¬F(x)`); the bounds are produced lazily into a pending-axiom queue the
//! implication checker drains (see [`Encoding::take_pending`]).

use std::cell::RefCell;
use std::collections::HashSet;

use z3::ast::{forall_const, Ast, Bool, Dynamic, Int};
use z3::{Context, FuncDecl};

use keyflow_language::{BinaryOp, Expr, OperationKind, Program, Sort, VarId};
use keyflow_logic::{
    Axiom, Comparator, Conjunct, Conjunction, Implication, MemoryAxiom, StackAxiom, SymbolicExpr,
    SymbolId, SymbolPool,
};

use crate::config::{Pred, Predicate, SolverConfig, TermPattern};
use crate::error::{EngineError, EngineResult};

/// The state tag of a two-state assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Epoch {
    Now,
    Next,
}

impl Epoch {
    pub const BOTH: [Epoch; 2] = [Epoch::Now, Epoch::Next];

    fn tag(self) -> &'static str {
        match self {
            Epoch::Now => "now",
            Epoch::Next => "next",
        }
    }
}

/// The encoding layer over one Z3 context.
pub struct Encoding<'ctx, 'a> {
    ctx: &'ctx Context,
    program: &'a Program,
    config: &'a SolverConfig,
    pending: RefCell<Vec<Bool<'ctx>>>,
    bounded_flows: RefCell<HashSet<SymbolId>>,
}

impl<'ctx, 'a> Encoding<'ctx, 'a> {
    pub fn new(ctx: &'ctx Context, program: &'a Program, config: &'a SolverConfig) -> Self {
        let encoding = Encoding {
            ctx,
            program,
            config,
            pending: RefCell::new(Vec::new()),
            bounded_flows: RefCell::new(HashSet::new()),
        };
        // Background facts about the reserved constants.
        let min = encoding.min();
        let max = encoding.max();
        let null = encoding.null();
        encoding.pending.borrow_mut().push(min.lt(&max));
        encoding.pending.borrow_mut().push(null.lt(&min));
        encoding
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    pub fn config(&self) -> &'a SolverConfig {
        self.config
    }

    pub fn program(&self) -> &'a Program {
        self.program
    }

    /// Drains the axioms produced as a side effect of encoding (flow
    /// range bounds, background constants). The caller must assert them.
    pub fn take_pending(&self) -> Vec<Bool<'ctx>> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    /// Universal quantification over one integer variable.
    fn forall(&self, bound: &Int<'ctx>, body: &Bool<'ctx>) -> Bool<'ctx> {
        forall_one(self, bound, body)
    }

    /// Applies a boolean-ranged function to integer arguments.
    fn apply_bool(&self, decl: &FuncDecl<'ctx>, args: &[&Int<'ctx>]) -> Bool<'ctx> {
        let refs: Vec<&dyn Ast<'ctx>> = args.iter().map(|a| *a as &dyn Ast<'ctx>).collect();
        decl.apply(&refs)
            .as_bool()
            .expect("boolean-ranged function")
    }

    //
    // Reserved constants and sorts
    //

    fn z3_sort(&self, sort: Sort) -> EngineResult<z3::Sort<'ctx>> {
        match sort {
            Sort::Bool => Ok(z3::Sort::bool(self.ctx)),
            Sort::Data | Sort::Ptr => Ok(z3::Sort::int(self.ctx)),
            Sort::Void => Err(EngineError::internal("cannot encode the void sort")),
        }
    }

    pub fn null(&self) -> Int<'ctx> {
        Int::new_const(self.ctx, "$null")
    }

    pub fn min(&self) -> Int<'ctx> {
        Int::new_const(self.ctx, "$MIN")
    }

    pub fn max(&self) -> Int<'ctx> {
        Int::new_const(self.ctx, "$MAX")
    }

    pub fn bool_val(&self, value: bool) -> Bool<'ctx> {
        Bool::from_bool(self.ctx, value)
    }

    /// A quantification variable.
    pub fn qv(&self, name: &str) -> Int<'ctx> {
        Int::new_const(self.ctx, format!("$qv-{}", name))
    }

    //
    // Symbols and variables
    //

    /// The canonical constant of a first-order symbol.
    pub fn symbol(&self, id: SymbolId, pool: &SymbolPool) -> EngineResult<Dynamic<'ctx>> {
        let sort = pool.sort(id).ok_or_else(|| {
            EngineError::internal(format!("flow symbol {} used as a value", pool.name(id)))
        })?;
        let name = format!("$sym-{}", id.index());
        Ok(match sort {
            Sort::Bool => Dynamic::from_ast(&Bool::new_const(self.ctx, name)),
            _ => Dynamic::from_ast(&Int::new_const(self.ctx, name)),
        })
    }

    fn symbol_int(&self, id: SymbolId, pool: &SymbolPool) -> EngineResult<Int<'ctx>> {
        self.symbol(id, pool)?
            .as_int()
            .ok_or_else(|| EngineError::internal("expected an integer-sorted symbol"))
    }

    /// Membership of `key` in the set denoted by a second-order symbol.
    ///
    /// The first use of a flow symbol queues its range bounds.
    pub fn flow_member(&self, flow: SymbolId, key: &Int<'ctx>) -> Bool<'ctx> {
        let decl = FuncDecl::new(
            self.ctx,
            format!("$flowsym-{}", flow.index()),
            &[&z3::Sort::int(self.ctx)],
            &z3::Sort::bool(self.ctx),
        );
        if self.bounded_flows.borrow_mut().insert(flow) {
            let x = self.qv("flow-bound");
            let outside = Bool::or(self.ctx, &[&x.lt(&self.min()), &x.gt(&self.max())]);
            let member = self.apply_bool(&decl, &[&x]);
            let bound = self.forall(&x, &outside.implies(&member.not()));
            self.pending.borrow_mut().push(bound);
        }
        self.apply_bool(&decl, &[key])
    }

    /// The canonical constant of a program variable.
    ///
    /// Variables are not epoch-tagged: a single atomic heap step never
    /// changes the local stack, and shared variables are re-read anyway.
    pub fn variable(&self, var: VarId) -> EngineResult<Dynamic<'ctx>> {
        let decl = self.program.var(var);
        let name = format!("$var-{}-{}", var.index(), decl.name);
        Ok(match self.program.types.sort(decl.ty) {
            Sort::Bool => Dynamic::from_ast(&Bool::new_const(self.ctx, name)),
            Sort::Data | Sort::Ptr => Dynamic::from_ast(&Int::new_const(self.ctx, name)),
            Sort::Void => return Err(EngineError::internal("void-sorted variable")),
        })
    }

    //
    // Heap, flow, ownership, ghosts
    //

    fn field_sort(&self, field: &str) -> EngineResult<Sort> {
        let node_type = self.program.types.get(self.config.flow_domain.node_type);
        let ty = node_type.field(field).ok_or_else(|| {
            EngineError::config(format!(
                "node type '{}' has no field '{}'",
                node_type.name, field
            ))
        })?;
        Ok(self.program.types.sort(ty))
    }

    fn heap_decl(&self, field: &str, epoch: Epoch) -> EngineResult<FuncDecl<'ctx>> {
        let range = self.z3_sort(self.field_sort(field)?)?;
        Ok(FuncDecl::new(
            self.ctx,
            format!("$heap-{}@{}", field, epoch.tag()),
            &[&z3::Sort::int(self.ctx)],
            &range,
        ))
    }

    /// Field projection `node->field` in the given epoch.
    pub fn heap(&self, node: &Int<'ctx>, field: &str, epoch: Epoch) -> EngineResult<Dynamic<'ctx>> {
        Ok(self
            .heap_decl(field, epoch)?
            .apply(&[node as &dyn Ast<'ctx>]))
    }

    /// `node->field == value` in the given epoch.
    pub fn heap_is(
        &self,
        node: &Int<'ctx>,
        field: &str,
        value: &Dynamic<'ctx>,
        epoch: Epoch,
    ) -> EngineResult<Bool<'ctx>> {
        Ok(self.heap(node, field, epoch)?._eq(value))
    }

    /// Membership of `key` in the flow arriving at `node` in the epoch.
    pub fn graph_flow(&self, node: &Int<'ctx>, key: &Int<'ctx>, epoch: Epoch) -> Bool<'ctx> {
        let decl = FuncDecl::new(
            self.ctx,
            format!("$flow@{}", epoch.tag()),
            &[&z3::Sort::int(self.ctx), &z3::Sort::int(self.ctx)],
            &z3::Sort::bool(self.ctx),
        );
        self.apply_bool(&decl, &[node, key])
    }

    /// Thread ownership of a cell in the epoch.
    pub fn ownership(&self, node: &Int<'ctx>, epoch: Epoch) -> Bool<'ctx> {
        let decl = FuncDecl::new(
            self.ctx,
            format!("$owned@{}", epoch.tag()),
            &[&z3::Sort::int(self.ctx)],
            &z3::Sort::bool(self.ctx),
        );
        self.apply_bool(&decl, &[node])
    }

    /// The outstanding-obligation ghost for an operation kind.
    pub fn obligation(&self, kind: OperationKind, key: &Int<'ctx>, epoch: Epoch) -> Bool<'ctx> {
        let decl = FuncDecl::new(
            self.ctx,
            format!("$obl-{}@{}", kind, epoch.tag()),
            &[&z3::Sort::int(self.ctx)],
            &z3::Sort::bool(self.ctx),
        );
        self.apply_bool(&decl, &[key])
    }

    /// The fulfilled-obligation ghost for an operation kind and return value.
    pub fn fulfillment(
        &self,
        kind: OperationKind,
        key: &Int<'ctx>,
        return_value: bool,
        epoch: Epoch,
    ) -> Bool<'ctx> {
        let decl = FuncDecl::new(
            self.ctx,
            format!("$ful-{}-{}@{}", kind, return_value, epoch.tag()),
            &[&z3::Sort::int(self.ctx)],
            &z3::Sort::bool(self.ctx),
        );
        self.apply_bool(&decl, &[key])
    }

    /// `key ∈ keyset(node)`: the key reaches the node and is not forwarded
    /// along any pointer field.
    pub fn keyset_contains(
        &self,
        node: &Int<'ctx>,
        key: &Int<'ctx>,
        epoch: Epoch,
    ) -> EngineResult<Bool<'ctx>> {
        let inflow = self.graph_flow(node, key, epoch);
        let mut kept = vec![inflow];
        for (field, outflow) in self.config.pointer_fields() {
            let _ = field;
            let sent = self.predicate(outflow, node, Some(key), epoch)?;
            kept.push(sent.not());
        }
        let refs: Vec<&Bool> = kept.iter().collect();
        Ok(Bool::and(self.ctx, &refs))
    }

    //
    // Templates
    //

    fn term_pattern(
        &self,
        pattern: &TermPattern,
        node: &Int<'ctx>,
        key: Option<&Int<'ctx>>,
        epoch: Epoch,
    ) -> EngineResult<Dynamic<'ctx>> {
        Ok(match pattern {
            TermPattern::Node => Dynamic::from_ast(node),
            TermPattern::Key => {
                let key = key.ok_or_else(|| {
                    EngineError::config("template uses the key hole in a one-hole position")
                })?;
                Dynamic::from_ast(key)
            }
            TermPattern::Field(field) => self.heap(node, field, epoch)?,
            TermPattern::Min => Dynamic::from_ast(&self.min()),
            TermPattern::Max => Dynamic::from_ast(&self.max()),
            TermPattern::Null => Dynamic::from_ast(&self.null()),
            TermPattern::True => Dynamic::from_ast(&self.bool_val(true)),
            TermPattern::False => Dynamic::from_ast(&self.bool_val(false)),
        })
    }

    fn pred(
        &self,
        pred: &Pred,
        node: &Int<'ctx>,
        key: Option<&Int<'ctx>>,
        epoch: Epoch,
    ) -> EngineResult<Bool<'ctx>> {
        Ok(match pred {
            Pred::True => self.bool_val(true),
            Pred::False => self.bool_val(false),
            Pred::Compare(op, lhs, rhs) => {
                let l = self.term_pattern(lhs, node, key, epoch)?;
                let r = self.term_pattern(rhs, node, key, epoch)?;
                self.compare(*op, &l, &r)?
            }
            Pred::And(parts) => {
                let encoded: Vec<Bool> = parts
                    .iter()
                    .map(|p| self.pred(p, node, key, epoch))
                    .collect::<EngineResult<_>>()?;
                let refs: Vec<&Bool> = encoded.iter().collect();
                Bool::and(self.ctx, &refs)
            }
            Pred::Or(parts) => {
                let encoded: Vec<Bool> = parts
                    .iter()
                    .map(|p| self.pred(p, node, key, epoch))
                    .collect::<EngineResult<_>>()?;
                let refs: Vec<&Bool> = encoded.iter().collect();
                Bool::or(self.ctx, &refs)
            }
            Pred::Not(inner) => self.pred(inner, node, key, epoch)?.not(),
            Pred::Implies(premise, conclusion) => {
                let p = self.pred(premise, node, key, epoch)?;
                let q = self.pred(conclusion, node, key, epoch)?;
                p.implies(&q)
            }
            Pred::KeyInFlow => {
                let key = key.ok_or_else(|| {
                    EngineError::config("template uses the key hole in a one-hole position")
                })?;
                self.graph_flow(node, key, epoch)
            }
            Pred::TermInFlow(term) => {
                let value = self
                    .term_pattern(term, node, key, epoch)?
                    .as_int()
                    .ok_or_else(|| EngineError::config("flow membership of a non-data term"))?;
                self.graph_flow(node, &value, epoch)
            }
            Pred::RangeInFlow(lo, hi) => {
                let lo = self
                    .term_pattern(lo, node, key, epoch)?
                    .as_int()
                    .ok_or_else(|| EngineError::config("flow range bound of a non-data term"))?;
                let hi = self
                    .term_pattern(hi, node, key, epoch)?
                    .as_int()
                    .ok_or_else(|| EngineError::config("flow range bound of a non-data term"))?;
                let k = self.qv("range");
                let in_range = Bool::and(self.ctx, &[&lo.le(&k), &k.le(&hi)]);
                self.forall(&k, &in_range.implies(&self.graph_flow(node, &k, epoch)))
            }
            Pred::HasFlow => {
                let k = self.qv("hasflow");
                let none = self.forall(&k, &self.graph_flow(node, &k, epoch).not());
                none.not()
            }
            Pred::NoFlow => {
                let k = self.qv("noflow");
                self.forall(&k, &self.graph_flow(node, &k, epoch).not())
            }
        })
    }

    /// Instantiates a predicate template at the SMT level.
    pub fn predicate(
        &self,
        predicate: &Predicate,
        node: &Int<'ctx>,
        key: Option<&Int<'ctx>>,
        epoch: Epoch,
    ) -> EngineResult<Bool<'ctx>> {
        self.pred(&predicate.body, node, key, epoch)
    }

    /// Instantiates the shared-node invariant at a node.
    pub fn invariant(
        &self,
        node: &Int<'ctx>,
        epoch: Epoch,
    ) -> EngineResult<Bool<'ctx>> {
        // The invariant only constrains allocated cells; NULL is vacuous.
        let applies = node._eq(&self.null()).not();
        let body = self.predicate(&self.config.shared_node_invariant, node, None, epoch)?;
        Ok(applies.implies(&body))
    }

    //
    // Program expressions
    //

    fn compare(
        &self,
        op: Comparator,
        lhs: &Dynamic<'ctx>,
        rhs: &Dynamic<'ctx>,
    ) -> EngineResult<Bool<'ctx>> {
        let ordered = |f: fn(&Int<'ctx>, &Int<'ctx>) -> Bool<'ctx>| -> EngineResult<Bool<'ctx>> {
            match (lhs.as_int(), rhs.as_int()) {
                (Some(l), Some(r)) => Ok(f(&l, &r)),
                _ => Err(EngineError::internal("ordered comparison of non-integers")),
            }
        };
        Ok(match op {
            Comparator::Eq => lhs._eq(rhs),
            Comparator::Neq => lhs._eq(rhs).not(),
            Comparator::Leq => ordered(|l, r| l.le(r))?,
            Comparator::Lt => ordered(|l, r| l.lt(r))?,
            Comparator::Geq => ordered(|l, r| l.ge(r))?,
            Comparator::Gt => ordered(|l, r| l.gt(r))?,
        })
    }

    /// Structural translation of a program expression in an epoch.
    pub fn expr(&self, expr: &Expr, epoch: Epoch) -> EngineResult<Dynamic<'ctx>> {
        Ok(match expr {
            Expr::Bool(b) => Dynamic::from_ast(&self.bool_val(*b)),
            Expr::Null => Dynamic::from_ast(&self.null()),
            Expr::Min => Dynamic::from_ast(&self.min()),
            Expr::Max => Dynamic::from_ast(&self.max()),
            Expr::Var(v) => self.variable(*v)?,
            Expr::Not(inner) => {
                let encoded = self.expr(inner, epoch)?.as_bool().ok_or_else(|| {
                    EngineError::internal("negation of a non-boolean expression")
                })?;
                Dynamic::from_ast(&encoded.not())
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs, epoch)?;
                let r = self.expr(rhs, epoch)?;
                let encoded = match op {
                    BinaryOp::Eq => self.compare(Comparator::Eq, &l, &r)?,
                    BinaryOp::Neq => self.compare(Comparator::Neq, &l, &r)?,
                    BinaryOp::Leq => self.compare(Comparator::Leq, &l, &r)?,
                    BinaryOp::Lt => self.compare(Comparator::Lt, &l, &r)?,
                    BinaryOp::Geq => self.compare(Comparator::Geq, &l, &r)?,
                    BinaryOp::Gt => self.compare(Comparator::Gt, &l, &r)?,
                    BinaryOp::And | BinaryOp::Or => {
                        let lb = l.as_bool().ok_or_else(|| {
                            EngineError::internal("connective over non-boolean operand")
                        })?;
                        let rb = r.as_bool().ok_or_else(|| {
                            EngineError::internal("connective over non-boolean operand")
                        })?;
                        if *op == BinaryOp::And {
                            Bool::and(self.ctx, &[&lb, &rb])
                        } else {
                            Bool::or(self.ctx, &[&lb, &rb])
                        }
                    }
                };
                Dynamic::from_ast(&encoded)
            }
            Expr::Deref { expr, field } => {
                let node = self.expr(expr, epoch)?.as_int().ok_or_else(|| {
                    EngineError::internal("dereference of a non-pointer expression")
                })?;
                self.heap(&node, field, epoch)?
            }
        })
    }

    //
    // Logic formulas
    //

    pub fn sym_expr(
        &self,
        expr: &SymbolicExpr,
        pool: &SymbolPool,
    ) -> EngineResult<Dynamic<'ctx>> {
        Ok(match expr {
            SymbolicExpr::Symbol(id) => self.symbol(*id, pool)?,
            SymbolicExpr::True => Dynamic::from_ast(&self.bool_val(true)),
            SymbolicExpr::False => Dynamic::from_ast(&self.bool_val(false)),
            SymbolicExpr::Null => Dynamic::from_ast(&self.null()),
            SymbolicExpr::Min => Dynamic::from_ast(&self.min()),
            SymbolicExpr::Max => Dynamic::from_ast(&self.max()),
        })
    }

    /// Encodes one memory axiom in an epoch: field projections equal the
    /// field symbols, the graph flow at the node coincides with the flow
    /// symbol, and ownership reflects locality.
    pub fn memory(
        &self,
        mem: &MemoryAxiom,
        local: bool,
        epoch: Epoch,
        pool: &SymbolPool,
    ) -> EngineResult<Bool<'ctx>> {
        let node = self.symbol_int(mem.node, pool)?;
        let mut parts: Vec<Bool> = Vec::new();

        for (field, value) in mem.fields() {
            let value = self.symbol(*value, pool)?;
            parts.push(self.heap_is(&node, field, &value, epoch)?);
        }

        let k = self.qv("mem-flow");
        let linked = self
            .graph_flow(&node, &k, epoch)
            .iff(&self.flow_member(mem.flow, &k));
        parts.push(self.forall(&k, &linked));

        let owned = self.ownership(&node, epoch);
        parts.push(if local { owned } else { owned.not() });
        parts.push(node._eq(&self.null()).not());

        let refs: Vec<&Bool> = parts.iter().collect();
        Ok(Bool::and(self.ctx, &refs))
    }

    pub fn stack_axiom(&self, stack: &StackAxiom, pool: &SymbolPool) -> EngineResult<Bool<'ctx>> {
        let lhs = self.sym_expr(&stack.lhs, pool)?;
        let rhs = self.sym_expr(&stack.rhs, pool)?;
        self.compare(stack.op, &lhs, &rhs)
    }

    /// Encodes one axiom in an epoch.
    pub fn axiom(&self, axiom: &Axiom, epoch: Epoch, pool: &SymbolPool) -> EngineResult<Bool<'ctx>> {
        Ok(match axiom {
            Axiom::EqualsTo { var, value } => {
                let var = self.variable(*var)?;
                let value = self.symbol(*value, pool)?;
                var._eq(&value)
            }
            Axiom::SharedMemory(mem) => self.memory(mem, false, epoch, pool)?,
            Axiom::LocalMemory(mem) => self.memory(mem, true, epoch, pool)?,
            Axiom::Stack(stack) => self.stack_axiom(stack, pool)?,
            Axiom::InflowEmpty { flow, is_empty } => {
                let k = self.qv("inflow-empty");
                let empty = self.forall(&k, &self.flow_member(*flow, &k).not());
                if *is_empty {
                    empty
                } else {
                    empty.not()
                }
            }
            Axiom::InflowHasValue { flow, value } => {
                let value = self
                    .sym_expr(value, pool)?
                    .as_int()
                    .ok_or_else(|| EngineError::internal("flow member of non-data sort"))?;
                self.flow_member(*flow, &value)
            }
            Axiom::InflowHasRange { flow, low, high } => {
                let low = self
                    .sym_expr(low, pool)?
                    .as_int()
                    .ok_or_else(|| EngineError::internal("flow bound of non-data sort"))?;
                let high = self
                    .sym_expr(high, pool)?
                    .as_int()
                    .ok_or_else(|| EngineError::internal("flow bound of non-data sort"))?;
                let k = self.qv("inflow-range");
                let in_range = Bool::and(self.ctx, &[&low.le(&k), &k.le(&high)]);
                self.forall(&k, &in_range.implies(&self.flow_member(*flow, &k)))
            }
            Axiom::Obligation { kind, key } => {
                let key = self.symbol_int(*key, pool)?;
                self.obligation(*kind, &key, epoch)
            }
            Axiom::Fulfillment {
                kind,
                key,
                return_value,
            } => {
                let key = self.symbol_int(*key, pool)?;
                self.fulfillment(*kind, &key, *return_value, epoch)
            }
        })
    }

    /// Encodes a separating conjunction in an epoch, including the
    /// separation side conditions: distinct memory axioms denote distinct
    /// non-null addresses.
    pub fn conjunction(
        &self,
        conjunction: &Conjunction,
        epoch: Epoch,
        pool: &SymbolPool,
    ) -> EngineResult<Bool<'ctx>> {
        let mut parts: Vec<Bool> = Vec::new();
        for conjunct in &conjunction.conjuncts {
            match conjunct {
                Conjunct::Axiom(axiom) => parts.push(self.axiom(axiom, epoch, pool)?),
                Conjunct::Implication(Implication {
                    premise,
                    conclusion,
                }) => {
                    let encode_all = |axioms: &[Axiom]| -> EngineResult<Bool<'ctx>> {
                        let encoded: Vec<Bool> = axioms
                            .iter()
                            .map(|a| self.axiom(a, epoch, pool))
                            .collect::<EngineResult<_>>()?;
                        let refs: Vec<&Bool> = encoded.iter().collect();
                        Ok(Bool::and(self.ctx, &refs))
                    };
                    parts.push(encode_all(premise)?.implies(&encode_all(conclusion)?));
                }
            }
        }
        parts.extend(self.separation(conjunction, epoch, pool)?);
        let refs: Vec<&Bool> = parts.iter().collect();
        Ok(Bool::and(self.ctx, &refs))
    }

    /// The separation side conditions of a conjunction.
    pub fn separation(
        &self,
        conjunction: &Conjunction,
        epoch: Epoch,
        pool: &SymbolPool,
    ) -> EngineResult<Vec<Bool<'ctx>>> {
        let memories: Vec<&MemoryAxiom> = conjunction.memories().collect();
        let mut parts = Vec::new();
        for (i, first) in memories.iter().enumerate() {
            for second in &memories[i + 1..] {
                let a = self.symbol_int(first.node, pool)?;
                let b = self.symbol_int(second.node, pool)?;
                parts.push(a._eq(&b).not());
                if self.config.unique_inflow {
                    let k = self.qv("keyset-disjoint");
                    let both = Bool::and(
                        self.ctx,
                        &[
                            &self.keyset_contains(&a, &k, epoch)?,
                            &self.keyset_contains(&b, &k, epoch)?,
                        ],
                    );
                    parts.push(self.forall(&k, &both.not()));
                }
            }
        }
        Ok(parts)
    }

    //
    // Frame conditions
    //

    /// `Now`/`Next` agreement of every field of a node, minus exceptions.
    pub fn maintains_heap(
        &self,
        node: &Int<'ctx>,
        except: &[&str],
    ) -> EngineResult<Bool<'ctx>> {
        let node_type = self.program.types.get(self.config.flow_domain.node_type);
        let mut parts: Vec<Bool> = Vec::new();
        for (field, _) in &node_type.fields {
            if except.contains(&field.as_str()) {
                continue;
            }
            let now = self.heap(node, field, Epoch::Now)?;
            let next = self.heap(node, field, Epoch::Next)?;
            parts.push(now._eq(&next));
        }
        let refs: Vec<&Bool> = parts.iter().collect();
        Ok(Bool::and(self.ctx, &refs))
    }

    /// `Now`/`Next` agreement of the flow at a node for one key.
    pub fn maintains_flow_at(&self, node: &Int<'ctx>, key: &Int<'ctx>) -> Bool<'ctx> {
        self.graph_flow(node, key, Epoch::Now)
            .iff(&self.graph_flow(node, key, Epoch::Next))
    }

    /// `Now`/`Next` agreement of the whole flow at a node.
    pub fn maintains_flow(&self, node: &Int<'ctx>) -> Bool<'ctx> {
        let k = self.qv("frame-flow");
        self.forall(&k, &self.maintains_flow_at(node, &k))
    }

    /// `Now`/`Next` agreement of ownership of a node.
    pub fn maintains_ownership(&self, node: &Int<'ctx>) -> Bool<'ctx> {
        self.ownership(node, Epoch::Now)
            .iff(&self.ownership(node, Epoch::Next))
    }

}

/// Universal quantification over one integer variable, for callers
/// outside the encoding.
pub fn forall_one<'ctx>(
    encoding: &Encoding<'ctx, '_>,
    bound: &Int<'ctx>,
    body: &Bool<'ctx>,
) -> Bool<'ctx> {
    forall_const(encoding.ctx, &[bound as &dyn Ast<'ctx>], &[], body)
}

/// Universal quantification over two integer variables.
pub fn forall_two<'ctx>(
    encoding: &Encoding<'ctx, '_>,
    first: &Int<'ctx>,
    second: &Int<'ctx>,
    body: &Bool<'ctx>,
) -> Bool<'ctx> {
    forall_const(
        encoding.ctx,
        &[first as &dyn Ast<'ctx>, second as &dyn Ast<'ctx>],
        &[],
        body,
    )
}
