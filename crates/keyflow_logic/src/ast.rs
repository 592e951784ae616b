//! Axioms, compound formulas, annotations, and effects.
//!
//! The grammar, bottom up:
//!
//! ```text
//! expr      ::= symbol | true | false | null | MIN | MAX
//! axiom     ::= var == symbol                      (EqualsTo)
//!             | mem(node, flow, fields)            (Shared/LocalMemory)
//!             | expr ⋈ expr                        (Stack, ⋈ ∈ {=,≠,≤,<,≥,>})
//!             | flow = ∅ | flow ≠ ∅                (InflowEmpty)
//!             | expr ∈ flow                        (InflowHasValue)
//!             | [lo, hi] ⊆ flow                    (InflowHasRange)
//!             | OBL(op, key) | FUL(op, key, ret)   (Obligation/Fulfillment)
//! conjunct  ::= axiom | (axioms ⇒ axioms)          (Implication)
//! now       ::= conjunct ∗ … ∗ conjunct            (separating conjunction)
//! ```
//!
//! An [`Annotation`] is `(now, past, future)`. An [`Effect`] is the
//! observable footprint of one atomic heap write, `(pre, post, context)`.
//!
//! Construction validates sorts and symbol orders eagerly (see
//! [`LogicError`]); everything downstream may assume well-formed objects.

use keyflow_language::{Expr, OperationKind, Sort, VarId};

use crate::error::LogicError;
use crate::symbols::{SymbolId, SymbolPool};

/// A symbolic expression: a symbol or one of the distinguished constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolicExpr {
    Symbol(SymbolId),
    True,
    False,
    Null,
    Min,
    Max,
}

impl SymbolicExpr {
    /// The sort of the expression; `None` for flow symbols.
    pub fn sort(&self, pool: &SymbolPool) -> Option<Sort> {
        match self {
            SymbolicExpr::Symbol(id) => pool.sort(*id),
            SymbolicExpr::True | SymbolicExpr::False => Some(Sort::Bool),
            SymbolicExpr::Null => Some(Sort::Ptr),
            SymbolicExpr::Min | SymbolicExpr::Max => Some(Sort::Data),
        }
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        match self {
            SymbolicExpr::Symbol(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<SymbolId> for SymbolicExpr {
    fn from(id: SymbolId) -> Self {
        SymbolicExpr::Symbol(id)
    }
}

/// Comparison operators of stack axioms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Comparator {
    Eq,
    Neq,
    Leq,
    Lt,
    Geq,
    Gt,
}

impl Comparator {
    /// `true` for the operators invariant under operand exchange.
    pub fn is_symmetric(self) -> bool {
        matches!(self, Comparator::Eq | Comparator::Neq)
    }

    /// The operator obtained by exchanging the operands.
    pub fn mirrored(self) -> Comparator {
        match self {
            Comparator::Eq => Comparator::Eq,
            Comparator::Neq => Comparator::Neq,
            Comparator::Leq => Comparator::Geq,
            Comparator::Lt => Comparator::Gt,
            Comparator::Geq => Comparator::Leq,
            Comparator::Gt => Comparator::Lt,
        }
    }

    /// The operator denoting the complementary relation.
    pub fn negated(self) -> Comparator {
        match self {
            Comparator::Eq => Comparator::Neq,
            Comparator::Neq => Comparator::Eq,
            Comparator::Leq => Comparator::Gt,
            Comparator::Lt => Comparator::Geq,
            Comparator::Geq => Comparator::Lt,
            Comparator::Gt => Comparator::Leq,
        }
    }

    /// `true` for the order comparisons (everything but `=`/`≠`).
    pub fn is_ordered(self) -> bool {
        !self.is_symmetric()
    }
}

/// A comparison between two symbolic expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackAxiom {
    pub op: Comparator,
    pub lhs: SymbolicExpr,
    pub rhs: SymbolicExpr,
}

impl StackAxiom {
    /// Builds a stack axiom, checking sort compatibility.
    ///
    /// Equality and disequality require comparable sorts (data/data,
    /// bool/bool, ptr/ptr); ordered comparisons require data operands.
    pub fn new(
        op: Comparator,
        lhs: SymbolicExpr,
        rhs: SymbolicExpr,
        pool: &SymbolPool,
    ) -> Result<Self, LogicError> {
        let lsort = lhs
            .sort(pool)
            .ok_or_else(|| LogicError::ExpectedValueSymbol {
                symbol: format!("{:?}", lhs),
            })?;
        let rsort = rhs
            .sort(pool)
            .ok_or_else(|| LogicError::ExpectedValueSymbol {
                symbol: format!("{:?}", rhs),
            })?;
        if lsort != rsort {
            return Err(LogicError::IncomparableSorts {
                lhs: lsort,
                rhs: rsort,
            });
        }
        if op.is_ordered() && lsort != Sort::Data {
            return Err(LogicError::OrderOnNonData { sort: lsort });
        }
        Ok(StackAxiom { op, lhs, rhs })
    }

    /// Evaluates the axiom when both operands are constants.
    ///
    /// `MIN < MAX` and `MIN ≠ MAX` are built into the data order.
    pub fn truth_value(&self) -> Option<bool> {
        use Comparator::*;
        use SymbolicExpr::*;
        if self.lhs == self.rhs {
            return match self.op {
                Eq | Leq | Geq => Some(true),
                Neq | Lt | Gt => Some(false),
            };
        }
        if matches!(self.lhs, Symbol(_)) || matches!(self.rhs, Symbol(_)) {
            return None;
        }
        match (self.lhs, self.rhs) {
            (Min, Max) => Some(matches!(self.op, Neq | Leq | Lt)),
            (Max, Min) => Some(matches!(self.op, Neq | Geq | Gt)),
            (True, False) | (False, True) => Some(matches!(self.op, Neq)),
            _ => None,
        }
    }
}

/// A heap cell: its address, its inflow, and one symbol per field.
///
/// Fields are kept sorted by name; this is the canonical pairing used by
/// syntactic equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAxiom {
    pub node: SymbolId,
    pub flow: SymbolId,
    fields: Vec<(String, SymbolId)>,
}

impl MemoryAxiom {
    pub fn new(
        node: SymbolId,
        flow: SymbolId,
        mut fields: Vec<(String, SymbolId)>,
        pool: &SymbolPool,
    ) -> Result<Self, LogicError> {
        if pool.sort(node) != Some(Sort::Ptr) {
            return Err(LogicError::NodeNotPointer {
                symbol: pool.name(node),
            });
        }
        if !pool.is_flow(flow) {
            return Err(LogicError::ExpectedFlowSymbol {
                symbol: pool.name(flow),
            });
        }
        for (_, value) in &fields {
            if pool.is_flow(*value) {
                return Err(LogicError::ExpectedValueSymbol {
                    symbol: pool.name(*value),
                });
            }
        }
        fields.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(MemoryAxiom { node, flow, fields })
    }

    pub fn field(&self, name: &str) -> Option<SymbolId> {
        self.fields
            .iter()
            .find(|(f, _)| f == name)
            .map(|(_, v)| *v)
    }

    /// Fields in canonical (name) order.
    pub fn fields(&self) -> &[(String, SymbolId)] {
        &self.fields
    }

    /// Replaces the symbol of one field, keeping the canonical order.
    pub fn set_field(&mut self, name: &str, value: SymbolId) {
        for (f, v) in &mut self.fields {
            if f == name {
                *v = value;
                return;
            }
        }
    }

    pub(crate) fn fields_mut(&mut self) -> &mut Vec<(String, SymbolId)> {
        &mut self.fields
    }
}

/// An atomic formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Axiom {
    /// The program variable currently evaluates to the symbol.
    EqualsTo { var: VarId, value: SymbolId },
    /// A shared heap cell, observable by all threads.
    SharedMemory(MemoryAxiom),
    /// A heap cell owned by this thread; its flow is empty.
    LocalMemory(MemoryAxiom),
    Stack(StackAxiom),
    /// The flow is (non-)empty.
    InflowEmpty { flow: SymbolId, is_empty: bool },
    /// The value is in the flow.
    InflowHasValue { flow: SymbolId, value: SymbolicExpr },
    /// All data values in `[low, high]` are in the flow.
    InflowHasRange {
        flow: SymbolId,
        low: SymbolicExpr,
        high: SymbolicExpr,
    },
    /// Outstanding linearization requirement of this thread.
    Obligation { kind: OperationKind, key: SymbolId },
    /// Completed linearization with the recorded return value.
    Fulfillment {
        kind: OperationKind,
        key: SymbolId,
        return_value: bool,
    },
}

impl Axiom {
    /// The canonical contradiction, used to collapse infeasible states.
    pub fn contradiction() -> Axiom {
        Axiom::Stack(StackAxiom {
            op: Comparator::Eq,
            lhs: SymbolicExpr::True,
            rhs: SymbolicExpr::False,
        })
    }

    /// `true` if the axiom is a trivially false stack axiom.
    pub fn is_contradiction(&self) -> bool {
        matches!(self, Axiom::Stack(s) if s.truth_value() == Some(false))
    }

    /// `true` if the axiom is a trivially true stack axiom.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Axiom::Stack(s) if s.truth_value() == Some(true))
    }

    /// The memory axiom behind a shared or local memory conjunct.
    pub fn as_memory(&self) -> Option<&MemoryAxiom> {
        match self {
            Axiom::SharedMemory(m) | Axiom::LocalMemory(m) => Some(m),
            _ => None,
        }
    }
}

/// `premise ⇒ conclusion` over axiom conjunctions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implication {
    pub premise: Vec<Axiom>,
    pub conclusion: Vec<Axiom>,
}

/// One element of a separating conjunction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conjunct {
    Axiom(Axiom),
    Implication(Implication),
}

impl From<Axiom> for Conjunct {
    fn from(axiom: Axiom) -> Self {
        Conjunct::Axiom(axiom)
    }
}

/// A separating conjunction of conjuncts.
///
/// Separation is semantic, not syntactic: distinct memory axioms denote
/// distinct cells, and a local memory is distinct from every other memory.
/// The encoding layer turns this into disequalities.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conjunction {
    pub conjuncts: Vec<Conjunct>,
}

impl Conjunction {
    pub fn new() -> Self {
        Conjunction {
            conjuncts: Vec::new(),
        }
    }

    pub fn from_axioms(axioms: Vec<Axiom>) -> Self {
        Conjunction {
            conjuncts: axioms.into_iter().map(Conjunct::Axiom).collect(),
        }
    }

    pub fn push(&mut self, conjunct: impl Into<Conjunct>) {
        self.conjuncts.push(conjunct.into());
    }

    pub fn extend(&mut self, other: Conjunction) {
        self.conjuncts.extend(other.conjuncts);
    }

    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conjuncts.len()
    }

    /// The plain axioms of the conjunction (implications skipped).
    pub fn axioms(&self) -> impl Iterator<Item = &Axiom> {
        self.conjuncts.iter().filter_map(|c| match c {
            Conjunct::Axiom(a) => Some(a),
            Conjunct::Implication(_) => None,
        })
    }

    /// All memory axioms, shared and local.
    pub fn memories(&self) -> impl Iterator<Item = &MemoryAxiom> {
        self.axioms().filter_map(Axiom::as_memory)
    }

    /// The shared memory axioms only.
    pub fn shared_memories(&self) -> impl Iterator<Item = &MemoryAxiom> {
        self.axioms().filter_map(|a| match a {
            Axiom::SharedMemory(m) => Some(m),
            _ => None,
        })
    }

    /// The memory axiom whose address is the given symbol, if any.
    pub fn memory_at(&self, node: SymbolId) -> Option<&MemoryAxiom> {
        self.memories().find(|m| m.node == node)
    }

    /// The symbol a program variable is currently bound to.
    pub fn value_of(&self, var: VarId) -> Option<SymbolId> {
        self.axioms().find_map(|a| match a {
            Axiom::EqualsTo { var: v, value } if *v == var => Some(*value),
            _ => None,
        })
    }

    /// `true` if any conjunct is a trivial contradiction.
    pub fn has_contradiction(&self) -> bool {
        self.axioms().any(Axiom::is_contradiction)
    }
}

/// A single heap update command, the subject of future predicates and
/// effect bookkeeping. `lhs` is a dereference, `rhs` the written value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapUpdate {
    pub lhs: Expr,
    pub rhs: Expr,
}

/// The formula held at some earlier point of the same thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastPredicate {
    pub formula: Conjunction,
}

/// From `pre`, executing `command` can reach a state satisfying `post`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuturePredicate {
    pub pre: Conjunction,
    pub command: HeapUpdate,
    pub post: Conjunction,
}

/// The symbolic description of the reachable states at one program point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Annotation {
    pub now: Conjunction,
    pub past: Vec<PastPredicate>,
    pub future: Vec<FuturePredicate>,
}

impl Annotation {
    /// The empty annotation, satisfied by every state.
    pub fn top() -> Self {
        Annotation::default()
    }

    pub fn from_now(now: Conjunction) -> Self {
        Annotation {
            now,
            past: Vec::new(),
            future: Vec::new(),
        }
    }

    /// The unsatisfiable annotation.
    pub fn bottom() -> Self {
        Annotation::from_now(Conjunction::from_axioms(vec![Axiom::contradiction()]))
    }

    pub fn is_bottom(&self) -> bool {
        self.now.has_contradiction()
    }
}

/// The observable footprint of one atomic write to shared memory.
///
/// `pre` and `post` are the updated cell before and after the step;
/// `context` is the surrounding stack/flow knowledge another thread may
/// assume when checking stability against this effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effect {
    pub pre: MemoryAxiom,
    pub post: MemoryAxiom,
    pub context: Conjunction,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolFactory;

    fn pool_with(sorts: &[Sort]) -> (SymbolPool, Vec<SymbolId>) {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let ids = sorts.iter().map(|s| factory.fresh_value(*s)).collect();
        (pool, ids)
    }

    #[test]
    fn stack_axiom_rejects_mixed_sorts() {
        let (pool, ids) = pool_with(&[Sort::Data, Sort::Ptr]);
        let err = StackAxiom::new(
            Comparator::Eq,
            ids[0].into(),
            ids[1].into(),
            &pool,
        )
        .unwrap_err();
        assert!(matches!(err, LogicError::IncomparableSorts { .. }));
    }

    #[test]
    fn stack_axiom_rejects_order_on_pointers() {
        let (pool, ids) = pool_with(&[Sort::Ptr, Sort::Ptr]);
        let err = StackAxiom::new(
            Comparator::Lt,
            ids[0].into(),
            ids[1].into(),
            &pool,
        )
        .unwrap_err();
        assert!(matches!(err, LogicError::OrderOnNonData { .. }));
    }

    #[test]
    fn truth_value_of_constants() {
        let min_lt_max = StackAxiom {
            op: Comparator::Lt,
            lhs: SymbolicExpr::Min,
            rhs: SymbolicExpr::Max,
        };
        assert_eq!(min_lt_max.truth_value(), Some(true));
        assert!(Axiom::contradiction().is_contradiction());
    }

    #[test]
    fn reflexive_comparison_is_decided() {
        let (_, ids) = pool_with(&[Sort::Data]);
        let refl = StackAxiom {
            op: Comparator::Leq,
            lhs: ids[0].into(),
            rhs: ids[0].into(),
        };
        assert_eq!(refl.truth_value(), Some(true));
        let strict = StackAxiom {
            op: Comparator::Lt,
            lhs: ids[0].into(),
            rhs: ids[0].into(),
        };
        assert_eq!(strict.truth_value(), Some(false));
    }

    #[test]
    fn memory_axiom_orders_fields_canonically() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let node = factory.fresh_value(Sort::Ptr);
        let flow = factory.fresh_flow();
        let val = factory.fresh_value(Sort::Data);
        let next = factory.fresh_value(Sort::Ptr);
        let mem = MemoryAxiom::new(
            node,
            flow,
            vec![("val".to_string(), val), ("next".to_string(), next)],
            &pool,
        )
        .unwrap();
        let names: Vec<&str> = mem.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["next", "val"]);
        assert_eq!(mem.field("val"), Some(val));
    }

    #[test]
    fn memory_axiom_rejects_value_symbol_as_flow() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let node = factory.fresh_value(Sort::Ptr);
        let not_flow = factory.fresh_value(Sort::Data);
        let err = MemoryAxiom::new(node, not_flow, vec![], &pool).unwrap_err();
        assert!(matches!(err, LogicError::ExpectedFlowSymbol { .. }));
    }

    #[test]
    fn value_of_finds_binding() {
        let (_, ids) = pool_with(&[Sort::Data]);
        let var = VarId::from_index(0);
        let now = Conjunction::from_axioms(vec![Axiom::EqualsTo {
            var,
            value: ids[0],
        }]);
        assert_eq!(now.value_of(var), Some(ids[0]));
        assert_eq!(now.value_of(VarId::from_index(1)), None);
    }

    #[test]
    fn bottom_is_recognized() {
        assert!(Annotation::bottom().is_bottom());
        assert!(!Annotation::top().is_bottom());
    }
}
