//! Construction errors for logic objects.

use keyflow_language::Sort;

/// A precondition violation while building a logic object.
///
/// Raised at construction time, never during solving.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicError {
    /// Stack axiom over operands of incomparable sorts.
    #[error("stack axiom compares incomparable sorts {lhs} and {rhs}")]
    IncomparableSorts { lhs: Sort, rhs: Sort },

    /// Ordered comparison over a non-data sort.
    #[error("ordered comparison requires data operands, found sort {sort}")]
    OrderOnNonData { sort: Sort },

    /// A position requiring a first-order symbol received a flow symbol.
    #[error("expected a first-order symbol, found flow symbol {symbol}")]
    ExpectedValueSymbol { symbol: String },

    /// A position requiring a flow symbol received a first-order symbol.
    #[error("expected a flow symbol, found first-order symbol {symbol}")]
    ExpectedFlowSymbol { symbol: String },

    /// A memory axiom whose node symbol is not pointer-sorted.
    #[error("memory axiom node {symbol} is not of pointer sort")]
    NodeNotPointer { symbol: String },
}
