//! Expressions of the input language.
//!
//! Expressions are a small algebra over literals, variables, negation,
//! binary operators, and pointer dereference. Typing rules are enforced by
//! [`Program::validate`] and queried through [`Program::type_of`], both of
//! which need the program's tables; the expression tree itself stores only
//! handles.
//!
//! [`Program::validate`]: crate::program::Program::validate
//! [`Program::type_of`]: crate::program::Program::type_of

use std::fmt;

use crate::program::VarId;

/// Binary operators.
///
/// Comparisons apply to operands of comparable types and yield `bool`;
/// `And`/`Or` apply to booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinaryOp {
    Eq,
    Neq,
    Leq,
    Lt,
    Geq,
    Gt,
    And,
    Or,
}

impl BinaryOp {
    /// Returns `true` for the comparison operators (everything but the
    /// boolean connectives).
    pub fn is_comparison(self) -> bool {
        !matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Leq => "<=",
            BinaryOp::Lt => "<",
            BinaryOp::Geq => ">=",
            BinaryOp::Gt => ">",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Boolean literal.
    Bool(bool),
    /// The null pointer literal.
    Null,
    /// The smallest data value.
    Min,
    /// The largest data value.
    Max,
    /// Variable read.
    Var(VarId),
    /// Boolean negation.
    Not(Box<Expr>),
    /// Binary operation.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Field read `expr->field`.
    Deref { expr: Box<Expr>, field: String },
}

impl Expr {
    pub fn var(v: VarId) -> Self {
        Expr::Var(v)
    }

    pub fn not(e: Expr) -> Self {
        Expr::Not(Box::new(e))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn neq(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Neq, lhs, rhs)
    }

    pub fn lt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Lt, lhs, rhs)
    }

    pub fn gt(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::Gt, lhs, rhs)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Self::binary(BinaryOp::And, lhs, rhs)
    }

    pub fn deref(expr: Expr, field: &str) -> Self {
        Expr::Deref {
            expr: Box::new(expr),
            field: field.to_string(),
        }
    }

    /// Field read through a variable, the common case.
    pub fn var_deref(v: VarId, field: &str) -> Self {
        Self::deref(Expr::Var(v), field)
    }

    /// Logical negation as a rewrite.
    ///
    /// Comparisons are flipped (`¬(a ≤ b)` becomes `a > b`), double
    /// negation cancels, and only connectives fall back to a `Not` node.
    pub fn negate(self) -> Expr {
        match self {
            Expr::Bool(b) => Expr::Bool(!b),
            Expr::Not(inner) => *inner,
            Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
                let flipped = match op {
                    BinaryOp::Eq => BinaryOp::Neq,
                    BinaryOp::Neq => BinaryOp::Eq,
                    BinaryOp::Leq => BinaryOp::Gt,
                    BinaryOp::Lt => BinaryOp::Geq,
                    BinaryOp::Geq => BinaryOp::Lt,
                    BinaryOp::Gt => BinaryOp::Leq,
                    BinaryOp::And | BinaryOp::Or => unreachable!(),
                };
                Expr::Binary { op: flipped, lhs, rhs }
            }
            other => Expr::not(other),
        }
    }

    /// Walks the tree, calling `f` on every node.
    pub fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Not(inner) => inner.visit(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Deref { expr, .. } => expr.visit(f),
            _ => {}
        }
    }

    /// Returns `true` if the tree contains a dereference.
    pub fn has_deref(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e, Expr::Deref { .. }) {
                found = true;
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(n: u32) -> VarId {
        VarId::from_index(n as usize)
    }

    #[test]
    fn negate_flips_comparisons() {
        let e = Expr::binary(BinaryOp::Leq, Expr::Var(v(0)), Expr::Var(v(1)));
        match e.negate() {
            Expr::Binary { op, .. } => assert_eq!(op, BinaryOp::Gt),
            other => panic!("expected a binary expression, got {:?}", other),
        }
    }

    #[test]
    fn negate_cancels_double_negation() {
        let e = Expr::not(Expr::Var(v(0)));
        assert_eq!(e.negate(), Expr::Var(v(0)));
    }

    #[test]
    fn negate_keeps_connectives_under_not() {
        let e = Expr::and(Expr::Var(v(0)), Expr::Var(v(1)));
        assert!(matches!(e.negate(), Expr::Not(_)));
    }

    #[test]
    fn has_deref_sees_nested_reads() {
        let e = Expr::eq(Expr::var_deref(v(0), "next"), Expr::Null);
        assert!(e.has_deref());
        let e = Expr::eq(Expr::Var(v(0)), Expr::Null);
        assert!(!e.has_deref());
    }
}
