//! Statements and lexical scopes.
//!
//! Statements arrive in simplified form: the external simplifier has
//! already desugared `CAS` commands used as expressions and rewritten
//! conditional loops into unconditional [`Stmt::Loop`]s with internal
//! breaks and assumes. The [`Stmt::While`], [`Stmt::DoWhile`], and
//! [`Stmt::Cas`] variants remain representable so the verifier can reject
//! residual uses with a precise error instead of misbehaving.

use crate::expr::Expr;
use crate::program::{FuncId, VarId};

/// A lexical scope: the variables it introduces and its body.
#[derive(Debug, Clone)]
pub struct Scope {
    pub vars: Vec<VarId>,
    pub body: Stmt,
}

impl Scope {
    pub fn new(vars: Vec<VarId>, body: Stmt) -> Self {
        Scope { vars, body }
    }

    /// A scope introducing no variables.
    pub fn bare(body: Stmt) -> Self {
        Scope { vars: Vec::new(), body }
    }
}

/// One element of a (multi-word) compare-and-swap.
#[derive(Debug, Clone)]
pub struct CasTriple {
    pub dst: Expr,
    pub cmp: Expr,
    pub src: Expr,
}

/// A statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Statements in sequence.
    Seq(Vec<Stmt>),
    /// A nested lexical scope.
    Scope(Box<Scope>),
    /// An atomic block: its body is a single step of the thread.
    Atomic(Box<Scope>),
    /// Nondeterministic choice between branches.
    Choice(Vec<Scope>),
    /// Conditional.
    If {
        cond: Expr,
        then_branch: Box<Scope>,
        else_branch: Box<Scope>,
    },
    /// Unconditional loop, exited by `break` (the simplifier's loop form).
    Loop(Box<Scope>),
    /// `while (cond) { ... }` — only `while (true)` is verifiable.
    While { cond: Expr, body: Box<Scope> },
    /// `do { ... } while (cond)` — rejected by the verifier.
    DoWhile { cond: Expr, body: Box<Scope> },
    Skip,
    Break,
    /// `continue` — rejected by the verifier (simplified programs do not
    /// contain it).
    Continue,
    /// Blocks execution until the condition holds.
    Assume(Expr),
    /// Must be entailed by the current state.
    Assert(Expr),
    /// Return from the enclosing function.
    Return(Vec<Expr>),
    /// Fresh allocation into a pointer variable.
    Malloc(VarId),
    /// `lhs = rhs`, where `lhs` is a variable or a single dereference.
    Assign { lhs: Expr, rhs: Expr },
    /// Macro call with result targets.
    Call {
        targets: Vec<VarId>,
        callee: FuncId,
        args: Vec<Expr>,
    },
    /// Residual compare-and-swap — rejected by the verifier.
    Cas(Vec<CasTriple>),
}

impl Stmt {
    /// Sequences two statements, flattening nested sequences.
    pub fn then(self, next: Stmt) -> Stmt {
        match self {
            Stmt::Seq(mut stmts) => {
                stmts.push(next);
                Stmt::Seq(stmts)
            }
            first => Stmt::Seq(vec![first, next]),
        }
    }

    pub fn assign(lhs: Expr, rhs: Expr) -> Stmt {
        Stmt::Assign { lhs, rhs }
    }

    pub fn atomic(body: Stmt) -> Stmt {
        Stmt::Atomic(Box::new(Scope::bare(body)))
    }

    pub fn seq(stmts: Vec<Stmt>) -> Stmt {
        Stmt::Seq(stmts)
    }

    pub fn loop_(body: Stmt) -> Stmt {
        Stmt::Loop(Box::new(Scope::bare(body)))
    }

    pub fn if_else(cond: Expr, then_branch: Stmt, else_branch: Stmt) -> Stmt {
        Stmt::If {
            cond,
            then_branch: Box::new(Scope::bare(then_branch)),
            else_branch: Box::new(Scope::bare(else_branch)),
        }
    }

    pub fn choice(branches: Vec<Stmt>) -> Stmt {
        Stmt::Choice(branches.into_iter().map(Scope::bare).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn then_flattens_sequences() {
        let s = Stmt::Skip.then(Stmt::Break).then(Stmt::Skip);
        match s {
            Stmt::Seq(stmts) => assert_eq!(stmts.len(), 3),
            other => panic!("expected a sequence, got {:?}", other),
        }
    }
}
