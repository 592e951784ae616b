//! Construction and well-formedness errors for the program IR.

use crate::types::Sort;

/// An error raised when an IR object is malformed.
///
/// These are precondition violations: the frontend (or a test harness)
/// produced a program the IR cannot represent soundly. They are reported
/// eagerly, during construction or during [`Program::validate`],
/// never during verification.
///
/// [`Program::validate`]: crate::program::Program::validate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// Two expression operands do not share a comparable type.
    #[error("operands of '{op}' have incomparable sorts {lhs} and {rhs}")]
    IncomparableOperands {
        op: String,
        lhs: Sort,
        rhs: Sort,
    },

    /// An assignment between inassignable types.
    #[error("cannot assign a value of type '{from}' to a target of type '{to}'")]
    NotAssignable { to: String, from: String },

    /// A dereference names a field the record type does not declare.
    #[error("type '{ty}' has no field '{field}'")]
    NoSuchField { ty: String, field: String },

    /// A dereference of a non-pointer expression.
    #[error("cannot dereference an expression of sort {sort}")]
    DerefNonPointer { sort: Sort },

    /// A boolean position holds a non-boolean expression.
    #[error("expected a boolean expression, found sort {sort}")]
    ExpectedBool { sort: Sort },

    /// `malloc` into a variable of non-pointer type.
    #[error("malloc target '{var}' is not of pointer type")]
    MallocNonPointer { var: String },

    /// A macro call with mismatched arity.
    #[error("call of '{callee}' passes {given} arguments, declaration has {expected}")]
    ArityMismatch {
        callee: String,
        given: usize,
        expected: usize,
    },

    /// A call targets a function that is not a macro.
    #[error("'{callee}' is an interface function and cannot be called")]
    CallOfInterface { callee: String },

    /// A function's operation spec names a parameter index that does not exist.
    #[error("operation spec of '{func}' names parameter #{index}, but it has {arity}")]
    BadSpecParameter {
        func: String,
        index: usize,
        arity: usize,
    },
}
