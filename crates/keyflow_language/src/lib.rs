//! # keyflow-language
//!
//! Typed program IR for the keyflow linearizability verifier.
//!
//! This crate defines the abstract syntax the verifier consumes: a small
//! imperative concurrency language with nominal record types, shared and
//! thread-local variables, and structured statements. The surface parser and
//! the source-to-source simplifier live outside the workspace; programs
//! arriving here are expected to be in simplified form (CAS desugared,
//! conditional loops rewritten to unconditional loops with internal breaks).
//!
//! ## Handles, not pointers
//!
//! Types, variables, and functions are stored in flat tables owned by the
//! [`Program`] and referenced through copyable index handles ([`TypeId`],
//! [`VarId`], [`FuncId`]). Nominal type equality is handle equality.
//!
//! ## Modules
//!
//! - [`types`] — sorts, record types, the type table
//! - [`expr`] — expressions
//! - [`stmt`] — statements and scopes
//! - [`program`] — variables, functions, programs, well-formedness
//! - [`print`] — pretty printing
//! - [`error`] — construction and well-formedness errors

pub mod error;
pub mod expr;
pub mod print;
pub mod program;
pub mod stmt;
pub mod types;

pub use error::IrError;
pub use expr::{BinaryOp, Expr};
pub use print::Printer;
pub use program::{
    FuncId, Function, FunctionKind, OperationKind, OperationSpec, Program, VarDecl, VarId,
};
pub use stmt::{CasTriple, Scope, Stmt};
pub use types::{RecordType, Sort, TypeId, TypeTable};
