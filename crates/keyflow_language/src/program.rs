//! Variables, functions, and whole programs.
//!
//! A [`Program`] owns the type table, a flat table of every variable
//! declaration (globals, parameters, returns, and scope-locals alike), an
//! optional initializer, and its functions. Interface functions are the
//! concurrent API verified against the sequential set specification; macro
//! functions are inlined at call sites.

use std::fmt;

use crate::error::IrError;
use crate::expr::{BinaryOp, Expr};
use crate::stmt::{Scope, Stmt};
use crate::types::{Sort, TypeId, TypeTable};

/// Handle to a variable declaration in a [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(index: usize) -> Self {
        VarId(index as u32)
    }
}

/// A variable declaration.
///
/// Shared variables are visible to all threads; unshared variables are
/// thread-local. Variables carry no storage — the logic refers to them
/// through equality-to-symbol axioms.
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeId,
    pub shared: bool,
}

/// Handle to a function in a [`Program`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Whether a function is part of the verified API or inlined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Verified in isolation against its operation spec.
    Interface,
    /// Inlined at call sites.
    Macro,
}

/// The sequential set operation an interface function implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Contains,
    Insert,
    Delete,
}

impl OperationKind {
    /// All operation kinds, for iteration.
    pub const ALL: [OperationKind; 3] = [
        OperationKind::Contains,
        OperationKind::Insert,
        OperationKind::Delete,
    ];
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Contains => write!(f, "contains"),
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// The sequential specification of an interface function: which set
/// operation it implements and which parameter is the key.
#[derive(Debug, Clone, Copy)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub key_param: usize,
}

/// A function declaration.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<VarId>,
    pub returns: Vec<VarId>,
    /// Present on interface functions; absent on macros.
    pub spec: Option<OperationSpec>,
    pub body: Scope,
}

/// A complete program.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub types: TypeTable,
    pub variables: Vec<VarDecl>,
    /// Runs once before any thread starts; must establish the invariants.
    pub initializer: Option<Function>,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new(name: &str, types: TypeTable) -> Self {
        Program {
            name: name.to_string(),
            types,
            variables: Vec::new(),
            initializer: None,
            functions: Vec::new(),
        }
    }

    /// Declares a variable and returns its handle.
    pub fn declare_var(&mut self, name: &str, ty: TypeId, shared: bool) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(VarDecl {
            name: name.to_string(),
            ty,
            shared,
        });
        id
    }

    /// Adds a function and returns its handle.
    pub fn add_function(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn var(&self, id: VarId) -> &VarDecl {
        &self.variables[id.index()]
    }

    pub fn func(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    /// Iterates over all variables with their handles.
    pub fn vars(&self) -> impl Iterator<Item = (VarId, &VarDecl)> {
        self.variables
            .iter()
            .enumerate()
            .map(|(i, decl)| (VarId(i as u32), decl))
    }

    /// The shared (global) variables of the program.
    pub fn shared_vars(&self) -> impl Iterator<Item = (VarId, &VarDecl)> {
        self.vars().filter(|(_, decl)| decl.shared)
    }

    /// The interface functions, in declaration order.
    pub fn interface_functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .filter(|(_, f)| f.kind == FunctionKind::Interface)
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    /// Computes the type of an expression.
    ///
    /// Fails on dereferences of non-pointers and unknown fields; operator
    /// typing is checked by [`Program::validate`].
    pub fn type_of(&self, expr: &Expr) -> Result<TypeId, IrError> {
        match expr {
            Expr::Bool(_) => Ok(TypeTable::BOOL),
            Expr::Null => Ok(TypeTable::NULL),
            Expr::Min | Expr::Max => Ok(TypeTable::DATA),
            Expr::Var(v) => Ok(self.var(*v).ty),
            Expr::Not(_) => Ok(TypeTable::BOOL),
            Expr::Binary { .. } => Ok(TypeTable::BOOL),
            Expr::Deref { expr, field } => {
                let base = self.type_of(expr)?;
                if self.types.sort(base) != Sort::Ptr {
                    return Err(IrError::DerefNonPointer {
                        sort: self.types.sort(base),
                    });
                }
                self.types
                    .get(base)
                    .field(field)
                    .ok_or_else(|| IrError::NoSuchField {
                        ty: self.types.get(base).name.clone(),
                        field: field.clone(),
                    })
            }
        }
    }

    /// Computes the sort of an expression.
    pub fn sort_of(&self, expr: &Expr) -> Result<Sort, IrError> {
        Ok(self.types.sort(self.type_of(expr)?))
    }

    /// Checks well-formedness of the whole program.
    ///
    /// Verifies operator typing, assignability of assignments and calls,
    /// malloc targets, and operation specs. Returns the first violation.
    pub fn validate(&self) -> Result<(), IrError> {
        for function in self.functions.iter().chain(self.initializer.iter()) {
            if let Some(spec) = &function.spec {
                if spec.key_param >= function.params.len() {
                    return Err(IrError::BadSpecParameter {
                        func: function.name.clone(),
                        index: spec.key_param,
                        arity: function.params.len(),
                    });
                }
            }
            self.validate_stmt(&function.body.body)?;
        }
        Ok(())
    }

    fn validate_stmt(&self, stmt: &Stmt) -> Result<(), IrError> {
        match stmt {
            Stmt::Seq(stmts) => stmts.iter().try_for_each(|s| self.validate_stmt(s)),
            Stmt::Scope(scope) | Stmt::Atomic(scope) => self.validate_stmt(&scope.body),
            Stmt::Choice(branches) => branches
                .iter()
                .try_for_each(|scope| self.validate_stmt(&scope.body)),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expect_bool(cond)?;
                self.validate_stmt(&then_branch.body)?;
                self.validate_stmt(&else_branch.body)
            }
            Stmt::Loop(scope) => self.validate_stmt(&scope.body),
            Stmt::While { cond, body } | Stmt::DoWhile { cond, body } => {
                self.expect_bool(cond)?;
                self.validate_stmt(&body.body)
            }
            Stmt::Skip | Stmt::Break | Stmt::Continue => Ok(()),
            Stmt::Assume(cond) | Stmt::Assert(cond) => self.expect_bool(cond),
            Stmt::Return(exprs) => {
                for e in exprs {
                    self.validate_expr(e)?;
                }
                Ok(())
            }
            Stmt::Malloc(v) => {
                if self.types.sort(self.var(*v).ty) != Sort::Ptr {
                    return Err(IrError::MallocNonPointer {
                        var: self.var(*v).name.clone(),
                    });
                }
                Ok(())
            }
            Stmt::Assign { lhs, rhs } => {
                self.validate_expr(lhs)?;
                self.validate_expr(rhs)?;
                let to = self.type_of(lhs)?;
                let from = self.type_of(rhs)?;
                if !self.types.assignable(to, from) {
                    return Err(IrError::NotAssignable {
                        to: self.types.get(to).name.clone(),
                        from: self.types.get(from).name.clone(),
                    });
                }
                Ok(())
            }
            Stmt::Call {
                targets,
                callee,
                args,
            } => {
                let callee = self.func(*callee);
                if callee.kind != FunctionKind::Macro {
                    return Err(IrError::CallOfInterface {
                        callee: callee.name.clone(),
                    });
                }
                if args.len() != callee.params.len() || targets.len() != callee.returns.len() {
                    return Err(IrError::ArityMismatch {
                        callee: callee.name.clone(),
                        given: args.len(),
                        expected: callee.params.len(),
                    });
                }
                for (arg, param) in args.iter().zip(&callee.params) {
                    let from = self.type_of(arg)?;
                    let to = self.var(*param).ty;
                    if !self.types.assignable(to, from) {
                        return Err(IrError::NotAssignable {
                            to: self.types.get(to).name.clone(),
                            from: self.types.get(from).name.clone(),
                        });
                    }
                }
                Ok(())
            }
            Stmt::Cas(triples) => {
                for triple in triples {
                    self.validate_expr(&triple.dst)?;
                    self.validate_expr(&triple.cmp)?;
                    self.validate_expr(&triple.src)?;
                }
                Ok(())
            }
        }
    }

    fn validate_expr(&self, expr: &Expr) -> Result<(), IrError> {
        match expr {
            Expr::Not(inner) => {
                self.validate_expr(inner)?;
                self.expect_bool(inner)
            }
            Expr::Binary { op, lhs, rhs } => {
                self.validate_expr(lhs)?;
                self.validate_expr(rhs)?;
                if op.is_comparison() {
                    let l = self.type_of(lhs)?;
                    let r = self.type_of(rhs)?;
                    if !self.types.comparable(l, r) {
                        return Err(IrError::IncomparableOperands {
                            op: op.to_string(),
                            lhs: self.types.sort(l),
                            rhs: self.types.sort(r),
                        });
                    }
                    if matches!(op, BinaryOp::Leq | BinaryOp::Lt | BinaryOp::Geq | BinaryOp::Gt)
                        && self.types.sort(l) != Sort::Data
                    {
                        return Err(IrError::IncomparableOperands {
                            op: op.to_string(),
                            lhs: self.types.sort(l),
                            rhs: self.types.sort(r),
                        });
                    }
                    Ok(())
                } else {
                    self.expect_bool(lhs)?;
                    self.expect_bool(rhs)
                }
            }
            Expr::Deref { .. } => self.type_of(expr).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn expect_bool(&self, expr: &Expr) -> Result<(), IrError> {
        self.validate_expr(expr)?;
        let sort = self.sort_of(expr)?;
        if sort != Sort::Bool {
            return Err(IrError::ExpectedBool { sort });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_program() -> (Program, VarId, VarId) {
        let mut types = TypeTable::new();
        let node = types.declare("Node", vec![("val".to_string(), TypeTable::DATA)]);
        types.add_field(node, "next", node);
        let mut program = Program::new("test", types);
        let head = program.declare_var("Head", node, true);
        let cur = program.declare_var("cur", node, false);
        (program, head, cur)
    }

    #[test]
    fn type_of_deref_follows_fields() {
        let (program, head, _) = list_program();
        let ty = program.type_of(&Expr::var_deref(head, "val")).unwrap();
        assert_eq!(ty, TypeTable::DATA);
        let ty = program.type_of(&Expr::var_deref(head, "next")).unwrap();
        assert_eq!(ty, program.var(head).ty);
    }

    #[test]
    fn type_of_rejects_unknown_field() {
        let (program, head, _) = list_program();
        let err = program.type_of(&Expr::var_deref(head, "prev")).unwrap_err();
        assert!(matches!(err, IrError::NoSuchField { .. }));
    }

    #[test]
    fn validate_rejects_order_on_pointers() {
        let (mut program, head, cur) = list_program();
        let body = Stmt::Assume(Expr::lt(Expr::Var(head), Expr::Var(cur)));
        program.add_function(Function {
            name: "bad".to_string(),
            kind: FunctionKind::Interface,
            params: vec![],
            returns: vec![],
            spec: None,
            body: Scope::bare(body),
        });
        assert!(matches!(
            program.validate(),
            Err(IrError::IncomparableOperands { .. })
        ));
    }

    #[test]
    fn validate_rejects_pointer_data_assignment() {
        let (mut program, head, _) = list_program();
        let body = Stmt::assign(Expr::Var(head), Expr::Min);
        program.add_function(Function {
            name: "bad".to_string(),
            kind: FunctionKind::Interface,
            params: vec![],
            returns: vec![],
            spec: None,
            body: Scope::bare(body),
        });
        assert!(matches!(program.validate(), Err(IrError::NotAssignable { .. })));
    }

    #[test]
    fn validate_accepts_null_assignment() {
        let (mut program, head, _) = list_program();
        let body = Stmt::assign(Expr::Var(head), Expr::Null);
        program.add_function(Function {
            name: "ok".to_string(),
            kind: FunctionKind::Interface,
            params: vec![],
            returns: vec![],
            spec: None,
            body: Scope::bare(body),
        });
        assert!(program.validate().is_ok());
    }

    #[test]
    fn spec_parameter_is_checked() {
        let (mut program, _, _) = list_program();
        program.add_function(Function {
            name: "contains".to_string(),
            kind: FunctionKind::Interface,
            params: vec![],
            returns: vec![],
            spec: Some(OperationSpec {
                kind: OperationKind::Contains,
                key_param: 0,
            }),
            body: Scope::bare(Stmt::Skip),
        });
        assert!(matches!(
            program.validate(),
            Err(IrError::BadSpecParameter { .. })
        ));
    }
}
