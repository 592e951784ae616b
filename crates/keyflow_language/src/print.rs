//! Pretty printing of programs, statements, and expressions.
//!
//! Output approximates the surface syntax; it is meant for diagnostics and
//! error messages, not for round-tripping.

use std::fmt::Write;

use crate::expr::Expr;
use crate::program::{FunctionKind, Program};
use crate::stmt::{Scope, Stmt};

/// Pretty printer over a program's tables.
pub struct Printer<'a> {
    program: &'a Program,
}

impl<'a> Printer<'a> {
    pub fn new(program: &'a Program) -> Self {
        Printer { program }
    }

    pub fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Bool(b) => b.to_string(),
            Expr::Null => "null".to_string(),
            Expr::Min => "MIN".to_string(),
            Expr::Max => "MAX".to_string(),
            Expr::Var(v) => self.program.var(*v).name.clone(),
            Expr::Not(inner) => format!("!({})", self.expr(inner)),
            Expr::Binary { op, lhs, rhs } => {
                format!("{} {} {}", self.expr(lhs), op, self.expr(rhs))
            }
            Expr::Deref { expr, field } => format!("{}->{}", self.expr(expr), field),
        }
    }

    pub fn stmt(&self, stmt: &Stmt) -> String {
        let mut out = String::new();
        self.write_stmt(&mut out, stmt, 0);
        out
    }

    pub fn program(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "// program: {}", self.program.name);
        for (_, decl) in self.program.shared_vars() {
            let _ = writeln!(
                out,
                "shared {} {};",
                self.program.types.get(decl.ty).name,
                decl.name
            );
        }
        for function in &self.program.functions {
            let kind = match function.kind {
                FunctionKind::Interface => "interface",
                FunctionKind::Macro => "macro",
            };
            let params: Vec<String> = function
                .params
                .iter()
                .map(|p| {
                    let decl = self.program.var(*p);
                    format!("{} {}", self.program.types.get(decl.ty).name, decl.name)
                })
                .collect();
            let _ = writeln!(out, "{} {}({}) {{", kind, function.name, params.join(", "));
            self.write_stmt(&mut out, &function.body.body, 1);
            let _ = writeln!(out, "}}");
        }
        out
    }

    fn write_scope(&self, out: &mut String, scope: &Scope, indent: usize) {
        let pad = "    ".repeat(indent);
        let _ = writeln!(out, "{}{{", pad);
        for v in &scope.vars {
            let decl = self.program.var(*v);
            let _ = writeln!(
                out,
                "{}    {} {};",
                pad,
                self.program.types.get(decl.ty).name,
                decl.name
            );
        }
        self.write_stmt(out, &scope.body, indent + 1);
        let _ = writeln!(out, "{}}}", pad);
    }

    fn write_stmt(&self, out: &mut String, stmt: &Stmt, indent: usize) {
        let pad = "    ".repeat(indent);
        match stmt {
            Stmt::Seq(stmts) => {
                for s in stmts {
                    self.write_stmt(out, s, indent);
                }
            }
            Stmt::Scope(scope) => self.write_scope(out, scope, indent),
            Stmt::Atomic(scope) => {
                let _ = writeln!(out, "{}atomic", pad);
                self.write_scope(out, scope, indent);
            }
            Stmt::Choice(branches) => {
                let _ = writeln!(out, "{}choose", pad);
                for branch in branches {
                    self.write_scope(out, branch, indent);
                }
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let _ = writeln!(out, "{}if ({})", pad, self.expr(cond));
                self.write_scope(out, then_branch, indent);
                let _ = writeln!(out, "{}else", pad);
                self.write_scope(out, else_branch, indent);
            }
            Stmt::Loop(scope) => {
                let _ = writeln!(out, "{}loop", pad);
                self.write_scope(out, scope, indent);
            }
            Stmt::While { cond, body } => {
                let _ = writeln!(out, "{}while ({})", pad, self.expr(cond));
                self.write_scope(out, body, indent);
            }
            Stmt::DoWhile { cond, body } => {
                let _ = writeln!(out, "{}do", pad);
                self.write_scope(out, body, indent);
                let _ = writeln!(out, "{}while ({});", pad, self.expr(cond));
            }
            Stmt::Skip => {
                let _ = writeln!(out, "{}skip;", pad);
            }
            Stmt::Break => {
                let _ = writeln!(out, "{}break;", pad);
            }
            Stmt::Continue => {
                let _ = writeln!(out, "{}continue;", pad);
            }
            Stmt::Assume(cond) => {
                let _ = writeln!(out, "{}assume({});", pad, self.expr(cond));
            }
            Stmt::Assert(cond) => {
                let _ = writeln!(out, "{}assert({});", pad, self.expr(cond));
            }
            Stmt::Return(exprs) => {
                let parts: Vec<String> = exprs.iter().map(|e| self.expr(e)).collect();
                let _ = writeln!(out, "{}return {};", pad, parts.join(", "));
            }
            Stmt::Malloc(v) => {
                let _ = writeln!(out, "{}{} = malloc;", pad, self.program.var(*v).name);
            }
            Stmt::Assign { lhs, rhs } => {
                let _ = writeln!(out, "{}{} = {};", pad, self.expr(lhs), self.expr(rhs));
            }
            Stmt::Call {
                targets,
                callee,
                args,
            } => {
                let targets: Vec<String> = targets
                    .iter()
                    .map(|v| self.program.var(*v).name.clone())
                    .collect();
                let args: Vec<String> = args.iter().map(|e| self.expr(e)).collect();
                let prefix = if targets.is_empty() {
                    String::new()
                } else {
                    format!("{} = ", targets.join(", "))
                };
                let _ = writeln!(
                    out,
                    "{}{}{}({});",
                    pad,
                    prefix,
                    self.program.func(*callee).name,
                    args.join(", ")
                );
            }
            Stmt::Cas(triples) => {
                let parts: Vec<String> = triples
                    .iter()
                    .map(|t| {
                        format!(
                            "{}, {}, {}",
                            self.expr(&t.dst),
                            self.expr(&t.cmp),
                            self.expr(&t.src)
                        )
                    })
                    .collect();
                let _ = writeln!(out, "{}CAS({});", pad, parts.join("; "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;
    use crate::types::TypeTable;

    #[test]
    fn prints_deref_assignment() {
        let mut types = TypeTable::new();
        let node = types.declare("Node", vec![]);
        types.add_field(node, "next", node);
        let mut program = Program::new("p", types);
        let head = program.declare_var("Head", node, true);
        let printer = Printer::new(&program);
        let stmt = Stmt::assign(Expr::var_deref(head, "next"), Expr::Null);
        assert_eq!(printer.stmt(&stmt).trim(), "Head->next = null;");
    }
}
