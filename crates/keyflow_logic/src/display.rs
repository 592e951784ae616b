//! Human-readable formatting of logic objects.
//!
//! Symbols print as `@<index>`; program variables as `#<index>` (resolving
//! variable names needs the program's tables, which the logic crate does
//! not depend on for display). The output is for diagnostics and error
//! reports, not for parsing.

use std::fmt;

use crate::ast::{
    Annotation, Axiom, Comparator, Conjunct, Conjunction, Effect, FuturePredicate, Implication,
    MemoryAxiom, PastPredicate, StackAxiom, SymbolicExpr,
};

impl fmt::Display for SymbolicExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolicExpr::Symbol(id) => write!(f, "{}", id),
            SymbolicExpr::True => write!(f, "true"),
            SymbolicExpr::False => write!(f, "false"),
            SymbolicExpr::Null => write!(f, "null"),
            SymbolicExpr::Min => write!(f, "MIN"),
            SymbolicExpr::Max => write!(f, "MAX"),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Eq => "==",
            Comparator::Neq => "!=",
            Comparator::Leq => "<=",
            Comparator::Lt => "<",
            Comparator::Geq => ">=",
            Comparator::Gt => ">",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for StackAxiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

impl fmt::Display for MemoryAxiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} |-> (flow: {}", self.node, self.flow)?;
        for (name, value) in self.fields() {
            write!(f, ", {}: {}", name, value)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Axiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axiom::EqualsTo { var, value } => write!(f, "#{} == {}", var.index(), value),
            Axiom::SharedMemory(mem) => write!(f, "shared {}", mem),
            Axiom::LocalMemory(mem) => write!(f, "local {}", mem),
            Axiom::Stack(stack) => write!(f, "{}", stack),
            Axiom::InflowEmpty { flow, is_empty } => {
                if *is_empty {
                    write!(f, "{} == \u{2205}", flow)
                } else {
                    write!(f, "{} != \u{2205}", flow)
                }
            }
            Axiom::InflowHasValue { flow, value } => write!(f, "{} \u{2208} {}", value, flow),
            Axiom::InflowHasRange { flow, low, high } => {
                write!(f, "[{}, {}] \u{2286} {}", low, high, flow)
            }
            Axiom::Obligation { kind, key } => write!(f, "OBL({}, {})", kind, key),
            Axiom::Fulfillment {
                kind,
                key,
                return_value,
            } => write!(f, "FUL({}, {}, {})", kind, key, return_value),
        }
    }
}

fn write_axioms(f: &mut fmt::Formatter<'_>, axioms: &[Axiom]) -> fmt::Result {
    if axioms.is_empty() {
        return write!(f, "true");
    }
    for (i, axiom) in axioms.iter().enumerate() {
        if i > 0 {
            write!(f, " && ")?;
        }
        write!(f, "{}", axiom)?;
    }
    Ok(())
}

impl fmt::Display for Implication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        write_axioms(f, &self.premise)?;
        write!(f, " ==> ")?;
        write_axioms(f, &self.conclusion)?;
        write!(f, "]")
    }
}

impl fmt::Display for Conjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conjunct::Axiom(axiom) => write!(f, "{}", axiom),
            Conjunct::Implication(imp) => write!(f, "{}", imp),
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "true");
        }
        for (i, conjunct) in self.conjuncts.iter().enumerate() {
            if i > 0 {
                write!(f, " * ")?;
            }
            write!(f, "{}", conjunct)?;
        }
        Ok(())
    }
}

impl fmt::Display for PastPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PAST<{}>", self.formula)
    }
}

impl fmt::Display for FuturePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FUT<{} -- update --> {}>", self.pre, self.post)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {}", self.now)?;
        for past in &self.past {
            write!(f, " * {}", past)?;
        }
        for future in &self.future {
            write!(f, " * {}", future)?;
        }
        write!(f, " }}")
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "effect: {} ~~> {} under {}",
            self.pre, self.post, self.context
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{SymbolFactory, SymbolPool};
    use keyflow_language::Sort;

    #[test]
    fn memory_axiom_renders_fields_in_order() {
        let mut pool = SymbolPool::new();
        let mut factory = SymbolFactory::new(&mut pool);
        let node = factory.fresh_value(Sort::Ptr);
        let flow = factory.fresh_flow();
        let val = factory.fresh_value(Sort::Data);
        let mem = MemoryAxiom::new(node, flow, vec![("val".to_string(), val)], &pool).unwrap();
        let rendered = format!("{}", mem);
        assert!(rendered.contains("flow: @1"));
        assert!(rendered.contains("val: @2"));
    }

    #[test]
    fn empty_conjunction_renders_true() {
        assert_eq!(format!("{}", Conjunction::new()), "true");
    }
}
