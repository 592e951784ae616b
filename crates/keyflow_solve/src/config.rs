//! The flow-domain configuration.
//!
//! A [`SolverConfig`] tells the engine everything structure-specific: the
//! node type, the per-field outflow predicates defining how keys travel
//! along heap edges, the logical-containment predicate defining the set
//! content, and the node/variable invariants the engine assumes and
//! re-establishes.
//!
//! ## Predicate templates
//!
//! Predicates are formula trees with two numbered holes — the *node* and
//! the *key* — whose leaves may project fields of the node hole.
//! Instantiation is a single substitution pass: the encoding layer fills
//! holes with SMT terms (fields become heap selector applications at the
//! requested epoch), and the logic layer fills them with the symbols of a
//! memory axiom (fields become the axiom's field symbols).
//!
//! ```
//! use keyflow_logic::Comparator;
//! use keyflow_solve::config::{Predicate, Pred, TermPattern};
//!
//! // outflow along `next`: every key greater than the node's value
//! let outflow = Predicate::new(
//!     "outflow-next",
//!     Pred::Compare(Comparator::Gt, TermPattern::Key, TermPattern::Field("val".into())),
//! );
//! assert_eq!(outflow.name, "outflow-next");
//! ```

use keyflow_language::{Program, Sort, TypeId, VarId};
use keyflow_logic::{
    Axiom, Comparator, Conjunct, Implication, MemoryAxiom, StackAxiom, SymbolPool, SymbolicExpr,
};

use crate::error::{EngineError, EngineResult};

/// A leaf of a predicate template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermPattern {
    /// Hole 0: the node under consideration.
    Node,
    /// Hole 1: the key under consideration.
    Key,
    /// A field of the node hole.
    Field(String),
    Min,
    Max,
    Null,
    True,
    False,
}

/// A predicate template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pred {
    True,
    False,
    Compare(Comparator, TermPattern, TermPattern),
    And(Vec<Pred>),
    Or(Vec<Pred>),
    Not(Box<Pred>),
    Implies(Box<Pred>, Box<Pred>),
    /// The key hole is in the node's flow.
    KeyInFlow,
    /// The given term is in the node's flow.
    TermInFlow(TermPattern),
    /// Every data value in the closed range is in the node's flow.
    RangeInFlow(TermPattern, TermPattern),
    /// The node's flow is non-empty.
    HasFlow,
    /// The node's flow is empty.
    NoFlow,
}

/// A named predicate template with up to two holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: String,
    pub body: Pred,
}

impl Predicate {
    pub fn new(name: impl Into<String>, body: Pred) -> Self {
        Predicate {
            name: name.into(),
            body,
        }
    }

    /// The always-true template.
    pub fn trivial(name: impl Into<String>) -> Self {
        Predicate::new(name, Pred::True)
    }

    /// The always-false template.
    pub fn empty(name: impl Into<String>) -> Self {
        Predicate::new(name, Pred::False)
    }

    /// Instantiates the template at the logic level, against a memory
    /// axiom: fields resolve to the axiom's field symbols, flow facts to
    /// inflow axioms over the axiom's flow symbol.
    ///
    /// Only the conjunctive fragment (with one implication level) can be
    /// expressed as logic conjuncts; templates using `Or`, `Not`, or
    /// nested implications are rejected with a configuration error.
    /// The SMT-level instantiation in the encoding layer has no such
    /// restriction.
    pub fn on_memory(
        &self,
        mem: &MemoryAxiom,
        key: Option<SymbolicExpr>,
        pool: &SymbolPool,
    ) -> EngineResult<Vec<Conjunct>> {
        let term = |pattern: &TermPattern| -> EngineResult<SymbolicExpr> {
            Ok(match pattern {
                TermPattern::Node => SymbolicExpr::Symbol(mem.node),
                TermPattern::Key => key.ok_or_else(|| {
                    EngineError::config(format!(
                        "template '{}' uses the key hole in a one-hole position",
                        self.name
                    ))
                })?,
                TermPattern::Field(field) => {
                    SymbolicExpr::Symbol(mem.field(field).ok_or_else(|| {
                        EngineError::config(format!(
                            "template '{}' projects unknown field '{}'",
                            self.name, field
                        ))
                    })?)
                }
                TermPattern::Min => SymbolicExpr::Min,
                TermPattern::Max => SymbolicExpr::Max,
                TermPattern::Null => SymbolicExpr::Null,
                TermPattern::True => SymbolicExpr::True,
                TermPattern::False => SymbolicExpr::False,
            })
        };

        // Lowers one conjunctive level to axioms.
        fn atoms(
            predicate: &Predicate,
            pred: &Pred,
            mem: &MemoryAxiom,
            term: &dyn Fn(&TermPattern) -> EngineResult<SymbolicExpr>,
            pool: &SymbolPool,
        ) -> EngineResult<Vec<Axiom>> {
            Ok(match pred {
                Pred::True => vec![],
                Pred::False => vec![Axiom::contradiction()],
                Pred::Compare(op, lhs, rhs) => {
                    vec![Axiom::Stack(StackAxiom::new(
                        *op,
                        term(lhs)?,
                        term(rhs)?,
                        pool,
                    )?)]
                }
                Pred::And(parts) => {
                    let mut out = Vec::new();
                    for part in parts {
                        out.extend(atoms(predicate, part, mem, term, pool)?);
                    }
                    out
                }
                Pred::KeyInFlow => vec![Axiom::InflowHasValue {
                    flow: mem.flow,
                    value: term(&TermPattern::Key)?,
                }],
                Pred::TermInFlow(t) => vec![Axiom::InflowHasValue {
                    flow: mem.flow,
                    value: term(t)?,
                }],
                Pred::RangeInFlow(lo, hi) => vec![Axiom::InflowHasRange {
                    flow: mem.flow,
                    low: term(lo)?,
                    high: term(hi)?,
                }],
                Pred::HasFlow => vec![Axiom::InflowEmpty {
                    flow: mem.flow,
                    is_empty: false,
                }],
                Pred::NoFlow => vec![Axiom::InflowEmpty {
                    flow: mem.flow,
                    is_empty: true,
                }],
                Pred::Or(_) | Pred::Not(_) | Pred::Implies(..) => {
                    return Err(EngineError::config(format!(
                        "template '{}' is not conjunctive at the logic level",
                        predicate.name
                    )))
                }
            })
        }

        match &self.body {
            Pred::Implies(premise, conclusion) => {
                let premise = atoms(self, premise, mem, &term, pool)?;
                let conclusion = atoms(self, conclusion, mem, &term, pool)?;
                Ok(vec![Conjunct::Implication(Implication {
                    premise,
                    conclusion,
                })])
            }
            Pred::And(parts) => {
                let mut out = Vec::new();
                for part in parts {
                    match part {
                        Pred::Implies(premise, conclusion) => {
                            let premise = atoms(self, premise, mem, &term, pool)?;
                            let conclusion = atoms(self, conclusion, mem, &term, pool)?;
                            out.push(Conjunct::Implication(Implication {
                                premise,
                                conclusion,
                            }));
                        }
                        other => {
                            for axiom in atoms(self, other, mem, &term, pool)? {
                                out.push(Conjunct::Axiom(axiom));
                            }
                        }
                    }
                }
                Ok(out)
            }
            other => Ok(atoms(self, other, mem, &term, pool)?
                .into_iter()
                .map(Conjunct::Axiom)
                .collect()),
        }
    }

    /// The field names the template projects from its node hole.
    pub fn projected_fields(&self) -> Vec<&str> {
        fn walk<'a>(pred: &'a Pred, out: &mut Vec<&'a str>) {
            let mut term = |t: &'a TermPattern| {
                if let TermPattern::Field(name) = t {
                    out.push(name.as_str());
                }
            };
            match pred {
                Pred::Compare(_, lhs, rhs) => {
                    term(lhs);
                    term(rhs);
                }
                Pred::And(ps) | Pred::Or(ps) => ps.iter().for_each(|p| walk(p, out)),
                Pred::Not(p) => walk(p, out),
                Pred::Implies(p, q) => {
                    walk(p, out);
                    walk(q, out);
                }
                Pred::TermInFlow(t) => term(t),
                Pred::RangeInFlow(lo, hi) => {
                    term(lo);
                    term(hi);
                }
                Pred::True | Pred::False | Pred::KeyInFlow | Pred::HasFlow | Pred::NoFlow => {}
            }
        }
        let mut out = Vec::new();
        walk(&self.body, &mut out);
        out
    }
}

/// The flow domain: which record type flows travel over, whether updates
/// can only shrink outflow, and the per-field outflow templates.
#[derive(Debug, Clone)]
pub struct FlowDomain {
    /// The node type of the data structure.
    pub node_type: TypeId,
    /// `true` if every update may only decrease outflow. Non-decreasing
    /// domains additionally require loop-free footprints.
    pub decreasing: bool,
    /// Outflow template per pointer field: `outflow(node, key)` holds iff
    /// the node forwards the key along that field.
    pub outflow: Vec<(String, Predicate)>,
}

impl FlowDomain {
    pub fn outflow_of(&self, field: &str) -> Option<&Predicate> {
        self.outflow
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, p)| p)
    }
}

/// A configuration inconsistency, reported before verification starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("flow domain node type '{ty}' is not a pointer record type")]
    NodeTypeNotPointer { ty: String },

    #[error("no outflow predicate for pointer field '{field}'")]
    MissingOutflow { field: String },

    #[error("outflow predicate given for '{field}', which is not a pointer field")]
    OutflowOnNonPointerField { field: String },

    #[error("predicate '{predicate}' projects unknown field '{field}'")]
    UnknownField { predicate: String, field: String },

    #[error("variable invariant given for unshared variable '{var}'")]
    InvariantOnLocalVariable { var: String },

    #[error("footprint depth must be positive")]
    ZeroFootprintDepth,
}

/// Everything the engine needs to know about the verified structure.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Upper bound on the footprint exploration depth.
    pub max_footprint_depth: usize,
    pub flow_domain: FlowDomain,
    /// `contains(node, key)`: the node logically contains the key.
    pub contains_key: Predicate,
    /// Invariant of every shared node, one hole (the node).
    pub shared_node_invariant: Predicate,
    /// Invariant of freshly allocated, still-local nodes.
    pub local_node_invariant: Predicate,
    /// Per shared variable: an invariant over its value (the node hole).
    pub variable_invariants: Vec<(VarId, Predicate)>,
    /// Raise [`EngineErrorKind::SolverUnknown`] on UNKNOWN instead of
    /// conservatively answering "not implied".
    ///
    /// [`EngineErrorKind::SolverUnknown`]: crate::error::EngineErrorKind::SolverUnknown
    pub strict_unknown: bool,
    /// Retry a query once before acting on UNKNOWN.
    pub retry_on_unknown: bool,
    /// Discharge batched implications as one disjunctive query instead of
    /// one query per conclusion.
    pub holistic_check: bool,
    /// Additionally assert pairwise keyset disjointness of known cells as
    /// background. Kept as a toggle; a no-op when unset.
    pub unique_inflow: bool,
}

impl SolverConfig {
    /// A configuration with conservative flags and the given structure
    /// description.
    pub fn new(
        max_footprint_depth: usize,
        flow_domain: FlowDomain,
        contains_key: Predicate,
        shared_node_invariant: Predicate,
        local_node_invariant: Predicate,
    ) -> Self {
        SolverConfig {
            max_footprint_depth,
            flow_domain,
            contains_key,
            shared_node_invariant,
            local_node_invariant,
            variable_invariants: Vec::new(),
            strict_unknown: false,
            retry_on_unknown: true,
            holistic_check: false,
            unique_inflow: false,
        }
    }

    /// Checks the configuration against a program.
    pub fn validate(&self, program: &Program) -> Result<(), ConfigError> {
        if self.max_footprint_depth == 0 {
            return Err(ConfigError::ZeroFootprintDepth);
        }
        let node_type = program.types.get(self.flow_domain.node_type);
        if node_type.sort != Sort::Ptr {
            return Err(ConfigError::NodeTypeNotPointer {
                ty: node_type.name.clone(),
            });
        }

        // Every pointer field needs an outflow template, and only pointer
        // fields may have one.
        for (field, field_ty) in &node_type.fields {
            if program.types.sort(*field_ty) == Sort::Ptr
                && self.flow_domain.outflow_of(field).is_none()
            {
                return Err(ConfigError::MissingOutflow {
                    field: field.clone(),
                });
            }
        }
        for (field, _) in &self.flow_domain.outflow {
            match node_type.field(field) {
                Some(ty) if program.types.sort(ty) == Sort::Ptr => {}
                _ => {
                    return Err(ConfigError::OutflowOnNonPointerField {
                        field: field.clone(),
                    })
                }
            }
        }

        // Templates may only project declared fields.
        let all_predicates = self
            .flow_domain
            .outflow
            .iter()
            .map(|(_, p)| p)
            .chain([
                &self.contains_key,
                &self.shared_node_invariant,
                &self.local_node_invariant,
            ])
            .chain(self.variable_invariants.iter().map(|(_, p)| p));
        for predicate in all_predicates {
            for field in predicate.projected_fields() {
                if !node_type.has_field(field) {
                    return Err(ConfigError::UnknownField {
                        predicate: predicate.name.clone(),
                        field: field.to_string(),
                    });
                }
            }
        }

        for (var, _) in &self.variable_invariants {
            if !program.var(*var).shared {
                return Err(ConfigError::InvariantOnLocalVariable {
                    var: program.var(*var).name.clone(),
                });
            }
        }

        Ok(())
    }

    /// The pointer fields of the node type, with their outflow templates.
    pub fn pointer_fields(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.flow_domain
            .outflow
            .iter()
            .map(|(f, p)| (f.as_str(), p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyflow_language::TypeTable;

    fn list_program() -> (Program, TypeId) {
        let mut types = TypeTable::new();
        let node = types.declare("Node", vec![("val".to_string(), TypeTable::DATA)]);
        types.add_field(node, "next", node);
        (Program::new("p", types), node)
    }

    fn list_config(node: TypeId) -> SolverConfig {
        SolverConfig::new(
            2,
            FlowDomain {
                node_type: node,
                decreasing: true,
                outflow: vec![(
                    "next".to_string(),
                    Predicate::new(
                        "outflow-next",
                        Pred::Compare(
                            Comparator::Gt,
                            TermPattern::Key,
                            TermPattern::Field("val".to_string()),
                        ),
                    ),
                )],
            },
            Predicate::new(
                "contains",
                Pred::Compare(Comparator::Eq, TermPattern::Field("val".to_string()), TermPattern::Key),
            ),
            Predicate::trivial("shared-inv"),
            Predicate::trivial("local-inv"),
        )
    }

    #[test]
    fn valid_config_passes() {
        let (program, node) = list_program();
        assert!(list_config(node).validate(&program).is_ok());
    }

    #[test]
    fn missing_outflow_is_reported() {
        let (program, node) = list_program();
        let mut config = list_config(node);
        config.flow_domain.outflow.clear();
        assert!(matches!(
            config.validate(&program),
            Err(ConfigError::MissingOutflow { .. })
        ));
    }

    #[test]
    fn unknown_field_is_reported() {
        let (program, node) = list_program();
        let mut config = list_config(node);
        config.contains_key = Predicate::new(
            "contains",
            Pred::Compare(
                Comparator::Eq,
                TermPattern::Field("mark".to_string()),
                TermPattern::Key,
            ),
        );
        assert!(matches!(
            config.validate(&program),
            Err(ConfigError::UnknownField { .. })
        ));
    }

    #[test]
    fn zero_depth_is_rejected() {
        let (program, node) = list_program();
        let mut config = list_config(node);
        config.max_footprint_depth = 0;
        assert_eq!(
            config.validate(&program),
            Err(ConfigError::ZeroFootprintDepth)
        );
    }

    #[test]
    fn projected_fields_walks_the_tree() {
        let pred = Predicate::new(
            "inv",
            Pred::Implies(
                Box::new(Pred::HasFlow),
                Box::new(Pred::And(vec![
                    Pred::TermInFlow(TermPattern::Field("val".to_string())),
                    Pred::Compare(
                        Comparator::Neq,
                        TermPattern::Field("next".to_string()),
                        TermPattern::Null,
                    ),
                ])),
            ),
        );
        let fields = pred.projected_fields();
        assert!(fields.contains(&"val"));
        assert!(fields.contains(&"next"));
    }
}
