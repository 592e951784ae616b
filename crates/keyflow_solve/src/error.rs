//! Engine errors.
//!
//! Failures are outcomes, not control flow: every fallible engine
//! operation returns [`EngineResult`]. The driver maps verification
//! failures (`LinearizationFailure`, `InvariantViolation`,
//! `AssertionFailure`) to a negative verdict and resource-bound failures
//! (`FootprintTooSmall`, `SolverUnknown`) to an unknown verdict;
//! configuration and construct errors surface to the caller as errors.
//!
//! Panics are reserved for broken internal invariants of the engine
//! itself.

use std::fmt;

use keyflow_logic::LogicError;

/// Result type of engine operations.
pub type EngineResult<T = ()> = Result<T, EngineError>;

/// An engine failure with its location and an explanation.
#[derive(Debug, Clone)]
pub struct EngineError {
    /// The category of failure.
    pub kind: EngineErrorKind,
    /// The command or scope that triggered the failure, if known.
    pub at: Option<String>,
    /// Human-readable context.
    pub explanation: String,
}

/// The category of an engine failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// The flow-domain configuration is incomplete or inconsistent.
    Config { detail: String },

    /// The input program uses a feature the engine cannot soundly handle.
    UnsupportedConstruct { construct: String },

    /// The footprint exploration reached its depth bound without closing
    /// the invariant and specification obligations.
    FootprintTooSmall { depth: usize },

    /// A write violates the sequential specification.
    ///
    /// Carries the offending pre-state and the post-state the engine
    /// computed, rendered for the report.
    LinearizationFailure { pre: String, post: String },

    /// The next-state invariant cannot be established at a node.
    InvariantViolation { node: String },

    /// An `assert` is not entailed by the current state.
    AssertionFailure { condition: String },

    /// The SMT backend returned UNKNOWN and the strict flag is set.
    SolverUnknown,

    /// A broken invariant inside the engine. Always a bug.
    Internal { detail: String },
}

impl EngineError {
    fn of(kind: EngineErrorKind) -> Self {
        EngineError {
            kind,
            at: None,
            explanation: String::new(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::of(EngineErrorKind::Config {
            detail: detail.into(),
        })
    }

    pub fn unsupported(construct: impl Into<String>) -> Self {
        Self::of(EngineErrorKind::UnsupportedConstruct {
            construct: construct.into(),
        })
    }

    pub fn footprint_too_small(depth: usize) -> Self {
        Self::of(EngineErrorKind::FootprintTooSmall { depth })
    }

    pub fn linearization_failure(pre: impl Into<String>, post: impl Into<String>) -> Self {
        Self::of(EngineErrorKind::LinearizationFailure {
            pre: pre.into(),
            post: post.into(),
        })
    }

    pub fn invariant_violation(node: impl Into<String>) -> Self {
        Self::of(EngineErrorKind::InvariantViolation { node: node.into() })
    }

    pub fn assertion_failure(condition: impl Into<String>) -> Self {
        Self::of(EngineErrorKind::AssertionFailure {
            condition: condition.into(),
        })
    }

    pub fn solver_unknown() -> Self {
        Self::of(EngineErrorKind::SolverUnknown)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::of(EngineErrorKind::Internal {
            detail: detail.into(),
        })
    }

    /// Attaches the command or scope where the failure triggered.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.at = Some(location.into());
        self
    }

    /// Attaches human-readable context.
    pub fn because(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    /// `true` for the failures the driver reports as *not linearizable*.
    pub fn is_refutation(&self) -> bool {
        matches!(
            self.kind,
            EngineErrorKind::LinearizationFailure { .. }
                | EngineErrorKind::InvariantViolation { .. }
                | EngineErrorKind::AssertionFailure { .. }
        )
    }

    /// `true` for the failures the driver reports as *unknown*.
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self.kind,
            EngineErrorKind::FootprintTooSmall { .. } | EngineErrorKind::SolverUnknown
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EngineErrorKind::Config { detail } => {
                write!(f, "configuration error: {}", detail)?;
            }
            EngineErrorKind::UnsupportedConstruct { construct } => {
                write!(f, "unsupported construct: {}", construct)?;
            }
            EngineErrorKind::FootprintTooSmall { depth } => {
                write!(
                    f,
                    "footprint too small: could not close the update within depth {}",
                    depth
                )?;
            }
            EngineErrorKind::LinearizationFailure { pre, post } => {
                writeln!(f, "linearization failure")?;
                writeln!(f, "  pre:  {}", pre)?;
                write!(f, "  post: {}", post)?;
            }
            EngineErrorKind::InvariantViolation { node } => {
                write!(f, "cannot establish the node invariant at {}", node)?;
            }
            EngineErrorKind::AssertionFailure { condition } => {
                write!(f, "assertion does not hold: {}", condition)?;
            }
            EngineErrorKind::SolverUnknown => {
                write!(f, "the SMT solver returned UNKNOWN")?;
            }
            EngineErrorKind::Internal { detail } => {
                write!(f, "internal engine error: {}", detail)?;
            }
        }
        if let Some(at) = &self.at {
            write!(f, "\n  at: {}", at)?;
        }
        if !self.explanation.is_empty() {
            write!(f, "\n  note: {}", self.explanation)?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {}

impl From<LogicError> for EngineError {
    fn from(err: LogicError) -> Self {
        EngineError::internal(format!("malformed logic object: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_of_kinds() {
        assert!(EngineError::linearization_failure("p", "q").is_refutation());
        assert!(EngineError::invariant_violation("@1").is_refutation());
        assert!(EngineError::footprint_too_small(2).is_inconclusive());
        assert!(EngineError::solver_unknown().is_inconclusive());
        assert!(!EngineError::config("x").is_refutation());
        assert!(!EngineError::config("x").is_inconclusive());
    }

    #[test]
    fn display_carries_location() {
        let err = EngineError::unsupported("continue").at("while loop");
        let rendered = format!("{}", err);
        assert!(rendered.contains("continue"));
        assert!(rendered.contains("while loop"));
    }
}
