//! Verification verdicts.

use std::fmt;

/// The outcome of a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every interface function is linearizable against the sequential
    /// set specification.
    Linearizable,
    /// A specification or invariant violation was found.
    NotLinearizable { reason: String },
    /// The verifier could not decide within its resource bounds.
    Unknown { reason: String },
}

impl Verdict {
    pub fn is_linearizable(&self) -> bool {
        matches!(self, Verdict::Linearizable)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Linearizable => write!(f, "linearizable"),
            Verdict::NotLinearizable { reason } => {
                write!(f, "not linearizable: {}", reason)
            }
            Verdict::Unknown { reason } => write!(f, "unknown: {}", reason),
        }
    }
}
