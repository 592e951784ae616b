//! # keyflow-prove
//!
//! The top-level verifier loop: drives per-function symbolic execution,
//! accumulates the interference set, and iterates to a fixed point.
//!
//! ```text
//! interference := ∅
//! repeat:
//!   for each interface function f:
//!     verify f under interference, collecting new effects
//!   consolidate new effects into interference
//! until interference stopped growing
//! ⇒ linearizable
//! ```
//!
//! The outcome is a [`Verdict`], never an exception: specification and
//! invariant violations map to [`Verdict::NotLinearizable`], resource
//! bounds (footprint depth, solver UNKNOWN) to [`Verdict::Unknown`].
//! Configuration and construct errors surface as [`EngineError`]s.

pub mod interference;
pub mod verdict;
pub mod verifier;

pub use verdict::Verdict;
pub use verifier::check_linearizability;

pub use keyflow_solve::{EngineError, EngineResult};
