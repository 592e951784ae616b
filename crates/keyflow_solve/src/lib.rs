//! # keyflow-solve
//!
//! The verification engine of keyflow: everything between the logic IR
//! and the SMT solver.
//!
//! The crate lowers annotations into a two-state Z3 encoding (`Now` and
//! `Next` of one atomic step), computes per-command post-images with
//! bounded flow-footprint exploration, classifies every heap write as
//! pure or as the insertion/deletion of exactly one key, and offers the
//! verifier loop its working set: join, stabilization against
//! interference effects, and effect subsumption.
//!
//! ## Modules
//!
//! - [`config`] — flow-domain configuration and predicate templates
//! - [`backend`] — the narrow SMT wrapper
//! - [`encoding`] — the two-state encoding
//! - [`checker`] — the implication checker
//! - [`graph`] — the bounded footprint graph
//! - [`post`] — per-command post-images
//! - [`solver`] — the facade the verifier drives
//! - [`error`] — engine errors
//!
//! ## Resource model
//!
//! Z3 contexts are scoped per query: each facade operation creates its
//! context, runs its checks, and drops everything on return. The symbol
//! pool is owned by the caller and only ever grows.

pub mod backend;
pub mod checker;
pub mod config;
pub mod encoding;
pub mod error;
pub mod graph;
pub mod post;
pub mod solver;

pub use backend::{Backend, SatVerdict};
pub use checker::ImplicationChecker;
pub use config::{ConfigError, FlowDomain, Pred, Predicate, SolverConfig, TermPattern};
pub use encoding::{Encoding, Epoch};
pub use error::{EngineError, EngineErrorKind, EngineResult};
pub use post::{PostCommand, PostImage};
pub use solver::Solver;
