//! # sqlward-core
//!
//! Policy model and shared types for sqlward.
//!
//! This crate provides:
//! - The declarative allow-list [`Policy`] (tables, columns, row-level
//!   restrictions) and its loaders for JSON and YAML
//! - Policy validation into an immutable [`CompiledPolicy`] with
//!   restrictions as an exhaustively-matched sum type
//! - The [`Verdict`] returned to callers after query analysis
//!
//! A policy is constructed once per request, validated immediately, and
//! shared read-only across verification calls.

pub mod compiled;
pub mod error;
pub mod policy;
pub mod value;
pub mod verdict;

pub use compiled::{CmpOp, CompiledPolicy, CompiledTable, Restriction};
pub use error::{PolicyError, PolicyErrorKind, PolicyLoadError};
pub use policy::{Policy, RestrictionSpec, TablePolicy};
pub use value::ScalarValue;
pub use verdict::Verdict;
