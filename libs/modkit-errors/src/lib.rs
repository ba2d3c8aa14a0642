//! Error data types shared by the modkit action engine.
//!
//! - RFC 9457 Problem Details (`Problem`)
//! - The error class catalog (`ErrorClass`) every engine failure is classified into
//! - Field-level validation violations (`ValidationViolation`)
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod catalog;
pub mod problem;

pub use catalog::ErrorClass;
pub use problem::{APPLICATION_PROBLEM_JSON, Problem, ValidationViolation};
