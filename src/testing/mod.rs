//! Numerical gradient-checking harness used by integration tests to
//! validate the analytic backward passes implemented across the
//! operator library (§8).

pub mod grad_check;

pub use grad_check::{grad_check, GradCheckReport};
