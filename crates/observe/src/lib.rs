//! Initialization logic for metrics and logging shared by binaries and
//! tests, plus logging helper functions.

pub mod metrics;
pub mod tracing;
