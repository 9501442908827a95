//! Rill Test Harness - Recording sinks and propagation scenarios
//!
//! This crate provides:
//! - Recording sinks that capture every delivery
//! - Faulty sinks for partial-failure testing
//! - Chain and fan-out topology builders
//! - Tracing setup for tests and benches
//! - End-to-end propagation test suites

pub mod faulty;
pub mod integration;
pub mod logging;
pub mod recorder;
pub mod topology;

pub use faulty::*;
pub use integration::*;
pub use logging::*;
pub use recorder::*;
pub use topology::*;
