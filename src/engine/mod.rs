//! Query engine for sonda
//!
//! The engine wires the pieces together:
//! 1. Session - pick a provider and build a runtime over the bundled resources
//! 2. Evaluation - run a compiled query against that runtime
//! 3. Report - render the result as text or JSON

pub mod report;
pub mod session;

pub use session::Session;
