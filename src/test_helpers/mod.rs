// Test Helpers Module
//
// Simulated external actions shared by unit tests, integration tests and
// benchmarks.

pub mod simulated_action;

pub use simulated_action::{ActionSpan, SimulatedActionInvoker};
