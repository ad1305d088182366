//! # Registry Infrastructure
//!
//! Routing of task action references to the invokers that run them.
//!
//! - **ActionRegistry**: component id → [`ActionInvoker`](crate::orchestration::ActionInvoker),
//!   plus one invoker for direct `componentUrl` addressing

pub mod action_registry;

pub use action_registry::{ActionRegistry, ActionRegistryStats};
