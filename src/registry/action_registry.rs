//! # Action Registry
//!
//! Routes a task's [`ActionRef`] to the [`ActionInvoker`] that runs it.
//!
//! Named actions are resolved by component id. Direct `componentUrl`
//! addressing goes to a single URL invoker. An unresolvable action is an
//! [`ActionError`], which the executor turns into a task-level error.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::ActionRef;
use crate::orchestration::types::{ActionError, ActionInvoker};

/// Registry statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRegistryStats {
    pub total_components: usize,
    pub components: Vec<String>,
    pub has_url_invoker: bool,
}

#[derive(Default)]
pub struct ActionRegistry {
    components: DashMap<String, Arc<dyn ActionInvoker>>,
    url_invoker: RwLock<Option<Arc<dyn ActionInvoker>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the invoker for a component id, replacing any previous one
    pub fn register_component(&self, component: impl Into<String>, invoker: Arc<dyn ActionInvoker>) {
        let component = component.into();
        if self.components.insert(component.clone(), invoker).is_some() {
            debug!(component = %component, "Replaced action invoker");
        } else {
            info!(component = %component, "Registered action invoker");
        }
    }

    pub fn unregister_component(&self, component: &str) -> bool {
        self.components.remove(component).is_some()
    }

    /// Set the invoker used for direct `componentUrl` addressing
    pub fn set_url_invoker(&self, invoker: Arc<dyn ActionInvoker>) {
        *self.url_invoker.write() = Some(invoker);
    }

    pub fn contains_component(&self, component: &str) -> bool {
        self.components.contains_key(component)
    }

    pub fn resolve(&self, action: &ActionRef) -> Result<Arc<dyn ActionInvoker>, ActionError> {
        match action {
            ActionRef::Named { component, .. } => self
                .components
                .get(component)
                .map(|entry| Arc::clone(entry.value()))
                .ok_or_else(|| ActionError::UnknownComponent(component.clone())),
            ActionRef::Direct { url } => self
                .url_invoker
                .read()
                .clone()
                .ok_or_else(|| ActionError::Invocation(format!("No invoker for component URL {url}"))),
        }
    }

    pub fn stats(&self) -> ActionRegistryStats {
        let mut components: Vec<String> =
            self.components.iter().map(|e| e.key().clone()).collect();
        components.sort();

        ActionRegistryStats {
            total_components: components.len(),
            components,
            has_url_invoker: self.url_invoker.read().is_some(),
        }
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("ActionRegistry")
            .field("components", &stats.components)
            .field("has_url_invoker", &stats.has_url_invoker)
            .finish()
    }
}
