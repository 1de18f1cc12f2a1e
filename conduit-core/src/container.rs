// Controller container

use crate::action::{Controller, controller_name};
use crate::error::DependencyResolutionError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Produces controller instances by type name.
pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, type_name: &str) -> Result<Arc<dyn Controller>, DependencyResolutionError>;
}

type ControllerFactory = Arc<dyn Fn() -> Arc<dyn Controller> + Send + Sync>;

#[derive(Clone)]
enum Binding {
    Singleton(Arc<dyn Controller>),
    Transient(ControllerFactory),
}

/// Controller registry used as the default [`DependencyResolver`].
///
/// Controllers are keyed by their type name, the same name
/// [`RouteAction::method`](crate::action::RouteAction::method) records.
#[derive(Clone, Default)]
pub struct Container {
    bindings: Arc<RwLock<HashMap<String, Binding>>>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new controller container");
        Self::default()
    }

    /// Register a shared controller instance.
    pub fn register<C: Controller>(&self, instance: C) {
        let type_name = controller_name::<C>();
        trace!(controller = type_name, "Acquiring write lock for registration");
        self.bindings
            .write()
            .insert(type_name.to_string(), Binding::Singleton(Arc::new(instance)));
        debug!(controller = type_name, "Controller registered");
    }

    /// Register a factory; each resolution gets a fresh controller.
    pub fn register_factory<C: Controller, F>(&self, factory: F)
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        let type_name = controller_name::<C>();
        let factory: ControllerFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn Controller>);
        self.bindings
            .write()
            .insert(type_name.to_string(), Binding::Transient(factory));
        debug!(controller = type_name, "Controller factory registered");
    }

    /// Register an instance under an explicit name.
    pub fn register_named(&self, name: impl Into<String>, instance: Arc<dyn Controller>) {
        let name = name.into();
        debug!(controller = %name, "Controller registered by name");
        self.bindings.write().insert(name, Binding::Singleton(instance));
    }

    pub fn has(&self, type_name: &str) -> bool {
        let exists = self.bindings.read().contains_key(type_name);
        trace!(controller = type_name, exists, "Checked controller existence");
        exists
    }

    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    pub fn clear(&self) {
        let mut bindings = self.bindings.write();
        let count = bindings.len();
        bindings.clear();
        debug!(controller_count = count, "Cleared all controllers from container");
    }
}

impl DependencyResolver for Container {
    fn resolve(&self, type_name: &str) -> Result<Arc<dyn Controller>, DependencyResolutionError> {
        trace!(controller = type_name, "Attempting to resolve controller");
        // Clone the binding out so factories run without the lock held.
        let binding = self.bindings.read().get(type_name).cloned();

        match binding {
            Some(Binding::Singleton(instance)) => Ok(instance),
            Some(Binding::Transient(factory)) => Ok(factory()),
            None => {
                debug!(controller = type_name, "Controller not found in container");
                Err(DependencyResolutionError {
                    type_name: type_name.to_string(),
                    reason: "no controller registered under this name".to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bindings = self.bindings.read();
        let mut names: Vec<_> = bindings.keys().collect();
        names.sort();
        f.debug_struct("Container").field("controllers", &names).finish()
    }
}
