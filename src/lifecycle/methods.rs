//! Per-type lifecycle hook lookup

use crate::describe::{AnyInstance, Describe, DiscoveredMethod, DiscoveryError, Marker, TypeDescriptor, find_marked_methods};
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

/// The start and stop hooks of one concrete type, in declared order.
#[derive(Debug, Clone, Default)]
pub struct LifeCycleMethods {
    start: Vec<DiscoveredMethod>,
    stop: Vec<DiscoveredMethod>,
}

impl LifeCycleMethods {
    pub fn resolve(descriptor: &TypeDescriptor) -> Result<Self, DiscoveryError> {
        Ok(Self {
            start: find_marked_methods(descriptor, Marker::PostConstruct)?,
            stop: find_marked_methods(descriptor, Marker::PreDestroy)?,
        })
    }

    pub fn has_start(&self) -> bool {
        !self.start.is_empty()
    }

    pub fn has_stop(&self) -> bool {
        !self.stop.is_empty()
    }

    pub fn start_methods(&self) -> &[DiscoveredMethod] {
        &self.start
    }

    pub fn stop_methods(&self) -> &[DiscoveredMethod] {
        &self.stop
    }
}

/// Invoke one discovered hook on `instance`.
pub(crate) fn invoke(method: &DiscoveredMethod, instance: &AnyInstance) -> anyhow::Result<()> {
    method.target().invoke_hook(instance)
}

/// Cache of [`LifeCycleMethods`] keyed by concrete type.
#[derive(Default)]
pub struct LifeCycleMethodsMap {
    methods: DashMap<TypeId, Arc<LifeCycleMethods>>,
}

impl LifeCycleMethodsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: Describe>(&self) -> Result<Arc<LifeCycleMethods>, DiscoveryError> {
        let type_id = TypeId::of::<T>();
        if let Some(found) = self.methods.get(&type_id) {
            return Ok(Arc::clone(found.value()));
        }
        let resolved = Arc::new(LifeCycleMethods::resolve(&T::describe())?);
        Ok(Arc::clone(self.methods.entry(type_id).or_insert(resolved).value()))
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
