//! Method discovery over descriptor graphs
//!
//! The graph of a type is its own declared methods, then its parent chain,
//! then each capability depth-first. Earlier entries are more derived.

use super::descriptor::{Marker, MethodDescriptor, TypeDescriptor};
use super::value::ValueType;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("#[{marker}] methods cannot have arguments: {signature}")]
    HookHasParameters { marker: Marker, signature: String },
}

/// A marked method together with the declaration that is actually invoked.
#[derive(Debug, Clone)]
pub struct DiscoveredMethod {
    declaration: Arc<MethodDescriptor>,
    target: Arc<MethodDescriptor>,
}

impl DiscoveredMethod {
    pub fn name(&self) -> &str {
        self.declaration.name()
    }

    /// The declaration that carries the marker
    pub fn declaration(&self) -> &Arc<MethodDescriptor> {
        &self.declaration
    }

    /// The most-derived implementation with the same signature
    pub fn target(&self) -> &Arc<MethodDescriptor> {
        &self.target
    }
}

/// Find every method carrying `marker`, most-derived first, one per name.
///
/// Lifecycle markers may sit on non-public methods, but never on methods
/// that take parameters.
pub fn find_marked_methods(
    descriptor: &TypeDescriptor,
    marker: Marker,
) -> Result<Vec<DiscoveredMethod>, DiscoveryError> {
    let mut used = HashSet::new();
    let mut found = Vec::new();
    collect_marked(descriptor, descriptor, marker, &mut used, &mut found)?;
    Ok(found)
}

fn collect_marked(
    root: &TypeDescriptor,
    current: &TypeDescriptor,
    marker: Marker,
    used: &mut HashSet<String>,
    found: &mut Vec<DiscoveredMethod>,
) -> Result<(), DiscoveryError> {
    for method in current.declared_methods() {
        if method.is_synthetic() || !method.has(marker) || used.contains(method.name()) {
            continue;
        }
        if marker.is_lifecycle() && !method.parameters().is_empty() {
            return Err(DiscoveryError::HookHasParameters {
                marker,
                signature: method.signature(),
            });
        }
        used.insert(method.name().to_string());
        found.push(DiscoveredMethod {
            declaration: Arc::clone(method),
            target: resolve_target(root, method),
        });
    }

    if let Some(parent) = current.parent() {
        collect_marked(root, parent, marker, used, found)?;
    }
    for capability in current.capabilities() {
        collect_marked(root, capability, marker, used, found)?;
    }
    Ok(())
}

/// Find the config-marked declaration of every public instance method.
pub fn find_config_methods(descriptor: &TypeDescriptor) -> Vec<DiscoveredMethod> {
    let mut seen: HashSet<(String, Vec<ValueType>)> = HashSet::new();
    let mut found = Vec::new();
    for method in graph_methods(descriptor) {
        if method.is_synthetic() || method.is_associated() || !method.is_public() {
            continue;
        }
        let key = (method.name().to_string(), method.parameters().to_vec());
        if !seen.insert(key) {
            continue;
        }
        if let Some(declaration) = find_marked_declaration(descriptor, &method, Marker::Config) {
            let target = resolve_target(descriptor, &declaration);
            found.push(DiscoveredMethod {
                declaration,
                target,
            });
        }
    }
    found
}

fn find_marked_declaration(
    current: &TypeDescriptor,
    signature: &MethodDescriptor,
    marker: Marker,
) -> Option<Arc<MethodDescriptor>> {
    let declared = current
        .declared_methods()
        .iter()
        .find(|method| method.same_signature(signature) && method.has(marker));
    if let Some(method) = declared {
        return Some(Arc::clone(method));
    }
    if let Some(found) = current
        .parent()
        .and_then(|parent| find_marked_declaration(parent, signature, marker))
    {
        return Some(found);
    }
    current
        .capabilities()
        .iter()
        .find_map(|capability| find_marked_declaration(capability, signature, marker))
}

/// The most-derived implementation of `declaration`, or the declaration itself
/// when nothing in the graph implements it.
pub fn resolve_target(
    descriptor: &TypeDescriptor,
    declaration: &Arc<MethodDescriptor>,
) -> Arc<MethodDescriptor> {
    graph_methods(descriptor)
        .into_iter()
        .find(|method| {
            !method.is_synthetic() && method.has_invoker() && method.same_signature(declaration)
        })
        .unwrap_or_else(|| Arc::clone(declaration))
}

/// Every declared method in the graph, most-derived first.
pub fn graph_methods(descriptor: &TypeDescriptor) -> Vec<Arc<MethodDescriptor>> {
    let mut methods = Vec::new();
    push_graph(descriptor, &mut methods);
    methods
}

fn push_graph(current: &TypeDescriptor, methods: &mut Vec<Arc<MethodDescriptor>>) {
    methods.extend(current.declared_methods().iter().cloned());
    if let Some(parent) = current.parent() {
        push_graph(parent, methods);
    }
    for capability in current.capabilities() {
        push_graph(capability, methods);
    }
}

/// Declared methods of the type and its parent chain, capabilities excluded.
pub fn class_chain_methods(descriptor: &TypeDescriptor) -> Vec<Arc<MethodDescriptor>> {
    let mut methods = Vec::new();
    let mut current = Some(descriptor);
    while let Some(ty) = current {
        methods.extend(ty.declared_methods().iter().cloned());
        current = ty.parent().map(Arc::as_ref);
    }
    methods
}

/// A public instance method with the given name and parameters, most-derived first.
pub fn find_public_method(
    descriptor: &TypeDescriptor,
    name: &str,
    params: &[ValueType],
) -> Option<Arc<MethodDescriptor>> {
    graph_methods(descriptor).into_iter().find(|method| {
        method.name() == name
            && method.parameters() == params
            && method.is_public()
            && !method.is_associated()
            && !method.is_synthetic()
    })
}
