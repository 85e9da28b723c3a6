//! Configuration factory
//!
//! Builds typed configuration instances from an immutable property map.
//! Every problem of a build is collected before the build fails, so a single
//! pass reports all missing, malformed and deprecated properties at once.

use super::metadata::{AttributeMetadata, ConfigurationMetadata};
use super::problems::{ConfigurationError, Problems};
use crate::describe::discovery::class_chain_methods;
use crate::describe::{AnyInstance, Describe, Marker, coerce};
use dashmap::{DashMap, DashSet};
use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Receives configuration warnings as they are produced.
pub type WarningsMonitor = Arc<dyn Fn(&str) + Send + Sync>;

/// A configuration type bound under a property prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingKey {
    type_name: String,
    prefix: String,
    type_id: TypeId,
}

impl BindingKey {
    fn new<T: 'static>(type_name: &str, prefix: Option<&str>) -> Self {
        Self {
            type_name: type_name.to_string(),
            prefix: normalize_prefix(prefix),
            type_id: TypeId::of::<T>(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The prefix including its trailing dot, or empty
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn normalize_prefix(prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}."),
        _ => String::new(),
    }
}

pub struct ConfigurationFactory {
    properties: BTreeMap<String, String>,
    metadata_cache: DashMap<TypeId, Arc<ConfigurationMetadata>>,
    bindings: DashMap<BindingKey, Arc<ConfigurationMetadata>>,
    instances: DashMap<BindingKey, Arc<AnyInstance>>,
    used_properties: DashSet<String>,
    warnings_monitor: Option<WarningsMonitor>,
}

impl ConfigurationFactory {
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self {
            properties,
            metadata_cache: DashMap::new(),
            bindings: DashMap::new(),
            instances: DashMap::new(),
            used_properties: DashSet::new(),
            warnings_monitor: None,
        }
    }

    pub fn with_warnings_monitor(mut self, monitor: WarningsMonitor) -> Self {
        self.warnings_monitor = Some(monitor);
        self
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Property names consumed by any build so far
    pub fn used_properties(&self) -> BTreeSet<String> {
        self.used_properties.iter().map(|name| name.key().clone()).collect()
    }

    /// Supplied property names no build has consumed
    pub fn unused_properties(&self) -> BTreeSet<String> {
        self.properties
            .keys()
            .filter(|name| !self.used_properties.contains(*name))
            .cloned()
            .collect()
    }

    /// Resolved metadata for `T`, cached per type.
    pub fn metadata<T: Describe>(&self) -> Arc<ConfigurationMetadata> {
        self.metadata_cache
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(ConfigurationMetadata::get::<T>()))
            .clone()
    }

    pub fn build<T: Describe>(&self) -> Result<T, ConfigurationError> {
        self.build_with_prefix::<T>(None)
    }

    /// Build a fresh `T` from the properties under `prefix`.
    pub fn build_with_prefix<T: Describe>(&self, prefix: Option<&str>) -> Result<T, ConfigurationError> {
        let metadata = self.metadata::<T>();
        let instance = self.build_erased(&metadata, &normalize_prefix(prefix), false)?;
        downcast_owned::<T>(instance, &metadata)
    }

    /// Build `T` from constructor state and default-value markers only.
    ///
    /// Supplied properties are ignored and missing required values are not an error.
    pub fn build_defaults<T: Describe>(&self) -> Result<T, ConfigurationError> {
        let metadata = self.metadata::<T>();
        let instance = self.build_erased(&metadata, "", true)?;
        downcast_owned::<T>(instance, &metadata)
    }

    /// Record `T` under `prefix` so that it is validated and reported.
    pub fn register<T: Describe>(&self, prefix: Option<&str>) -> BindingKey {
        let metadata = self.metadata::<T>();
        let key = BindingKey::new::<T>(metadata.type_name(), prefix);
        self.bindings.entry(key.clone()).or_insert(metadata);
        key
    }

    /// The shared instance of `T` under `prefix`, built on first use.
    pub fn get<T: Describe>(&self, prefix: Option<&str>) -> Result<Arc<T>, ConfigurationError> {
        let key = self.register::<T>(prefix);
        let instance = self.get_registered(&key)?;
        instance.downcast::<T>().map_err(|_| {
            ConfigurationError::single(format!(
                "Cached configuration for [{}] has an unexpected type",
                key.type_name()
            ))
        })
    }

    /// Build every registered binding and collect all of their problems.
    pub fn validate_registered(&self) -> Problems {
        let mut problems = Problems::new();
        for key in self.binding_keys() {
            if let Err(error) = self.get_registered(&key) {
                problems.extend(error.problems());
            }
        }
        problems
    }

    pub fn binding_keys(&self) -> Vec<BindingKey> {
        let mut keys: Vec<BindingKey> = self.bindings.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub(crate) fn binding_metadata(&self, key: &BindingKey) -> Option<Arc<ConfigurationMetadata>> {
        self.bindings.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn cached_instance(&self, key: &BindingKey) -> Option<Arc<AnyInstance>> {
        self.instances.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn defaults_erased(&self, metadata: &ConfigurationMetadata) -> Option<Box<AnyInstance>> {
        self.build_erased(metadata, "", true).ok()
    }

    pub(crate) fn get_registered(&self, key: &BindingKey) -> Result<Arc<AnyInstance>, ConfigurationError> {
        if let Some(instance) = self.cached_instance(key) {
            return Ok(instance);
        }
        let metadata = self.binding_metadata(key).ok_or_else(|| {
            ConfigurationError::single(format!(
                "Configuration [{}] is not registered",
                key.type_name()
            ))
        })?;
        let instance: Arc<AnyInstance> = Arc::from(self.build_erased(&metadata, key.prefix(), false)?);
        // concurrent first builds race here; the first stored instance wins
        let winner = self.instances.entry(key.clone()).or_insert(instance);
        Ok(Arc::clone(winner.value()))
    }

    fn build_erased(
        &self,
        metadata: &ConfigurationMetadata,
        prefix: &str,
        defaults_only: bool,
    ) -> Result<Box<AnyInstance>, ConfigurationError> {
        metadata.problems().throw_if_has_errors()?;
        let constructor = metadata.constructor().ok_or_else(|| {
            ConfigurationError::single(format!(
                "Configuration class [{}] does not have a public no-arg constructor",
                metadata.type_name()
            ))
        })?;

        let mut problems = Problems::new();
        let mut instance = constructor.instantiate();
        for attribute in metadata.attributes().values() {
            self.apply(instance.as_mut(), attribute, prefix, defaults_only, &mut problems);
        }

        if !defaults_only {
            for defunct in metadata.descriptor().defunct() {
                let property = format!("{prefix}{defunct}");
                if !defunct.is_empty() && self.properties.contains_key(&property) {
                    problems.add_error(format!(
                        "Defunct property '{property}' (class [{}]) cannot be configured.",
                        metadata.type_name()
                    ));
                }
            }
        }

        for method in class_chain_methods(metadata.descriptor()) {
            if method.is_abstract() && !method.has(Marker::Config) {
                problems.add_error(format!(
                    "Method [{}] is abstract but does not have an annotation",
                    method.signature()
                ));
            }
        }

        if let Some(monitor) = &self.warnings_monitor {
            for warning in problems.warnings() {
                monitor(warning);
            }
        }

        if problems.has_errors() {
            return Err(ConfigurationError::with_partial(problems, instance));
        }
        Ok(instance)
    }

    fn apply(
        &self,
        instance: &mut AnyInstance,
        attribute: &AttributeMetadata,
        prefix: &str,
        defaults_only: bool,
        problems: &mut Problems,
    ) {
        let Some(setter) = attribute.setter() else {
            return;
        };
        let property = format!("{prefix}{}", attribute.property_name());

        let mut supplied: Option<(String, &String)> = None;
        let mut conflicted = false;
        if !defaults_only {
            let legacy = attribute.legacy_names().iter().map(|name| (format!("{prefix}{name}"), true));
            for (name, is_legacy) in std::iter::once((property.clone(), false)).chain(legacy) {
                let Some(value) = self.properties.get(&name) else {
                    continue;
                };
                self.used_properties.insert(name.clone());
                if is_legacy {
                    problems.add_warning(format!(
                        "Configuration property '{name}' has been replaced. Use '{property}' instead."
                    ));
                }
                if let Some((operative, operative_value)) = supplied.as_ref() {
                    problems.add_error(format!(
                        "Configuration {} conflicts with {}",
                        describe_property(&name, value, attribute),
                        describe_property(operative, operative_value, attribute)
                    ));
                    conflicted = true;
                    continue;
                }
                supplied = Some((name, value));
            }
        }
        if conflicted {
            return;
        }

        let (property, supplied) = match supplied {
            Some((name, value)) => (name, Some(value)),
            None => (property, None),
        };
        if supplied.is_some() && attribute.is_deprecated() {
            problems.add_warning(format!(
                "Configuration property '{property}' is deprecated and should not be used"
            ));
        }

        let Some(raw) = supplied.map(String::as_str).or(attribute.default_value()) else {
            if setter.is_abstract() && !defaults_only {
                problems.add_error(format!(
                    "No value present for '{property}' in [{}]",
                    setter.signature()
                ));
            }
            return;
        };

        let Some(value_type) = attribute.value_type() else {
            return;
        };
        let Some(value) = coerce(value_type, raw) else {
            if attribute.is_sensitive() {
                problems.add_error(format!(
                    "Could not coerce value to {value_type} (property '{property}') in order to call [{}]",
                    setter.signature()
                ));
            } else {
                problems.add_error(format!(
                    "Could not coerce value '{raw}' to {value_type} (property '{property}') in order to call [{}]",
                    setter.signature()
                ));
            }
            return;
        };

        if let Err(error) = setter.invoke_setter(instance, value) {
            problems.add_error(format!(
                "Error invoking configuration method [{}]: {error}",
                setter.signature()
            ));
        }
    }
}

/// `property 'name' (=value)`, without the value when it is sensitive
fn describe_property(name: &str, value: &str, attribute: &AttributeMetadata) -> String {
    if attribute.is_sensitive() {
        format!("property '{name}'")
    } else {
        format!("property '{name}' (={value})")
    }
}

impl Default for ConfigurationFactory {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

fn downcast_owned<T: 'static>(
    instance: Box<AnyInstance>,
    metadata: &ConfigurationMetadata,
) -> Result<T, ConfigurationError> {
    instance.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        ConfigurationError::single(format!(
            "Constructor of [{}] produced an instance of another type",
            metadata.type_name()
        ))
    })
}
