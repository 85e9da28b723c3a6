//! Configuration metadata resolution
//!
//! Resolves the configurable attributes of a configuration type from its
//! descriptor and records every structural problem found along the way.
//! Resolution never fails: problems are collected and inspected by callers.

use super::problems::{ConfigurationError, Problems};
use crate::describe::discovery::{
    DiscoveredMethod, class_chain_methods, find_config_methods, find_public_method, resolve_target,
};
use crate::describe::{
    AnyInstance, ConfigValue, Constructor, Describe, Marker, MethodDescriptor, TypeDescriptor,
    ValueType,
};
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One configurable attribute of a configuration type.
#[derive(Debug, Clone)]
pub struct AttributeMetadata {
    config_type: String,
    name: String,
    property_name: String,
    description: Option<String>,
    default_value: Option<String>,
    legacy_names: Vec<String>,
    sensitive: bool,
    deprecated: bool,
    getter: Option<Arc<MethodDescriptor>>,
    setter: Option<Arc<MethodDescriptor>>,
}

impl AttributeMetadata {
    pub fn config_type(&self) -> &str {
        &self.config_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Former property names, relative to the prefix
    pub fn legacy_names(&self) -> &[String] {
        &self.legacy_names
    }

    pub fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub fn getter(&self) -> Option<&Arc<MethodDescriptor>> {
        self.getter.as_ref()
    }

    pub fn setter(&self) -> Option<&Arc<MethodDescriptor>> {
        self.setter.as_ref()
    }

    /// The type the setter takes
    pub fn value_type(&self) -> Option<ValueType> {
        self.setter
            .as_ref()
            .and_then(|setter| setter.parameters().first().copied())
    }

    /// Read the attribute's current value through its getter.
    pub fn read(&self, instance: &AnyInstance) -> Option<anyhow::Result<ConfigValue>> {
        self.getter
            .as_ref()
            .map(|getter| getter.invoke_getter(instance))
    }
}

/// The resolved configuration shape of one type.
#[derive(Debug, Clone)]
pub struct ConfigurationMetadata {
    descriptor: Arc<TypeDescriptor>,
    constructor: Option<Constructor>,
    attributes: BTreeMap<String, AttributeMetadata>,
    problems: Problems,
}

impl ConfigurationMetadata {
    pub fn get<T: Describe>() -> Self {
        Self::resolve(Arc::new(T::describe()), false)
    }

    /// Like [`get`](Self::get), failing when any structural error was found.
    pub fn get_valid<T: Describe>() -> Result<Self, ConfigurationError> {
        let metadata = Self::get::<T>();
        metadata.problems.throw_if_has_errors()?;
        Ok(metadata)
    }

    /// Resolve in legacy mode: abstract types are allowed and getters need no setter.
    pub fn get_legacy<T: Describe>() -> Self {
        Self::resolve(Arc::new(T::describe()), true)
    }

    pub fn resolve(descriptor: Arc<TypeDescriptor>, legacy: bool) -> Self {
        let mut problems = Problems::new();
        let type_name = descriptor.name().to_string();

        if !legacy && descriptor.is_abstract() {
            problems.add_error(format!("Config class [{type_name}] is abstract"));
        }
        if !descriptor.is_public() {
            problems.add_error(format!("Config class [{type_name}] is not public"));
        }

        let constructor = descriptor.constructor().cloned();
        match &constructor {
            Some(constructor) if !constructor.is_public() => {
                problems.add_error(format!("Constructor [{type_name}::new()] is not public"));
            }
            Some(_) => {}
            None => problems.add_error(format!(
                "Configuration class [{type_name}] does not have a public no-arg constructor"
            )),
        }

        let mut attributes: BTreeMap<String, AttributeMetadata> = BTreeMap::new();
        for method in find_config_methods(&descriptor) {
            let Some(attribute) = build_attribute(&descriptor, &method, legacy, &mut problems)
            else {
                continue;
            };
            if attributes.contains_key(&attribute.name) {
                problems.add_error(format!(
                    "Configuration class [{type_name}] Multiple methods are annotated for #[config] attribute [{}]",
                    attribute.name
                ));
                continue;
            }
            attributes.insert(attribute.name.clone(), attribute);
        }

        for method in class_chain_methods(&descriptor) {
            if !method.has(Marker::Config) {
                continue;
            }
            if !method.is_public() {
                problems.add_error(format!(
                    "#[config] method [{}] is not public",
                    method.signature()
                ));
            }
            if method.is_associated() {
                problems.add_error(format!(
                    "#[config] method [{}] is an associated function",
                    method.signature()
                ));
            }
        }

        if !problems.has_errors() && attributes.is_empty() {
            problems.add_error(format!(
                "Configuration class [{type_name}] does not have any #[config] annotations"
            ));
        }

        Self {
            descriptor,
            constructor,
            attributes,
            problems,
        }
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.descriptor.type_id()
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeMetadata> {
        &self.attributes
    }

    pub fn problems(&self) -> &Problems {
        &self.problems
    }

    pub fn is_valid(&self) -> bool {
        !self.problems.has_errors()
    }
}

fn build_attribute(
    descriptor: &TypeDescriptor,
    discovered: &DiscoveredMethod,
    legacy: bool,
    problems: &mut Problems,
) -> Option<AttributeMetadata> {
    let method = discovered.declaration();
    let signature = method.signature();

    let property_name = method.annotations().config.clone().unwrap_or_default();
    if property_name.is_empty() {
        problems.add_error(format!(
            "#[config] method [{signature}] annotation has an empty value"
        ));
        return None;
    }

    let name = method.name();
    let (attribute_name, getter, setter) = if let Some(attribute) = accessor(name, "set_") {
        if method.parameters().len() != 1 {
            problems.add_error(format!(
                "#[config] setter [{signature}] does not have exactly one parameter"
            ));
        } else {
            check_setter_type(method, problems);
        }
        let getter = find_public_method(descriptor, &format!("get_{attribute}"), &[]);
        (attribute, getter, Some(Arc::clone(discovered.target())))
    } else if let Some(attribute) = accessor(name, "get_") {
        check_getter(method, problems);
        let setter = if legacy {
            None
        } else {
            Some(find_setter(descriptor, method, attribute, problems)?)
        };
        (attribute, Some(Arc::clone(discovered.target())), setter)
    } else if let Some(attribute) = accessor(name, "is_") {
        check_getter(method, problems);
        if method.return_type() != Some(ValueType::Bool) {
            problems.add_error(format!(
                "#[config] is method [{signature}] does not return bool"
            ));
        }
        let setter = find_setter(descriptor, method, attribute, problems)?;
        (attribute, Some(Arc::clone(discovered.target())), Some(setter))
    } else {
        problems.add_error(format!(
            "#[config] method [{signature}] is not a valid getter or setter"
        ));
        return None;
    };

    let annotations = method.annotations();
    for legacy_name in &annotations.legacy_names {
        if legacy_name.is_empty() || *legacy_name == property_name {
            problems.add_error(format!(
                "#[config] method [{signature}] has an invalid legacy name '{legacy_name}'"
            ));
        }
    }
    Some(AttributeMetadata {
        config_type: descriptor.name().to_string(),
        name: attribute_name.to_string(),
        property_name,
        description: annotations.description.clone(),
        default_value: annotations.default_value.clone(),
        legacy_names: annotations.legacy_names.clone(),
        sensitive: annotations.sensitive,
        deprecated: annotations.deprecated,
        getter,
        setter,
    })
}

fn accessor<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    name.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}

fn check_getter(method: &MethodDescriptor, problems: &mut Problems) {
    if !method.parameters().is_empty() {
        problems.add_error(format!(
            "#[config] getter [{}] has parameters",
            method.signature()
        ));
    }
    if method.return_type().is_none() {
        problems.add_error(format!(
            "#[config] getter [{}] does not return anything",
            method.signature()
        ));
    }
}

fn check_setter_type(setter: &MethodDescriptor, problems: &mut Problems) {
    if let Some(value_type) = setter.parameters().first() {
        if !value_type.is_coercible() {
            problems.add_error(format!(
                "#[config] setter [{}] has unsupported parameter type {}",
                setter.signature(),
                value_type
            ));
        }
    }
}

fn find_setter(
    descriptor: &TypeDescriptor,
    getter: &MethodDescriptor,
    attribute: &str,
    problems: &mut Problems,
) -> Option<Arc<MethodDescriptor>> {
    let setter_name = format!("set_{attribute}");
    let mut candidates: Vec<Arc<MethodDescriptor>> = Vec::new();
    for method in class_chain_methods(descriptor) {
        if method.name() != setter_name
            || method.parameters().len() != 1
            || method.is_synthetic()
            || method.is_associated()
            || !method.is_public()
        {
            continue;
        }
        // an override in a subtype is the same setter as its base declaration
        if candidates.iter().any(|seen| seen.same_signature(&method)) {
            continue;
        }
        candidates.push(method);
    }

    match candidates.as_slice() {
        [] => {
            problems.add_error(format!(
                "No setter for #[config] method [{}]",
                getter.signature()
            ));
            None
        }
        [setter] => {
            check_setter_type(setter, problems);
            Some(resolve_target(descriptor, setter))
        }
        _ => {
            let listed = candidates
                .iter()
                .map(|candidate| candidate.signature())
                .collect::<Vec<_>>()
                .join(", ");
            problems.add_error(format!(
                "Multiple setters found for #[config] getter [{}]; move the marker to the setter instead: [{listed}]",
                getter.signature()
            ));
            None
        }
    }
}
