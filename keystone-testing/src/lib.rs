//! Assertions for configuration types
//!
//! Unit tests of a configuration type usually check two things: that a
//! default instance has the documented defaults, and that every property maps
//! onto the attribute it is meant to set.
//!
//! ```ignore
//! use keystone_testing::{assert_defaults, assert_full_mapping};
//!
//! #[test]
//! fn test_defaults() {
//!     assert_defaults::<HttpConfig>(&[("port", ConfigValue::I32(8080)), ("host", "0.0.0.0".into())]);
//! }
//! ```

use keystone::configuration::{AttributeMetadata, ConfigurationFactory, ConfigurationMetadata};
use keystone::describe::{AnyInstance, ConfigValue, Describe};
use std::collections::{BTreeMap, BTreeSet};

/// Assert that a default instance of `T` has exactly the expected attribute values.
///
/// Every non-deprecated attribute must be listed, and only attributes of `T`
/// may be listed.
pub fn assert_defaults<T: Describe>(expected: &[(&str, ConfigValue)]) {
    let metadata = valid_metadata::<T>();
    let expected: BTreeMap<&str, &ConfigValue> =
        expected.iter().map(|(name, value)| (*name, value)).collect();

    let all: BTreeSet<&str> = metadata.attributes().keys().map(String::as_str).collect();
    let unsupported: BTreeSet<&str> = expected.keys().copied().filter(|name| !all.contains(name)).collect();
    if !unsupported.is_empty() {
        panic!("Unsupported attributes: {unsupported:?}");
    }

    let current: BTreeSet<&str> = metadata
        .attributes()
        .values()
        .filter(|attribute| !attribute.is_deprecated())
        .map(AttributeMetadata::name)
        .collect();
    let deprecated: BTreeSet<&str> = expected.keys().copied().filter(|name| !current.contains(name)).collect();
    if !deprecated.is_empty() {
        panic!("Deprecated attributes: {deprecated:?}");
    }
    let untested: BTreeSet<&str> = current.iter().copied().filter(|name| !expected.contains_key(name)).collect();
    if !untested.is_empty() {
        panic!("Untested attributes: {untested:?}");
    }

    let defaults = default_instance::<T>();
    for attribute in metadata.attributes().values().filter(|a| !a.is_deprecated()) {
        let Some(actual) = read(attribute, &defaults) else {
            continue;
        };
        let wanted = expected.get(attribute.name()).copied();
        if wanted != Some(&actual) {
            panic!(
                "Attribute '{}' default: expected {:?} but was {:?}",
                attribute.name(),
                wanted,
                actual
            );
        }
    }
}

/// Assert that `properties` set every attribute of `T` to the value in `expected`.
pub fn assert_full_mapping<T: Describe>(properties: &BTreeMap<String, String>, expected: &T) {
    assert_full_mapping_skipping(properties, expected, &[]);
}

/// Like [`assert_full_mapping`], exempting the `skipped` property names.
pub fn assert_full_mapping_skipping<T: Describe>(
    properties: &BTreeMap<String, String>,
    expected: &T,
    skipped: &[&str],
) {
    let metadata = valid_metadata::<T>();
    let skipped: BTreeSet<&str> = skipped.iter().copied().collect();

    let supported: BTreeSet<&str> = metadata
        .attributes()
        .values()
        .filter(|attribute| !attribute.is_deprecated())
        .map(AttributeMetadata::property_name)
        .collect();
    let unsupported: BTreeSet<&str> = properties
        .keys()
        .map(String::as_str)
        .filter(|name| !supported.contains(name))
        .collect();
    if !unsupported.is_empty() {
        panic!("Unsupported or deprecated properties: {unsupported:?}");
    }

    let invalid_skipped: BTreeSet<&str> = skipped.difference(&supported).copied().collect();
    if !invalid_skipped.is_empty() {
        panic!("Invalid skipped properties: {invalid_skipped:?}");
    }
    let skipped_but_tested: BTreeSet<&str> = skipped
        .iter()
        .copied()
        .filter(|name| properties.contains_key(*name))
        .collect();
    if !skipped_but_tested.is_empty() {
        panic!("Skipped but tested properties: {skipped_but_tested:?}");
    }
    let untested: BTreeSet<&str> = supported
        .iter()
        .copied()
        .filter(|name| !skipped.contains(name) && !properties.contains_key(*name))
        .collect();
    if !untested.is_empty() {
        panic!("Untested properties: {untested:?}");
    }

    let actual = ConfigurationFactory::new(properties.clone())
        .build::<T>()
        .unwrap_or_else(|e| panic!("{e}"));
    let defaults = default_instance::<T>();

    for attribute in metadata.attributes().values() {
        if attribute.is_deprecated() || skipped.contains(attribute.property_name()) {
            continue;
        }
        let (Some(value), Some(default)) = (read(attribute, &actual), read(attribute, &defaults)) else {
            continue;
        };
        if value == default {
            panic!(
                "Attribute value matches the default: {} = {:?}",
                attribute.name(),
                value
            );
        }
    }

    assert_attributes_equal(&metadata, &actual, expected);
}

/// Assert that every readable attribute of `actual` equals the one of `expected`.
pub fn assert_attributes_equal<T: Describe>(metadata: &ConfigurationMetadata, actual: &T, expected: &T) {
    for attribute in metadata.attributes().values() {
        let actual_value = read(attribute, actual);
        let expected_value = read(attribute, expected);
        if actual_value != expected_value {
            panic!(
                "Attribute '{}': expected {:?} but was {:?}",
                attribute.name(),
                expected_value,
                actual_value
            );
        }
    }
}

fn valid_metadata<T: Describe>() -> ConfigurationMetadata {
    ConfigurationMetadata::get_valid::<T>().unwrap_or_else(|e| panic!("{e}"))
}

fn default_instance<T: Describe>() -> T {
    ConfigurationFactory::default()
        .build_defaults::<T>()
        .unwrap_or_else(|e| panic!("{e}"))
}

fn read<T: Describe>(attribute: &AttributeMetadata, instance: &T) -> Option<ConfigValue> {
    let instance: &AnyInstance = instance;
    attribute.read(instance).map(|value| {
        value.unwrap_or_else(|e| panic!("Reading attribute '{}' failed: {e:#}", attribute.name()))
    })
}
