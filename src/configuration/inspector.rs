//! Effective configuration records
//!
//! Enumerates every configuration binding known to a factory together with
//! its default and runtime values, for the startup configuration table and
//! for JSON export.

use super::factory::ConfigurationFactory;
use super::metadata::AttributeMetadata;
use crate::describe::AnyInstance;
use serde::Serialize;

const NO_VALUE: &str = "-- none --";
const NOT_AVAILABLE: &str = "-- n/a --";
const ERROR_VALUE: &str = "-- ERROR --";
const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigAttribute {
    pub attribute_name: String,
    pub property_name: String,
    pub default_value: String,
    pub current_value: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigRecord {
    pub type_name: String,
    /// Prefix without the trailing dot, empty when unprefixed
    pub prefix: String,
    pub attributes: Vec<ConfigAttribute>,
}

pub struct ConfigurationInspector;

impl ConfigurationInspector {
    /// Records sorted by type name then prefix; attributes sorted by name.
    pub fn inspect(factory: &ConfigurationFactory) -> Vec<ConfigRecord> {
        factory
            .binding_keys()
            .into_iter()
            .filter_map(|key| {
                let metadata = factory.binding_metadata(&key)?;
                let defaults = factory.defaults_erased(&metadata);
                let current = factory.cached_instance(&key);
                let attributes = metadata
                    .attributes()
                    .values()
                    .map(|attribute| ConfigAttribute {
                        attribute_name: attribute.name().to_string(),
                        property_name: format!("{}{}", key.prefix(), attribute.property_name()),
                        default_value: render(attribute, defaults.as_deref(), NO_VALUE),
                        current_value: render(attribute, current.as_deref(), NOT_AVAILABLE),
                        description: attribute.description().unwrap_or_default().to_string(),
                    })
                    .collect();
                Some(ConfigRecord {
                    type_name: key.type_name().to_string(),
                    prefix: key.prefix().trim_end_matches('.').to_string(),
                    attributes,
                })
            })
            .collect()
    }

    pub fn to_json(records: &[ConfigRecord]) -> serde_json::Result<String> {
        serde_json::to_string_pretty(records)
    }
}

fn render(attribute: &AttributeMetadata, instance: Option<&AnyInstance>, missing: &str) -> String {
    let Some(instance) = instance else {
        return missing.to_string();
    };
    match attribute.read(instance) {
        None => missing.to_string(),
        Some(Err(_)) => ERROR_VALUE.to_string(),
        Some(Ok(_)) if attribute.is_sensitive() => REDACTED.to_string(),
        Some(Ok(value)) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::{Describe, MethodDescriptor, TypeDescriptor};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Database {
        url: String,
        password: String,
        pool: i32,
    }

    impl Describe for Database {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::builder::<Self>()
                .constructor(|| Database {
                    pool: 4,
                    ..Database::default()
                })
                .method(MethodDescriptor::getter("get_url", |c: &Database| c.url.clone()))
                .method(
                    MethodDescriptor::setter("set_url", |c: &mut Database, v: String| c.url = v)
                        .config("url")
                        .description("JDBC-style connection url"),
                )
                .method(MethodDescriptor::getter("get_password", |c: &Database| {
                    c.password.clone()
                }))
                .method(
                    MethodDescriptor::setter("set_password", |c: &mut Database, v: String| {
                        c.password = v
                    })
                    .config("password")
                    .sensitive(),
                )
                .method(
                    MethodDescriptor::setter("set_pool", |c: &mut Database, v: i32| c.pool = v)
                        .config("pool"),
                )
                .build()
        }
    }

    fn factory() -> ConfigurationFactory {
        let properties = BTreeMap::from([
            ("db.url".to_string(), "postgres://db".to_string()),
            ("db.password".to_string(), "secret".to_string()),
        ]);
        ConfigurationFactory::new(properties)
    }

    #[test]
    fn test_records_before_and_after_build() {
        let factory = factory();
        factory.register::<Database>(Some("db"));

        let before = ConfigurationInspector::inspect(&factory);
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].prefix, "db");
        assert!(before[0].attributes.iter().all(|a| a.current_value == NOT_AVAILABLE));

        factory.get::<Database>(Some("db")).unwrap();
        let after = ConfigurationInspector::inspect(&factory);
        let attributes = &after[0].attributes;
        let names: Vec<_> = attributes.iter().map(|a| a.attribute_name.as_str()).collect();
        assert_eq!(names, vec!["password", "pool", "url"]);

        assert_eq!(attributes[0].property_name, "db.password");
        assert_eq!(attributes[0].current_value, REDACTED);
        assert_eq!(attributes[0].default_value, REDACTED);

        // no getter for pool
        assert_eq!(attributes[1].default_value, NO_VALUE);
        assert_eq!(attributes[1].current_value, NOT_AVAILABLE);

        assert_eq!(attributes[2].default_value, "");
        assert_eq!(attributes[2].current_value, "postgres://db");
        assert_eq!(attributes[2].description, "JDBC-style connection url");
    }

    #[test]
    fn test_json_export_has_no_secrets() {
        let factory = factory();
        factory.get::<Database>(Some("db")).unwrap();
        let json = ConfigurationInspector::to_json(&ConfigurationInspector::inspect(&factory)).unwrap();
        assert!(json.contains("\"type_name\": \"Database\""));
        assert!(json.contains("postgres://db"));
        assert!(!json.contains("secret"));
    }
}
