//! Configuration binding
//!
//! Configuration types expose marked accessors (see `#[derive(Config)]`).
//! [`ConfigurationMetadata`] resolves and validates them, and
//! [`ConfigurationFactory`] binds string properties onto typed instances.

pub mod factory;
pub mod inspector;
pub mod loader;
pub mod metadata;
pub mod problems;

pub use factory::{BindingKey, ConfigurationFactory, WarningsMonitor};
pub use inspector::{ConfigAttribute, ConfigRecord, ConfigurationInspector};
pub use loader::{LoadError, load_properties_from, parse_properties, replace_environment_variables};
pub use metadata::{AttributeMetadata, ConfigurationMetadata};
pub use problems::{ConfigurationError, Problems};
