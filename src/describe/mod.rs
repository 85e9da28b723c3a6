//! Type descriptors and method discovery
//!
//! Participating types declare their structure once through [`Describe`];
//! the lifecycle manager and the configuration system answer every "does this
//! type have a hook / a config accessor" question from that descriptor.

pub mod descriptor;
pub mod discovery;
pub mod value;

pub use descriptor::{
    Annotations, AnyInstance, Constructor, Describe, IntoHookResult, Invoker, Marker,
    MethodDescriptor, TypeDescriptor, TypeDescriptorBuilder, Visibility, short_type_name,
};
pub use discovery::{DiscoveredMethod, DiscoveryError, find_config_methods, find_marked_methods};
pub use value::{ConfigType, ConfigValue, ValueType, coerce};
