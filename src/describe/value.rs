//! Value types understood by the configuration coercion table.

use std::fmt;

/// The declared type of an accessor parameter or return value.
///
/// Everything the coercion table can produce has its own variant. Any other
/// type is declared as `Other` with a display name; configuration metadata
/// rejects setters taking an `Other` type instead of passing the raw string
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    String,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Other(&'static str),
}

impl ValueType {
    /// Whether the coercion table has an entry for this type
    pub fn is_coercible(&self) -> bool {
        !matches!(self, ValueType::Other(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "String",
            ValueType::Bool => "bool",
            ValueType::I8 => "i8",
            ValueType::I16 => "i16",
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// A typed configuration value produced by coercion or read back from a getter.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl ConfigValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ConfigValue::String(_) => ValueType::String,
            ConfigValue::Bool(_) => ValueType::Bool,
            ConfigValue::I8(_) => ValueType::I8,
            ConfigValue::I16(_) => ValueType::I16,
            ConfigValue::I32(_) => ValueType::I32,
            ConfigValue::I64(_) => ValueType::I64,
            ConfigValue::F32(_) => ValueType::F32,
            ConfigValue::F64(_) => ValueType::F64,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::String(v) => f.write_str(v),
            ConfigValue::Bool(v) => write!(f, "{v}"),
            ConfigValue::I8(v) => write!(f, "{v}"),
            ConfigValue::I16(v) => write!(f, "{v}"),
            ConfigValue::I32(v) => write!(f, "{v}"),
            ConfigValue::I64(v) => write!(f, "{v}"),
            ConfigValue::F32(v) => write!(f, "{v}"),
            ConfigValue::F64(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

/// Coerce a raw property string to `target`.
///
/// Returns `None` when the string does not parse as the target type or the
/// target type has no coercion.
pub fn coerce(target: ValueType, raw: &str) -> Option<ConfigValue> {
    match target {
        ValueType::String => Some(ConfigValue::String(raw.to_string())),
        // anything but a case-insensitive "true" is false
        ValueType::Bool => Some(ConfigValue::Bool(raw.eq_ignore_ascii_case("true"))),
        ValueType::I8 => raw.parse().ok().map(ConfigValue::I8),
        ValueType::I16 => raw.parse().ok().map(ConfigValue::I16),
        ValueType::I32 => raw.parse().ok().map(ConfigValue::I32),
        ValueType::I64 => raw.parse().ok().map(ConfigValue::I64),
        ValueType::F32 => raw.parse().ok().map(ConfigValue::F32),
        ValueType::F64 => raw.parse().ok().map(ConfigValue::F64),
        ValueType::Other(_) => None,
    }
}

/// Rust types that can be bound to a configuration property.
pub trait ConfigType: Sized + Send + Sync + 'static {
    const VALUE_TYPE: ValueType;

    fn from_value(value: ConfigValue) -> Option<Self>;

    fn to_value(&self) -> ConfigValue;
}

impl ConfigType for String {
    const VALUE_TYPE: ValueType = ValueType::String;

    fn from_value(value: ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }

    fn to_value(&self) -> ConfigValue {
        ConfigValue::String(self.clone())
    }
}

macro_rules! copy_config_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ConfigType for $ty {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn from_value(value: ConfigValue) -> Option<Self> {
                    match value {
                        ConfigValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn to_value(&self) -> ConfigValue {
                    ConfigValue::$variant(*self)
                }
            }
        )*
    };
}

copy_config_type! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}
