//! Type and method descriptors
//!
//! A descriptor is the declared shape of a type: its visibility, its no-arg
//! constructor, its methods with their markers, and the parent type and
//! capabilities it inherits methods from. Descriptors are built once (by hand
//! through the builders here, or by `#[derive(Config)]` / `#[lifecycle]`) and
//! are immutable afterwards.

use super::value::{ConfigType, ConfigValue, ValueType};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A type-erased managed object.
pub type AnyInstance = dyn Any + Send + Sync;

type GetterFn = Arc<dyn Fn(&AnyInstance) -> anyhow::Result<ConfigValue> + Send + Sync>;
type SetterFn = Arc<dyn Fn(&mut AnyInstance, ConfigValue) -> anyhow::Result<()> + Send + Sync>;
type HookFn = Arc<dyn Fn(&AnyInstance) -> anyhow::Result<()> + Send + Sync>;
type ConstructorFn = Arc<dyn Fn() -> Box<AnyInstance> + Send + Sync>;

/// Types that declare their structure to the platform.
///
/// The default implementation describes a type with no constructor and no
/// methods: such a type has no lifecycle hooks and is not a configuration type.
pub trait Describe: Any + Send + Sync + Sized {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::builder::<Self>().build()
    }
}

/// Conversion of a hook's return value into the hook result
pub trait IntoHookResult {
    fn into_hook_result(self) -> anyhow::Result<()>;
}

impl IntoHookResult for () {
    fn into_hook_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoHookResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_hook_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

/// The markers a method can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Marker {
    #[strum(to_string = "config")]
    Config,
    #[strum(to_string = "post_construct")]
    PostConstruct,
    #[strum(to_string = "pre_destroy")]
    PreDestroy,
}

impl Marker {
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Marker::PostConstruct | Marker::PreDestroy)
    }
}

/// Marker values attached to a method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotations {
    /// Property name bound by the `config` marker
    pub config: Option<String>,
    pub description: Option<String>,
    pub default_value: Option<String>,
    /// Former property names still accepted, with a warning
    pub legacy_names: Vec<String>,
    pub sensitive: bool,
    pub deprecated: bool,
    pub post_construct: bool,
    pub pre_destroy: bool,
}

/// How a described method is called.
#[derive(Clone, Default)]
pub enum Invoker {
    /// Declaration only
    #[default]
    None,
    Getter(GetterFn),
    Setter(SetterFn),
    Hook(HookFn),
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Invoker::None => "None",
            Invoker::Getter(_) => "Getter",
            Invoker::Setter(_) => "Setter",
            Invoker::Hook(_) => "Hook",
        };
        f.write_str(kind)
    }
}

/// A declared method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    name: String,
    declaring_type: String,
    params: Vec<ValueType>,
    returns: Option<ValueType>,
    visibility: Visibility,
    is_associated: bool,
    is_abstract: bool,
    is_synthetic: bool,
    annotations: Annotations,
    invoker: Invoker,
}

impl MethodDescriptor {
    /// A declaration-only method: no parameters, returns nothing, no invoker.
    pub fn declared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type: String::new(),
            params: Vec::new(),
            returns: None,
            visibility: Visibility::Public,
            is_associated: false,
            is_abstract: false,
            is_synthetic: false,
            annotations: Annotations::default(),
            invoker: Invoker::None,
        }
    }

    /// A zero-argument accessor returning `V`.
    pub fn getter<T, V, F>(name: impl Into<String>, read: F) -> Self
    where
        T: Any + Send + Sync,
        V: ConfigType,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        let mut method = Self::declared(name).returns(V::VALUE_TYPE);
        method.invoker = Invoker::Getter(Arc::new(move |instance: &AnyInstance| {
            let target = instance
                .downcast_ref::<T>()
                .ok_or_else(receiver_mismatch::<T>)?;
            Ok(read(target).to_value())
        }));
        method
    }

    /// A one-argument mutator taking `V`.
    pub fn setter<T, V, F>(name: impl Into<String>, write: F) -> Self
    where
        T: Any + Send + Sync,
        V: ConfigType,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let mut method = Self::declared(name).param(V::VALUE_TYPE);
        method.invoker = Invoker::Setter(Arc::new(
            move |instance: &mut AnyInstance, value: ConfigValue| {
                let found = value.value_type();
                let value = V::from_value(value).ok_or_else(|| {
                    anyhow::anyhow!("expected a {} value but got {}", V::VALUE_TYPE, found)
                })?;
                let target = instance
                    .downcast_mut::<T>()
                    .ok_or_else(receiver_mismatch::<T>)?;
                write(target, value);
                Ok(())
            },
        ));
        method
    }

    /// A no-argument method run as a lifecycle hook.
    pub fn hook<T, R, F>(name: impl Into<String>, run: F) -> Self
    where
        T: Any + Send + Sync,
        R: IntoHookResult,
        F: Fn(&T) -> R + Send + Sync + 'static,
    {
        let mut method = Self::declared(name);
        method.invoker = Invoker::Hook(Arc::new(move |instance: &AnyInstance| {
            let target = instance
                .downcast_ref::<T>()
                .ok_or_else(receiver_mismatch::<T>)?;
            run(target).into_hook_result()
        }));
        method
    }

    pub fn param(mut self, value_type: ValueType) -> Self {
        self.params.push(value_type);
        self
    }

    pub fn params(mut self, value_types: impl IntoIterator<Item = ValueType>) -> Self {
        self.params.extend(value_types);
        self
    }

    pub fn returns(mut self, value_type: ValueType) -> Self {
        self.returns = Some(value_type);
        self
    }

    /// Bind this accessor to a configuration property.
    pub fn config(mut self, property: impl Into<String>) -> Self {
        self.annotations.config = Some(property.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.annotations.description = Some(description.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.annotations.default_value = Some(value.into());
        self
    }

    /// Also accept the property under its former name `name`.
    pub fn legacy(mut self, name: impl Into<String>) -> Self {
        self.annotations.legacy_names.push(name.into());
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.annotations.sensitive = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.annotations.deprecated = true;
        self
    }

    pub fn post_construct(mut self) -> Self {
        self.annotations.post_construct = true;
        self
    }

    pub fn pre_destroy(mut self) -> Self {
        self.annotations.pre_destroy = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    /// Mark as an associated function (no receiver).
    pub fn associated(mut self) -> Self {
        self.is_associated = true;
        self
    }

    /// Mark as abstract: the method has no default behavior, so a
    /// configuration setter marked this way requires a value.
    pub fn required(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Mark as compiler-generated; discovery skips synthetic methods.
    pub fn synthetic(mut self) -> Self {
        self.is_synthetic = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn parameters(&self) -> &[ValueType] {
        &self.params
    }

    pub fn return_type(&self) -> Option<ValueType> {
        self.returns
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn is_associated(&self) -> bool {
        self.is_associated
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_synthetic(&self) -> bool {
        self.is_synthetic
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn has(&self, marker: Marker) -> bool {
        match marker {
            Marker::Config => self.annotations.config.is_some(),
            Marker::PostConstruct => self.annotations.post_construct,
            Marker::PreDestroy => self.annotations.pre_destroy,
        }
    }

    pub fn has_invoker(&self) -> bool {
        !matches!(self.invoker, Invoker::None)
    }

    /// `Type::name(params) -> ret`
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        match self.returns {
            Some(ret) => format!("{}::{}({}) -> {}", self.declaring_type, self.name, params, ret),
            None => format!("{}::{}({})", self.declaring_type, self.name, params),
        }
    }

    /// Whether `other` has the same name and parameter list
    pub fn same_signature(&self, other: &MethodDescriptor) -> bool {
        self.name == other.name && self.params == other.params
    }

    pub fn invoke_hook(&self, instance: &AnyInstance) -> anyhow::Result<()> {
        match &self.invoker {
            Invoker::Hook(run) => run(instance),
            _ => Err(self.not_invocable("hook")),
        }
    }

    pub fn invoke_getter(&self, instance: &AnyInstance) -> anyhow::Result<ConfigValue> {
        match &self.invoker {
            Invoker::Getter(read) => read(instance),
            _ => Err(self.not_invocable("getter")),
        }
    }

    pub fn invoke_setter(&self, instance: &mut AnyInstance, value: ConfigValue) -> anyhow::Result<()> {
        match &self.invoker {
            Invoker::Setter(write) => write(instance, value),
            _ => Err(self.not_invocable("setter")),
        }
    }

    fn not_invocable(&self, kind: &str) -> anyhow::Error {
        anyhow::anyhow!("method [{}] cannot be invoked as a {}", self.signature(), kind)
    }
}

fn receiver_mismatch<T>() -> anyhow::Error {
    anyhow::anyhow!("receiver is not a {}", std::any::type_name::<T>())
}

/// The no-arg constructor of a type.
#[derive(Clone)]
pub struct Constructor {
    visibility: Visibility,
    make: ConstructorFn,
}

impl Constructor {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn instantiate(&self) -> Box<AnyInstance> {
        (self.make)()
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constructor")
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

/// The declared structure of a type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    type_id: Option<TypeId>,
    visibility: Visibility,
    is_abstract: bool,
    constructor: Option<Constructor>,
    methods: Vec<Arc<MethodDescriptor>>,
    parent: Option<Arc<TypeDescriptor>>,
    capabilities: Vec<Arc<TypeDescriptor>>,
    defunct: Vec<String>,
}

impl TypeDescriptor {
    /// Start describing the concrete type `T`.
    pub fn builder<T: Any>() -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new(short_type_name::<T>(), Some(TypeId::of::<T>()))
    }

    /// Start describing a named parent type or capability.
    pub fn named(name: impl Into<String>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder::new(name.into(), None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn declared_methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    pub fn parent(&self) -> Option<&Arc<TypeDescriptor>> {
        self.parent.as_ref()
    }

    pub fn capabilities(&self) -> &[Arc<TypeDescriptor>] {
        &self.capabilities
    }

    /// Property names that may no longer be configured
    pub fn defunct(&self) -> &[String] {
        &self.defunct
    }
}

pub struct TypeDescriptorBuilder {
    descriptor: TypeDescriptor,
}

impl TypeDescriptorBuilder {
    fn new(name: String, type_id: Option<TypeId>) -> Self {
        Self {
            descriptor: TypeDescriptor {
                name,
                type_id,
                visibility: Visibility::Public,
                is_abstract: false,
                constructor: None,
                methods: Vec::new(),
                parent: None,
                capabilities: Vec::new(),
                defunct: Vec::new(),
            },
        }
    }

    pub fn private(mut self) -> Self {
        self.descriptor.visibility = Visibility::Private;
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.descriptor.is_abstract = true;
        self
    }

    pub fn constructor<T, F>(self, make: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.with_constructor(Visibility::Public, make)
    }

    pub fn private_constructor<T, F>(self, make: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.with_constructor(Visibility::Private, make)
    }

    fn with_constructor<T, F>(mut self, visibility: Visibility, make: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.descriptor.constructor = Some(Constructor {
            visibility,
            make: Arc::new(move || Box::new(make()) as Box<AnyInstance>),
        });
        self
    }

    pub fn method(mut self, mut method: MethodDescriptor) -> Self {
        method.declaring_type = self.descriptor.name.clone();
        self.descriptor.methods.push(Arc::new(method));
        self
    }

    pub fn extends(mut self, parent: TypeDescriptor) -> Self {
        self.descriptor.parent = Some(Arc::new(parent));
        self
    }

    pub fn implements(mut self, capability: TypeDescriptor) -> Self {
        self.descriptor.capabilities.push(Arc::new(capability));
        self
    }

    /// Reject `property` when it is supplied.
    pub fn defunct(mut self, property: impl Into<String>) -> Self {
        self.descriptor.defunct.push(property.into());
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// The last path segment of `T`'s name, without generic arguments
pub fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
