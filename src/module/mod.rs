use crate::di::Container;
use crate::error::Result;

/// Trait for application modules
///
/// A module declares bindings on the container. Closures taking the
/// container are modules too.
///
/// # Example
/// ```
/// use keystone::{Container, Module, Result};
///
/// struct AppModule;
///
/// impl Module for AppModule {
///     fn configure(&self, container: &mut Container) -> Result<()> {
///         container.bind_instance(std::sync::Arc::new(Registry));
///         Ok(())
///     }
/// }
///
/// struct Registry;
/// impl keystone::Describe for Registry {}
/// ```
pub trait Module: Send + Sync {
    /// Declare this module's bindings
    fn configure(&self, container: &mut Container) -> Result<()>;
}

impl<F> Module for F
where
    F: Fn(&mut Container) -> Result<()> + Send + Sync,
{
    fn configure(&self, container: &mut Container) -> Result<()> {
        self(container)
    }
}
