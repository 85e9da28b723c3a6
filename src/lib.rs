//! # Keystone
//!
//! Configuration binding and lifecycle management for dependency-injected
//! Rust applications.
//!
//! ## Features
//!
//! - **Configuration Binding**: `#[derive(Config)]` maps string properties onto typed fields
//! - **Validation**: every structural and value problem is reported at once, before anything starts
//! - **Lifecycle Hooks**: `#[post_construct]` / `#[pre_destroy]` methods run as instances come and go
//! - **Graceful Shutdown**: started managers stop through registered exit hooks
//! - **Modular Architecture**: modules declare bindings on a singleton container
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use keystone::{Bootstrap, Config, Container, Module, lifecycle};
//! use std::sync::Arc;
//!
//! // 1. Define your configuration
//! #[derive(Debug, Default, Config)]
//! pub struct HttpConfig {
//!     #[config(name = "http.port", description = "listen port")]
//!     port: i32,
//! }
//!
//! // 2. Define your service
//! pub struct HttpServer {
//!     port: i32,
//! }
//!
//! #[lifecycle]
//! impl HttpServer {
//!     #[post_construct]
//!     fn start(&self) {
//!         tracing::info!("listening on {}", self.port);
//!     }
//!
//!     #[pre_destroy]
//!     fn stop(&self) {
//!         tracing::info!("stopped");
//!     }
//! }
//!
//! // 3. Define your module
//! fn http_module(container: &mut Container) -> keystone::Result<()> {
//!     container
//!         .bind_config::<HttpConfig>()
//!         .bind_provider(|c: &Container| {
//!             Ok(HttpServer { port: c.resolve::<HttpConfig>()?.port })
//!         });
//!     Ok(())
//! }
//!
//! // 4. Bootstrap your application
//! fn main() -> keystone::Result<()> {
//!     let container = Bootstrap::new(Vec::new())
//!         .module(http_module)
//!         .set_required_configuration_property("http.port", "8080")
//!         .initialize()?;
//!
//!     let server: Arc<HttpServer> = container.resolve()?;
//!     // Serve your app...
//!     container.lifecycle().stop().ok();
//!     Ok(())
//! }
//! ```

extern crate self as keystone;

pub mod bootstrap;
pub mod configuration;
pub mod describe;
pub mod di;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod module;

// Re-export core types
pub use bootstrap::Bootstrap;
pub use configuration::{ConfigurationError, ConfigurationFactory, ConfigurationMetadata};
pub use describe::Describe;
pub use di::Container;
pub use error::{KeystoneError, Result};
pub use lifecycle::LifeCycleManager;
pub use module::Module;

// Re-export macros
pub use keystone_macro::{Config, lifecycle, post_construct, pre_destroy};

/// Prelude module for convenient imports
///
/// ```
/// use keystone::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bootstrap::Bootstrap;
    pub use crate::configuration::{
        ConfigurationError, ConfigurationFactory, ConfigurationInspector, ConfigurationMetadata,
        Problems,
    };
    pub use crate::describe::{ConfigValue, Describe, MethodDescriptor, TypeDescriptor};
    pub use crate::di::Container;
    pub use crate::error::{KeystoneError, Result};
    pub use crate::lifecycle::{
        ExitHooks, LifeCycleError, LifeCycleManager, LifeCycleStartError, LifeCycleStopError,
        ShutdownHandler, State, shutdown_signal,
    };
    pub use crate::module::Module;
    pub use crate::{Config, lifecycle, post_construct, pre_destroy};
    pub use std::sync::Arc;
}
