//! Lifecycle Module
//!
//! Runs start and stop hooks of container-provisioned instances.
//!
//! # Lifecycle Phases
//!
//! ```text
//! 1. Configuration Loading
//!    ↓
//! 2. Module Configuration
//!    ↓
//! 3. Singleton Provisioning
//!    ↓
//! 4. #[post_construct] (each instance, as it is added)   ← Lifecycle Hook
//!    ↓
//! 5. LifeCycleManager::start (exit hook registered)
//!    ↓
//! [Running...]
//!    ↓
//! 6. Shutdown Signal (SIGTERM/SIGINT) or explicit stop
//!    ↓
//! 7. #[pre_destroy] (each instance, reverse order)       ← Lifecycle Hook
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use keystone::lifecycle;
//!
//! pub struct DatabaseService {
//!     pool: Pool,
//! }
//!
//! #[lifecycle]
//! impl DatabaseService {
//!     #[post_construct]
//!     fn connect(&self) -> anyhow::Result<()> {
//!         tracing::info!("Initializing database connection");
//!         self.pool.connect()
//!     }
//!
//!     #[pre_destroy]
//!     fn close(&self) {
//!         tracing::info!("Closing database connections");
//!         self.pool.close();
//!     }
//! }
//! ```

mod error;
mod identity;
mod manager;
mod methods;
mod shutdown;

pub use error::{LifeCycleError, LifeCycleStartError, LifeCycleStopError, Result};
pub use identity::{Handle, IdentityTracker};
pub use manager::{LifeCycleManager, State};
pub use methods::{LifeCycleMethods, LifeCycleMethodsMap};
pub use shutdown::{
    ExitHook, ExitHookError, ExitHookId, ExitHooks, ProcessExit, ShutdownHandler, shutdown_signal,
};
