//! Process exit hooks and graceful shutdown
//!
//! The lifecycle manager registers an exit hook when it starts and removes it
//! when it stops. [`ExitHooks::global`] is the process-wide registry;
//! [`ShutdownHandler`] runs it when the process receives Ctrl+C or SIGTERM.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use thiserror::Error;
use tokio::signal;

pub type ExitHook = Box<dyn FnOnce() + Send + 'static>;

static GLOBAL: LazyLock<Arc<ExitHooks>> = LazyLock::new(|| Arc::new(ExitHooks::new()));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitHookId(u64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExitHookError {
    #[error("process is already shutting down")]
    AlreadyShuttingDown,

    #[error("exit hook {0:?} is not registered")]
    NotRegistered(ExitHookId),
}

/// Registration of work to run when the process exits
pub trait ProcessExit: Send + Sync {
    fn register(&self, hook: ExitHook) -> Result<ExitHookId, ExitHookError>;

    fn deregister(&self, id: ExitHookId) -> Result<(), ExitHookError>;
}

/// An exit hook registry.
///
/// Hooks run once, in registration order, the first time [`run`](Self::run)
/// is called. Registration and removal fail once shutdown has begun.
#[derive(Default)]
pub struct ExitHooks {
    hooks: Mutex<Vec<(ExitHookId, ExitHook)>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
}

impl ExitHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by default managers and bootstraps
    pub fn global() -> Arc<ExitHooks> {
        Arc::clone(&GLOBAL)
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Run every registered hook; later calls do nothing.
    pub fn run(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let hooks = std::mem::take(&mut *self.hooks.lock().unwrap_or_else(PoisonError::into_inner));
        tracing::info!("Running {} exit hook(s)", hooks.len());
        for (id, hook) in hooks {
            tracing::debug!("Running exit hook {:?}", id);
            hook();
        }
    }
}

impl ProcessExit for ExitHooks {
    fn register(&self, hook: ExitHook) -> Result<ExitHookId, ExitHookError> {
        if self.is_shutting_down() {
            return Err(ExitHookError::AlreadyShuttingDown);
        }
        let id = ExitHookId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, hook));
        Ok(id)
    }

    fn deregister(&self, id: ExitHookId) -> Result<(), ExitHookError> {
        if self.is_shutting_down() {
            return Err(ExitHookError::AlreadyShuttingDown);
        }
        let mut hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
        let before = hooks.len();
        hooks.retain(|(registered, _)| *registered != id);
        if hooks.len() == before {
            return Err(ExitHookError::NotRegistered(id));
        }
        Ok(())
    }
}

/// Handles graceful shutdown of the application
///
/// ShutdownHandler listens for OS signals (SIGTERM, SIGINT) and then runs
/// the exit hooks, which stops every started lifecycle manager.
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::ShutdownHandler;
///
/// let shutdown_handler = ShutdownHandler::default();
///
/// tokio::spawn(async move {
///     shutdown_handler.wait_for_shutdown().await;
///     std::process::exit(0);
/// });
/// ```
pub struct ShutdownHandler {
    exit_hooks: Arc<ExitHooks>,
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new(ExitHooks::global())
    }
}

impl ShutdownHandler {
    pub fn new(exit_hooks: Arc<ExitHooks>) -> Self {
        Self { exit_hooks }
    }

    /// Wait for a shutdown signal, then run the exit hooks.
    pub async fn wait_for_shutdown(&self) {
        shutdown_signal().await;
        self.shutdown().await;
    }

    /// Run the exit hooks off the async runtime.
    pub async fn shutdown(&self) {
        tracing::info!("Starting graceful shutdown...");
        let exit_hooks = Arc::clone(&self.exit_hooks);
        if let Err(e) = tokio::task::spawn_blocking(move || exit_hooks.run()).await {
            tracing::error!("Exit hooks panicked: {}", e);
        }
        tracing::info!("Graceful shutdown complete");
    }
}

/// Create a future that completes when a shutdown signal is received
///
/// # Example
///
/// ```rust,ignore
/// use keystone::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         println!("Shutdown signal received");
///     }
///     _ = server.serve() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
