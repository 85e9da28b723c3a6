//! Lifecycle-specific error types

use crate::describe::DiscoveryError;
use std::fmt;
use thiserror::Error;

/// Errors from adding an instance to the lifecycle manager
#[derive(Debug, Error)]
pub enum LifeCycleError {
    /// The manager is stopping or stopped
    #[error("life cycle is stopped")]
    Stopped,

    #[error(transparent)]
    Start(#[from] LifeCycleStartError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// A start hook failed, or the manager could not start.
///
/// When a start hook fails the instance's stop hooks are still run, and
/// each of their failures is attached as a suppressed error.
#[derive(Debug)]
pub struct LifeCycleStartError {
    message: String,
    cause: Option<anyhow::Error>,
    suppressed: Vec<anyhow::Error>,
}

impl LifeCycleStartError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
            suppressed: Vec::new(),
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause),
            suppressed: Vec::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_ref()
    }

    pub fn suppressed(&self) -> &[anyhow::Error] {
        &self.suppressed
    }

    pub(crate) fn add_suppressed(&mut self, error: anyhow::Error) {
        self.suppressed.push(error);
    }
}

impl fmt::Display for LifeCycleStartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause:#}")?;
        }
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for LifeCycleStartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// One or more stop hooks failed.
///
/// `stop()` logs each failure and reports none here; `stop_without_failure_logging()`
/// carries every failure as a suppressed error.
#[derive(Debug)]
pub struct LifeCycleStopError {
    suppressed: Vec<anyhow::Error>,
}

impl LifeCycleStopError {
    pub(crate) fn new(suppressed: Vec<anyhow::Error>) -> Self {
        Self { suppressed }
    }

    pub fn suppressed(&self) -> &[anyhow::Error] {
        &self.suppressed
    }
}

impl fmt::Display for LifeCycleStopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stopping life cycle failed")?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for LifeCycleStopError {}

/// A specialized Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifeCycleError>;
