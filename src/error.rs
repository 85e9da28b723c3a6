use crate::configuration::{ConfigurationError, LoadError};
use crate::lifecycle::{LifeCycleError, LifeCycleStartError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeystoneError>;

#[derive(Debug, Error)]
pub enum KeystoneError {
    #[error("Dependency not found: {type_name}")]
    DependencyNotFound { type_name: String },

    #[error("Failed to downcast type: {type_name}")]
    DowncastFailed { type_name: String },

    #[error("Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    #[error("Bootstrap has already been initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    ConfigurationFile(#[from] LoadError),

    #[error(transparent)]
    LifeCycle(#[from] LifeCycleError),
}

impl From<LifeCycleStartError> for KeystoneError {
    fn from(err: LifeCycleStartError) -> Self {
        KeystoneError::LifeCycle(LifeCycleError::Start(err))
    }
}
