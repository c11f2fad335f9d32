use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("JWT signing secret is empty")]
    MissingSecret,
    #[error("password cost {0} is outside of bcrypt's supported range")]
    InvalidPasswordCost(u32),
    #[error("token lifetime must be positive, got {0} hours")]
    InvalidTokenLifetime(i64),
}

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    // External errors
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}
