//! Domain error taxonomy.

use thiserror::Error;

use crate::types::Id;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid policy: {0}")]
    ConstructionInvalid(String),

    #[error("auto-scaling group '{0}' is not set up")]
    NotSetUp(Id),

    #[error("auto-scaling group '{0}' is busy executing commands")]
    Busy(Id),

    #[error("auto-scaling group '{0}' has been deleted")]
    Deleted(Id),

    #[error("unknown id '{0}'")]
    UnknownId(Id),

    #[error("id '{0}' already exists")]
    AlreadyExists(Id),

    #[error("provisioning failed: {0}")]
    ProvisioningFailed(String),

    #[error("termination failed: {0}")]
    TerminationFailed(String),

    #[error("command execution failed: {}", .0.join("; "))]
    ExecutionFailed(Vec<String>),
}

pub type CoreResult<T> = Result<T, CoreError>;
