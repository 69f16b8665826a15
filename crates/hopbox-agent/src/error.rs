//! Agent-wide error taxonomy (§7), mapped to RPC/HTTP responses at the edge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    #[error("script not found: {0}")]
    ScriptNotFound(String),
    #[error("no service manager is initialized")]
    NoServiceManager,
    #[error("no backup target is configured")]
    NoBackupTarget,
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),
    #[error("service error: {0}")]
    Service(#[from] ServiceError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown dependency {0:?} declared by service {1:?}")]
    UnknownDependency(String, String),
    #[error("dependency cycle detected among services: {0:?}")]
    Cycle(Vec<String>),
    #[error("service {0:?} failed to start: {1}")]
    StartFailed(String, String),
    #[error("service {0:?} did not become healthy within {1}s")]
    HealthTimeout(String, u64),
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classifies an [`AgentError`] the way §7's taxonomy requires so the HTTP
/// layer and the RPC dispatcher agree on status codes without duplicating
/// the match.
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    NotConfigured,
    Internal,
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::MethodNotFound(_) => ErrorKind::NotFound,
            AgentError::ServiceNotFound(_) | AgentError::ScriptNotFound(_) => ErrorKind::NotFound,
            AgentError::InvalidParams(_) | AgentError::Manifest(_) => ErrorKind::InvalidInput,
            AgentError::NoServiceManager | AgentError::NoBackupTarget => ErrorKind::NotConfigured,
            AgentError::Service(_) | AgentError::Internal(_) => ErrorKind::Internal,
        }
    }
}
