use thiserror::Error;

/// Errors raised by the harness core.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Registry index outside `[0, len)`.
    #[error("app index {id} out of range (registry has {len} apps)")]
    OutOfRange { id: usize, len: usize },

    /// The campaign task could not be launched.
    #[error("failed to start app test task: {0}")]
    Spawn(String),

    #[error("duplicate app name in catalog: {0}")]
    DuplicateApp(String),

    #[error("app catalog is empty")]
    EmptyCatalog,

    #[error("unknown driver class: {0}")]
    UnknownDriverClass(String),

    #[error("invalid health check: {0}")]
    InvalidHealthCheck(String),
}
