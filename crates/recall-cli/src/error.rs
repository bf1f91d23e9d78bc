use std::fmt;

use recall::{BackendError, MemoryError};

/// Failure of one CLI invocation, mapped to a process exit code.
#[derive(Debug)]
pub enum CliError {
    /// Arguments parsed but make no sense (bad id, bad value)
    Usage(String),
    /// The referenced memory does not exist
    NotFound(String),
    /// The engine rejected or failed the operation
    Engine(MemoryError),
    /// Writing the result failed
    Output(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            CliError::NotFound(_) => 3,
            CliError::Engine(MemoryError::Validation(_)) => 2,
            CliError::Engine(MemoryError::Timeout(_)) => 4,
            CliError::Engine(_) | CliError::Output(_) => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::NotFound(what) => write!(f, "Memory not found: {what}"),
            CliError::Engine(e) => write!(f, "{e}"),
            CliError::Output(msg) => write!(f, "Output error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MemoryError> for CliError {
    fn from(e: MemoryError) -> Self {
        CliError::Engine(e)
    }
}

impl From<BackendError> for CliError {
    fn from(e: BackendError) -> Self {
        CliError::Engine(e.into())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(format!("JSON: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Output(e.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use recall::ValidationError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Usage("bad".into()).exit_code(), 2);
        assert_eq!(CliError::NotFound("x".into()).exit_code(), 3);
        assert_eq!(
            CliError::from(MemoryError::Validation(ValidationError::EmptyField("title")))
                .exit_code(),
            2
        );
        assert_eq!(
            CliError::from(BackendError::Unavailable("locked".into())).exit_code(),
            1
        );
    }
}
