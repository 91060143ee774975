//! Error types for Drover

use thiserror::Error;

/// Result type alias for Drover operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Drover operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A git command exited unsuccessfully.
    ///
    /// `command` is the rendered command line with credentials stripped.
    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    /// The operation was called in a state that cannot support it
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Error reported by a remote repository capability, passed through as-is
    #[error("{0}")]
    Remote(String),

    /// The remote does not offer the requested capability
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The failing command line, if this error came from a git invocation
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::Command { command, .. } => Some(command),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_message_includes_command() {
        let err = Error::Command {
            command: "git push origin main".to_string(),
            stderr: "rejected".to_string(),
        };
        assert_eq!(err.to_string(), "`git push origin main` failed: rejected");
        assert_eq!(err.command(), Some("git push origin main"));
    }

    #[test]
    fn test_remote_error_is_verbatim() {
        let err = Error::Remote("name already exists on this account".to_string());
        assert_eq!(err.to_string(), "name already exists on this account");
        assert!(err.command().is_none());
    }
}
