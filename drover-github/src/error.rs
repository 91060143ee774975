//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// GitHub API error
    #[error("GitHub API error: {0}")]
    Api(#[from] octocrab::Error),

    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// The API answered with a message of its own
    #[error("{0}")]
    Rejected(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Prefer GitHub's own message over the client's wrapping of it
    pub(crate) fn from_api(err: octocrab::Error) -> Self {
        match err {
            octocrab::Error::GitHub { source, .. } => {
                if source.message.contains("Bad credentials") {
                    Error::Auth("Invalid GitHub token".to_string())
                } else {
                    let details: Vec<String> = source
                        .errors
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|e| e.get("message").and_then(|m| m.as_str()).map(str::to_string))
                        .collect();
                    if details.is_empty() {
                        Error::Rejected(source.message)
                    } else {
                        Error::Rejected(format!("{}: {}", source.message, details.join(", ")))
                    }
                }
            }
            other => Error::Api(other),
        }
    }
}

/// Remote capability failures reach callers as [`drover_core::Error::Remote`]
/// with the message unchanged.
impl From<Error> for drover_core::Error {
    fn from(err: Error) -> Self {
        drover_core::Error::Remote(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_message_passes_through() {
        let err: drover_core::Error = Error::Rejected("name already exists on this account".to_string()).into();
        assert!(matches!(err, drover_core::Error::Remote(_)));
        assert_eq!(err.to_string(), "name already exists on this account");
    }

    #[test]
    fn test_auth_message() {
        let err: drover_core::Error = Error::Auth("Invalid GitHub token".to_string()).into();
        assert_eq!(err.to_string(), "GitHub authentication error: Invalid GitHub token");
    }
}
