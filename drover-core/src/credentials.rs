//! Credentials presented to remote repositories
//!
//! The token is kept out of configuration to avoid accidental sharing. It is
//! looked up in this order:
//! 1. `DROVER_TOKEN` environment variable
//! 2. `GITHUB_TOKEN` environment variable
//! 3. Secrets file (`~/.config/drover/secrets.toml`, must be 0600 on Unix)

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::redact::redact_secret;
use crate::{Error, Result};

/// Environment variables checked for a token, highest priority first
const TOKEN_ENV_VARS: [&str; 2] = ["DROVER_TOKEN", "GITHUB_TOKEN"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SecretsFile {
    git: GitSecrets,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitSecrets {
    token: Option<String>,
}

/// Opaque credentials handed to remote capabilities
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Credentials {
    /// Credentials carrying an access token
    pub fn with_token(token: impl Into<String>) -> Self {
        let token = token.into().trim().to_string();
        Self {
            token: (!token.is_empty()).then_some(token),
        }
    }

    /// Credentials with no token; clone URLs stay anonymous
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The access token, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Strip this token and any URL userinfo from `text`
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        redact_secret(text, self.token())
    }

    /// Load credentials from the environment, then the default secrets file
    pub fn load() -> Result<Self> {
        for var in TOKEN_ENV_VARS {
            if let Ok(token) = std::env::var(var) {
                let creds = Self::with_token(token);
                if creds.token.is_some() {
                    debug!(source = var, "Using token from environment");
                    return Ok(creds);
                }
            }
        }

        match Self::default_secrets_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::anonymous()),
        }
    }

    /// Load credentials from a secrets file, refusing group/world readable files
    pub fn load_from_file(path: &Path) -> Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = std::fs::metadata(path)?.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }
        }

        let contents = std::fs::read_to_string(path)?;
        let secrets: SecretsFile = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        debug!(path = %path.display(), "Loaded secrets file");
        Ok(secrets.git.token.map(Self::with_token).unwrap_or_default())
    }

    /// Returns `~/.config/drover/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("drover").join("secrets.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_debug_hides_token() {
        let creds = Credentials::with_token("ghp_abc123");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("ghp_abc123"));
        assert!(debug.contains("<set>"));
    }

    #[test]
    fn test_blank_token_is_anonymous() {
        assert_eq!(Credentials::with_token("   "), Credentials::anonymous());
        assert_eq!(Credentials::with_token(" tok \n").token(), Some("tok"));
    }

    #[test]
    fn test_redact_literal_token() {
        let creds = Credentials::with_token("tok-123");
        assert_eq!(creds.redact("bad token tok-123"), "bad token [REDACTED]");
    }

    #[cfg(unix)]
    #[test]
    fn test_insecure_permissions_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[git]\ntoken = \"test\"").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = Credentials::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("insecure permissions"));
    }

    #[cfg(unix)]
    #[test]
    fn test_secure_file_loaded_and_trimmed() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[git]\ntoken = \"  ghp_test  \"").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();

        let creds = Credentials::load_from_file(file.path()).unwrap();
        assert_eq!(creds.token(), Some("ghp_test"));
    }
}
