// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Maps config, auth, local file and remote failures to exit codes

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Cannot read local file {}: {source}", path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote error {status} on {endpoint}: {message}")]
    Remote {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            Error::Auth(_) => 3,
            Error::LocalFile { .. } => 4,
            Error::Network(_) => 5,
            Error::Remote { .. } => 6,
            Error::Parse(_) => 7,
            Error::Filesystem(_) => 8,
        }
    }

    /// Transport failures and server-side statuses worth a second attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Remote { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(Error::Config("test".into()).exit_code(), 2);
        assert_eq!(Error::Auth("test".into()).exit_code(), 3);
        assert_eq!(
            Error::LocalFile {
                path: "a.json".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            }
            .exit_code(),
            4
        );
        assert_eq!(
            Error::Remote {
                endpoint: "test".into(),
                status: 404,
                message: "not found".into()
            }
            .exit_code(),
            6
        );
    }

    #[test]
    fn test_local_file_message_names_path() {
        let err = Error::LocalFile {
            path: "data/a.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("data/a.json"));
    }

    #[test]
    fn test_transient_statuses() {
        let remote = |status| Error::Remote {
            endpoint: "/x".into(),
            status,
            message: String::new(),
        };
        assert!(remote(503).is_transient());
        assert!(remote(429).is_transient());
        assert!(!remote(403).is_transient());
        assert!(!Error::Auth("nope".into()).is_transient());
    }
}
