use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to fetch metrics for {scope}{}: {message}", status_suffix(.status))]
    Upstream {
        scope: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Upstream HTTP status, when the failure came from the transport.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_names_scope_and_status() {
        let e = Error::Upstream {
            scope: "organization 'acme'".into(),
            status: Some(404),
            message: "Not Found".into(),
        };
        assert_eq!(
            e.to_string(),
            "Failed to fetch metrics for organization 'acme' (status 404): Not Found"
        );
        assert_eq!(e.status(), Some(404));
    }

    #[test]
    fn test_upstream_message_without_status() {
        let e = Error::Upstream {
            scope: "team 'web' in organization 'acme'".into(),
            status: None,
            message: "connection refused".into(),
        };
        assert_eq!(
            e.to_string(),
            "Failed to fetch metrics for team 'web' in organization 'acme': connection refused"
        );
        assert_eq!(e.status(), None);
    }
}
