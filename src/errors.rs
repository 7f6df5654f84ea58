//! Typed error hierarchy for shipdeck.
//!
//! Three top-level enums cover the three layers:
//! - `RemoteError`: running a command on a host over ssh
//! - `RevisionError`: resolving a revision from a ledger, registry or host
//! - `StatusError`: the preconditions of a status request

use thiserror::Error;

/// Errors from the remote executor.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Failed to spawn ssh client: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Cannot reach host {host}: {message}")]
    Dial { host: String, message: String },

    #[error("Key rejected by {user}@{host}: {message}")]
    Auth {
        user: String,
        host: String,
        message: String,
    },

    #[error("Command {command:?} on {host} exited with code {exit_code}: {stderr}")]
    Command {
        host: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Remote command on {host} was cancelled")]
    Cancelled { host: String },
}

/// Errors from a revision lookup.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("{0}")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not the configured registry {expected:?} but {actual:?}")]
    UnsupportedRegistry { expected: String, actual: String },

    #[error("Lookup cancelled")]
    Cancelled,
}

/// Errors that abort a whole status request.
///
/// Per-host and per-environment lookup failures never show up here; they
/// degrade to the unknown revision instead.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("No project found: {0}")]
    NotFound(String),

    #[error("permission denied")]
    Forbidden { project: String, user: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_command_carries_stderr() {
        let err = RemoteError::Command {
            host: "web1:22".to_string(),
            command: "git rev-parse HEAD".to_string(),
            exit_code: 128,
            stderr: "fatal: not a git repository".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("web1:22"));
        assert!(msg.contains("128"));
        assert!(msg.contains("fatal: not a git repository"));
    }

    #[test]
    fn remote_error_converts_into_revision_error() {
        let err: RevisionError = RemoteError::Cancelled {
            host: "h".to_string(),
        }
        .into();
        match err {
            RevisionError::Remote(RemoteError::Cancelled { host }) => assert_eq!(host, "h"),
            other => panic!("Expected Remote(Cancelled), got {other:?}"),
        }
    }

    #[test]
    fn revision_error_decode_has_source() {
        use std::error::Error as _;
        let source = serde_json::from_str::<String>("not json").unwrap_err();
        let err = RevisionError::Decode {
            what: "manifest".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("Failed to decode manifest"));
        assert!(err.source().is_some());
    }

    #[test]
    fn status_error_forbidden_message_hides_details() {
        let err = StatusError::Forbidden {
            project: "web".to_string(),
            user: "bob".to_string(),
        };
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn status_error_not_found_names_project() {
        let err = StatusError::NotFound("api".to_string());
        assert_eq!(err.to_string(), "No project found: api");
    }
}
