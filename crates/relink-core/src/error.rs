//! Error types for relocation operations.
//!
//! Only precondition failures ([`RelinkError::MissingArtifact`],
//! [`RelinkError::NoMatch`], [`RelinkError::AmbiguousModule`]) abort a run.
//! Everything else is caught per artifact and recorded in the report.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for relocation operations.
pub type RelinkResult<T> = Result<T, RelinkError>;

/// Errors that can occur while inspecting or relinking binaries.
#[derive(Debug, Error)]
pub enum RelinkError {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML config parsing error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid glob pattern in the configuration.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Config file not found.
    #[error("config file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched.
        path: PathBuf,
    },

    /// A file required before relinking does not exist.
    #[error("required file '{path}' does not exist")]
    MissingArtifact {
        /// Expected location.
        path: PathBuf,
    },

    /// No regular file matched a library or module pattern.
    #[error("no file matching '{pattern}' in {dir}")]
    NoMatch {
        /// Glob pattern that was tried.
        pattern: String,
        /// Directory searched.
        dir: PathBuf,
    },

    /// A module directory holds more than one loadable module.
    #[error("expected exactly one module in {dir}, found {count}")]
    AmbiguousModule {
        /// Module directory.
        dir: PathBuf,
        /// Number of candidates found.
        count: usize,
    },

    /// The inspection or mutation tool could not be started.
    #[error("failed to run {tool}: {source}")]
    Spawn {
        /// Executable name.
        tool: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The inspection or mutation tool exited with a failure status.
    #[error("{tool} failed on {path} ({status}): {stderr}")]
    ToolFailed {
        /// Executable name.
        tool: String,
        /// Binary being processed.
        path: PathBuf,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// Tool output could not be understood.
    #[error("parse error: {0}")]
    Parse(String),
}

impl RelinkError {
    /// Returns true for errors raised by the precondition check.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::MissingArtifact { .. } | Self::NoMatch { .. } | Self::AmbiguousModule { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_names_path() {
        let err = RelinkError::MissingArtifact {
            path: PathBuf::from("/pkg/libs/libtbb.12.10.dylib"),
        };
        assert_eq!(
            err.to_string(),
            "required file '/pkg/libs/libtbb.12.10.dylib' does not exist"
        );
        assert!(err.is_precondition());
    }

    #[test]
    fn tool_failure_is_not_precondition() {
        let err = RelinkError::ToolFailed {
            tool: "install_name_tool".into(),
            path: PathBuf::from("libfoo.dylib"),
            status: "exit status: 1".into(),
            stderr: "malformed object".into(),
        };
        assert!(!err.is_precondition());
        assert!(err.to_string().contains("malformed object"));
    }
}
