//! Error taxonomy for the point-cloud core.
//!
//! [`PointCloudError`] is the single domain error type. Every variant carries a
//! human-readable message; the variants that a caller can act on also carry an
//! ordered list of remediation `suggestions` which the dispatcher forwards
//! verbatim in its error response.
//!
//! No error ever crosses the dispatcher boundary as a Rust `Err`: the
//! dispatcher converts each one into a structured `{status: "error", ...}`
//! response.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type PointCloudResult<T> = Result<T, PointCloudError>;

/// Domain errors raised by the resource analyzer, sessions, and geometry backends.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointCloudError {
    /// Malformed or missing parameters, invalid method names, invalid array shapes.
    ///
    /// Always recoverable by the caller correcting the input; never retried.
    #[error("{message}")]
    Validation {
        /// Description of the problem.
        message: String,
        /// Optional next steps for the caller.
        suggestions: Vec<String>,
    },

    /// The referenced file path does not exist.
    #[error("File not found: {path}")]
    NotFound {
        /// The path that was requested.
        path: String,
    },

    /// The file extension or requested format is not handled by any available backend.
    #[error("Unsupported point cloud format: {format}")]
    UnsupportedFormat {
        /// The format name or extension that was rejected.
        format: String,
        /// Formats the caller could use instead.
        suggestions: Vec<String>,
    },

    /// No geometry backend is available at all.
    #[error("No point cloud library available")]
    NoLibrary {
        /// Install-time remedies.
        suggestions: Vec<String>,
    },

    /// The pre-flight memory estimate exceeds the safe threshold.
    #[error("{message}")]
    Resource {
        /// Description of the shortfall.
        message: String,
        /// Concrete alternatives (recommended point count, parameters).
        suggestions: Vec<String>,
    },

    /// An operation requiring a loaded cloud was invoked on an empty session.
    #[error("No point cloud loaded in session")]
    NoPointCloud,

    /// The request was cancelled before the backend call started.
    #[error("Operation '{operation}' was cancelled")]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
    },

    /// The geometry backend failed for a reason outside the taxonomy above.
    #[error("Geometry backend failure: {message}")]
    Backend {
        /// Context describing the failure.
        message: String,
    },
}

impl PointCloudError {
    /// Creates a [`PointCloudError::Validation`] without suggestions.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    /// Creates a [`PointCloudError::Validation`] with suggestions.
    pub fn validation_with(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            suggestions,
        }
    }

    /// Creates a [`PointCloudError::Backend`].
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates the [`PointCloudError::NoLibrary`] error with the standard install remedies.
    pub fn no_library() -> Self {
        Self::NoLibrary {
            suggestions: vec![
                "Build the node with the native geometry backend enabled (the `geometry` crate)"
                    .to_string(),
                "Register a GeometryBackend implementation when constructing the dispatcher"
                    .to_string(),
            ],
        }
    }

    /// Returns the remediation suggestions carried by this error (empty if none).
    pub fn suggestions(&self) -> &[String] {
        match self {
            Self::Validation { suggestions, .. }
            | Self::UnsupportedFormat { suggestions, .. }
            | Self::NoLibrary { suggestions }
            | Self::Resource { suggestions, .. } => suggestions,
            Self::NotFound { .. }
            | Self::NoPointCloud
            | Self::Cancelled { .. }
            | Self::Backend { .. } => &[],
        }
    }

    /// Stable tag naming the error kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::NoLibrary { .. } => "no_library",
            Self::Resource { .. } => "resource",
            Self::NoPointCloud => "no_point_cloud",
            Self::Cancelled { .. } => "cancelled",
            Self::Backend { .. } => "backend",
        }
    }

    /// Returns `true` for failures that originate outside the domain taxonomy.
    ///
    /// The dispatcher reports these with a generic message instead of the
    /// underlying library text.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }
}
