//! Error types for manifest import operations.
//!
//! This module provides the [`ImportError`] type for all library operations
//! and the [`Result`] convenience type.
//!
//! Errors fall into two families. Parse, dispatch and resolution failures are
//! raised as [`ImportError`] values and abort the operation that hit them.
//! Manifest validation problems are collected as data by
//! [`ManifestValidator`](crate::manifest_validator::ManifestValidator) and only
//! surface here as [`ImportError::InvalidManifest`] when a caller asks for a
//! conversion of a manifest that failed validation.

use std::path::PathBuf;

use thiserror::Error;

use crate::manifest_validator::ValidationError;

/// Error type for all import library operations.
#[derive(Error, Debug)]
pub enum ImportError {
    /// IO error while reading a source file or manifest.
    #[error("IO error reading {}: {source}", path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Malformed XML in a source document.
    #[error("Malformed XML in {}: {message}", path.display())]
    Xml {
        /// File that failed to parse
        path: PathBuf,
        /// Parser diagnostic
        message: String,
    },

    /// Malformed CSV in a source table or manifest.
    #[error("Malformed CSV in {}: {source}", path.display())]
    Csv {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying CSV error
        #[source]
        source: csv::Error,
    },

    /// Locator expression that cannot be parsed.
    #[error("Invalid locator '{locator}': {message}")]
    Locator {
        /// The offending locator expression
        locator: String,
        /// Parser diagnostic
        message: String,
    },

    /// No record matched the institutional id and locator.
    #[error("Record not found for id '{id}' using locator '{locator}'")]
    RecordNotFound {
        /// Institutional id
        id: String,
        /// Locator expression
        locator: String,
    },

    /// More than one record matched the institutional id and locator.
    #[error("Ambiguous locator: {count} records match id '{id}' using locator '{locator}'")]
    AmbiguousRecord {
        /// Institutional id
        id: String,
        /// Locator expression
        locator: String,
        /// Number of matching records
        count: usize,
    },

    /// A CSV source table lacks the column named by a locator.
    #[error("Column '{column}' not found in {}", path.display())]
    MissingColumn {
        /// Missing column name
        column: String,
        /// Table that was searched
        path: PathBuf,
    },

    /// A `source_data_type` value that names no known format.
    #[error("Unrecognized source data type: '{0}'")]
    UnknownSourceFormat(String),

    /// Conversion was requested for a manifest that failed validation.
    #[error("Manifest failed validation with {} error(s)", errors.len())]
    InvalidManifest {
        /// Every error found by the validation pass
        errors: Vec<ValidationError>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error while reading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by a mapper while converting a record.
    #[error(transparent)]
    Mapping(#[from] anyhow::Error),
}

impl ImportError {
    /// Whether this error is a resolution failure (zero or several matches).
    #[must_use]
    pub fn is_resolution_failure(&self) -> bool {
        matches!(
            self,
            ImportError::RecordNotFound { .. }
                | ImportError::AmbiguousRecord { .. }
                | ImportError::MissingColumn { .. }
        )
    }
}

/// Convenience type alias for [`std::result::Result`] with [`ImportError`].
pub type Result<T> = std::result::Result<T, ImportError>;
