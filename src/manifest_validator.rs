//! Manifest validation.
//!
//! [`ManifestValidator`] checks a [`Manifest`] in six stages:
//!
//! | Stage | Checks |
//! |-------|--------|
//! | [`validate_columns`](ManifestValidator::validate_columns) | every manifest column is in the header |
//! | [`validate_required_values`](ManifestValidator::validate_required_values) | required cells are non-blank |
//! | [`validate_data_types`](ManifestValidator::validate_data_types) | Wikidata ids, URLs, dates and source types are well formed |
//! | [`validate_files_exist`](ManifestValidator::validate_files_exist) | every source file exists |
//! | [`validate_records_present`](ManifestValidator::validate_records_present) | each row resolves to exactly one record |
//! | [`validate_ids_unique`](ManifestValidator::validate_ids_unique) | no institutional id repeats |
//!
//! Each stage can be called on its own. [`validate`](ManifestValidator::validate)
//! runs them all in order without stopping at the first failure, so one pass
//! reports every problem in the manifest.
//!
//! # Examples
//!
//! ```no_run
//! use ds_import::config::ImportConfig;
//! use ds_import::manifest::Manifest;
//! use ds_import::manifest_validator::ManifestValidator;
//! use std::path::Path;
//!
//! let manifest = Manifest::from_path(Path::new("data/manifest.csv")).unwrap();
//! let mut validator = ManifestValidator::new(ImportConfig::default());
//! if !validator.validate(&manifest) {
//!     for error in validator.errors() {
//!         eprintln!("{error}");
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::id_validator::{validator_for, IdValidator};
use crate::manifest::{
    Manifest, ManifestEntry, ALL_COLUMNS, FILENAME, IIIF_MANIFEST_URL, INSTITUTIONAL_ID,
    INSTITUTIONAL_ID_LOCATION_IN_SOURCE, INSTITUTION_WIKIDATA_QID, LINK_TO_INSTITUTIONAL_RECORD,
    MANIFEST_GENERATED_AT, RECORD_LAST_UPDATED, SOURCE_TYPE,
};
use crate::source_format::SourceFormat;

/// Columns that must have a value on every row.
pub const REQUIRED_VALUES: [&str; 6] = [
    INSTITUTION_WIKIDATA_QID,
    SOURCE_TYPE,
    FILENAME,
    INSTITUTIONAL_ID,
    INSTITUTIONAL_ID_LOCATION_IN_SOURCE,
    MANIFEST_GENERATED_AT,
];

/// Columns holding Wikidata item ids.
pub const IDENTIFIER_COLUMNS: [&str; 1] = [INSTITUTION_WIKIDATA_QID];

/// Columns holding http(s) URLs.
pub const URL_COLUMNS: [&str; 2] = [IIIF_MANIFEST_URL, LINK_TO_INSTITUTIONAL_RECORD];

/// Columns holding timestamps.
pub const DATE_COLUMNS: [&str; 2] = [RECORD_LAST_UPDATED, MANIFEST_GENERATED_AT];

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
const OFFSET_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

lazy_static! {
    static ref WIKIDATA_QID: Regex = Regex::new(r"^Q\d+$").unwrap();
}

/// One validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// 1-based manifest row; 0 for manifest-level problems
    pub row: usize,
    /// What is wrong
    pub message: String,
}

impl ValidationError {
    /// Create an error for a data row.
    #[must_use]
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        ValidationError {
            row,
            message: message.into(),
        }
    }

    /// Create an error about the manifest as a whole.
    #[must_use]
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::new(0, message)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.row == 0 {
            write!(f, "Manifest: {}", self.message)
        } else {
            write!(f, "Row {}: {}", self.row, self.message)
        }
    }
}

/// Whether a value is a Wikidata item id such as `Q49117`.
#[must_use]
pub fn is_wikidata_qid(value: &str) -> bool {
    WIKIDATA_QID.is_match(value.trim())
}

/// Whether a value is an absolute http or https URL.
#[must_use]
pub fn is_http_url(value: &str) -> bool {
    url::Url::parse(value.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

/// Whether a value is an ISO 8601 date or date-time.
///
/// Accepts `YYYY-MM-DD` and `YYYY-MM-DDTHH:MM:SS` with optional fractional
/// seconds and an optional `Z` or numeric offset. A space may stand in for `T`.
#[must_use]
pub fn is_iso_date(value: &str) -> bool {
    let value = value.trim();
    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        return true;
    }
    let value = value.replacen(' ', "T", 1);
    DateTime::parse_from_rfc3339(&value).is_ok()
        || DateTime::parse_from_str(&value, OFFSET_DATETIME_FORMAT).is_ok()
        || NAIVE_DATETIME_FORMATS
            .iter()
            .any(|format| NaiveDateTime::parse_from_str(&value, format).is_ok())
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Validates manifests against their source files.
///
/// The validator keeps one [`IdValidator`] per source format for its whole
/// life, so source documents parsed in one pass are reused by the next.
#[derive(Debug)]
pub struct ManifestValidator {
    config: ImportConfig,
    validators: HashMap<SourceFormat, Box<dyn IdValidator>>,
    errors: Vec<ValidationError>,
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new(ImportConfig::default())
    }
}

impl ManifestValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(config: ImportConfig) -> Self {
        ManifestValidator {
            config,
            validators: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Create a validator that resolves records with `validators`, adding
    /// one for any format not yet present.
    #[must_use]
    pub fn with_validators(
        config: ImportConfig,
        validators: HashMap<SourceFormat, Box<dyn IdValidator>>,
    ) -> Self {
        ManifestValidator {
            config,
            validators,
            errors: Vec::new(),
        }
    }

    /// Give back the per-format validators along with their parsed sources.
    #[must_use]
    pub fn into_validators(self) -> HashMap<SourceFormat, Box<dyn IdValidator>> {
        self.validators
    }

    /// Errors accumulated since the last [`validate`](Self::validate) or
    /// [`clear_errors`](Self::clear_errors).
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Take the accumulated errors, leaving the list empty.
    pub fn take_errors(&mut self) -> Vec<ValidationError> {
        std::mem::take(&mut self.errors)
    }

    /// Discard accumulated errors.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    fn push(&mut self, error: ValidationError) {
        debug!(row = error.row, message = %error.message, "validation error");
        self.errors.push(error);
    }

    /// Run every stage. Returns true if the manifest is valid.
    ///
    /// The error list is cleared first; afterwards [`errors`](Self::errors)
    /// holds every problem found.
    pub fn validate(&mut self, manifest: &Manifest) -> bool {
        self.errors.clear();

        // Every stage runs even after an earlier one fails.
        let verdicts = [
            self.validate_columns(manifest),
            self.validate_required_values(manifest),
            self.validate_data_types(manifest),
            self.validate_files_exist(manifest),
            self.validate_records_present(manifest),
            self.validate_ids_unique(manifest),
        ];
        let valid = verdicts.iter().all(|&ok| ok);

        if valid {
            info!(manifest = manifest.identity(), rows = manifest.len(), "manifest is valid");
        } else {
            warn!(
                manifest = manifest.identity(),
                rows = manifest.len(),
                errors = self.errors.len(),
                "manifest failed validation"
            );
        }
        valid
    }

    /// Check that the header contains every manifest column.
    pub fn validate_columns(&mut self, manifest: &Manifest) -> bool {
        let present: HashSet<&str> = manifest.headers().iter().map(String::as_str).collect();
        let missing: Vec<&str> = ALL_COLUMNS
            .iter()
            .copied()
            .filter(|column| !present.contains(column))
            .collect();

        if missing.is_empty() {
            return true;
        }
        self.push(ValidationError::manifest(format!(
            "Missing required column(s): {}",
            missing.join(", ")
        )));
        false
    }

    /// Check that required columns have a value on every row.
    pub fn validate_required_values(&mut self, manifest: &Manifest) -> bool {
        let mut valid = true;
        for entry in manifest {
            for column in REQUIRED_VALUES {
                if is_blank(entry.value(column)) {
                    self.push(ValidationError::new(
                        entry.row(),
                        format!("Required value missing for '{column}'"),
                    ));
                    valid = false;
                }
            }
        }
        valid
    }

    /// Check value formats. Blank values pass; requiredness is checked by
    /// [`validate_required_values`](Self::validate_required_values).
    pub fn validate_data_types(&mut self, manifest: &Manifest) -> bool {
        let mut valid = true;
        for entry in manifest {
            // Run every check so a row reports all of its problems.
            let checks = [
                self.check_identifiers(entry),
                self.check_urls(entry),
                self.check_dates(entry),
                self.check_source_format(entry),
            ];
            valid &= checks.iter().all(|&ok| ok);
        }
        valid
    }

    fn check_column(
        &mut self,
        entry: &ManifestEntry,
        columns: &[&str],
        kind: &str,
        accept: fn(&str) -> bool,
    ) -> bool {
        let mut valid = true;
        for &column in columns {
            let Some(value) = entry.value(column) else {
                continue;
            };
            if value.trim().is_empty() || accept(value) {
                continue;
            }
            self.push(ValidationError::new(
                entry.row(),
                format!("Invalid {kind} in '{column}': '{value}'"),
            ));
            valid = false;
        }
        valid
    }

    fn check_identifiers(&mut self, entry: &ManifestEntry) -> bool {
        self.check_column(entry, &IDENTIFIER_COLUMNS, "Wikidata QID", is_wikidata_qid)
    }

    fn check_urls(&mut self, entry: &ManifestEntry) -> bool {
        self.check_column(entry, &URL_COLUMNS, "URL", is_http_url)
    }

    fn check_dates(&mut self, entry: &ManifestEntry) -> bool {
        self.check_column(entry, &DATE_COLUMNS, "date", is_iso_date)
    }

    fn check_source_format(&mut self, entry: &ManifestEntry) -> bool {
        let raw = entry.source_data_type();
        if raw.trim().is_empty() || entry.source_format().is_ok() {
            return true;
        }
        let expected: Vec<&str> = SourceFormat::ALL.iter().map(|f| f.as_str()).collect();
        self.push(ValidationError::new(
            entry.row(),
            format!(
                "Invalid source data type '{raw}' (expected one of: {})",
                expected.join(", ")
            ),
        ));
        false
    }

    /// Check that every referenced source file exists.
    pub fn validate_files_exist(&mut self, manifest: &Manifest) -> bool {
        let mut valid = true;
        for entry in manifest {
            if entry.filename().is_empty() {
                continue;
            }
            let path = manifest.source_path(entry);
            if !path.is_file() {
                self.push(ValidationError::new(
                    entry.row(),
                    format!("Source file not found: {}", path.display()),
                ));
                valid = false;
            }
        }
        valid
    }

    /// Check that each row's institutional id resolves to exactly one record.
    ///
    /// Rows with a blank id or locator, an unknown source type, or a missing
    /// file are left to the stages that report those problems.
    pub fn validate_records_present(&mut self, manifest: &Manifest) -> bool {
        let mut valid = true;
        for entry in manifest {
            let Ok(format) = entry.source_format() else {
                continue;
            };
            let (id, locator) = (entry.institutional_id(), entry.id_location());
            let path = manifest.source_path(entry);
            if id.is_empty() || locator.is_empty() || !path.is_file() {
                continue;
            }

            let capacity = self.config.cache_capacity;
            let resolver = self
                .validators
                .entry(format)
                .or_insert_with(|| validator_for(format, capacity));
            if resolver.is_present(&path, id, locator) {
                continue;
            }
            let message = resolver.last_error().map_or_else(
                || format!("Record not found for id '{id}' using locator '{locator}'"),
                ToString::to_string,
            );
            self.push(ValidationError::new(entry.row(), message));
            valid = false;
        }
        valid
    }

    /// Check that institutional ids are unique, manifest-wide or per file
    /// depending on [`ImportConfig::ids_unique_per_file`].
    pub fn validate_ids_unique(&mut self, manifest: &Manifest) -> bool {
        let per_file = self.config.ids_unique_per_file;
        let mut first_seen: HashMap<(&str, &str), usize> = HashMap::new();
        let mut valid = true;

        for entry in manifest {
            let id = entry.institutional_id();
            if id.is_empty() {
                continue;
            }
            let scope = if per_file { entry.filename() } else { "" };
            match first_seen.get(&(scope, id)) {
                Some(&first) => {
                    let message = if per_file {
                        format!(
                            "Duplicate institutional id '{id}' in '{scope}' (first seen in row {first})"
                        )
                    } else {
                        format!("Duplicate institutional id '{id}' (first seen in row {first})")
                    };
                    self.push(ValidationError::new(entry.row(), message));
                    valid = false;
                },
                None => {
                    first_seen.insert((scope, id), entry.row());
                },
            }
        }
        valid
    }
}
