//! Configuration for validation and conversion runs.
//!
//! [`ImportConfig`] carries the knobs shared by
//! [`ManifestValidator`](crate::manifest_validator::ManifestValidator) and
//! [`Converter`](crate::converter::Converter). Institution names and Wikidata
//! identifiers live in an [`InstitutionTable`], built once when configuration
//! is loaded and shared read-only afterwards.
//!
//! # Examples
//!
//! ```
//! use ds_import::config::ImportConfig;
//!
//! let config = ImportConfig::from_json_str(r#"{
//!     "cache_capacity": 4,
//!     "institutions": [
//!         { "qid": "Q49117", "label": "University of Pennsylvania",
//!           "names": ["Penn", "UPenn"] }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(config.cache_capacity, 4);
//! assert_eq!(config.institutions.qid_for_name("upenn"), Some("Q49117"));
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::source_cache::DEFAULT_CACHE_CAPACITY;

/// One holding institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    /// Wikidata item id, e.g. `Q49117`
    pub qid: String,
    /// Preferred display label
    pub label: String,
    /// Alternate names the institution appears under
    #[serde(default)]
    pub names: Vec<String>,
}

/// Immutable lookup table of institutions by Wikidata id and by name.
///
/// Name lookups ignore case and surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstitutionTable {
    institutions: Vec<Institution>,
    by_qid: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl InstitutionTable {
    /// Build a table. Later entries win when ids or names repeat.
    #[must_use]
    pub fn new(institutions: Vec<Institution>) -> Self {
        let mut by_qid = HashMap::new();
        let mut by_name = HashMap::new();
        for (index, institution) in institutions.iter().enumerate() {
            by_qid.insert(institution.qid.trim().to_string(), index);
            by_name.insert(name_key(&institution.label), index);
            for name in &institution.names {
                by_name.insert(name_key(name), index);
            }
        }
        InstitutionTable {
            institutions,
            by_qid,
            by_name,
        }
    }

    /// Parse a JSON array of institutions.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Json`] on malformed input.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let institutions: Vec<Institution> = serde_json::from_str(json)?;
        Ok(Self::new(institutions))
    }

    /// Institution with the given Wikidata id.
    #[must_use]
    pub fn get(&self, qid: &str) -> Option<&Institution> {
        self.by_qid
            .get(qid.trim())
            .map(|&index| &self.institutions[index])
    }

    /// Preferred label for a Wikidata id.
    #[must_use]
    pub fn label_for(&self, qid: &str) -> Option<&str> {
        self.get(qid).map(|institution| institution.label.as_str())
    }

    /// Wikidata id for a label or alternate name.
    #[must_use]
    pub fn qid_for_name(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(&name_key(name))
            .map(|&index| self.institutions[index].qid.as_str())
    }

    /// Number of institutions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.institutions.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.institutions.is_empty()
    }

    /// Institutions in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Institution> {
        self.institutions.iter()
    }
}

impl FromIterator<Institution> for InstitutionTable {
    fn from_iter<I: IntoIterator<Item = Institution>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Serialize for InstitutionTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.institutions.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for InstitutionTable {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<Institution>::deserialize(deserializer).map(Self::new)
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Settings for a validation or conversion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Parsed documents kept per source format
    pub cache_capacity: usize,

    /// Institutional ids need only be unique within one source file.
    ///
    /// When false (default), an id may appear once in the whole manifest.
    pub ids_unique_per_file: bool,

    /// Institution lookup table shared by mappers
    pub institutions: Arc<InstitutionTable>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            ids_unique_per_file: false,
            institutions: Arc::new(InstitutionTable::default()),
        }
    }
}

impl ImportConfig {
    /// Parse configuration from JSON. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Json`] on malformed input and
    /// [`ImportError::Config`] if a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ImportConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Io`] if the file cannot be read, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Config`] if `cache_capacity` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(ImportError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the per-format document cache capacity.
    #[must_use]
    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Check id uniqueness per source file instead of manifest-wide.
    #[must_use]
    pub fn with_ids_unique_per_file(mut self, per_file: bool) -> Self {
        self.ids_unique_per_file = per_file;
        self
    }

    /// Use the given institution table.
    #[must_use]
    pub fn with_institutions(mut self, institutions: InstitutionTable) -> Self {
        self.institutions = Arc::new(institutions);
        self
    }
}
