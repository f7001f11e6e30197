//! The manifest: one row per physical item to validate and convert.
//!
//! A manifest is a header-bearing CSV whose rows name a source file, its
//! format, and where the item's institutional id lives inside that file.
//! [`Manifest`] is an ordered, read-only view over those rows; iterating it
//! always starts at the first row.
//!
//! # Examples
//!
//! ```
//! use ds_import::manifest::Manifest;
//!
//! let csv = "holding_institution_wikidata_qid,holding_institution_wikidata_label,ds_id,\
//! source_data_type,filename,holding_institution_institutional_id,\
//! institutional_id_location_in_source,record_last_updated,call_number,title,\
//! iiif_manifest_url,link_to_institutional_record,manifest_generated_at
//! Q49117,University of Pennsylvania,,marc-xml,marc.xml,9951865503503681,\
//! controlfield[@tag='001'],2023-12-12T05:05:05,LJS 101,Hours,,,2024-01-01T00:00:00
//! ";
//!
//! let manifest = Manifest::from_reader(csv.as_bytes(), "data", "inline").unwrap();
//! assert_eq!(manifest.len(), 1);
//! let entry = manifest.iter().next().unwrap();
//! assert_eq!(entry.row(), 1);
//! assert_eq!(entry.institutional_id(), "9951865503503681");
//! assert_eq!(entry.ds_id(), None);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};
use crate::source_format::SourceFormat;

/// `holding_institution_wikidata_qid`
pub const INSTITUTION_WIKIDATA_QID: &str = "holding_institution_wikidata_qid";
/// `holding_institution_wikidata_label`
pub const INSTITUTION_WIKIDATA_LABEL: &str = "holding_institution_wikidata_label";
/// `ds_id`
pub const DS_ID: &str = "ds_id";
/// `source_data_type`
pub const SOURCE_TYPE: &str = "source_data_type";
/// `filename`
pub const FILENAME: &str = "filename";
/// `holding_institution_institutional_id`
pub const INSTITUTIONAL_ID: &str = "holding_institution_institutional_id";
/// `institutional_id_location_in_source`
pub const INSTITUTIONAL_ID_LOCATION_IN_SOURCE: &str = "institutional_id_location_in_source";
/// `record_last_updated`
pub const RECORD_LAST_UPDATED: &str = "record_last_updated";
/// `call_number`
pub const CALL_NUMBER: &str = "call_number";
/// `title`
pub const TITLE: &str = "title";
/// `iiif_manifest_url`
pub const IIIF_MANIFEST_URL: &str = "iiif_manifest_url";
/// `link_to_institutional_record`
pub const LINK_TO_INSTITUTIONAL_RECORD: &str = "link_to_institutional_record";
/// `manifest_generated_at`
pub const MANIFEST_GENERATED_AT: &str = "manifest_generated_at";

/// Every manifest column, in canonical order.
pub const ALL_COLUMNS: [&str; 13] = [
    INSTITUTION_WIKIDATA_QID,
    INSTITUTION_WIKIDATA_LABEL,
    DS_ID,
    SOURCE_TYPE,
    FILENAME,
    INSTITUTIONAL_ID,
    INSTITUTIONAL_ID_LOCATION_IN_SOURCE,
    RECORD_LAST_UPDATED,
    CALL_NUMBER,
    TITLE,
    IIIF_MANIFEST_URL,
    LINK_TO_INSTITUTIONAL_RECORD,
    MANIFEST_GENERATED_AT,
];

/// One manifest row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestEntry {
    #[serde(skip)]
    row: usize,
    holding_institution_wikidata_qid: String,
    holding_institution_wikidata_label: String,
    ds_id: String,
    source_data_type: String,
    filename: String,
    holding_institution_institutional_id: String,
    institutional_id_location_in_source: String,
    record_last_updated: String,
    call_number: String,
    title: String,
    iiif_manifest_url: String,
    link_to_institutional_record: String,
    manifest_generated_at: String,
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

impl ManifestEntry {
    /// 1-based data row number (the header is not counted).
    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    /// Raw value of a manifest column, `None` for unknown column names.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&str> {
        let value = match column {
            INSTITUTION_WIKIDATA_QID => &self.holding_institution_wikidata_qid,
            INSTITUTION_WIKIDATA_LABEL => &self.holding_institution_wikidata_label,
            DS_ID => &self.ds_id,
            SOURCE_TYPE => &self.source_data_type,
            FILENAME => &self.filename,
            INSTITUTIONAL_ID => &self.holding_institution_institutional_id,
            INSTITUTIONAL_ID_LOCATION_IN_SOURCE => &self.institutional_id_location_in_source,
            RECORD_LAST_UPDATED => &self.record_last_updated,
            CALL_NUMBER => &self.call_number,
            TITLE => &self.title,
            IIIF_MANIFEST_URL => &self.iiif_manifest_url,
            LINK_TO_INSTITUTIONAL_RECORD => &self.link_to_institutional_record,
            MANIFEST_GENERATED_AT => &self.manifest_generated_at,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Wikidata id of the holding institution.
    #[must_use]
    pub fn institution_wikidata_qid(&self) -> &str {
        self.holding_institution_wikidata_qid.trim()
    }

    /// Wikidata label of the holding institution.
    #[must_use]
    pub fn institution_wikidata_label(&self) -> &str {
        self.holding_institution_wikidata_label.trim()
    }

    /// Output identifier, if already assigned.
    #[must_use]
    pub fn ds_id(&self) -> Option<&str> {
        non_blank(&self.ds_id)
    }

    /// The `source_data_type` value as written.
    #[must_use]
    pub fn source_data_type(&self) -> &str {
        &self.source_data_type
    }

    /// The parsed source format.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::UnknownSourceFormat`] for unrecognized values.
    pub fn source_format(&self) -> Result<SourceFormat> {
        self.source_data_type.parse()
    }

    /// Source file name, relative to the manifest's source directory.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.filename.trim()
    }

    /// Institution's identifier for the item.
    #[must_use]
    pub fn institutional_id(&self) -> &str {
        self.holding_institution_institutional_id.trim()
    }

    /// Locator expression for the institutional id.
    #[must_use]
    pub fn id_location(&self) -> &str {
        self.institutional_id_location_in_source.trim()
    }

    /// When the institution last updated the record.
    #[must_use]
    pub fn record_last_updated(&self) -> Option<&str> {
        non_blank(&self.record_last_updated)
    }

    /// Shelfmark or call number.
    #[must_use]
    pub fn call_number(&self) -> Option<&str> {
        non_blank(&self.call_number)
    }

    /// Title as given in the manifest.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        non_blank(&self.title)
    }

    /// IIIF presentation manifest URL.
    #[must_use]
    pub fn iiif_manifest_url(&self) -> Option<&str> {
        non_blank(&self.iiif_manifest_url)
    }

    /// Link to the institution's catalog record.
    #[must_use]
    pub fn link_to_institutional_record(&self) -> Option<&str> {
        non_blank(&self.link_to_institutional_record)
    }

    /// When the manifest row was generated.
    #[must_use]
    pub fn manifest_generated_at(&self) -> Option<&str> {
        non_blank(&self.manifest_generated_at)
    }
}

/// Ordered, read-only collection of manifest rows.
#[derive(Debug, Clone)]
pub struct Manifest {
    identity: String,
    source_dir: PathBuf,
    headers: Vec<String>,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Read a manifest file. Source files are resolved against the manifest's
    /// own directory.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Io`] if the file cannot be opened and
    /// [`ImportError::Csv`] if it is not valid CSV.
    pub fn from_path(path: &Path) -> Result<Self> {
        let source_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::from_path_with_source_dir(path, source_dir)
    }

    /// Read a manifest file whose source files live in `source_dir`.
    ///
    /// # Errors
    ///
    /// As [`from_path`](Self::from_path).
    pub fn from_path_with_source_dir(path: &Path, source_dir: impl Into<PathBuf>) -> Result<Self> {
        let file = fs::File::open(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read(file, source_dir.into(), path.display().to_string(), path)
    }

    /// Read a manifest from any reader. `identity` names the manifest in
    /// mapper registries and log output.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Csv`] if the input is not valid CSV.
    pub fn from_reader<R: std::io::Read>(
        reader: R,
        source_dir: impl Into<PathBuf>,
        identity: &str,
    ) -> Result<Self> {
        Self::read(reader, source_dir.into(), identity.to_string(), Path::new(identity))
    }

    fn read<R: std::io::Read>(
        reader: R,
        source_dir: PathBuf,
        identity: String,
        path: &Path,
    ) -> Result<Self> {
        let csv_error = |source| ImportError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        reader.set_headers(csv::StringRecord::from(headers.clone()));

        let mut entries = Vec::new();
        for (index, record) in reader.deserialize::<ManifestEntry>().enumerate() {
            let mut entry = record.map_err(csv_error)?;
            entry.row = index + 1;
            entries.push(entry);
        }

        Ok(Manifest {
            identity,
            source_dir,
            headers,
            entries,
        })
    }

    /// Name identifying this manifest (its path, or the label given to
    /// [`from_reader`](Self::from_reader)).
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Directory source file names are resolved against.
    #[must_use]
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Full path of an entry's source file.
    #[must_use]
    pub fn source_path(&self, entry: &ManifestEntry) -> PathBuf {
        self.source_dir.join(entry.filename())
    }

    /// Header row as written (trimmed).
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by 1-based row number.
    #[must_use]
    pub fn entry(&self, row: usize) -> Option<&ManifestEntry> {
        row.checked_sub(1).and_then(|index| self.entries.get(index))
    }

    /// Iterate entries from the first row.
    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> String {
        ALL_COLUMNS.join(",")
    }

    fn sample() -> String {
        format!(
            "{}\n\
             Q49117,Penn,DS1,marc-xml,marc.xml, 99123 ,controlfield[@tag='001'],,LJS 1,Hours,,,2024-01-01\n\
             Q49117,Penn,,tei-xml,tei.xml,MS 2,//idno,,,,,,2024-01-01\n",
            header()
        )
    }

    #[test]
    fn test_entries_in_file_order() {
        let manifest = Manifest::from_reader(sample().as_bytes(), "src", "sample").unwrap();
        let rows: Vec<_> = manifest.iter().map(ManifestEntry::row).collect();
        assert_eq!(rows, vec![1, 2]);
        assert_eq!(manifest.identity(), "sample");
        assert_eq!(manifest.headers().len(), ALL_COLUMNS.len());
    }

    #[test]
    fn test_each_traversal_starts_at_first_row() {
        let manifest = Manifest::from_reader(sample().as_bytes(), "src", "sample").unwrap();
        let first: Vec<_> = manifest.iter().take(1).map(ManifestEntry::row).collect();
        let second: Vec<_> = (&manifest).into_iter().map(ManifestEntry::row).collect();
        assert_eq!(first, vec![1]);
        assert_eq!(second, vec![1, 2]);
    }

    #[test]
    fn test_entry_accessors() {
        let manifest = Manifest::from_reader(sample().as_bytes(), "src", "sample").unwrap();
        let entry = manifest.entry(1).unwrap();

        assert_eq!(entry.institutional_id(), "99123");
        assert_eq!(entry.ds_id(), Some("DS1"));
        assert_eq!(entry.source_format().unwrap(), SourceFormat::MarcXml);
        assert_eq!(entry.call_number(), Some("LJS 1"));
        assert_eq!(entry.record_last_updated(), None);
        assert_eq!(manifest.source_path(entry), Path::new("src").join("marc.xml"));
        assert_eq!(manifest.entry(2).unwrap().ds_id(), None);
        assert!(manifest.entry(0).is_none());
        assert!(manifest.entry(3).is_none());
    }

    #[test]
    fn test_missing_columns_load_as_blank() {
        let csv = "filename,source_data_type\nmarc.xml,marc-xml\n";
        let manifest = Manifest::from_reader(csv.as_bytes(), ".", "partial").unwrap();
        let entry = manifest.entry(1).unwrap();
        assert_eq!(entry.filename(), "marc.xml");
        assert_eq!(entry.institutional_id(), "");
        assert_eq!(entry.value(TITLE), Some(""));
        assert_eq!(entry.value("not_a_column"), None);
    }

    #[test]
    fn test_unknown_source_type_is_kept_raw() {
        let csv = "filename,source_data_type\nx.xml,marc\n";
        let manifest = Manifest::from_reader(csv.as_bytes(), ".", "bad").unwrap();
        let entry = manifest.entry(1).unwrap();
        assert_eq!(entry.source_data_type(), "marc");
        assert!(entry.source_format().is_err());
    }

    #[test]
    fn test_missing_manifest_file() {
        let err = Manifest::from_path(Path::new("/nonexistent/manifest.csv")).unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}
