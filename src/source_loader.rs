//! Loading and caching of source documents.
//!
//! Every source format is read by a [`SourceLoader`], which pairs a
//! format-specific [`DocumentParser`] with a [`SourceCache`] so that each file
//! is read and parsed at most once while it stays cached.
//!
//! | Format | Parser | Document |
//! |---|---|---|
//! | `marc-xml` | [`MarcXmlParser`] | [`XmlDocument`], namespaces stripped |
//! | `tei-xml` | [`TeiXmlParser`] | [`XmlDocument`], namespaces stripped |
//! | `ds-mets` | [`MetsXmlParser`] | [`XmlDocument`], namespaces preserved |
//! | `ds-csv` | [`CsvParser`] | [`CsvTable`] |
//!
//! # Examples
//!
//! ```no_run
//! use ds_import::source_loader::MarcXmlLoader;
//! use std::path::Path;
//!
//! # fn main() -> ds_import::Result<()> {
//! let mut loader = MarcXmlLoader::default();
//! let first = loader.load(Path::new("data/marc.xml"))?;
//! let again = loader.load(Path::new("data/marc.xml"))?; // served from cache
//! assert!(std::rc::Rc::ptr_eq(&first, &again));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::error::{ImportError, Result};
use crate::source_cache::{SourceCache, DEFAULT_CACHE_CAPACITY};
use crate::xml_document::{NamespaceMode, XmlDocument};

/// Parses one source file into a queryable document.
///
/// Implementations are stateless; caching is handled by [`SourceLoader`].
pub trait DocumentParser: fmt::Debug {
    /// The parsed representation.
    type Document: fmt::Debug;

    /// Read and parse `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    fn open(&self, path: &Path) -> Result<Self::Document>;
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn open_xml(path: &Path, mode: NamespaceMode) -> Result<XmlDocument> {
    let text = read_source(path)?;
    XmlDocument::parse_str(&text, mode).map_err(|message| ImportError::Xml {
        path: path.to_path_buf(),
        message,
    })
}

/// MARCXML files: a single `<record>` or a `<collection>` of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarcXmlParser;

impl DocumentParser for MarcXmlParser {
    type Document = XmlDocument;

    fn open(&self, path: &Path) -> Result<XmlDocument> {
        open_xml(path, NamespaceMode::Strip)
    }
}

/// TEI manuscript descriptions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeiXmlParser;

impl DocumentParser for TeiXmlParser {
    type Document = XmlDocument;

    fn open(&self, path: &Path) -> Result<XmlDocument> {
        open_xml(path, NamespaceMode::Strip)
    }
}

/// METS packages. Names keep their prefixes because METS files mix sibling
/// vocabularies (`mets:`, `mods:`, `dc:`) whose local names collide.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetsXmlParser;

impl DocumentParser for MetsXmlParser {
    type Document = XmlDocument;

    fn open(&self, path: &Path) -> Result<XmlDocument> {
        open_xml(path, NamespaceMode::Preserve)
    }
}

/// Header-bearing CSV tables, one row per record.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser;

impl DocumentParser for CsvParser {
    type Document = CsvTable;

    fn open(&self, path: &Path) -> Result<CsvTable> {
        let csv_error = |source| ImportError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let file = fs::File::open(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        CsvTable::from_reader(file).map_err(csv_error)
    }
}

/// A parsed CSV source: header plus rows of string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// Parse CSV from any reader. The first record is the header.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed CSV, including rows whose length differs
    /// from the header's.
    pub fn from_reader<R: std::io::Read>(reader: R) -> std::result::Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, _>>()?;
        Ok(CsvTable { headers, rows })
    }

    /// Column names in order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Index of the named column.
    #[must_use]
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `row` in the named column.
    #[must_use]
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    /// Iterate rows as cell slices.
    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Caching loader for one source format.
///
/// Documents are keyed by normalized path and shared through [`Rc`], so a
/// document handed out stays valid after the cache evicts it.
pub struct SourceLoader<P: DocumentParser> {
    parser: P,
    cache: SourceCache<PathBuf, Rc<P::Document>>,
}

/// Loader for MARCXML sources.
pub type MarcXmlLoader = SourceLoader<MarcXmlParser>;
/// Loader for TEI sources.
pub type TeiXmlLoader = SourceLoader<TeiXmlParser>;
/// Loader for METS sources.
pub type MetsXmlLoader = SourceLoader<MetsXmlParser>;
/// Loader for flat CSV sources.
pub type CsvLoader = SourceLoader<CsvParser>;

impl<P: DocumentParser> SourceLoader<P> {
    /// Create a loader that keeps up to `cache_capacity` parsed documents.
    #[must_use]
    pub fn new(parser: P, cache_capacity: usize) -> Self {
        SourceLoader {
            parser,
            cache: SourceCache::new(cache_capacity),
        }
    }

    /// Load `path`, parsing it only if it is not cached.
    ///
    /// # Errors
    ///
    /// Returns the parser's error for missing or malformed files. Failures are
    /// not cached; a later call retries the read.
    pub fn load(&mut self, path: &Path) -> Result<Rc<P::Document>> {
        let key = normalize_path(path);
        let parser = &self.parser;
        let document = self.cache.get_or_add(key, || {
            debug!(path = %path.display(), "parsing source document");
            parser.open(path).map(Rc::new)
        })?;
        Ok(Rc::clone(document))
    }

    /// The underlying document cache.
    #[must_use]
    pub fn cache(&self) -> &SourceCache<PathBuf, Rc<P::Document>> {
        &self.cache
    }

    /// The format parser.
    #[must_use]
    pub fn parser(&self) -> &P {
        &self.parser
    }
}

impl<P: DocumentParser + Default> Default for SourceLoader<P> {
    fn default() -> Self {
        Self::new(P::default(), DEFAULT_CACHE_CAPACITY)
    }
}

impl<P: DocumentParser> fmt::Debug for SourceLoader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLoader")
            .field("parser", &self.parser)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Cache key for a source path: canonical when the file exists.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
