//! Record resolution: finding the one record a manifest row points at.
//!
//! Each source format has an [`IdValidator`]. All of them follow the same
//! algorithm:
//!
//! 1. load the source document through a caching [`SourceLoader`],
//! 2. bind the institutional id into the row's locator expression,
//! 3. run the resulting query against the document,
//! 4. lift every hit to its enclosing record element and classify the
//!    distinct records: none is [`ImportError::RecordNotFound`], one is the
//!    resolved record, several is [`ImportError::AmbiguousRecord`].
//!
//! XML formats share [`XmlIdValidator`]; flat CSV uses [`CsvIdValidator`], whose
//! locator names a column instead of a path.
//!
//! # Examples
//!
//! ```no_run
//! use ds_import::id_validator::{IdValidator, XmlIdValidator};
//! use std::path::Path;
//!
//! let mut validator = XmlIdValidator::marc_xml(10);
//! let found = validator.is_present(
//!     Path::new("data/marc.xml"),
//!     "9951865503503681",
//!     "controlfield[@tag='001']",
//! );
//! if !found {
//!     eprintln!("{}", validator.last_error().unwrap());
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::error::{ImportError, Result};
use crate::locator::{Item, Query, ID_PLACEHOLDER};
use crate::source_format::SourceFormat;
use crate::source_loader::{
    CsvParser, CsvTable, DocumentParser, MarcXmlParser, MetsXmlParser, SourceLoader, TeiXmlParser,
};
use crate::xml_document::{NodeId, XmlDocument};

/// Record element wrapped around MARC locators.
pub const MARC_RECORD_ELEMENT: &str = "record";
/// Record element wrapped around TEI locators.
pub const TEI_RECORD_ELEMENT: &str = "TEI";
/// Record element wrapped around METS locators.
pub const METS_RECORD_ELEMENT: &str = "mets:mets";

/// A uniquely resolved source record.
///
/// The handle shares the cached document and only reads from it.
#[derive(Debug, Clone)]
pub enum ResolvedRecord {
    /// A node inside an XML document
    Xml {
        /// The whole source document
        document: Rc<XmlDocument>,
        /// The record element enclosing the match
        node: NodeId,
    },
    /// A row of a CSV table
    Csv {
        /// The whole source table
        table: Rc<CsvTable>,
        /// Zero-based data row index
        row: usize,
    },
}

impl ResolvedRecord {
    /// Evaluate a relative locator against an XML record and return its text.
    ///
    /// Returns `None` for CSV records or when nothing is selected.
    #[must_use]
    pub fn xml_string(&self, query: &Query) -> Option<String> {
        match self {
            ResolvedRecord::Xml { document, node } => query.string(document, *node, None),
            ResolvedRecord::Csv { .. } => None,
        }
    }

    /// Value of a column in a CSV record.
    #[must_use]
    pub fn csv_value(&self, column: &str) -> Option<&str> {
        match self {
            ResolvedRecord::Csv { table, row } => table.get(*row, column),
            ResolvedRecord::Xml { .. } => None,
        }
    }
}

/// Resolves manifest rows to records in one source format.
pub trait IdValidator: fmt::Debug {
    /// The format this validator handles.
    fn source_format(&self) -> SourceFormat;

    /// Resolve the single record identified by `id` and `locator` in `path`.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the source cannot be loaded, a locator error if
    /// the locator is invalid, and [`ImportError::RecordNotFound`] or
    /// [`ImportError::AmbiguousRecord`] if the match count is not exactly one.
    fn resolve(&mut self, path: &Path, id: &str, locator: &str) -> Result<ResolvedRecord>;

    /// Whether exactly one record matches. Failure detail is kept for
    /// [`last_error`](Self::last_error).
    fn is_present(&mut self, path: &Path, id: &str, locator: &str) -> bool;

    /// Detail of the most recent failed [`is_present`](Self::is_present) call.
    fn last_error(&self) -> Option<&ImportError>;
}

/// Build the validator for a format.
#[must_use]
pub fn validator_for(format: SourceFormat, cache_capacity: usize) -> Box<dyn IdValidator> {
    match format {
        SourceFormat::MarcXml => Box::new(XmlIdValidator::marc_xml(cache_capacity)),
        SourceFormat::TeiXml => Box::new(XmlIdValidator::tei_xml(cache_capacity)),
        SourceFormat::DsMets => Box::new(XmlIdValidator::mets_xml(cache_capacity)),
        SourceFormat::DsCsv => Box::new(CsvIdValidator::new(cache_capacity)),
    }
}

fn classify<T>(mut hits: Vec<T>, id: &str, locator: &str) -> Result<T> {
    match hits.len() {
        0 => Err(ImportError::RecordNotFound {
            id: id.to_string(),
            locator: locator.to_string(),
        }),
        1 => Ok(hits.remove(0)),
        count => Err(ImportError::AmbiguousRecord {
            id: id.to_string(),
            locator: locator.to_string(),
            count,
        }),
    }
}

fn track<T>(last_error: &mut Option<ImportError>, outcome: Result<T>) -> bool {
    match outcome {
        Ok(_) => {
            *last_error = None;
            true
        },
        Err(err) => {
            debug!(error = %err, "record resolution failed");
            *last_error = Some(err);
            false
        },
    }
}

/// Resolver for XML dialects, generic over the injected loader.
///
/// A locator containing [`ID_PLACEHOLDER`] is used as a complete query. Any
/// other locator is taken relative to the dialect's record element and
/// wrapped as `//RECORD[LOCATOR = 'ID_PLACEHOLDER']`.
pub struct XmlIdValidator<P>
where
    P: DocumentParser<Document = XmlDocument>,
{
    format: SourceFormat,
    loader: SourceLoader<P>,
    record_element: String,
    queries: HashMap<String, Rc<Query>>,
    last_error: Option<ImportError>,
}

/// Resolver for MARCXML sources.
pub type MarcXmlIdValidator = XmlIdValidator<MarcXmlParser>;
/// Resolver for TEI sources.
pub type TeiXmlIdValidator = XmlIdValidator<TeiXmlParser>;
/// Resolver for METS sources.
pub type MetsXmlIdValidator = XmlIdValidator<MetsXmlParser>;

impl<P> XmlIdValidator<P>
where
    P: DocumentParser<Document = XmlDocument>,
{
    /// Create a resolver over `loader` whose records are `record_element`s.
    #[must_use]
    pub fn new(format: SourceFormat, loader: SourceLoader<P>, record_element: &str) -> Self {
        XmlIdValidator {
            format,
            loader,
            record_element: record_element.to_string(),
            queries: HashMap::new(),
            last_error: None,
        }
    }

    /// The full query template a locator expands to.
    #[must_use]
    pub fn query_template(&self, locator: &str) -> String {
        if locator.contains(ID_PLACEHOLDER) {
            locator.to_string()
        } else {
            format!(
                "//{}[{} = '{ID_PLACEHOLDER}']",
                self.record_element,
                locator.trim()
            )
        }
    }

    fn compile(&mut self, locator: &str) -> Result<Rc<Query>> {
        if let Some(query) = self.queries.get(locator) {
            return Ok(Rc::clone(query));
        }
        let query = Query::parse(&self.query_template(locator)).map_err(|err| match err {
            ImportError::Locator { message, .. } => ImportError::Locator {
                locator: locator.to_string(),
                message,
            },
            other => other,
        })?;
        let query = Rc::new(query);
        self.queries.insert(locator.to_string(), Rc::clone(&query));
        Ok(query)
    }

    /// The document loader.
    #[must_use]
    pub fn loader(&self) -> &SourceLoader<P> {
        &self.loader
    }
}

impl XmlIdValidator<MarcXmlParser> {
    /// Resolver for MARCXML with a document cache of `cache_capacity` files.
    #[must_use]
    pub fn marc_xml(cache_capacity: usize) -> Self {
        Self::new(
            SourceFormat::MarcXml,
            SourceLoader::new(MarcXmlParser, cache_capacity),
            MARC_RECORD_ELEMENT,
        )
    }
}

impl XmlIdValidator<TeiXmlParser> {
    /// Resolver for TEI with a document cache of `cache_capacity` files.
    #[must_use]
    pub fn tei_xml(cache_capacity: usize) -> Self {
        Self::new(
            SourceFormat::TeiXml,
            SourceLoader::new(TeiXmlParser, cache_capacity),
            TEI_RECORD_ELEMENT,
        )
    }
}

impl XmlIdValidator<MetsXmlParser> {
    /// Resolver for METS with a document cache of `cache_capacity` files.
    #[must_use]
    pub fn mets_xml(cache_capacity: usize) -> Self {
        Self::new(
            SourceFormat::DsMets,
            SourceLoader::new(MetsXmlParser, cache_capacity),
            METS_RECORD_ELEMENT,
        )
    }
}

impl<P> IdValidator for XmlIdValidator<P>
where
    P: DocumentParser<Document = XmlDocument>,
{
    fn source_format(&self) -> SourceFormat {
        self.format
    }

    fn resolve(&mut self, path: &Path, id: &str, locator: &str) -> Result<ResolvedRecord> {
        let document = self.loader.load(path)?;
        let query = self.compile(locator)?;
        let hits = query.select(&document, XmlDocument::DOCUMENT, Some(id))?;

        // Hits count per record: several matches inside one record are one hit.
        let records: IndexSet<NodeId> = hits
            .into_iter()
            .map(|item| {
                let node = match item {
                    Item::Node(node) if document.is_element(node) => node,
                    Item::Node(node) => document.parent(node).unwrap_or(node),
                    Item::Attribute(owner, _) => owner,
                };
                document.enclosing(node, &self.record_element).unwrap_or(node)
            })
            .collect();
        trace!(%id, %locator, records = records.len(), "xml locator evaluated");

        let node = classify(records.into_iter().collect(), id, locator)?;
        Ok(ResolvedRecord::Xml { document, node })
    }

    fn is_present(&mut self, path: &Path, id: &str, locator: &str) -> bool {
        let outcome = self.resolve(path, id, locator);
        track(&mut self.last_error, outcome)
    }

    fn last_error(&self) -> Option<&ImportError> {
        self.last_error.as_ref()
    }
}

impl<P> fmt::Debug for XmlIdValidator<P>
where
    P: DocumentParser<Document = XmlDocument>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlIdValidator")
            .field("format", &self.format)
            .field("record_element", &self.record_element)
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

/// Resolver for flat CSV sources. The locator names the id column.
#[derive(Debug)]
pub struct CsvIdValidator {
    loader: SourceLoader<CsvParser>,
    last_error: Option<ImportError>,
}

impl CsvIdValidator {
    /// Create a resolver with a table cache of `cache_capacity` files.
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        CsvIdValidator {
            loader: SourceLoader::new(CsvParser, cache_capacity),
            last_error: None,
        }
    }

    /// The table loader.
    #[must_use]
    pub fn loader(&self) -> &SourceLoader<CsvParser> {
        &self.loader
    }
}

impl IdValidator for CsvIdValidator {
    fn source_format(&self) -> SourceFormat {
        SourceFormat::DsCsv
    }

    fn resolve(&mut self, path: &Path, id: &str, locator: &str) -> Result<ResolvedRecord> {
        let table = self.loader.load(path)?;
        let column = locator.trim();
        let index = table
            .column_index(column)
            .ok_or_else(|| ImportError::MissingColumn {
                column: column.to_string(),
                path: PathBuf::from(path),
            })?;

        let wanted = id.trim();
        let hits: Vec<usize> = table
            .rows()
            .enumerate()
            .filter(|(_, cells)| cells.get(index).is_some_and(|cell| cell.trim() == wanted))
            .map(|(row, _)| row)
            .collect();
        trace!(%id, %column, hits = hits.len(), "csv column scanned");

        let row = classify(hits, id, locator)?;
        Ok(ResolvedRecord::Csv { table, row })
    }

    fn is_present(&mut self, path: &Path, id: &str, locator: &str) -> bool {
        let outcome = self.resolve(path, id, locator);
        track(&mut self.last_error, outcome)
    }

    fn last_error(&self) -> Option<&ImportError> {
        self.last_error.as_ref()
    }
}
