//! Mapping resolved records to normalized output rows.
//!
//! Conversion is pluggable: a [`MapperFactory`] builds one [`Mapper`] per
//! (source format, manifest) pair and the converter feeds it every entry of
//! that manifest in order. Mappers may keep state across calls.
//!
//! [`BasicMapper`] emits the identifying fields of each manifest row together
//! with the title found in the resolved source record.

use std::fmt;
use std::sync::Arc;

use anyhow::bail;
use indexmap::IndexMap;
use tracing::trace;

use crate::config::InstitutionTable;
use crate::error::Result;
use crate::id_validator::{
    ResolvedRecord, MARC_RECORD_ELEMENT, METS_RECORD_ELEMENT, TEI_RECORD_ELEMENT,
};
use crate::locator::Query;
use crate::manifest::{
    Manifest, ManifestEntry, CALL_NUMBER, DS_ID, IIIF_MANIFEST_URL, INSTITUTIONAL_ID,
    INSTITUTION_WIKIDATA_LABEL, INSTITUTION_WIKIDATA_QID, LINK_TO_INSTITUTIONAL_RECORD,
    MANIFEST_GENERATED_AT, RECORD_LAST_UPDATED, TITLE,
};
use crate::source_format::SourceFormat;

/// Ordered field name to value map produced for one manifest entry.
pub type NormalizedRow = IndexMap<String, String>;

/// Output field holding the source format.
pub const SOURCE_TYPE_FIELD: &str = "source_type";
/// Output field holding the title as found in the source record.
pub const TITLE_AS_RECORDED_FIELD: &str = "title_as_recorded";

const MARC_TITLE: &str = "datafield[@tag='245']/subfield[@code='a']";
const TEI_TITLE: &str = ".//msItem/title";
const METS_TITLE: &str = ".//mods:titleInfo/mods:title";
const CSV_TITLE_COLUMNS: [&str; 2] = ["title", "Title"];

/// Converts resolved records of one format into normalized rows.
pub trait Mapper: fmt::Debug {
    /// Map one manifest entry and its resolved record.
    ///
    /// # Errors
    ///
    /// Implementations report any mapping failure; the converter aborts the
    /// run on the first one.
    fn map_record(
        &mut self,
        entry: &ManifestEntry,
        record: &ResolvedRecord,
    ) -> anyhow::Result<NormalizedRow>;

    /// Number of records mapped so far.
    fn records_mapped(&self) -> usize;
}

/// Builds mappers for the converter's registry.
pub trait MapperFactory: fmt::Debug {
    /// Create the mapper for `format` entries of `manifest`.
    ///
    /// # Errors
    ///
    /// Returns an error if no mapper can be built for the format.
    fn create(&self, format: SourceFormat, manifest: &Manifest) -> Result<Box<dyn Mapper>>;
}

/// Mapper emitting manifest identifiers plus the recorded title.
#[derive(Debug)]
pub struct BasicMapper {
    format: SourceFormat,
    institutions: Arc<InstitutionTable>,
    /// Title expression and the record element it is evaluated from
    title_query: Option<(Query, &'static str)>,
    records_mapped: usize,
}

impl BasicMapper {
    /// Create a mapper for `format`.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::Locator`](crate::error::ImportError::Locator) if
    /// the format's title expression fails to compile.
    pub fn new(format: SourceFormat, institutions: Arc<InstitutionTable>) -> Result<Self> {
        let title_query = match format {
            SourceFormat::MarcXml => Some((Query::parse(MARC_TITLE)?, MARC_RECORD_ELEMENT)),
            SourceFormat::TeiXml => Some((Query::parse(TEI_TITLE)?, TEI_RECORD_ELEMENT)),
            SourceFormat::DsMets => Some((Query::parse(METS_TITLE)?, METS_RECORD_ELEMENT)),
            SourceFormat::DsCsv => None,
        };
        Ok(BasicMapper {
            format,
            institutions,
            title_query,
            records_mapped: 0,
        })
    }

    /// The format this mapper handles.
    #[must_use]
    pub fn source_format(&self) -> SourceFormat {
        self.format
    }

    fn recorded_title(&self, record: &ResolvedRecord) -> anyhow::Result<Option<String>> {
        let title = match (record, &self.title_query) {
            (ResolvedRecord::Xml { document, node }, Some((query, record_element))) => {
                let scope = document.enclosing(*node, record_element).unwrap_or(*node);
                query.string(document, scope, None)
            },
            (ResolvedRecord::Csv { .. }, None) => CSV_TITLE_COLUMNS
                .iter()
                .find_map(|column| record.csv_value(column))
                .map(str::to_string),
            _ => bail!("{} mapper cannot read this record kind", self.format),
        };
        Ok(title
            .map(|t| clean_title(&t))
            .filter(|t| !t.is_empty()))
    }
}

/// Collapse whitespace and drop trailing ISBD punctuation.
fn clean_title(title: &str) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| matches!(c, '/' | ':' | ';' | ',') || c.is_whitespace())
        .to_string()
}

impl Mapper for BasicMapper {
    fn map_record(
        &mut self,
        entry: &ManifestEntry,
        record: &ResolvedRecord,
    ) -> anyhow::Result<NormalizedRow> {
        let qid = entry.institution_wikidata_qid();
        let label = match entry.institution_wikidata_label() {
            "" => self.institutions.label_for(qid).unwrap_or_default(),
            label => label,
        };
        let title = match self.recorded_title(record)? {
            Some(title) => title,
            None => entry.title().unwrap_or_default().to_string(),
        };

        let mut row = NormalizedRow::new();
        let mut put = |field: &str, value: &str| {
            row.insert(field.to_string(), value.to_string());
        };
        put(DS_ID, entry.ds_id().unwrap_or_default());
        put(SOURCE_TYPE_FIELD, self.format.as_str());
        put(INSTITUTION_WIKIDATA_QID, qid);
        put(INSTITUTION_WIKIDATA_LABEL, label);
        put(INSTITUTIONAL_ID, entry.institutional_id());
        put(CALL_NUMBER, entry.call_number().unwrap_or_default());
        put(TITLE_AS_RECORDED_FIELD, &title);
        put(TITLE, entry.title().unwrap_or_default());
        put(
            LINK_TO_INSTITUTIONAL_RECORD,
            entry.link_to_institutional_record().unwrap_or_default(),
        );
        put(IIIF_MANIFEST_URL, entry.iiif_manifest_url().unwrap_or_default());
        put(RECORD_LAST_UPDATED, entry.record_last_updated().unwrap_or_default());
        put(MANIFEST_GENERATED_AT, entry.manifest_generated_at().unwrap_or_default());

        self.records_mapped += 1;
        trace!(row = entry.row(), format = %self.format, "record mapped");
        Ok(row)
    }

    fn records_mapped(&self) -> usize {
        self.records_mapped
    }
}

/// Factory for [`BasicMapper`]s sharing one institution table.
#[derive(Debug, Clone, Default)]
pub struct BasicMapperFactory {
    institutions: Arc<InstitutionTable>,
}

impl BasicMapperFactory {
    /// Create a factory whose mappers fall back to `institutions` for labels.
    #[must_use]
    pub fn new(institutions: Arc<InstitutionTable>) -> Self {
        BasicMapperFactory { institutions }
    }
}

impl MapperFactory for BasicMapperFactory {
    fn create(&self, format: SourceFormat, _manifest: &Manifest) -> Result<Box<dyn Mapper>> {
        Ok(Box::new(BasicMapper::new(
            format,
            Arc::clone(&self.institutions),
        )?))
    }
}
