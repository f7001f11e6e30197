//! Common test helpers and fixtures shared across the test suite.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ds_import::manifest::{self, ALL_COLUMNS};
use ds_import::Manifest;
use tempfile::TempDir;

/// Control number of the first record in [`marc_collection`] fixtures.
pub const MARC_ID: &str = "9951865503503681";

/// Locator for the MARC control number.
pub const MARC_001: &str = "controlfield[@tag='001']";

/// Builds a MARCXML collection with one record per control number.
///
/// Every record carries the same 035 value so that locators on that field
/// match more than one record.
pub fn marc_collection(ids: &[&str]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <marc:collection xmlns:marc=\"http://www.loc.gov/MARC21/slim\">\n",
    );
    for id in ids {
        xml.push_str(&format!(
            "  <marc:record>\n\
             \x20   <marc:leader>01234nam a2200289 a 4500</marc:leader>\n\
             \x20   <marc:controlfield tag=\"001\">{id}</marc:controlfield>\n\
             \x20   <marc:datafield tag=\"035\" ind1=\" \" ind2=\" \">\
             <marc:subfield code=\"a\">(OCoLC)shared</marc:subfield></marc:datafield>\n\
             \x20   <marc:datafield tag=\"245\" ind1=\"1\" ind2=\"0\">\
             <marc:subfield code=\"a\">Record {id} /</marc:subfield></marc:datafield>\n\
             \x20 </marc:record>\n"
        ));
    }
    xml.push_str("</marc:collection>\n");
    xml
}

/// A TEI manuscript description identified by call number.
pub fn tei_document(call_number: &str, title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader><fileDesc><sourceDesc><msDesc>
    <msIdentifier><idno type="call-number">{call_number}</idno></msIdentifier>
    <msContents><msItem><title>{title}</title></msItem></msContents>
  </msDesc></sourceDesc></fileDesc></teiHeader>
</TEI>"#
    )
}

/// A METS object with a MODS local identifier.
pub fn mets_document(local_id: &str, title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<mets:mets xmlns:mets="http://www.loc.gov/METS/" xmlns:mods="http://www.loc.gov/mods/v3">
  <mets:dmdSec ID="DM1"><mets:mdWrap MDTYPE="MODS"><mets:xmlData><mods:mods>
    <mods:titleInfo><mods:title>{title}</mods:title></mods:titleInfo>
    <mods:identifier type="local">{local_id}</mods:identifier>
  </mods:mods></mets:xmlData></mets:mdWrap></mets:dmdSec>
</mets:mets>"#
    )
}

/// One manifest row, filled with valid defaults for a MARC record.
#[derive(Debug, Clone)]
pub struct ManifestRow {
    values: HashMap<&'static str, String>,
}

impl ManifestRow {
    /// A valid row pointing at `id` in `marc.xml`.
    pub fn marc(id: &str) -> Self {
        let defaults = [
            (manifest::INSTITUTION_WIKIDATA_QID, "Q49117"),
            (manifest::INSTITUTION_WIKIDATA_LABEL, "University of Pennsylvania"),
            (manifest::DS_ID, ""),
            (manifest::SOURCE_TYPE, "marc-xml"),
            (manifest::FILENAME, "marc.xml"),
            (manifest::INSTITUTIONAL_ID, id),
            (manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE, MARC_001),
            (manifest::RECORD_LAST_UPDATED, "2023-12-12T05:05:05"),
            (manifest::CALL_NUMBER, "LJS 101"),
            (manifest::TITLE, "Book of hours"),
            (manifest::IIIF_MANIFEST_URL, "https://example.com/iiif/manifest.json"),
            (manifest::LINK_TO_INSTITUTIONAL_RECORD, "https://example.com/record"),
            (manifest::MANIFEST_GENERATED_AT, "2024-01-01T00:00:00"),
        ];
        ManifestRow {
            values: defaults
                .into_iter()
                .map(|(column, value)| (column, value.to_string()))
                .collect(),
        }
    }

    /// Replace one column's value.
    pub fn set(mut self, column: &'static str, value: &str) -> Self {
        self.values.insert(column, value.to_string());
        self
    }

    fn cells(&self, columns: &[&str]) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.values.get(*column).cloned().unwrap_or_default())
            .collect()
    }
}

/// A temporary directory holding a manifest and its source files.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a source file into the fixture directory.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Write `rows` under a header of `columns` and load the manifest.
    pub fn manifest_with_columns(&self, columns: &[&str], rows: &[ManifestRow]) -> Manifest {
        let path = self.dir.path().join("manifest.csv");
        let mut writer = csv::Writer::from_path(&path).expect("create manifest");
        writer.write_record(columns).expect("write header");
        for row in rows {
            writer.write_record(row.cells(columns)).expect("write row");
        }
        writer.flush().expect("flush manifest");
        Manifest::from_path(&path).expect("load manifest")
    }

    /// Write `rows` with every manifest column and load the manifest.
    pub fn manifest(&self, rows: &[ManifestRow]) -> Manifest {
        self.manifest_with_columns(&ALL_COLUMNS, rows)
    }
}
