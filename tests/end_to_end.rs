//! End-to-end tests: load a manifest, validate it, convert it.

mod common;

use common::{marc_collection, mets_document, tei_document, Fixture, ManifestRow, MARC_ID};
use ds_import::manifest;
use ds_import::mapper::TITLE_AS_RECORDED_FIELD;
use ds_import::{
    Converter, ImportConfig, ImportError, Institution, InstitutionTable, ManifestValidator,
    SourceFormat,
};

#[test]
fn test_validate_then_convert_single_marc_row() {
    let fixture = Fixture::new();
    fixture.write("marc.xml", &marc_collection(&[MARC_ID, "9912345678901234"]));
    let manifest = fixture.manifest(&[ManifestRow::marc(MARC_ID).set(manifest::DS_ID, "DS10000")]);

    let mut validator = ManifestValidator::new(ImportConfig::default());
    assert!(validator.validate(&manifest), "{:?}", validator.errors());

    let mut converter = Converter::new(ImportConfig::default());
    let rows = converter.convert(&manifest).unwrap();
    assert_eq!(rows.len(), 1);

    let row = &rows[0];
    let entry = manifest.entry(1).unwrap();
    assert_eq!(row[manifest::DS_ID], "DS10000");
    assert_eq!(row[manifest::INSTITUTIONAL_ID], entry.institutional_id());
    assert_eq!(row[manifest::INSTITUTION_WIKIDATA_QID], "Q49117");
    assert_eq!(row[manifest::CALL_NUMBER], "LJS 101");
    assert_eq!(row[TITLE_AS_RECORDED_FIELD], format!("Record {MARC_ID}"));
    assert_eq!(row["source_type"], SourceFormat::MarcXml.as_str());
}

#[test]
fn test_absent_id_fails_validation_before_conversion() {
    let fixture = Fixture::new();
    fixture.write("marc.xml", &marc_collection(&[MARC_ID]));
    let manifest = fixture.manifest(&[ManifestRow::marc("9900000000000000")]);

    let mut validator = ManifestValidator::new(ImportConfig::default());
    assert!(!validator.validate(&manifest));

    let mut converter = Converter::new(ImportConfig::default());
    match converter.validate_and_convert(&manifest) {
        Err(ImportError::InvalidManifest { errors }) => {
            assert_eq!(errors, validator.errors());
        },
        other => panic!("expected InvalidManifest, got {other:?}"),
    }
    assert_eq!(converter.mapper_count(), 0);
}

#[test]
fn test_mixed_formats_convert_in_order() {
    let fixture = Fixture::new();
    fixture.write("marc.xml", &marc_collection(&[MARC_ID, "9912345678901234"]));
    fixture.write("tei.xml", &tei_document("LJS 224", "Antiphonary"));
    fixture.write("mets.xml", &mets_document("Ms. Codex 1", "Psalter"));
    fixture.write("items.csv", "Shelfmark,title\nMS 7,Gradual\n");

    let manifest = fixture.manifest(&[
        ManifestRow::marc("9912345678901234"),
        ManifestRow::marc("LJS 224")
            .set(manifest::SOURCE_TYPE, "TEI-XML")
            .set(manifest::FILENAME, "tei.xml")
            .set(
                manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE,
                "//msIdentifier/idno[@type='call-number' and . = 'ID_PLACEHOLDER']",
            ),
        ManifestRow::marc("Ms. Codex 1")
            .set(manifest::SOURCE_TYPE, "ds-mets")
            .set(manifest::FILENAME, "mets.xml")
            .set(
                manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE,
                ".//mods:identifier[@type='local']",
            ),
        ManifestRow::marc("MS 7")
            .set(manifest::SOURCE_TYPE, "ds-csv")
            .set(manifest::FILENAME, "items.csv")
            .set(manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE, "Shelfmark"),
        ManifestRow::marc(MARC_ID),
    ]);

    let mut converter = Converter::new(ImportConfig::default());
    let rows = converter.validate_and_convert(&manifest).unwrap();

    let titles: Vec<&str> = rows
        .iter()
        .map(|row| row[TITLE_AS_RECORDED_FIELD].as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "Record 9912345678901234",
            "Antiphonary",
            "Psalter",
            "Gradual",
            "Record 9951865503503681",
        ]
    );
    // One mapper per source format, reused across rows.
    assert_eq!(converter.mapper_count(), 4);
    let marc = converter.mapper(SourceFormat::MarcXml, &manifest).unwrap();
    assert_eq!(marc.records_mapped(), 2);
}

#[test]
fn test_tei_corpus_titles_come_from_each_record() {
    let fixture = Fixture::new();
    let corpus = ["First", "Second"]
        .iter()
        .enumerate()
        .map(|(index, title)| {
            tei_document(&format!("MS {}", index + 1), title)
                .replace(r#"<?xml version="1.0" encoding="UTF-8"?>"#, "")
        })
        .collect::<String>();
    fixture.write(
        "corpus.xml",
        &format!(r#"<teiCorpus xmlns="http://www.tei-c.org/ns/1.0">{corpus}</teiCorpus>"#),
    );
    let tei_row = |id: &str| {
        ManifestRow::marc(id)
            .set(manifest::SOURCE_TYPE, "tei-xml")
            .set(manifest::FILENAME, "corpus.xml")
            .set(manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE, ".//msIdentifier/idno")
    };
    let manifest = fixture.manifest(&[tei_row("MS 2"), tei_row("MS 1")]);

    let mut converter = Converter::new(ImportConfig::default());
    let rows = converter.validate_and_convert(&manifest).unwrap();
    let titles: Vec<&str> = rows
        .iter()
        .map(|row| row[TITLE_AS_RECORDED_FIELD].as_str())
        .collect();
    assert_eq!(titles, vec!["Second", "First"]);
}

#[test]
fn test_streaming_conversion_uses_institution_labels() {
    let fixture = Fixture::new();
    fixture.write("marc.xml", &marc_collection(&[MARC_ID]));
    let manifest = fixture.manifest(&[
        ManifestRow::marc(MARC_ID).set(manifest::INSTITUTION_WIKIDATA_LABEL, "")
    ]);

    let institutions = InstitutionTable::new(vec![Institution {
        qid: "Q49117".to_string(),
        label: "University of Pennsylvania".to_string(),
        names: vec!["Penn".to_string()],
    }]);
    let config = ImportConfig::default().with_institutions(institutions);
    let mut converter = Converter::new(config);

    let mut labels = Vec::new();
    let produced = converter
        .convert_each(&manifest, |row| {
            labels.push(row[manifest::INSTITUTION_WIKIDATA_LABEL].clone());
            Ok(())
        })
        .unwrap();
    assert_eq!(produced, 1);
    assert_eq!(labels, vec!["University of Pennsylvania".to_string()]);
}

#[test]
fn test_ids_with_quotes_match_literally() {
    let fixture = Fixture::new();
    fixture.write("items.csv", "Shelfmark,title\nMS 1,One\n");
    fixture.write("tei.xml", &tei_document("O'Brien 1", "Hours"));
    let manifest = fixture.manifest(&[ManifestRow::marc("O'Brien 1")
        .set(manifest::SOURCE_TYPE, "tei-xml")
        .set(manifest::FILENAME, "tei.xml")
        .set(manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE, "//msIdentifier/idno")]);

    let mut converter = Converter::new(ImportConfig::default());
    let rows = converter.validate_and_convert(&manifest).unwrap();
    assert_eq!(rows[0][manifest::INSTITUTIONAL_ID], "O'Brien 1");
}
