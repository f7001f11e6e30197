//! Integration tests for manifest validation against real source files.

mod common;

use common::{marc_collection, mets_document, tei_document, Fixture, ManifestRow, MARC_ID};
use ds_import::manifest::{self, ALL_COLUMNS};
use ds_import::{ImportConfig, ManifestValidator};

fn validator() -> ManifestValidator {
    ManifestValidator::new(ImportConfig::default())
}

fn marc_fixture(ids: &[&str]) -> Fixture {
    let fixture = Fixture::new();
    fixture.write("marc.xml", &marc_collection(ids));
    fixture
}

// ============================================================================
// Columns
// ============================================================================

#[test]
fn test_columns_pass_in_any_order() {
    let fixture = marc_fixture(&[MARC_ID]);
    let mut columns = ALL_COLUMNS.to_vec();
    columns.rotate_left(5);
    let manifest = fixture.manifest_with_columns(&columns, &[ManifestRow::marc(MARC_ID)]);

    let mut validator = validator();
    assert!(validator.validate_columns(&manifest));
    assert!(validator.validate(&manifest), "{:?}", validator.errors());
}

#[test]
fn test_missing_column_fails() {
    let fixture = marc_fixture(&[MARC_ID]);
    let columns: Vec<&str> = ALL_COLUMNS
        .iter()
        .copied()
        .filter(|&c| c != manifest::CALL_NUMBER)
        .collect();
    let manifest = fixture.manifest_with_columns(&columns, &[ManifestRow::marc(MARC_ID)]);

    let mut validator = validator();
    assert!(!validator.validate_columns(&manifest));
    let errors = validator.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].row, 0);
    assert!(errors[0].message.contains(manifest::CALL_NUMBER));
}

// ============================================================================
// Values
// ============================================================================

#[test]
fn test_valid_qid_passes() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest = fixture.manifest(&[ManifestRow::marc(MARC_ID)]);
    let mut validator = validator();
    assert!(validator.validate_data_types(&manifest));
    assert!(validator.validate_required_values(&manifest));
}

#[test]
fn test_malformed_qid_fails() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest = fixture
        .manifest(&[ManifestRow::marc(MARC_ID).set(manifest::INSTITUTION_WIKIDATA_QID, "Qxxx9")]);
    let mut validator = validator();
    assert!(!validator.validate_data_types(&manifest));
    assert_eq!(validator.errors()[0].row, 1);
    assert!(validator.errors()[0].message.contains("Qxxx9"));
}

#[test]
fn test_blank_required_value_fails() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest =
        fixture.manifest(&[ManifestRow::marc(MARC_ID).set(manifest::INSTITUTION_WIKIDATA_QID, "")]);
    let mut validator = validator();
    assert!(!validator.validate_required_values(&manifest));
    assert!(validator.validate_data_types(&manifest));
}

#[test]
fn test_url_values() {
    let fixture = marc_fixture(&[MARC_ID]);
    let mut validator = validator();

    let good = fixture
        .manifest(&[ManifestRow::marc(MARC_ID).set(manifest::IIIF_MANIFEST_URL, "https://example.com")]);
    assert!(validator.validate_data_types(&good));

    let blank = fixture.manifest(&[ManifestRow::marc(MARC_ID)
        .set(manifest::IIIF_MANIFEST_URL, "")
        .set(manifest::LINK_TO_INSTITUTIONAL_RECORD, "")]);
    assert!(validator.validate_data_types(&blank));

    let bad = fixture.manifest(&[
        ManifestRow::marc(MARC_ID).set(manifest::IIIF_MANIFEST_URL, "httpx://bad-example.com")
    ]);
    assert!(!validator.validate_data_types(&bad));
}

#[test]
fn test_date_values() {
    let fixture = marc_fixture(&[MARC_ID]);
    let mut validator = validator();

    let good = fixture.manifest(&[
        ManifestRow::marc(MARC_ID).set(manifest::RECORD_LAST_UPDATED, "2023-12-12T05:05:05")
    ]);
    assert!(validator.validate_data_types(&good));

    let bad = fixture.manifest(&[
        ManifestRow::marc(MARC_ID).set(manifest::RECORD_LAST_UPDATED, "2023-31-31T05:05:05")
    ]);
    assert!(!validator.validate_data_types(&bad));
}

#[test]
fn test_unknown_source_type_reported_once() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest =
        fixture.manifest(&[ManifestRow::marc(MARC_ID).set(manifest::SOURCE_TYPE, "marc")]);

    let mut validator = validator();
    assert!(!validator.validate(&manifest));
    assert_eq!(validator.errors().len(), 1, "{:?}", validator.errors());
    assert!(validator.errors()[0].message.contains("marc-xml"));
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn test_marc_record_present() {
    let fixture = marc_fixture(&[MARC_ID, "9912345678901234"]);
    let manifest = fixture.manifest(&[ManifestRow::marc(MARC_ID)]);
    let mut validator = validator();
    assert!(validator.validate_records_present(&manifest));
}

#[test]
fn test_absent_record_not_found() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest = fixture.manifest(&[ManifestRow::marc("0000000000")]);

    let mut validator = validator();
    assert!(!validator.validate_records_present(&manifest));
    let message = &validator.errors()[0].message;
    assert!(message.contains("0000000000"), "{message}");
    assert!(message.contains("controlfield[@tag='001']"), "{message}");
}

#[test]
fn test_ambiguous_locator_fails() {
    let fixture = marc_fixture(&[MARC_ID, "9912345678901234"]);
    let manifest = fixture.manifest(&[ManifestRow::marc("(OCoLC)shared").set(
        manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE,
        "datafield[@tag='035']/subfield[@code='a']",
    )]);

    let mut validator = validator();
    assert!(!validator.validate_records_present(&manifest));
    assert!(validator.errors()[0].message.contains("Ambiguous"));
}

#[test]
fn test_tei_mets_and_csv_records_present() {
    let fixture = Fixture::new();
    fixture.write("tei.xml", &tei_document("LJS 101", "Book of hours"));
    fixture.write("mets.xml", &mets_document("Ms. Codex 1", "Psalter"));
    fixture.write("items.csv", "Shelfmark,title\nMS 7,Gradual\nMS 8,Missal\n");

    let manifest = fixture.manifest(&[
        ManifestRow::marc("LJS 101")
            .set(manifest::SOURCE_TYPE, "tei-xml")
            .set(manifest::FILENAME, "tei.xml")
            .set(
                manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE,
                "//msIdentifier/idno[@type='call-number']",
            ),
        ManifestRow::marc("Ms. Codex 1")
            .set(manifest::SOURCE_TYPE, "ds-mets")
            .set(manifest::FILENAME, "mets.xml")
            .set(
                manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE,
                ".//mods:identifier[@type='local']",
            ),
        ManifestRow::marc("MS 8")
            .set(manifest::SOURCE_TYPE, "ds-csv")
            .set(manifest::FILENAME, "items.csv")
            .set(manifest::INSTITUTIONAL_ID_LOCATION_IN_SOURCE, "Shelfmark"),
    ]);

    let mut validator = validator();
    assert!(validator.validate(&manifest), "{:?}", validator.errors());
}

#[test]
fn test_malformed_source_is_row_error() {
    let fixture = Fixture::new();
    fixture.write("marc.xml", "<collection><record></collection>");
    let manifest = fixture.manifest(&[ManifestRow::marc(MARC_ID)]);

    let mut validator = validator();
    assert!(!validator.validate(&manifest));
    assert_eq!(validator.errors().len(), 1);
    assert_eq!(validator.errors()[0].row, 1);
    assert!(validator.errors()[0].message.contains("Malformed XML"));
}

// ============================================================================
// Uniqueness and files
// ============================================================================

#[test]
fn test_duplicate_ids_flagged() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest = fixture.manifest(&[ManifestRow::marc(MARC_ID), ManifestRow::marc(MARC_ID)]);

    let mut validator = validator();
    assert!(!validator.validate_ids_unique(&manifest));
    let error = &validator.errors()[0];
    assert_eq!(error.row, 2);
    assert!(error.message.contains("row 1"));
}

#[test]
fn test_distinct_ids_pass() {
    let fixture = marc_fixture(&[MARC_ID, "9912345678901234"]);
    let manifest = fixture.manifest(&[
        ManifestRow::marc(MARC_ID),
        ManifestRow::marc("9912345678901234"),
    ]);
    let mut validator = validator();
    assert!(validator.validate_ids_unique(&manifest));
    assert!(validator.validate(&manifest), "{:?}", validator.errors());
}

#[test]
fn test_missing_file_flagged_once() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest = fixture.manifest(&[
        ManifestRow::marc(MARC_ID),
        ManifestRow::marc("9912345678901234").set(manifest::FILENAME, "missing.xml"),
    ]);

    let mut validator = validator();
    assert!(!validator.validate_files_exist(&manifest));

    assert!(!validator.validate(&manifest));
    let errors = validator.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].row, 2);
    assert!(errors[0].message.contains("missing.xml"));
}

#[test]
fn test_all_files_present_pass() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest = fixture.manifest(&[ManifestRow::marc(MARC_ID)]);
    let mut validator = validator();
    assert!(validator.validate_files_exist(&manifest));
}

#[test]
fn test_every_stage_runs() {
    let fixture = marc_fixture(&[MARC_ID]);
    let manifest = fixture.manifest(&[
        ManifestRow::marc(MARC_ID).set(manifest::INSTITUTION_WIKIDATA_QID, "Qxxx9"),
        ManifestRow::marc(MARC_ID),
        ManifestRow::marc("404"),
    ]);

    let mut validator = validator();
    assert!(!validator.validate(&manifest));
    let rows: Vec<usize> = validator.errors().iter().map(|e| e.row).collect();
    // data type (row 1), record missing (row 3), duplicate id (row 2)
    assert_eq!(rows, vec![1, 3, 2]);
}
