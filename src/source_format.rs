//! Source formats named by the manifest's `source_data_type` column.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImportError;

/// Structural classification of a source file.
///
/// The set is closed: a `source_data_type` value outside it is a manifest
/// authoring defect and parses to [`ImportError::UnknownSourceFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceFormat {
    /// MARCXML record or collection (`marc-xml`)
    #[serde(rename = "marc-xml")]
    MarcXml,
    /// TEI manuscript description (`tei-xml`)
    #[serde(rename = "tei-xml")]
    TeiXml,
    /// Digital Scriptorium METS package (`ds-mets`)
    #[serde(rename = "ds-mets")]
    DsMets,
    /// Digital Scriptorium flat CSV (`ds-csv`)
    #[serde(rename = "ds-csv")]
    DsCsv,
}

impl SourceFormat {
    /// Every recognized format, in declaration order.
    pub const ALL: [SourceFormat; 4] = [
        SourceFormat::MarcXml,
        SourceFormat::TeiXml,
        SourceFormat::DsMets,
        SourceFormat::DsCsv,
    ];

    /// The manifest spelling of this format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarcXml => "marc-xml",
            Self::TeiXml => "tei-xml",
            Self::DsMets => "ds-mets",
            Self::DsCsv => "ds-csv",
        }
    }

    /// Whether documents of this format are XML trees.
    #[must_use]
    pub const fn is_xml(&self) -> bool {
        !matches!(self, Self::DsCsv)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        SourceFormat::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| ImportError::UnknownSourceFormat(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_formats() {
        assert_eq!("marc-xml".parse::<SourceFormat>().unwrap(), SourceFormat::MarcXml);
        assert_eq!("tei-xml".parse::<SourceFormat>().unwrap(), SourceFormat::TeiXml);
        assert_eq!("ds-mets".parse::<SourceFormat>().unwrap(), SourceFormat::DsMets);
        assert_eq!("ds-csv".parse::<SourceFormat>().unwrap(), SourceFormat::DsCsv);
    }

    #[test]
    fn test_parse_ignores_case_and_padding() {
        assert_eq!(" MARC-XML ".parse::<SourceFormat>().unwrap(), SourceFormat::MarcXml);
    }

    #[test]
    fn test_parse_unknown_format_is_error() {
        let err = "marc".parse::<SourceFormat>().unwrap_err();
        assert!(matches!(err, ImportError::UnknownSourceFormat(ref v) if v == "marc"));
        assert!("".parse::<SourceFormat>().is_err());
    }

    #[test]
    fn test_display_matches_manifest_spelling() {
        for format in SourceFormat::ALL {
            assert_eq!(format.to_string().parse::<SourceFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_only_csv_is_not_xml() {
        assert!(SourceFormat::MarcXml.is_xml());
        assert!(SourceFormat::DsMets.is_xml());
        assert!(!SourceFormat::DsCsv.is_xml());
    }
}
