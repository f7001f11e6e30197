#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # ds-import
//!
//! Manifest-driven resolution, validation and conversion of bibliographic
//! source records held as MARC XML, TEI, METS or flat CSV.
//!
//! ## Quick Start
//!
//! ### Validating a manifest
//!
//! ```no_run
//! use ds_import::{ImportConfig, Manifest, ManifestValidator};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = Manifest::from_path(Path::new("data/manifest.csv"))?;
//! let mut validator = ManifestValidator::new(ImportConfig::default());
//!
//! if !validator.validate(&manifest) {
//!     for error in validator.errors() {
//!         eprintln!("{error}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Converting a manifest
//!
//! ```no_run
//! use ds_import::{Converter, ImportConfig, Manifest};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manifest = Manifest::from_path(Path::new("data/manifest.csv"))?;
//! let mut converter = Converter::new(ImportConfig::default());
//!
//! converter.convert_each(&manifest, |row| {
//!     println!("{}", row["title_as_recorded"]);
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Resolving a single record
//!
//! ```no_run
//! use ds_import::id_validator::{IdValidator, XmlIdValidator};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut validator = XmlIdValidator::marc_xml(10);
//! let record = validator.resolve(
//!     Path::new("data/marc.xml"),
//!     "9951865503503681",
//!     "controlfield[@tag='001']",
//! )?;
//! # let _ = record;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`manifest`]: Manifest rows and column names
//! - [`manifest_validator`]: Staged manifest validation
//! - [`converter`]: Mapper dispatch over manifest entries
//! - [`mapper`]: Mapper and factory traits, plus the basic mapper
//! - [`id_validator`]: Record resolution per source format
//! - [`locator`]: Locator expression parser and evaluator
//! - [`source_loader`]: Cached parsing of source files
//! - [`source_cache`]: Bounded insertion-order cache
//! - [`xml_document`]: Read-only XML tree
//! - [`source_format`]: Recognized source data types
//! - [`config`]: Run configuration and institution table
//! - [`error`]: Error types and result type

pub mod config;
pub mod converter;
pub mod error;
pub mod id_validator;
pub mod locator;
pub mod manifest;
pub mod manifest_validator;
pub mod mapper;
pub mod source_cache;
pub mod source_format;
pub mod source_loader;
pub mod xml_document;

pub use config::{ImportConfig, Institution, InstitutionTable};
pub use converter::Converter;
pub use error::{ImportError, Result};
pub use id_validator::{validator_for, CsvIdValidator, IdValidator, ResolvedRecord, XmlIdValidator};
pub use locator::{Query, ID_PLACEHOLDER};
pub use manifest::{Manifest, ManifestEntry};
pub use manifest_validator::{ManifestValidator, ValidationError};
pub use mapper::{BasicMapper, BasicMapperFactory, Mapper, MapperFactory, NormalizedRow};
pub use source_cache::SourceCache;
pub use source_format::SourceFormat;
pub use source_loader::{DocumentParser, SourceLoader};
pub use xml_document::{NamespaceMode, XmlDocument};
