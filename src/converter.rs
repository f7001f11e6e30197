//! Manifest conversion.
//!
//! [`Converter`] walks a manifest in row order. For every entry it picks the
//! mapper registered for the entry's (source format, manifest) pair, creating
//! it through the [`MapperFactory`] on first use, resolves the entry's source
//! record and hands both to the mapper. Output rows come back in manifest
//! order.
//!
//! Conversion assumes a valid manifest: an unknown source type, a record that
//! does not resolve, or a mapper failure aborts the run. Use
//! [`validate_and_convert`](Converter::validate_and_convert) to validate first.
//!
//! # Examples
//!
//! ```no_run
//! use ds_import::config::ImportConfig;
//! use ds_import::converter::Converter;
//! use ds_import::manifest::Manifest;
//! use std::path::Path;
//!
//! let manifest = Manifest::from_path(Path::new("data/manifest.csv"))?;
//! let mut converter = Converter::new(ImportConfig::default());
//! for row in converter.validate_and_convert(&manifest)? {
//!     println!("{row:?}");
//! }
//! # Ok::<(), ds_import::ImportError>(())
//! ```

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::id_validator::{validator_for, IdValidator};
use crate::manifest::Manifest;
use crate::manifest_validator::ManifestValidator;
use crate::mapper::{BasicMapperFactory, Mapper, MapperFactory, NormalizedRow};
use crate::source_cache::SourceCache;
use crate::source_format::SourceFormat;

/// Registry key: source format plus manifest identity.
pub type MapperKey = (SourceFormat, String);

/// Drives mappers over manifest entries.
#[derive(Debug)]
pub struct Converter {
    config: ImportConfig,
    factory: Box<dyn MapperFactory>,
    mappers: SourceCache<MapperKey, Box<dyn Mapper>>,
    resolvers: HashMap<SourceFormat, Box<dyn IdValidator>>,
}

impl Converter {
    /// Create a converter using [`BasicMapper`](crate::mapper::BasicMapper)s.
    #[must_use]
    pub fn new(config: ImportConfig) -> Self {
        let factory = BasicMapperFactory::new(config.institutions.clone());
        Self::with_factory(config, Box::new(factory))
    }

    /// Create a converter using mappers built by `factory`.
    #[must_use]
    pub fn with_factory(config: ImportConfig, factory: Box<dyn MapperFactory>) -> Self {
        Converter {
            config,
            factory,
            mappers: SourceCache::unbounded(),
            resolvers: HashMap::new(),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// The mapper registered for a format and manifest, if one was created.
    #[must_use]
    pub fn mapper(&self, format: SourceFormat, manifest: &Manifest) -> Option<&dyn Mapper> {
        self.mappers
            .get(&(format, manifest.identity().to_string()))
            .map(|mapper| &**mapper)
    }

    /// Number of mappers created so far.
    #[must_use]
    pub fn mapper_count(&self) -> usize {
        self.mappers.len()
    }

    /// Convert every entry, collecting rows in manifest order.
    ///
    /// # Errors
    ///
    /// See [`convert_each`](Self::convert_each).
    pub fn convert(&mut self, manifest: &Manifest) -> Result<Vec<NormalizedRow>> {
        let mut rows = Vec::with_capacity(manifest.len());
        self.convert_each(manifest, |row| {
            rows.push(row);
            Ok(())
        })?;
        Ok(rows)
    }

    /// Convert every entry, passing each row to `sink` as soon as it is
    /// produced. Returns the number of rows produced.
    ///
    /// # Errors
    ///
    /// Stops at the first failure: [`ImportError::UnknownSourceFormat`] for an
    /// unrecognized source type, a parse or resolution error for the entry's
    /// record, [`ImportError::Mapping`] from the mapper, or whatever `sink`
    /// returns.
    pub fn convert_each<F>(&mut self, manifest: &Manifest, mut sink: F) -> Result<usize>
    where
        F: FnMut(NormalizedRow) -> Result<()>,
    {
        info!(manifest = manifest.identity(), rows = manifest.len(), "conversion started");
        let capacity = self.config.cache_capacity;
        let mut produced = 0;

        for entry in manifest {
            let format = entry.source_format()?;
            let path = manifest.source_path(entry);

            let resolver = self
                .resolvers
                .entry(format)
                .or_insert_with(|| validator_for(format, capacity));
            let record = resolver.resolve(&path, entry.institutional_id(), entry.id_location())?;

            let factory = &self.factory;
            let mapper = self
                .mappers
                .get_or_add((format, manifest.identity().to_string()), || {
                    factory.create(format, manifest)
                })?;
            let row = mapper.map_record(entry, &record)?;
            debug!(row = entry.row(), %format, "entry converted");

            sink(row)?;
            produced += 1;
        }

        info!(manifest = manifest.identity(), produced, "conversion finished");
        Ok(produced)
    }

    /// Validate the manifest with this converter's record resolvers, so
    /// sources parsed during validation are not parsed again to convert.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::InvalidManifest`] with every validation error.
    pub fn validate(&mut self, manifest: &Manifest) -> Result<()> {
        let resolvers = std::mem::take(&mut self.resolvers);
        let mut validator = ManifestValidator::with_validators(self.config.clone(), resolvers);
        let valid = validator.validate(manifest);
        let errors = validator.take_errors();
        self.resolvers = validator.into_validators();
        if valid {
            Ok(())
        } else {
            Err(ImportError::InvalidManifest { errors })
        }
    }

    /// Validate the manifest, then convert it.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::InvalidManifest`] with every validation error if
    /// validation fails; nothing is mapped in that case. Otherwise as
    /// [`convert`](Self::convert).
    pub fn validate_and_convert(&mut self, manifest: &Manifest) -> Result<Vec<NormalizedRow>> {
        self.validate(manifest)?;
        self.convert(manifest)
    }
}
