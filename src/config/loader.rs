use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::source::{parse_source, EntityMapping, SourceConfig};
use crate::error::ConfigError;
use crate::formatters::FormatterRegistry;
use crate::schema::EntityKind;

pub const REGISTRY_FILE: &str = "formatters.json";
pub const SOURCES_DIR: &str = "sources";

/// Loads the formatter registry once, then source files on demand.
///
/// Loaded sources are cached for the lifetime of the loader; build a new
/// loader to pick up edited files.
#[derive(Debug)]
pub struct ConfigLoader {
    dir: PathBuf,
    registry: FormatterRegistry,
    sources: HashMap<String, Arc<SourceConfig>>,
}

impl ConfigLoader {
    /// Open a config directory laid out as `formatters.json` + `sources/<name>.json`
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        let registry = FormatterRegistry::load(&dir.join(REGISTRY_FILE))?;
        info!(
            dir = %dir.display(),
            formatters = registry.names().len(),
            "loaded formatter registry"
        );
        Ok(Self::with_registry(dir, registry))
    }

    pub fn with_registry(dir: impl Into<PathBuf>, registry: FormatterRegistry) -> Self {
        Self {
            dir: dir.into(),
            registry,
            sources: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn registry(&self) -> &FormatterRegistry {
        &self.registry
    }

    pub fn load_source(&mut self, name: &str) -> Result<Arc<SourceConfig>, ConfigError> {
        if let Some(source) = self.sources.get(name) {
            return Ok(Arc::clone(source));
        }

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConfigError::invalid(
                SOURCES_DIR,
                format!("invalid source name '{}'", name),
            ));
        }

        let path = self.dir.join(SOURCES_DIR).join(format!("{}.json", name));
        let location = format!("{}/{}.json", SOURCES_DIR, name);
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            location: location.clone(),
            source,
        })?;

        let source = Arc::new(parse_source(name, &text, &location, &self.registry)?);
        info!(
            source = name,
            entities = source.entities.len(),
            "loaded source mapping"
        );
        self.sources.insert(name.to_string(), Arc::clone(&source));
        Ok(source)
    }

    pub fn load_entity(
        &mut self,
        source: &str,
        entity: EntityKind,
    ) -> Result<Arc<EntityMapping>, ConfigError> {
        let config = self.load_source(source)?;
        config
            .entity(entity)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownEntity {
                source_name: source.to_string(),
                entity: entity.to_string(),
            })
    }
}
