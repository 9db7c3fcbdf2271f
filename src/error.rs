use thiserror::Error;

/// Problems found while loading the formatter registry or a source mapping.
///
/// `location` is the file plus the path inside it, e.g.
/// `sources/dofusdb.json: entities.monster.mappings[2].formatters[0]`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{location}: failed to read: {source}")]
    Io {
        location: String,
        source: std::io::Error,
    },

    #[error("{location}: invalid JSON: {source}")]
    Parse {
        location: String,
        source: serde_json::Error,
    },

    #[error("{location}: unknown formatter '{name}'")]
    UnknownFormatter { location: String, name: String },

    #[error("{location}: {message}")]
    Invalid { location: String, message: String },

    #[error("source '{source_name}' has no mapping for entity '{entity}'")]
    UnknownEntity { source_name: String, entity: String },
}

impl ConfigError {
    pub fn invalid(location: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            location: location.into(),
            message: message.into(),
        }
    }
}
