use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::builtin::{Formatter, FormatterId};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatterKind {
    Pure,
    Parameterized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Any,
}

impl ArgType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            ArgType::String => value.is_string(),
            ArgType::Number => value.is_number(),
            ArgType::Integer => value.is_i64() || value.is_u64(),
            ArgType::Boolean => value.is_boolean(),
            ArgType::Object => value.is_object(),
            ArgType::Any => true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArgSpec {
    #[serde(rename = "type")]
    pub arg_type: ArgType,
    #[serde(default)]
    pub required: bool,
}

/// One registry entry as declared in `formatters.json`
#[derive(Debug, Clone)]
pub struct FormatterDefinition {
    pub id: FormatterId,
    pub kind: FormatterKind,
    pub args_schema: BTreeMap<String, ArgSpec>,
}

impl FormatterDefinition {
    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    formatters: Vec<RawDefinition>,
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    name: String,
    kind: FormatterKind,
    #[serde(default)]
    args: BTreeMap<String, ArgSpec>,
}

/// Formatters enabled for mapping rules. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct FormatterRegistry {
    definitions: HashMap<&'static str, FormatterDefinition>,
}

impl FormatterRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let location = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            location: location.clone(),
            source,
        })?;
        Self::from_json(&text, &location)
    }

    /// Parse a registry declaration; `location` names it in errors.
    pub fn from_json(text: &str, location: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            location: location.to_string(),
            source,
        })?;

        let mut definitions = HashMap::new();
        for (idx, raw) in file.formatters.into_iter().enumerate() {
            let here = format!("{}: formatters[{}]", location, idx);

            let id = FormatterId::from_name(&raw.name).ok_or_else(|| {
                ConfigError::UnknownFormatter {
                    location: here.clone(),
                    name: raw.name.clone(),
                }
            })?;
            if raw.kind != id.kind() {
                return Err(ConfigError::invalid(
                    here,
                    format!("formatter '{}' is {:?}, declared {:?}", raw.name, id.kind(), raw.kind),
                ));
            }
            if raw.kind == FormatterKind::Pure && !raw.args.is_empty() {
                return Err(ConfigError::invalid(
                    here,
                    format!("pure formatter '{}' cannot declare arguments", raw.name),
                ));
            }

            let definition = FormatterDefinition {
                id,
                kind: raw.kind,
                args_schema: raw.args,
            };
            if definitions.insert(id.name(), definition).is_some() {
                return Err(ConfigError::invalid(
                    here,
                    format!("formatter '{}' declared twice", raw.name),
                ));
            }
        }

        Ok(Self { definitions })
    }

    pub fn is_allowed(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn definition(&self, name: &str) -> Option<&FormatterDefinition> {
        self.definitions.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.definitions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Check a formatter reference against the allow-list and its argument schema,
    /// then build the typed transform.
    pub fn build(&self, name: &str, args: &Value, location: &str) -> Result<Formatter, ConfigError> {
        let definition = self
            .definition(name)
            .ok_or_else(|| ConfigError::UnknownFormatter {
                location: location.to_string(),
                name: name.to_string(),
            })?;

        let empty = Map::new();
        let args = match args {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(ConfigError::invalid(
                    location,
                    format!("arguments of '{}' must be an object", name),
                ))
            }
        };

        for key in args.keys() {
            if !definition.args_schema.contains_key(key) {
                return Err(ConfigError::invalid(
                    location,
                    format!("formatter '{}' has no argument '{}'", name, key),
                ));
            }
        }
        for (key, spec) in &definition.args_schema {
            match args.get(key) {
                None if spec.required => {
                    return Err(ConfigError::invalid(
                        location,
                        format!("formatter '{}' requires argument '{}'", name, key),
                    ))
                }
                Some(value) if !spec.arg_type.accepts(value) => {
                    return Err(ConfigError::invalid(
                        location,
                        format!(
                            "argument '{}' of '{}' must be of type {:?}",
                            key, name, spec.arg_type
                        ),
                    ))
                }
                _ => {}
            }
        }

        Formatter::from_args(definition.id, args)
            .map_err(|message| ConfigError::invalid(location, format!("{}: {}", name, message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const REGISTRY: &str = r#"{
        "formatters": [
            {"name": "to_int", "kind": "pure"},
            {"name": "pick_lang", "kind": "parameterized",
             "args": {"lang": {"type": "string"}}},
            {"name": "multiply", "kind": "parameterized",
             "args": {"factor": {"type": "number", "required": true}}}
        ]
    }"#;

    fn registry() -> FormatterRegistry {
        FormatterRegistry::from_json(REGISTRY, "formatters.json").unwrap()
    }

    #[test]
    fn test_allow_list() {
        let registry = registry();
        assert!(registry.is_allowed("to_int"));
        assert!(registry.is_allowed("multiply"));
        // Built in, but not enabled by this declaration.
        assert!(!registry.is_allowed("trim"));
        assert!(!registry.is_allowed("system"));
        assert_eq!(registry.names(), vec!["multiply", "pick_lang", "to_int"]);
    }

    #[test]
    fn test_rejects_unknown_declaration() {
        let err = FormatterRegistry::from_json(
            r#"{"formatters": [{"name": "exec", "kind": "pure"}]}"#,
            "formatters.json",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormatter { ref name, .. } if name == "exec"));
        assert!(err.to_string().contains("formatters.json: formatters[0]"));
    }

    #[test]
    fn test_rejects_kind_mismatch_and_duplicates() {
        let mismatch = FormatterRegistry::from_json(
            r#"{"formatters": [{"name": "multiply", "kind": "pure"}]}"#,
            "f.json",
        );
        assert!(mismatch.is_err());

        let duplicate = FormatterRegistry::from_json(
            r#"{"formatters": [{"name": "to_int", "kind": "pure"}, {"name": "to_int", "kind": "pure"}]}"#,
            "f.json",
        );
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_build_checks_arguments() {
        let registry = registry();
        assert_eq!(
            registry.build("multiply", &json!({"factor": 2}), "here").unwrap(),
            Formatter::Multiply { factor: 2.0 }
        );
        assert_eq!(
            registry.build("to_int", &Value::Null, "here").unwrap(),
            Formatter::ToInt
        );
        assert!(registry.build("multiply", &json!({}), "here").is_err());
        assert!(registry.build("multiply", &json!({"factor": "2"}), "here").is_err());
        assert!(registry.build("pick_lang", &json!({"locale": "en"}), "here").is_err());
        assert!(matches!(
            registry.build("trim", &Value::Null, "here"),
            Err(ConfigError::UnknownFormatter { .. })
        ));
    }
}
