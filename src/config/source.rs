//! Source and entity mapping configuration.
//!
//! Files are read into `Raw*` structs, then checked and turned into the typed
//! records the pipeline uses. Every check failure names the file and the path
//! inside it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::collect::PostProcess;
use crate::error::ConfigError;
use crate::filter::{Filter, FilterField, FilterKey, FilterSpec, Filters};
use crate::formatters::{Formatter, FormatterRegistry};
use crate::formula;
use crate::schema::{get_table, EntityKind};

const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_MAX_FILTER_VALUES: usize = 100;

/// Where a converted value lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub model: String,
    pub field: String,
}

/// How one catalog attribute becomes one or more domain attributes
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRule {
    pub source_path: String,
    pub targets: Vec<Target>,
    pub formatters: Vec<Formatter>,
}

/// Attribute derived from a formula over record values
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedField {
    pub targets: Vec<Target>,
    pub formula: String,
    /// Formula variable name -> record path
    pub variables: BTreeMap<String, String>,
}

/// Everything needed to collect and convert one entity kind from one source
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub kind: EntityKind,
    pub endpoint: String,
    /// Template with an `{id}` placeholder
    pub single_endpoint: Option<String>,
    pub page_size: usize,
    pub filters: FilterSpec,
    pub post_process: PostProcess,
    pub rules: Vec<MappingRule>,
    pub computed: Vec<ComputedField>,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub base_url: String,
    pub default_language: String,
    pub max_filter_values: usize,
    pub entities: BTreeMap<EntityKind, Arc<EntityMapping>>,
}

impl SourceConfig {
    pub fn entity(&self, kind: EntityKind) -> Option<&Arc<EntityMapping>> {
        self.entities.get(&kind)
    }

    /// Absolute URL for an endpoint path
    pub fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

// -----------------------------------------------------------------------------
// Raw file shapes
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSource {
    base_url: String,
    default_language: String,
    #[serde(default)]
    max_filter_values: Option<usize>,
    entities: BTreeMap<EntityKind, RawEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntity {
    endpoint: String,
    #[serde(default)]
    single_endpoint: Option<String>,
    #[serde(default)]
    page_size: Option<usize>,
    #[serde(default)]
    filters: BTreeSet<FilterKey>,
    #[serde(default)]
    filter_fields: BTreeMap<FilterField, String>,
    /// Filters sent on every request, e.g. `{"typeIds": "12,13"}`
    #[serde(default)]
    fixed_filters: BTreeMap<FilterKey, String>,
    #[serde(default)]
    post_process: PostProcess,
    #[serde(default)]
    mappings: Vec<RawRule>,
    #[serde(default)]
    computed: Vec<RawComputed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    source: String,
    targets: Vec<Target>,
    #[serde(default)]
    formatters: Vec<RawFormatterRef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFormatterRef {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawComputed {
    targets: Vec<Target>,
    formula: String,
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

/// Parse and check one source file. `location` names it in errors.
pub fn parse_source(
    name: &str,
    text: &str,
    location: &str,
    registry: &FormatterRegistry,
) -> Result<SourceConfig, ConfigError> {
    let raw: RawSource = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
        location: location.to_string(),
        source,
    })?;

    if !raw.base_url.starts_with("http://") && !raw.base_url.starts_with("https://") {
        return Err(ConfigError::invalid(
            format!("{}: base_url", location),
            format!("'{}' is not an http(s) URL", raw.base_url),
        ));
    }
    if raw.default_language.trim().is_empty() {
        return Err(ConfigError::invalid(
            format!("{}: default_language", location),
            "must not be empty",
        ));
    }
    let max_filter_values = raw.max_filter_values.unwrap_or(DEFAULT_MAX_FILTER_VALUES);
    if max_filter_values == 0 {
        return Err(ConfigError::invalid(
            format!("{}: max_filter_values", location),
            "must be greater than zero",
        ));
    }

    let mut entities = BTreeMap::new();
    for (kind, raw_entity) in raw.entities {
        let here = format!("{}: entities.{}", location, kind);
        let mapping = check_entity(kind, raw_entity, &here, registry)?;
        entities.insert(kind, Arc::new(mapping));
    }

    Ok(SourceConfig {
        name: name.to_string(),
        base_url: raw.base_url,
        default_language: raw.default_language,
        max_filter_values,
        entities,
    })
}

fn check_entity(
    kind: EntityKind,
    raw: RawEntity,
    here: &str,
    registry: &FormatterRegistry,
) -> Result<EntityMapping, ConfigError> {
    if raw.endpoint.trim().is_empty() {
        return Err(ConfigError::invalid(
            format!("{}.endpoint", here),
            "endpoint template is required",
        ));
    }
    if let Some(single) = &raw.single_endpoint {
        if !single.contains("{id}") {
            return Err(ConfigError::invalid(
                format!("{}.single_endpoint", here),
                "template must contain '{id}'",
            ));
        }
    }
    let page_size = raw.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err(ConfigError::invalid(
            format!("{}.page_size", here),
            "must be greater than zero",
        ));
    }

    let mut fixed = Filters::new();
    for (key, value) in &raw.fixed_filters {
        let filter = Filter::parse(*key, value).ok_or_else(|| {
            ConfigError::invalid(
                format!("{}.fixed_filters.{}", here, key),
                format!("'{}' is not a valid value", value),
            )
        })?;
        fixed = fixed.with(filter);
    }

    let mut rules = Vec::with_capacity(raw.mappings.len());
    for (idx, rule) in raw.mappings.into_iter().enumerate() {
        let rule_here = format!("{}.mappings[{}]", here, idx);
        if rule.source.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("{}.source", rule_here),
                "source path must not be empty",
            ));
        }
        check_targets(kind, &rule.targets, &rule_here)?;

        let formatters = rule
            .formatters
            .iter()
            .enumerate()
            .map(|(f_idx, f)| {
                registry.build(&f.name, &f.args, &format!("{}.formatters[{}]", rule_here, f_idx))
            })
            .collect::<Result<Vec<_>, _>>()?;

        rules.push(MappingRule {
            source_path: rule.source,
            targets: rule.targets,
            formatters,
        });
    }

    let mut computed = Vec::with_capacity(raw.computed.len());
    for (idx, field) in raw.computed.into_iter().enumerate() {
        let field_here = format!("{}.computed[{}]", here, idx);
        check_targets(kind, &field.targets, &field_here)?;
        let problems = formula::validate_formula(&field.formula);
        if !problems.is_empty() {
            return Err(ConfigError::invalid(
                format!("{}.formula", field_here),
                problems.join("; "),
            ));
        }
        computed.push(ComputedField {
            targets: field.targets,
            formula: field.formula,
            variables: field.variables,
        });
    }

    Ok(EntityMapping {
        kind,
        endpoint: raw.endpoint,
        single_endpoint: raw.single_endpoint,
        page_size,
        filters: FilterSpec {
            supported: raw.filters,
            fields: raw.filter_fields,
            fixed,
        },
        post_process: raw.post_process,
        rules,
        computed,
    })
}

/// Targets must name a column of a table the entity's group writes.
fn check_targets(kind: EntityKind, targets: &[Target], here: &str) -> Result<(), ConfigError> {
    if targets.is_empty() {
        return Err(ConfigError::invalid(
            format!("{}.targets", here),
            "at least one target is required",
        ));
    }
    let group = kind.group();
    for (idx, target) in targets.iter().enumerate() {
        let target_here = format!("{}.targets[{}]", here, idx);
        let table = get_table(&target.model)
            .filter(|t| group.owns_table(t.name))
            .ok_or_else(|| {
                ConfigError::invalid(
                    &target_here,
                    format!("model '{}' is not written by entity '{}'", target.model, kind),
                )
            })?;
        if !table.has_column(&target.field) {
            return Err(ConfigError::invalid(
                target_here,
                format!("model '{}' has no field '{}'", target.model, target.field),
            ));
        }
    }
    Ok(())
}
