use serde_json::Value;
use tracing::debug;

use super::record::{CatalogRecord, ConversionResult, SqlValue};
use crate::config::{EntityMapping, Target};
use crate::formatters::FormatContext;
use crate::formula::{self, Variables};

/// Convert one catalog record into per-model attribute maps.
///
/// Rules run in declaration order, so a later rule writing the same target
/// wins. Computed fields run last and read raw record values.
pub fn convert(
    record: &CatalogRecord,
    mapping: &EntityMapping,
    default_language: &str,
) -> ConversionResult {
    let ctx = FormatContext { default_language };
    let mut result = ConversionResult::new();

    for rule in &mapping.rules {
        let raw = record
            .get_path(&rule.source_path)
            .cloned()
            .unwrap_or(Value::Null);
        let value = rule
            .formatters
            .iter()
            .fold(raw, |value, formatter| formatter.apply(value, &ctx));
        write_targets(&mut result, &rule.targets, SqlValue::from(&value));
    }

    for field in &mapping.computed {
        let variables: Variables = field
            .variables
            .iter()
            .filter_map(|(name, path)| {
                let value = record.get_path(path).map(SqlValue::from)?.as_f64()?;
                Some((name.clone(), value))
            })
            .collect();

        let value = match formula::evaluate(&field.formula, &variables) {
            Some(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => SqlValue::Integer(v as i64),
            Some(v) => SqlValue::Real(v),
            None => {
                debug!(formula = %field.formula, "computed field did not evaluate");
                SqlValue::Null
            }
        };
        write_targets(&mut result, &field.targets, value);
    }

    result
}

fn write_targets(result: &mut ConversionResult, targets: &[Target], value: SqlValue) {
    for target in targets {
        result
            .entry(target.model.clone())
            .or_default()
            .insert(target.field.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComputedField, MappingRule};
    use crate::filter::FilterSpec;
    use crate::formatters::Formatter;
    use crate::schema::EntityKind;
    use serde_json::json;

    fn target(model: &str, field: &str) -> Target {
        Target {
            model: model.into(),
            field: field.into(),
        }
    }

    fn monster_mapping() -> EntityMapping {
        EntityMapping {
            kind: EntityKind::Monster,
            endpoint: "/monsters".into(),
            single_endpoint: None,
            page_size: 50,
            filters: FilterSpec::default(),
            post_process: Default::default(),
            rules: vec![
                MappingRule {
                    source_path: "name".into(),
                    targets: vec![target("creatures", "name")],
                    formatters: vec![Formatter::PickLang { lang: None }, Formatter::Trim],
                },
                MappingRule {
                    source_path: "id".into(),
                    targets: vec![target("monsters", "dofusdb_id")],
                    formatters: vec![Formatter::ToInt],
                },
                MappingRule {
                    source_path: "grades.0.level".into(),
                    targets: vec![target("creatures", "level")],
                    formatters: vec![],
                },
                MappingRule {
                    source_path: "isBoss".into(),
                    targets: vec![target("monsters", "is_boss")],
                    formatters: vec![Formatter::Default { value: json!(false) }],
                },
            ],
            computed: vec![ComputedField {
                targets: vec![target("creatures", "life")],
                formula: r#"{"characteristic":"level","1":"[level]*10","5":"[level]*12"}"#.into(),
                variables: [("level".to_string(), "grades.0.level".to_string())]
                    .into_iter()
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_convert_record() {
        let record = CatalogRecord::new(json!({
            "id": "31",
            "name": {"fr": " Bouftou ", "en": "Gobball"},
            "grades": [{"level": 6}]
        }));
        let result = convert(&record, &monster_mapping(), "fr");

        let creature = &result["creatures"];
        assert_eq!(creature["name"], SqlValue::Text("Bouftou".into()));
        assert_eq!(creature["level"], SqlValue::Integer(6));
        assert_eq!(creature["life"], SqlValue::Integer(72));

        let monster = &result["monsters"];
        assert_eq!(monster["dofusdb_id"], SqlValue::Integer(31));
        assert_eq!(monster["is_boss"], SqlValue::Integer(0));
    }

    #[test]
    fn test_missing_values_become_null() {
        let record = CatalogRecord::new(json!({"id": 2}));
        let result = convert(&record, &monster_mapping(), "fr");
        assert_eq!(result["creatures"]["name"], SqlValue::Null);
        assert_eq!(result["creatures"]["level"], SqlValue::Null);
        // level defaults to 0, below every band: the first band applies.
        assert_eq!(result["creatures"]["life"], SqlValue::Integer(0));
    }
}
