use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::convert::CatalogRecord;

/// Reshaping applied to a collected list, declared per entity
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum PostProcess {
    #[default]
    None,
    /// Keep the first record for each distinct value at `path`; records
    /// without a value there are all kept
    DistinctBy { path: String },
    /// Drop records whose value at `path` equals `equals`
    DropWhere { path: String, equals: Value },
}

impl PostProcess {
    pub fn apply(&self, records: Vec<CatalogRecord>) -> Vec<CatalogRecord> {
        match self {
            PostProcess::None => records,
            PostProcess::DistinctBy { path } => {
                let mut seen = HashSet::new();
                records
                    .into_iter()
                    .filter(|r| match r.get_path(path) {
                        Some(key) => seen.insert(key.to_string()),
                        None => true,
                    })
                    .collect()
            }
            PostProcess::DropWhere { path, equals } => records
                .into_iter()
                .filter(|r| r.get_path(path) != Some(equals))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(values: Vec<Value>) -> Vec<CatalogRecord> {
        values.into_iter().map(CatalogRecord::new).collect()
    }

    #[test]
    fn test_distinct_by() {
        let input = records(vec![
            json!({"id": 1, "type": {"id": 10}}),
            json!({"id": 2, "type": {"id": 11}}),
            json!({"id": 3, "type": {"id": 10}}),
        ]);
        let strategy = PostProcess::DistinctBy {
            path: "type.id".into(),
        };
        let ids: Vec<_> = strategy.apply(input).iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_distinct_by_keeps_records_without_the_key() {
        let input = records(vec![
            json!({"id": 1}),
            json!({"id": 2, "type": {"id": 10}}),
            json!({"id": 3}),
            json!({"id": 4, "type": {"id": 10}}),
            json!({"id": 5, "type": {}}),
        ]);
        let strategy = PostProcess::DistinctBy {
            path: "type.id".into(),
        };
        let ids: Vec<_> = strategy.apply(input).iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_drop_where() {
        let input = records(vec![
            json!({"id": 1, "isCosmetic": true}),
            json!({"id": 2, "isCosmetic": false}),
            json!({"id": 3}),
        ]);
        let strategy: PostProcess =
            serde_json::from_value(json!({"strategy": "drop_where", "path": "isCosmetic", "equals": true}))
                .unwrap();
        let ids: Vec<_> = strategy.apply(input).iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec![2, 3]);
    }
}
