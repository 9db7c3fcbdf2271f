//! Abstract collection filters and their translation into the upstream query
//! dialect (`field[$gte]`, `field[$in][]`, ...).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Filter names callers may use. An entity only forwards the ones it declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterKey {
    Id,
    Ids,
    IdMin,
    IdMax,
    Name,
    RaceId,
    RaceIds,
    LevelMin,
    LevelMax,
    TypeId,
    TypeIds,
    TypeIdsNot,
    BreedId,
}

impl FilterKey {
    pub const ALL: &'static [FilterKey] = &[
        FilterKey::Id,
        FilterKey::Ids,
        FilterKey::IdMin,
        FilterKey::IdMax,
        FilterKey::Name,
        FilterKey::RaceId,
        FilterKey::RaceIds,
        FilterKey::LevelMin,
        FilterKey::LevelMax,
        FilterKey::TypeId,
        FilterKey::TypeIds,
        FilterKey::TypeIdsNot,
        FilterKey::BreedId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterKey::Id => "id",
            FilterKey::Ids => "ids",
            FilterKey::IdMin => "idMin",
            FilterKey::IdMax => "idMax",
            FilterKey::Name => "name",
            FilterKey::RaceId => "raceId",
            FilterKey::RaceIds => "raceIds",
            FilterKey::LevelMin => "levelMin",
            FilterKey::LevelMax => "levelMax",
            FilterKey::TypeId => "typeId",
            FilterKey::TypeIds => "typeIds",
            FilterKey::TypeIdsNot => "typeIdsNot",
            FilterKey::BreedId => "breedId",
        }
    }

    /// Upstream field family the key filters on
    pub fn field(self) -> FilterField {
        match self {
            FilterKey::Id | FilterKey::Ids | FilterKey::IdMin | FilterKey::IdMax => FilterField::Id,
            FilterKey::Name => FilterField::Name,
            FilterKey::RaceId | FilterKey::RaceIds => FilterField::Race,
            FilterKey::LevelMin | FilterKey::LevelMax => FilterField::Level,
            FilterKey::TypeId | FilterKey::TypeIds | FilterKey::TypeIdsNot => FilterField::Type,
            FilterKey::BreedId => FilterField::Breed,
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKey::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown filter: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Id,
    Name,
    Race,
    Level,
    Type,
    Breed,
}

impl FilterField {
    fn default_name(self, language: &str) -> String {
        match self {
            FilterField::Id => "id".to_string(),
            FilterField::Name => format!("name.{}", language),
            FilterField::Race => "race".to_string(),
            FilterField::Level => "level".to_string(),
            FilterField::Type => "typeId".to_string(),
            FilterField::Breed => "breedId".to_string(),
        }
    }
}

/// One typed filter value
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Id(i64),
    Ids(Vec<i64>),
    IdMin(i64),
    IdMax(i64),
    Name(String),
    RaceId(i64),
    RaceIds(Vec<i64>),
    LevelMin(i64),
    LevelMax(i64),
    TypeId(i64),
    TypeIds(Vec<i64>),
    TypeIdsNot(Vec<i64>),
    BreedId(i64),
}

impl Filter {
    pub fn key(&self) -> FilterKey {
        match self {
            Filter::Id(_) => FilterKey::Id,
            Filter::Ids(_) => FilterKey::Ids,
            Filter::IdMin(_) => FilterKey::IdMin,
            Filter::IdMax(_) => FilterKey::IdMax,
            Filter::Name(_) => FilterKey::Name,
            Filter::RaceId(_) => FilterKey::RaceId,
            Filter::RaceIds(_) => FilterKey::RaceIds,
            Filter::LevelMin(_) => FilterKey::LevelMin,
            Filter::LevelMax(_) => FilterKey::LevelMax,
            Filter::TypeId(_) => FilterKey::TypeId,
            Filter::TypeIds(_) => FilterKey::TypeIds,
            Filter::TypeIdsNot(_) => FilterKey::TypeIdsNot,
            Filter::BreedId(_) => FilterKey::BreedId,
        }
    }

    /// Parse a `key=value` pair; lists are comma-separated.
    pub fn parse(key: FilterKey, raw: &str) -> Option<Filter> {
        let int = || raw.trim().parse::<i64>().ok();
        let list = || {
            raw.split(',')
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.parse::<i64>().ok())
                .collect::<Option<Vec<i64>>>()
        };

        Some(match key {
            FilterKey::Id => Filter::Id(int()?),
            FilterKey::Ids => Filter::Ids(list()?),
            FilterKey::IdMin => Filter::IdMin(int()?),
            FilterKey::IdMax => Filter::IdMax(int()?),
            FilterKey::Name => {
                let name = raw.trim();
                if name.is_empty() {
                    return None;
                }
                Filter::Name(name.to_string())
            }
            FilterKey::RaceId => Filter::RaceId(int()?),
            FilterKey::RaceIds => Filter::RaceIds(list()?),
            FilterKey::LevelMin => Filter::LevelMin(int()?),
            FilterKey::LevelMax => Filter::LevelMax(int()?),
            FilterKey::TypeId => Filter::TypeId(int()?),
            FilterKey::TypeIds => Filter::TypeIds(list()?),
            FilterKey::TypeIdsNot => Filter::TypeIdsNot(list()?),
            FilterKey::BreedId => Filter::BreedId(int()?),
        })
    }
}

/// Filters an entity accepts and the upstream field names it uses
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub supported: BTreeSet<FilterKey>,
    pub fields: BTreeMap<FilterField, String>,
    /// Always sent, ahead of caller filters and regardless of `supported`
    pub fixed: Filters,
}

impl FilterSpec {
    pub fn supports(&self, key: FilterKey) -> bool {
        self.supported.contains(&key)
    }

    pub fn field_name(&self, field: FilterField, language: &str) -> String {
        self.fields
            .get(&field)
            .cloned()
            .unwrap_or_else(|| field.default_name(language))
    }
}

/// A caller's set of filters, in the order given
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(Vec<Filter>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: Filter) -> Self {
        self.0.push(filter);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build from raw `key=value` pairs. Unknown keys and unparsable values are dropped.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut filters = Vec::new();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key.parse::<FilterKey>() {
                Ok(k) => match Filter::parse(k, value) {
                    Some(filter) => filters.push(filter),
                    None => debug!(filter = key, value, "dropping filter with invalid value"),
                },
                Err(_) => debug!(filter = key, "dropping unknown filter"),
            }
        }
        Self(filters)
    }

    /// Translate into upstream query parameters.
    ///
    /// The entity's fixed filters come first. Of the caller's filters only
    /// keys in `spec.supported` are forwarded. List values are de-duplicated
    /// and cut to `max_values`.
    pub fn to_query(
        &self,
        spec: &FilterSpec,
        language: &str,
        max_values: usize,
    ) -> Vec<(String, String)> {
        let mut query = Vec::new();

        for filter in &spec.fixed.0 {
            push_filter(&mut query, filter, spec, language, usize::MAX);
        }
        for filter in &self.0 {
            if !spec.supports(filter.key()) {
                debug!(filter = %filter.key(), "filter not supported by entity, dropping");
                continue;
            }
            push_filter(&mut query, filter, spec, language, max_values);
        }

        query
    }
}

fn push_filter(
    query: &mut Vec<(String, String)>,
    filter: &Filter,
    spec: &FilterSpec,
    language: &str,
    max_values: usize,
) {
    let field = spec.field_name(filter.key().field(), language);

    match filter {
        Filter::Id(v) | Filter::RaceId(v) | Filter::TypeId(v) | Filter::BreedId(v) => {
            query.push((field, v.to_string()));
        }
        Filter::IdMin(v) | Filter::LevelMin(v) => {
            query.push((format!("{}[$gte]", field), v.to_string()));
        }
        Filter::IdMax(v) | Filter::LevelMax(v) => {
            query.push((format!("{}[$lte]", field), v.to_string()));
        }
        Filter::Name(name) => {
            query.push((format!("{}[$search]", field), name.clone()));
        }
        Filter::Ids(values) | Filter::RaceIds(values) | Filter::TypeIds(values) => {
            let param = format!("{}[$in][]", field);
            for v in bounded_unique(values, max_values) {
                query.push((param.clone(), v.to_string()));
            }
        }
        Filter::TypeIdsNot(values) => {
            let param = format!("{}[$nin][]", field);
            for v in bounded_unique(values, max_values) {
                query.push((param.clone(), v.to_string()));
            }
        }
    }
}

/// First occurrence of each value, at most `max` of them
fn bounded_unique(values: &[i64], max: usize) -> Vec<i64> {
    let mut seen = HashSet::new();
    values
        .iter()
        .copied()
        .filter(|v| seen.insert(*v))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(keys: &[FilterKey]) -> FilterSpec {
        FilterSpec {
            supported: keys.iter().copied().collect(),
            ..Default::default()
        }
    }

    fn pairs(query: &[(String, String)]) -> Vec<(&str, &str)> {
        query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_from_pairs_drops_unknown_and_invalid() {
        let filters = Filters::from_pairs([
            ("raceId", "3"),
            ("colour", "red"),
            ("levelMin", "abc"),
            ("ids", "1, 2,3"),
        ]);
        assert_eq!(
            filters,
            Filters::new()
                .with(Filter::RaceId(3))
                .with(Filter::Ids(vec![1, 2, 3]))
        );
    }

    #[test]
    fn test_translation() {
        let filters = Filters::new()
            .with(Filter::IdMin(10))
            .with(Filter::IdMax(20))
            .with(Filter::Name("bouf".into()))
            .with(Filter::TypeIdsNot(vec![5]))
            .with(Filter::LevelMin(3));
        let spec = spec(&[
            FilterKey::IdMin,
            FilterKey::IdMax,
            FilterKey::Name,
            FilterKey::TypeIdsNot,
            FilterKey::LevelMin,
        ]);

        assert_eq!(
            pairs(&filters.to_query(&spec, "fr", 50)),
            vec![
                ("id[$gte]", "10"),
                ("id[$lte]", "20"),
                ("name.fr[$search]", "bouf"),
                ("typeId[$nin][]", "5"),
                ("level[$gte]", "3"),
            ]
        );
    }

    #[test]
    fn test_unsupported_filters_are_not_forwarded() {
        let filters = Filters::new()
            .with(Filter::RaceId(3))
            .with(Filter::BreedId(7));
        let query = filters.to_query(&spec(&[FilterKey::BreedId]), "fr", 50);
        assert_eq!(pairs(&query), vec![("breedId", "7")]);
    }

    #[test]
    fn test_field_overrides() {
        let mut spec = spec(&[FilterKey::LevelMax, FilterKey::RaceIds]);
        spec.fields.insert(FilterField::Level, "grades.0.level".into());
        spec.fields.insert(FilterField::Race, "raceId".into());
        let filters = Filters::new()
            .with(Filter::LevelMax(40))
            .with(Filter::RaceIds(vec![1]));
        assert_eq!(
            pairs(&filters.to_query(&spec, "en", 10)),
            vec![("grades.0.level[$lte]", "40"), ("raceId[$in][]", "1")]
        );
    }

    #[test]
    fn test_lists_are_deduplicated_and_bounded() {
        let filters = Filters::new().with(Filter::Ids(vec![4, 4, 2, 4, 9, 2, 7]));
        let query = filters.to_query(&spec(&[FilterKey::Ids]), "fr", 3);
        assert_eq!(
            pairs(&query),
            vec![("id[$in][]", "4"), ("id[$in][]", "2"), ("id[$in][]", "9")]
        );
    }

    #[test]
    fn test_fixed_filters_always_come_first() {
        let mut spec = spec(&[FilterKey::LevelMin]);
        spec.fixed = Filters::new().with(Filter::TypeIds(vec![12, 13, 12]));
        let filters = Filters::new()
            .with(Filter::LevelMin(5))
            .with(Filter::TypeId(99));

        assert_eq!(
            pairs(&filters.to_query(&spec, "fr", 1)),
            vec![
                ("typeId[$in][]", "12"),
                ("typeId[$in][]", "13"),
                ("level[$gte]", "5"),
            ]
        );
        assert_eq!(
            pairs(&Filters::new().to_query(&spec, "fr", 1)),
            vec![("typeId[$in][]", "12"), ("typeId[$in][]", "13")]
        );
    }
}
