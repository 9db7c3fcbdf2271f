use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::cache::ResponseCache;
use super::client::{FetchError, Transport};
use crate::config::{EntityMapping, SourceConfig};
use crate::convert::CatalogRecord;
use crate::filter::{FilterField, Filters};

/// Caps and paging knobs for one `fetch_many` call
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Most records to return
    pub limit: Option<usize>,
    /// Upstream offset of the first request
    pub start_skip: usize,
    /// Records asked for per request; the entity's default when unset
    pub page_size: Option<usize>,
    pub max_pages: Option<usize>,
    /// Hard cap on accumulated records, applied together with `limit`
    pub max_items: Option<usize>,
    pub skip_cache: bool,
}

impl CollectOptions {
    fn item_cap(&self) -> Option<usize> {
        match (self.limit, self.max_items) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectMeta {
    /// Upstream total, or `returned + skip` when the server never reported one
    pub total: u64,
    /// Last effective page size the server honored
    pub limit: usize,
    pub skip: usize,
    pub pages: usize,
    pub returned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub items: Vec<CatalogRecord>,
    pub meta: CollectMeta,
}

/// One upstream response page
struct Page {
    data: Vec<CatalogRecord>,
    total: Option<u64>,
    limit: Option<usize>,
}

impl Page {
    fn from_body(body: Value, url: &str) -> Result<Self> {
        match body {
            Value::Array(items) => Ok(Page {
                data: items.into_iter().map(CatalogRecord::new).collect(),
                total: None,
                limit: None,
            }),
            Value::Object(mut map) => {
                let data = match map.remove("data") {
                    Some(Value::Array(items)) => items,
                    _ => bail!("Response from {} has no data array", url),
                };
                Ok(Page {
                    data: data.into_iter().map(CatalogRecord::new).collect(),
                    total: map.get("total").and_then(Value::as_u64),
                    limit: map
                        .get("limit")
                        .and_then(Value::as_u64)
                        .map(|l| l as usize)
                        .filter(|l| *l > 0),
                })
            }
            _ => bail!("Unexpected response shape from {}", url),
        }
    }
}

/// Collects catalog records page by page from one upstream source
pub struct CollectService<T: Transport> {
    transport: T,
    cache: Option<ResponseCache>,
}

impl<T: Transport> CollectService<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Collect records matching `filters`.
    ///
    /// Paging advances by the page size the server reports back, which can be
    /// smaller than requested. Stops on a short page, on reaching the reported
    /// total, or on any of the caps in `options`. Any failed request fails the
    /// whole call.
    pub fn fetch_many(
        &self,
        source: &SourceConfig,
        entity: &EntityMapping,
        filters: &Filters,
        options: &CollectOptions,
    ) -> Result<Collection> {
        let query = filters.to_query(
            &entity.filters,
            &source.default_language,
            source.max_filter_values,
        );
        let page_size = options.page_size.unwrap_or(entity.page_size).max(1);
        let cap = options.item_cap();

        info!(
            source = %source.name,
            entity = %entity.kind,
            filters = query.len(),
            page_size,
            "collecting"
        );

        let mut items: Vec<CatalogRecord> = Vec::new();
        let mut skip = options.start_skip;
        let mut pages = 0;
        let mut reported_total: Option<u64> = None;
        let mut effective_limit = page_size;

        loop {
            if options.max_pages.is_some_and(|max| pages >= max) {
                debug!(pages, "page cap reached");
                break;
            }
            let remaining = cap.map(|c| c.saturating_sub(items.len()));
            if remaining == Some(0) {
                break;
            }
            let requested = remaining.map_or(page_size, |r| r.min(page_size));

            let page = self
                .fetch_page(source, &entity.endpoint, &query, requested, skip, options.skip_cache)
                .with_context(|| format!("Failed to collect {} at skip {}", entity.kind, skip))?;
            pages += 1;

            let returned = page.data.len();
            effective_limit = page.limit.unwrap_or(requested);
            if let Some(total) = page.total {
                reported_total = Some(total);
            }
            if effective_limit < requested {
                debug!(requested, effective_limit, "server capped page size");
            }

            let room = cap.map_or(usize::MAX, |c| c - items.len());
            items.extend(page.data.into_iter().take(room));

            skip += effective_limit;

            if returned == 0 || returned < effective_limit {
                break;
            }
            if reported_total.is_some_and(|total| skip as u64 >= total) {
                break;
            }
        }

        let collected = items.len();
        let items = entity.post_process.apply(items);
        let meta = CollectMeta {
            total: reported_total.unwrap_or((collected + options.start_skip) as u64),
            limit: effective_limit,
            skip: options.start_skip,
            pages,
            returned: items.len(),
        };

        info!(
            entity = %entity.kind,
            returned = meta.returned,
            total = meta.total,
            pages = meta.pages,
            "collected"
        );
        Ok(Collection { items, meta })
    }

    /// Fetch a single record by upstream id, or `None` if it does not exist.
    ///
    /// Entities with fixed filters always go through the filtered list, so a
    /// record outside them is `None`.
    pub fn fetch_one(
        &self,
        source: &SourceConfig,
        entity: &EntityMapping,
        id: i64,
        options: &CollectOptions,
    ) -> Result<Option<CatalogRecord>> {
        let single = entity
            .single_endpoint
            .as_ref()
            .filter(|_| entity.filters.fixed.is_empty());
        if let Some(template) = single {
            let url = source.url(&template.replace("{id}", &id.to_string()));
            return match self.get(&url, options.skip_cache) {
                Ok(Value::Null) => Ok(None),
                Ok(Value::Object(map)) if map.is_empty() => Ok(None),
                Ok(body) => Ok(Some(CatalogRecord::new(body))),
                Err(err) if err.is_not_found() => Ok(None),
                Err(err) => Err(err).with_context(|| format!("Failed to fetch {} {}", entity.kind, id)),
            };
        }

        // No dedicated endpoint: list filtered by id, one record.
        let id_field = entity
            .filters
            .field_name(FilterField::Id, &source.default_language);
        let mut query = Filters::new().to_query(
            &entity.filters,
            &source.default_language,
            source.max_filter_values,
        );
        query.push((id_field, id.to_string()));
        let page = self
            .fetch_page(source, &entity.endpoint, &query, 1, 0, options.skip_cache)
            .with_context(|| format!("Failed to fetch {} {}", entity.kind, id))?;

        Ok(page
            .data
            .into_iter()
            .next()
            .filter(|record| record.id().map_or(true, |found| found == id)))
    }

    fn fetch_page(
        &self,
        source: &SourceConfig,
        endpoint: &str,
        query: &[(String, String)],
        limit: usize,
        skip: usize,
        skip_cache: bool,
    ) -> Result<Page> {
        let url = page_url(source, endpoint, query, limit, skip)?;
        let body = self.get(&url, skip_cache)?;
        Page::from_body(body, &url)
    }

    fn get(&self, url: &str, skip_cache: bool) -> Result<Value, FetchError> {
        if let Some(cache) = &self.cache {
            if !skip_cache {
                if let Some(body) = cache.get(url) {
                    return Ok(body);
                }
            }
        }

        let body = self.transport.get_json(url)?;

        if let Some(cache) = &self.cache {
            if let Err(err) = cache.put(url, &body) {
                warn!(url, error = %err, "failed to cache response");
            }
        }
        Ok(body)
    }
}

/// `<base>/<endpoint>?$limit=..&$skip=..&<filters>`
pub fn page_url(
    source: &SourceConfig,
    endpoint: &str,
    query: &[(String, String)],
    limit: usize,
    skip: usize,
) -> Result<String> {
    let base = source.url(endpoint);
    let mut url = Url::parse(&base).with_context(|| format!("Invalid endpoint URL {}", base))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("$limit", &limit.to_string());
        pairs.append_pair("$skip", &skip.to_string());
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, FilterKey, FilterSpec};
    use crate::schema::EntityKind;
    use serde_json::json;
    use std::cell::RefCell;
    use std::sync::Arc;

    /// Serves `total` records with ids `1..=total`, never more than `cap` per page
    struct FakeCatalog {
        total: usize,
        cap: usize,
        report_total: bool,
        fail_at_skip: Option<usize>,
        name_prefix: RefCell<&'static str>,
        requests: RefCell<Vec<String>>,
    }

    impl FakeCatalog {
        fn new(total: usize, cap: usize) -> Self {
            Self {
                total,
                cap,
                report_total: true,
                fail_at_skip: None,
                name_prefix: RefCell::new("m"),
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    fn param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    impl Transport for FakeCatalog {
        fn get_json(&self, url: &str) -> Result<Value, FetchError> {
            self.requests.borrow_mut().push(url.to_string());
            let parsed = Url::parse(url).unwrap();
            let limit: usize = param(&parsed, "$limit").unwrap().parse().unwrap();
            let skip: usize = param(&parsed, "$skip").unwrap().parse().unwrap();
            if self.fail_at_skip == Some(skip) {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: 503,
                });
            }

            let effective = limit.min(self.cap);
            let prefix = *self.name_prefix.borrow();
            let data: Vec<Value> = (skip..self.total.min(skip + effective))
                .map(|i| json!({"id": i + 1, "name": {"fr": format!("{}{}", prefix, i + 1)}}))
                .collect();
            let mut body = json!({"data": data, "limit": effective, "skip": skip});
            if self.report_total {
                body["total"] = json!(self.total);
            }
            Ok(body)
        }
    }

    fn source() -> SourceConfig {
        let entity = EntityMapping {
            kind: EntityKind::Monster,
            endpoint: "/monsters".into(),
            single_endpoint: None,
            page_size: 20,
            filters: FilterSpec {
                supported: [FilterKey::RaceId].into_iter().collect(),
                ..Default::default()
            },
            post_process: Default::default(),
            rules: vec![],
            computed: vec![],
        };
        SourceConfig {
            name: "fake".into(),
            base_url: "https://api.example.test".into(),
            default_language: "fr".into(),
            max_filter_values: 10,
            entities: [(EntityKind::Monster, Arc::new(entity))].into_iter().collect(),
        }
    }

    fn ids(collection: &Collection) -> Vec<i64> {
        collection.items.iter().filter_map(|r| r.id()).collect()
    }

    #[test]
    fn test_server_capped_pages_return_every_item_once() {
        let source = source();
        let entity = source.entity(EntityKind::Monster).unwrap();
        let service = CollectService::new(FakeCatalog::new(45, 7));

        let result = service
            .fetch_many(&source, entity, &Filters::new(), &CollectOptions::default())
            .unwrap();

        assert_eq!(ids(&result), (1..=45).collect::<Vec<_>>());
        assert_eq!(result.meta.total, 45);
        assert_eq!(result.meta.limit, 7);
        assert_eq!(result.meta.pages, 7);
        assert_eq!(result.meta.returned, 45);
    }

    #[test]
    fn test_caps_and_start_skip() {
        let source = source();
        let entity = source.entity(EntityKind::Monster).unwrap();
        let service = CollectService::new(FakeCatalog::new(100, 10));

        let limited = service
            .fetch_many(
                &source,
                entity,
                &Filters::new(),
                &CollectOptions {
                    limit: Some(25),
                    start_skip: 5,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ids(&limited), (6..=30).collect::<Vec<_>>());
        assert_eq!(limited.meta.skip, 5);

        let paged = service
            .fetch_many(
                &source,
                entity,
                &Filters::new(),
                &CollectOptions {
                    max_pages: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(paged.items.len(), 20);
        assert_eq!(paged.meta.pages, 2);

        let max_items = service
            .fetch_many(
                &source,
                entity,
                &Filters::new(),
                &CollectOptions {
                    limit: Some(50),
                    max_items: Some(12),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(max_items.items.len(), 12);
    }

    #[test]
    fn test_total_inferred_when_not_reported() {
        let source = source();
        let entity = source.entity(EntityKind::Monster).unwrap();
        let mut catalog = FakeCatalog::new(13, 5);
        catalog.report_total = false;
        let service = CollectService::new(catalog);

        let result = service
            .fetch_many(
                &source,
                entity,
                &Filters::new(),
                &CollectOptions {
                    start_skip: 3,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.items.len(), 10);
        assert_eq!(result.meta.total, 13);
    }

    #[test]
    fn test_failure_mid_pagination_fails_the_call() {
        let source = source();
        let entity = source.entity(EntityKind::Monster).unwrap();
        let mut catalog = FakeCatalog::new(30, 10);
        catalog.fail_at_skip = Some(20);
        let service = CollectService::new(catalog);

        let err = service
            .fetch_many(&source, entity, &Filters::new(), &CollectOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("skip 20"));
    }

    #[test]
    fn test_only_supported_filters_reach_the_server() {
        let source = source();
        let entity = source.entity(EntityKind::Monster).unwrap();
        let catalog = FakeCatalog::new(3, 10);
        let service = CollectService::new(&catalog);
        let filters = Filters::new()
            .with(Filter::RaceId(4))
            .with(Filter::Name("bouf".into()));

        service
            .fetch_many(&source, entity, &filters, &CollectOptions::default())
            .unwrap();

        let requests = catalog.requests.borrow();
        let url = Url::parse(&requests[0]).unwrap();
        assert_eq!(param(&url, "race").as_deref(), Some("4"));
        assert!(url.query_pairs().all(|(k, _)| !k.starts_with("name")));
    }

    #[test]
    fn test_fixed_filters_reach_the_server() {
        let mut source = source();
        if let Some(entity) = source.entities.get_mut(&EntityKind::Monster) {
            let entity = Arc::make_mut(entity);
            entity.single_endpoint = Some("/monsters/{id}".into());
            entity.filters.fixed = Filters::new().with(Filter::TypeIds(vec![12, 13]));
        }
        let entity = source.entity(EntityKind::Monster).unwrap();
        let catalog = FakeCatalog::new(3, 10);
        let service = CollectService::new(&catalog);

        service
            .fetch_many(&source, entity, &Filters::new(), &CollectOptions::default())
            .unwrap();
        service
            .fetch_one(&source, entity, 1, &CollectOptions::default())
            .unwrap();

        let requests = catalog.requests.borrow();
        assert_eq!(requests.len(), 2);
        for request in requests.iter() {
            let url = Url::parse(request).unwrap();
            assert_eq!(url.path(), "/monsters");
            let types: Vec<String> = url
                .query_pairs()
                .filter(|(k, _)| k == "typeId[$in][]")
                .map(|(_, v)| v.into_owned())
                .collect();
            assert_eq!(types, vec!["12", "13"]);
        }
    }

    #[test]
    fn test_fetch_one_through_list() {
        let source = source();
        let entity = source.entity(EntityKind::Monster).unwrap();
        let catalog = FakeCatalog::new(3, 10);
        let service = CollectService::new(&catalog);

        // The fake ignores the id filter and returns the first record.
        let found = service
            .fetch_one(&source, entity, 1, &CollectOptions::default())
            .unwrap();
        assert_eq!(found.and_then(|r| r.id()), Some(1));

        let mismatched = service
            .fetch_one(&source, entity, 2, &CollectOptions::default())
            .unwrap();
        assert!(mismatched.is_none());

        let url = Url::parse(&catalog.requests.borrow()[0]).unwrap();
        assert_eq!(param(&url, "id").as_deref(), Some("1"));
        assert_eq!(param(&url, "$limit").as_deref(), Some("1"));
    }

    #[test]
    fn test_page_url_encodes_query() {
        let url = page_url(
            &source(),
            "/monsters",
            &[("id[$in][]".to_string(), "3".to_string())],
            10,
            20,
        )
        .unwrap();
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/monsters");
        assert_eq!(param(&parsed, "$skip").as_deref(), Some("20"));
        assert_eq!(param(&parsed, "id[$in][]").as_deref(), Some("3"));
    }

    #[test]
    fn test_expired_cache_entries_are_fetched_again() {
        use std::time::{Duration, SystemTime};

        let dir = tempfile::TempDir::new().unwrap();
        let source = source();
        let entity = source.entity(EntityKind::Monster).unwrap();
        let catalog = FakeCatalog::new(2, 10);
        let cache = ResponseCache::new(Some(dir.path().to_path_buf()))
            .unwrap()
            .with_max_age(Duration::from_secs(600));
        let service = CollectService::new(&catalog).with_cache(cache);
        let names = || -> Vec<String> {
            service
                .fetch_many(&source, entity, &Filters::new(), &CollectOptions::default())
                .unwrap()
                .items
                .iter()
                .filter_map(|r| r.get_path("name.fr").and_then(Value::as_str).map(String::from))
                .collect()
        };

        *catalog.name_prefix.borrow_mut() = "v1-";
        assert_eq!(names(), vec!["v1-1", "v1-2"]);

        *catalog.name_prefix.borrow_mut() = "v2-";
        assert_eq!(names(), vec!["v1-1", "v1-2"]);
        assert_eq!(catalog.requests.borrow().len(), 1);

        for entry in std::fs::read_dir(dir.path()).unwrap() {
            std::fs::File::options()
                .write(true)
                .open(entry.unwrap().path())
                .unwrap()
                .set_modified(SystemTime::now() - Duration::from_secs(3600))
                .unwrap();
        }
        assert_eq!(names(), vec!["v2-1", "v2-2"]);
        assert_eq!(catalog.requests.borrow().len(), 2);
    }
}
