//! One collect → convert → integrate pass over a single entity kind

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::collect::{CollectMeta, CollectOptions, CollectService, Transport};
use crate::config::{EntityMapping, SourceConfig};
use crate::convert::convert;
use crate::filter::Filters;
use crate::integrate::{integrate, Action, IntegrateOptions, IntegrationOutcome};
use crate::schema::EntityKind;
use crate::writer::Store;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub source: String,
    pub entity: EntityKind,
    pub meta: CollectMeta,
    /// One outcome per collected record, in collection order
    pub outcomes: Vec<IntegrationOutcome>,
    pub summary: BTreeMap<Action, usize>,
}

impl PipelineReport {
    pub fn count(&self, action: Action) -> usize {
        self.summary.get(&action).copied().unwrap_or(0)
    }

    pub fn has_failures(&self) -> bool {
        self.count(Action::Failed) > 0
    }
}

pub struct Pipeline<T: Transport> {
    collector: CollectService<T>,
    store: Store,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(collector: CollectService<T>, store: Store) -> Self {
        Self { collector, store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Collect every matching record, then convert and integrate them one at
    /// a time. A collection failure fails the run before anything is written;
    /// per-record failures are reported as `failed` outcomes.
    pub fn run(
        &mut self,
        source: &SourceConfig,
        entity: &EntityMapping,
        filters: &Filters,
        collect: &CollectOptions,
        options: &IntegrateOptions,
    ) -> Result<PipelineReport> {
        let collection = self.collector.fetch_many(source, entity, filters, collect)?;

        let mut outcomes = Vec::with_capacity(collection.items.len());
        let mut summary = BTreeMap::new();
        for record in &collection.items {
            let data = convert(record, entity, &source.default_language);
            let outcome = integrate(&mut self.store, entity.kind, &data, options);
            *summary.entry(outcome.action).or_insert(0) += 1;
            outcomes.push(outcome);
        }

        info!(
            source = %source.name,
            entity = %entity.kind,
            records = outcomes.len(),
            summary = ?summary,
            "pipeline finished"
        );

        Ok(PipelineReport {
            source: source.name.clone(),
            entity: entity.kind,
            meta: collection.meta,
            outcomes,
            summary,
        })
    }

    /// Same as `run` for one upstream id. `None` when the record does not exist.
    pub fn run_one(
        &mut self,
        source: &SourceConfig,
        entity: &EntityMapping,
        id: i64,
        collect: &CollectOptions,
        options: &IntegrateOptions,
    ) -> Result<Option<IntegrationOutcome>> {
        let Some(record) = self.collector.fetch_one(source, entity, id, collect)? else {
            return Ok(None);
        };
        let data = convert(&record, entity, &source.default_language);
        Ok(Some(integrate(&mut self.store, entity.kind, &data, options)))
    }
}
