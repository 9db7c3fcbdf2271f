use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::outcome::{Action, IntegrateOptions, IntegrationOutcome};
use crate::convert::{Attributes, ConversionResult, SqlValue};
use crate::schema::{EntityGroup, EntityKind};
use crate::writer::{Store, UnitOfWork};

/// Write one converted record into the domain tables of its entity group.
///
/// Never returns an error: failures roll the whole group back and come out
/// as a `failed` outcome.
pub fn integrate(
    store: &mut Store,
    kind: EntityKind,
    data: &ConversionResult,
    options: &IntegrateOptions,
) -> IntegrationOutcome {
    let group = kind.group();

    if let Some(model) = data.keys().find(|model| !group.owns_table(model)) {
        return IntegrationOutcome::failed(
            format!("model '{}' is not part of entity '{}'", model, kind),
            data.clone(),
        );
    }

    let existing = match find_existing(store, group, data) {
        Ok(existing) => existing,
        Err(err) => return IntegrationOutcome::failed(format!("{:#}", err), data.clone()),
    };

    if let Some(id) = existing {
        if !options.force_update {
            let action = if options.dry_run {
                Action::WouldSkip
            } else {
                Action::Skipped
            };
            debug!(entity = %kind, id, "already integrated");
            return IntegrationOutcome::new(action, Some(id), data.clone())
                .with_message("already integrated");
        }
    }

    let mut payload = data.clone();
    if existing.is_some() {
        payload = exclude_fields(&payload, &options.exclude_from_update);
    }

    match resolve_references(store, group, &mut payload, options) {
        Ok(None) => {}
        Ok(Some(unresolved)) => {
            let action = if options.dry_run {
                Action::WouldSkip
            } else {
                Action::Skipped
            };
            return IntegrationOutcome::new(action, existing, payload).with_message(unresolved);
        }
        Err(err) => {
            warn!(entity = %kind, error = %format!("{:#}", err), "reference lookup failed");
            return IntegrationOutcome::failed(format!("{:#}", err), payload);
        }
    }

    if options.dry_run {
        let action = if existing.is_some() {
            Action::WouldUpdate
        } else {
            Action::WouldCreate
        };
        return IntegrationOutcome::new(action, existing, payload);
    }

    let written = store.unit_of_work().and_then(|uow| {
        let id = match existing {
            Some(id) => {
                update_group(&uow, group, id, &payload)?;
                id
            }
            None => create_group(&uow, group, &payload)?,
        };
        uow.commit()?;
        Ok(id)
    });

    match written {
        Ok(id) => {
            let action = if existing.is_some() {
                Action::Updated
            } else {
                Action::Created
            };
            info!(entity = %kind, id, action = %action, "integrated");
            IntegrationOutcome::new(action, Some(id), payload)
        }
        Err(err) => {
            warn!(entity = %kind, error = %format!("{:#}", err), "integration rolled back");
            IntegrationOutcome::failed(format!("{:#}", err), payload)
        }
    }
}

/// Drop `excluded` fields from every table's attributes
pub fn exclude_fields(payload: &ConversionResult, excluded: &BTreeSet<String>) -> ConversionResult {
    payload
        .iter()
        .map(|(model, attrs)| {
            let kept = attrs
                .iter()
                .filter(|(field, _)| !excluded.contains(*field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect();
            (model.clone(), kept)
        })
        .collect()
}

fn value_at<'a>(payload: &'a ConversionResult, table: &str, column: &str) -> Option<&'a SqlValue> {
    payload
        .get(table)
        .and_then(|attrs| attrs.get(column))
        .filter(|v| !v.is_null())
}

/// Base row id matching the record's natural key: external id first, then name
fn find_existing(
    store: &Store,
    group: &EntityGroup,
    data: &ConversionResult,
) -> Result<Option<i64>> {
    let ext = group.external_id;
    if let Some(value) = value_at(data, ext.table, ext.column) {
        if ext.table == group.base.name {
            return store.find_id(ext.table, ext.column, value);
        }
        if let Some(spec) = group.specialized.as_ref().filter(|s| s.table.name == ext.table) {
            let base_id = store.lookup(ext.table, spec.link_column, ext.column, value)?;
            return Ok(base_id.and_then(|v| v.as_i64()));
        }
        bail!("external id table '{}' is not part of the group", ext.table);
    }

    match value_at(data, group.base.name, group.name_column) {
        Some(name) => store.find_id(group.base.name, group.name_column, name),
        None => Ok(None),
    }
}

/// Replace upstream identifiers in reference columns with local row ids.
///
/// Unknown identifiers become null. `Some` carries the reason the record
/// must be skipped.
fn resolve_references(
    store: &Store,
    group: &EntityGroup,
    payload: &mut ConversionResult,
    options: &IntegrateOptions,
) -> Result<Option<String>> {
    for reference in group.references {
        let source = reference.source;
        let Some(upstream) = value_at(payload, source.table, source.column).cloned() else {
            continue;
        };

        let local = store
            .find_id(reference.target, reference.lookup_column, &upstream)
            .with_context(|| format!("Failed to resolve {}.{}", source.table, source.column))?;

        let resolved = match local {
            Some(id) => SqlValue::Integer(id),
            None if options.ignore_unvalidated && reference.required => {
                return Ok(Some(format!(
                    "unresolved {} {} for {}.{}",
                    reference.target, upstream, source.table, source.column
                )));
            }
            None => {
                debug!(
                    table = reference.target,
                    value = %upstream,
                    "unknown reference, storing null"
                );
                SqlValue::Null
            }
        };

        if let Some(attrs) = payload.get_mut(source.table) {
            attrs.insert(source.column.to_string(), resolved);
        }
    }
    Ok(None)
}

fn create_group(uow: &UnitOfWork<'_>, group: &EntityGroup, payload: &ConversionResult) -> Result<i64> {
    let base_attrs = payload.get(group.base.name).cloned().unwrap_or_default();
    let id = uow.insert(group.base.name, &base_attrs)?;

    if let Some(spec) = &group.specialized {
        let mut attrs = payload.get(spec.table.name).cloned().unwrap_or_default();
        attrs.insert(spec.link_column.to_string(), SqlValue::Integer(id));
        uow.insert(spec.table.name, &attrs)?;
    }
    Ok(id)
}

fn update_group(
    uow: &UnitOfWork<'_>,
    group: &EntityGroup,
    id: i64,
    payload: &ConversionResult,
) -> Result<()> {
    if let Some(attrs) = payload.get(group.base.name) {
        uow.update(group.base.name, id, attrs)?;
    }

    if let Some(spec) = &group.specialized {
        let mut attrs: Attributes = payload.get(spec.table.name).cloned().unwrap_or_default();
        attrs.remove(spec.link_column);
        let link = SqlValue::Integer(id);

        if uow.find_id(spec.table.name, spec.link_column, &link)?.is_some() {
            uow.update_where(spec.table.name, spec.link_column, &link, &attrs)?;
        } else {
            attrs.insert(spec.link_column.to_string(), link);
            uow.insert(spec.table.name, &attrs)?;
        }
    }
    Ok(())
}
