use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::convert::ConversionResult;

/// What integration did, or would do under a dry run, with one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Skipped,
    WouldCreate,
    WouldUpdate,
    WouldSkip,
    Failed,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Skipped => "skipped",
            Action::WouldCreate => "would_create",
            Action::WouldUpdate => "would_update",
            Action::WouldSkip => "would_skip",
            Action::Failed => "failed",
        }
    }

    /// True for actions that changed (or would change) stored rows
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Action::Created | Action::Updated | Action::WouldCreate | Action::WouldUpdate
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrateOptions {
    /// Report what would happen without writing
    pub dry_run: bool,
    /// Update rows that already exist instead of skipping them
    pub force_update: bool,
    /// Skip the whole record when a required reference does not resolve
    pub ignore_unvalidated: bool,
    /// Fields never written on update, in any table of the group
    pub exclude_from_update: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationOutcome {
    /// Base row id, when one exists or was created
    pub entity_id: Option<i64>,
    pub action: Action,
    pub message: Option<String>,
    /// Attributes written, or that would be written
    pub payload: ConversionResult,
}

impl IntegrationOutcome {
    pub fn new(action: Action, entity_id: Option<i64>, payload: ConversionResult) -> Self {
        Self {
            entity_id,
            action,
            message: None,
            payload,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn failed(message: impl Into<String>, payload: ConversionResult) -> Self {
        Self::new(Action::Failed, None, payload).with_message(message)
    }
}
