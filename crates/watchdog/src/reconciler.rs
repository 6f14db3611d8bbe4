//! One reconciliation pass: fetch rows, diff, notify, persist, update
//! the display.

use crate::differ::StatusDiffer;
use crate::types::{
    ChangeRecord, Collection, MonitoredRow, PersistedState, Severity, StatusEvent, is_error_status,
    is_ok_status,
};
use async_trait::async_trait;
use common::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of monitored rows for a collection, in source order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch_rows(&self, collection: &Collection) -> Result<Vec<MonitoredRow>>;
}

/// Durable key-value persistence for per-collection snapshots.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the snapshot for a key; `None` on first run.
    async fn load(&self, state_key: &str) -> Result<Option<PersistedState>>;

    /// Replace the snapshot for a key in one write.
    async fn store(&self, state_key: &str, state: &PersistedState) -> Result<()>;
}

/// Outbound notification channel for state changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification; delivery failure is an error to the
    /// caller, which applies the configured policy.
    async fn notify(&self, event: &StatusEvent) -> Result<()>;
}

/// Writes status/timestamp cells for changed rows only.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DisplaySink: Send + Sync {
    async fn write_status_cells(
        &self,
        collection: &Collection,
        changes: &[ChangeRecord],
    ) -> Result<()>;
}

/// What to do when notification delivery fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyFailurePolicy {
    /// Log the failure and keep dispatching (default).
    #[default]
    Lenient,
    /// Abort the pass; nothing is persisted.
    Fatal,
}

/// When the urgent-mention flag is set on an error notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationPolicy {
    /// Only on a fresh transition into an error state (default): a
    /// toggle between two error variants does not re-escalate.
    #[default]
    FirstErrorOnly,
    /// On every error notification.
    EveryError,
}

/// Policy knobs for a reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    pub notify_failure: NotifyFailurePolicy,
    pub escalation: EscalationPolicy,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            notify_failure: NotifyFailurePolicy::Lenient,
            escalation: EscalationPolicy::FirstErrorOnly,
        }
    }
}

/// Drives one pass per collection over the collaborators.
pub struct Reconciler {
    rows: Arc<dyn RowSource>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    display: Arc<dyn DisplaySink>,
    differ: StatusDiffer,
    policy: ReconcilePolicy,
}

impl Reconciler {
    pub fn new(
        rows: Arc<dyn RowSource>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        display: Arc<dyn DisplaySink>,
        differ: StatusDiffer,
        policy: ReconcilePolicy,
    ) -> Self {
        Self {
            rows,
            store,
            notifier,
            display,
            differ,
            policy,
        }
    }

    /// Run one reconciliation pass for a collection.
    ///
    /// Collaborator failures abort the pass and leave the persisted
    /// state untouched; an unchanged pass performs zero writes.
    pub async fn reconcile(&self, collection: &Collection) -> Result<Vec<ChangeRecord>> {
        let rows = self.rows.fetch_rows(collection).await?;
        if rows.is_empty() {
            debug!(collection = %collection.label, "no rows to reconcile");
            return Ok(Vec::new());
        }

        let previous = self
            .store
            .load(&collection.state_key)
            .await?
            .unwrap_or_default();

        let outcome = self.differ.diff(&rows, &previous.statuses).await;

        for record in outcome.changed.iter().filter(|r| r.notify) {
            let event = self.build_event(collection, record);
            if let Err(e) = self.notifier.notify(&event).await {
                match self.policy.notify_failure {
                    NotifyFailurePolicy::Fatal => return Err(e),
                    NotifyFailurePolicy::Lenient => {
                        warn!(key = %record.key, error = %e, "notification delivery failed")
                    }
                }
            }
        }

        let link_changed = previous.sheet_url != collection.link;
        let has_changes =
            !outcome.changed.is_empty() || !outcome.removed_keys.is_empty() || link_changed;
        if has_changes {
            let mut statuses = previous.statuses;
            for key in &outcome.removed_keys {
                statuses.remove(key);
            }
            statuses.extend(outcome.current.clone());
            let merged = PersistedState {
                sheet_url: collection.link.clone(),
                statuses,
            };
            self.store.store(&collection.state_key, &merged).await?;

            if !outcome.changed.is_empty() {
                self.display
                    .write_status_cells(collection, &outcome.changed)
                    .await?;
            }
            info!(
                collection = %collection.label,
                changed = outcome.changed.len(),
                removed = outcome.removed_keys.len(),
                "reconciliation pass persisted"
            );
        } else {
            debug!(collection = %collection.label, "no changes this pass");
        }

        Ok(outcome.changed)
    }

    fn build_event(&self, collection: &Collection, record: &ChangeRecord) -> StatusEvent {
        let severity = if is_ok_status(&record.new_status) {
            Severity::Recovery
        } else {
            Severity::Error
        };
        let was_error = record
            .previous_status
            .as_deref()
            .map(is_error_status)
            .unwrap_or(false);
        let escalate = severity == Severity::Error
            && match self.policy.escalation {
                EscalationPolicy::FirstErrorOnly => !was_error,
                EscalationPolicy::EveryError => true,
            };

        StatusEvent {
            name: record.key.clone(),
            url: record.url.clone(),
            status: record.new_status.clone(),
            last_update: record.last_update.clone(),
            source_link: collection.link.clone(),
            severity,
            collection_label: collection.label.clone(),
            escalate,
        }
    }
}
