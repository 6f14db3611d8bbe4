//! Assembles the collaborators and drives triggered runs.

use crate::config::Config;
use crate::notify::{LogNotifier, WebhookNotifier};
use crate::sheets::{SheetsClient, StaticTokenProvider};
use crate::store::FileStateStore;
use crate::types::{PassReport, RunSummary};
use async_trait::async_trait;
use common::{Error, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use watchdog::clock::now_jst;
use watchdog::{
    Collection, DisplaySink, LivenessProber, Notifier, Reconciler, RowSource, Severity,
    StatusDiffer, StatusEvent,
};

/// Something that can run one full pass over all collections. The HTTP
/// trigger endpoint only depends on this.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PassRunner: Send + Sync {
    async fn run_once(&self) -> Result<RunSummary>;
}

/// The assembled watchdog: Sheets row source/display sink, file-backed
/// state store, webhook notifier, and the reconciliation engine.
pub struct Watchdog {
    sheets: Arc<SheetsClient>,
    notifier: Arc<dyn Notifier>,
    reconciler: Reconciler,
    key_prefix: String,
    /// When the configured range pins a tab, only that tab is run.
    fixed_sheet: Option<String>,
}

impl Watchdog {
    /// Build the full collaborator graph from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.sheets.spreadsheet_id.is_empty() {
            return Err(Error::config("sheets.spreadsheet_id is required"));
        }
        let token = config
            .sheets
            .resolve_access_token()
            .ok_or_else(|| Error::credential("no Sheets access token configured"))?;

        let (fixed_sheet, cell_range) = config.sheets.split_range();
        let sheets = Arc::new(SheetsClient::new(
            config.sheets.api_base.clone(),
            config.sheets.spreadsheet_id.clone(),
            cell_range,
            Arc::new(StaticTokenProvider::new(token)),
            config.to_retry_policy(),
        )?);

        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => {
                warn!("no webhook configured, state changes will only be logged");
                Arc::new(LogNotifier)
            }
        };

        let prober = Arc::new(LivenessProber::new(config.to_probe_config())?);
        let differ = StatusDiffer::new(prober, config.probe.concurrency);
        let store = Arc::new(FileStateStore::new(config.state.dir.clone()));

        let reconciler = Reconciler::new(
            sheets.clone() as Arc<dyn RowSource>,
            store,
            notifier.clone(),
            sheets.clone() as Arc<dyn DisplaySink>,
            differ,
            config.to_reconcile_policy(),
        );

        Ok(Self {
            sheets,
            notifier,
            reconciler,
            key_prefix: config.state.key_prefix.clone(),
            fixed_sheet,
        })
    }

    /// The collections to reconcile this run: every tab of the
    /// spreadsheet, or just the pinned one.
    async fn collections(&self) -> Result<Vec<Collection>> {
        let mut sheets = self.sheets.sheet_metadata().await?;
        if let Some(title) = &self.fixed_sheet {
            sheets.retain(|sheet| &sheet.title == title);
            if sheets.is_empty() {
                return Err(Error::row_source(format!(
                    "sheet {title} not found in spreadsheet"
                )));
            }
        }
        Ok(sheets
            .into_iter()
            .map(|sheet| Collection {
                state_key: state_key(&self.key_prefix, &sheet.title),
                link: Some(self.sheets.sheet_link(sheet.sheet_id)),
                label: sheet.title,
            })
            .collect())
    }

    async fn run_pass(&self) -> Result<RunSummary> {
        let collections = self.collections().await?;
        let mut results = Vec::with_capacity(collections.len());
        for collection in &collections {
            let changed = self.reconciler.reconcile(collection).await?;
            results.push(PassReport {
                collection: collection.label.clone(),
                changed,
            });
        }
        info!(collections = results.len(), "health check pass complete");
        Ok(RunSummary {
            message: "Server health check complete.".to_string(),
            results,
        })
    }
}

#[async_trait]
impl PassRunner for Watchdog {
    async fn run_once(&self) -> Result<RunSummary> {
        let result = self.run_pass().await;
        if let Err(e) = &result {
            error!(error = %e, "health check pass failed");
            // Best-effort failure notice; the pass error is what gets
            // surfaced to the caller.
            if let Err(notify_err) = self.notifier.notify(&failure_event(e)).await {
                warn!(error = %notify_err, "failed to deliver failure notice");
            }
        }
        result
    }
}

fn state_key(prefix: &str, sheet_title: &str) -> String {
    format!("{prefix}_{sheet_title}")
}

fn failure_event(error: &Error) -> StatusEvent {
    StatusEvent {
        name: String::new(),
        url: String::new(),
        status: format!("An error occurred: {error}"),
        last_update: now_jst(),
        source_link: None,
        severity: Severity::Error,
        collection_label: String::new(),
        escalate: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_key() {
        assert_eq!(state_key("server_status", "Servers"), "server_status_Servers");
    }

    #[test]
    fn test_failure_event_shape() {
        let event = failure_event(&Error::row_source("quota exceeded"));
        assert_eq!(event.severity, Severity::Error);
        assert!(!event.escalate);
        assert!(event.status.starts_with("An error occurred:"));
        assert!(event.status.contains("quota exceeded"));
    }

    #[test]
    fn test_from_config_requires_spreadsheet_id() {
        let config = Config::default();
        assert!(matches!(
            Watchdog::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_config_requires_token() {
        let mut config = Config::default();
        config.sheets.spreadsheet_id = "doc".to_string();
        config.sheets.access_token = None;
        config.sheets.access_token_env = Some("SHEETWATCH_TEST_UNSET_TOKEN".to_string());
        assert!(matches!(
            Watchdog::from_config(&config),
            Err(Error::Credential(_))
        ));
    }

    #[test]
    fn test_from_config_builds_with_inline_token() {
        let mut config = Config::default();
        config.sheets.spreadsheet_id = "doc".to_string();
        config.sheets.access_token = Some("token".to_string());
        let watchdog = Watchdog::from_config(&config).unwrap();
        assert_eq!(watchdog.key_prefix, "server_status");
        assert!(watchdog.fixed_sheet.is_none());
    }
}
