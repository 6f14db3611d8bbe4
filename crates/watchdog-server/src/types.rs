//! Response types for the trigger endpoint.

use serde::Serialize;
use watchdog::ChangeRecord;

/// Summary of one triggered run over all monitored collections.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub message: String,
    pub results: Vec<PassReport>,
}

/// Result of one collection's reconciliation pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub collection: String,
    pub changed: Vec<ChangeRecord>,
}
