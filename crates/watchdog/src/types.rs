//! Core types for the reconciliation engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Outcome of probing a single target.
///
/// The closed status vocabulary. Every probe resolves to one of these;
/// the prober never raises. The `Display` form is the persisted and
/// displayed wire string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    /// Target answered HTTP 200, or a raw TCP connect succeeded.
    Ok,
    /// Target answered with a non-200 HTTP status code.
    HttpStatus(u16),
    /// The HTTP request was aborted by its timeout.
    HttpTimeout,
    /// Any other HTTP transport failure.
    Unreachable,
    /// Raw TCP connect was refused or the host could not be resolved.
    TcpPortUnreachable,
    /// The TCP connect race was lost to its timeout.
    TcpTimeout,
    /// The target string was empty.
    InvalidUrl,
    /// The target string could not be parsed as a URL or host:port.
    InvalidUrlFormat,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Ok => write!(f, "OK: Status 200"),
            ProbeStatus::HttpStatus(code) => write!(f, "ERROR: Status {}", code),
            ProbeStatus::HttpTimeout => write!(f, "ERROR: HTTP Timeout"),
            ProbeStatus::Unreachable => write!(f, "ERROR: Unreachable"),
            ProbeStatus::TcpPortUnreachable => write!(f, "ERROR: TCP Port Unreachable"),
            ProbeStatus::TcpTimeout => write!(f, "ERROR: TCP Timeout"),
            ProbeStatus::InvalidUrl => write!(f, "INVALID_URL"),
            ProbeStatus::InvalidUrlFormat => write!(f, "INVALID_URL_FORMAT"),
        }
    }
}

/// Whether a persisted status string is OK-classified.
pub fn is_ok_status(status: &str) -> bool {
    status.starts_with("OK")
}

/// Whether a persisted status string is error-classified.
///
/// Classification is by string prefix: comparison and change detection
/// operate on the persisted string form, not on the enum.
pub fn is_error_status(status: &str) -> bool {
    status.starts_with("ERROR")
}

/// One monitored row, as read from the source sheet.
///
/// Cells are validated at the boundary: whitespace-only cells and
/// missing trailing columns both become `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredRow {
    /// Display name of the monitored target.
    pub name: Option<String>,
    /// Target endpoint (URL or bare host:port).
    pub url: Option<String>,
    /// Status column as currently shown in the sheet.
    pub stale_status: Option<String>,
    /// Timestamp column as currently shown in the sheet.
    pub stale_timestamp: Option<String>,
}

impl MonitoredRow {
    /// Build a row from raw sheet cells.
    pub fn from_cells(cells: &[String]) -> Self {
        fn cell(cells: &[String], idx: usize) -> Option<String> {
            cells
                .get(idx)
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_string)
        }

        Self {
            name: cell(cells, 0),
            url: cell(cells, 1),
            stale_status: cell(cells, 2),
            stale_timestamp: cell(cells, 3),
        }
    }

    /// The identifier used to track this target across passes: the
    /// name if present, else the URL.
    pub fn effective_key(&self) -> Option<&str> {
        self.name.as_deref().or(self.url.as_deref())
    }

    /// A row with both identifying fields empty signals the target is
    /// no longer monitored.
    pub fn is_deletion_marker(&self) -> bool {
        self.name.is_none() && self.url.is_none()
    }

    /// A row with a name but no URL: nothing to probe, skipped.
    pub fn is_inert(&self) -> bool {
        self.name.is_some() && self.url.is_none()
    }
}

/// Last-known state of one monitored target.
///
/// Replaced wholesale each pass; never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub status: String,
    pub last_update: String,
}

/// Mapping from effective key to last-known status for one collection.
pub type StatusMap = BTreeMap<String, StatusEntry>;

/// The durable snapshot for one collection, as serialized to the
/// key-value store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Deep link to the source collection, for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_url: Option<String>,

    /// Per-key last-known status.
    #[serde(default)]
    pub statuses: StatusMap,
}

/// Background color hint for a display cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorHint {
    White,
    Red,
}

/// One row whose state changed this pass.
///
/// Ephemeral: produced by the differ, consumed by the notifier and the
/// display sink within a single reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub key: String,
    pub url: String,
    pub previous_status: Option<String>,
    pub new_status: String,
    pub last_update: String,
    pub row_index: usize,
    pub notify: bool,
    pub color_hint: ColorHint,
    /// Deletion marker: blank out the display columns for this row
    /// position instead of writing a status.
    pub clear_columns: bool,
}

impl ChangeRecord {
    /// A record for a deletion-marker row: clears the display columns,
    /// never notifies.
    pub fn clear(row_index: usize) -> Self {
        Self {
            key: String::new(),
            url: String::new(),
            previous_status: None,
            new_status: String::new(),
            last_update: String::new(),
            row_index,
            notify: false,
            color_hint: ColorHint::White,
            clear_columns: true,
        }
    }
}

/// Result of diffing one pass's probe results against persisted state.
#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    /// Fresh per-key state for every probed row, always overwritten.
    pub current: StatusMap,
    /// Rows whose status string differs from the persisted one.
    pub changed: Vec<ChangeRecord>,
    /// Keys present in the previous snapshot but no longer in the row
    /// set: dropped from the merged state.
    pub removed_keys: BTreeSet<String>,
}

/// Handle for one monitored collection (e.g. a sheet tab).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Key under which this collection's state is persisted.
    pub state_key: String,
    /// Human-readable label, used in notifications.
    pub label: String,
    /// Deep link to the collection in its source system.
    pub link: Option<String>,
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Recovery,
}

/// Payload handed to the notifier collaborator for one state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub name: String,
    pub url: String,
    pub status: String,
    pub last_update: String,
    pub source_link: Option<String>,
    pub severity: Severity,
    pub collection_label: String,
    /// Urgent-mention flag; set per the configured escalation policy.
    pub escalate: bool,
}
