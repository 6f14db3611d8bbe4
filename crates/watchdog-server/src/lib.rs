//! Sheetwatch Server Watchdog
//!
//! Monitors servers listed in a Google Sheets spreadsheet: each sheet in
//! the document is an independent collection of `(name, url)` rows. A pass
//! probes every row over HTTP or raw TCP, diffs results against the
//! previously persisted snapshot, notifies a Slack webhook on changes,
//! writes status and timestamp cells back to the sheet, and persists the
//! new snapshot.
//!
//! # Components
//!
//! - **SheetsClient**: reads rows and writes status cells via the Sheets API
//! - **FileStateStore**: JSON snapshots on local disk
//! - **WebhookNotifier**: Slack Block Kit payloads to an incoming webhook
//! - **Watchdog**: assembles the above into a `PassRunner`
//! - **TriggerServer**: HTTP endpoint that runs a pass on demand

pub mod config;
pub mod http_server;
pub mod notify;
pub mod runner;
pub mod sheets;
pub mod store;
pub mod types;

pub use config::{Config, ConfigError};
pub use http_server::TriggerServer;
pub use notify::{LogNotifier, WebhookNotifier};
pub use runner::{PassRunner, Watchdog};
pub use sheets::{SheetsClient, StaticTokenProvider, TokenProvider};
pub use store::FileStateStore;
pub use types::{PassReport, RunSummary};
