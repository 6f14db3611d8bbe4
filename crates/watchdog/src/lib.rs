//! Liveness reconciliation engine for sheet-driven monitoring.
//!
//! Given a batch of monitored rows (name, URL), this crate probes each
//! target's liveness over HTTP(S) or raw TCP, diffs the results
//! against the previously persisted per-key state, and decides which
//! rows need a notification, a display rewrite, and what merged
//! snapshot to persist.
//!
//! External collaborators (row source, key-value persistence, webhook
//! notifier, display sink) are narrow async traits implemented by the
//! server crate.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use watchdog::{
//!     Collection, LivenessProber, ProbeConfig, ReconcilePolicy, Reconciler, StatusDiffer,
//! };
//!
//! # async fn example(
//! #     rows: Arc<dyn watchdog::RowSource>,
//! #     store: Arc<dyn watchdog::StateStore>,
//! #     notifier: Arc<dyn watchdog::Notifier>,
//! #     display: Arc<dyn watchdog::DisplaySink>,
//! # ) -> common::Result<()> {
//! let prober = Arc::new(LivenessProber::new(ProbeConfig::default())?);
//! let differ = StatusDiffer::new(prober, 16);
//! let reconciler = Reconciler::new(
//!     rows,
//!     store,
//!     notifier,
//!     display,
//!     differ,
//!     ReconcilePolicy::default(),
//! );
//!
//! let collection = Collection {
//!     state_key: "server_status_Sheet1".to_string(),
//!     label: "Sheet1".to_string(),
//!     link: None,
//! };
//! let changed = reconciler.reconcile(&collection).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod differ;
pub mod prober;
pub mod reconciler;
pub mod retry;
pub mod types;

pub use differ::{DEFAULT_CONCURRENCY, StatusDiffer};
pub use prober::{LivenessProber, ProbeConfig, Prober};
pub use reconciler::{
    DisplaySink, EscalationPolicy, Notifier, NotifyFailurePolicy, ReconcilePolicy, Reconciler,
    RowSource, StateStore,
};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use types::{
    ChangeRecord, Collection, ColorHint, DiffOutcome, MonitoredRow, PersistedState, ProbeStatus,
    Severity, StatusEntry, StatusEvent, StatusMap, is_error_status, is_ok_status,
};
