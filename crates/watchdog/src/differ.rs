//! State diffing: probe results vs. persisted per-key state.

use crate::clock::now_jst;
use crate::prober::Prober;
use crate::types::{
    ChangeRecord, ColorHint, DiffOutcome, MonitoredRow, ProbeStatus, StatusEntry, StatusMap,
    is_ok_status,
};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

/// Default bound on concurrent probes per pass.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Computes, for one pass, which keys changed, which were removed and
/// the fresh state to persist.
pub struct StatusDiffer {
    prober: Arc<dyn Prober>,
    concurrency: usize,
}

impl StatusDiffer {
    /// Create a new differ with the given probe fan-out bound.
    pub fn new(prober: Arc<dyn Prober>, concurrency: usize) -> Self {
        Self {
            prober,
            concurrency: concurrency.max(1),
        }
    }

    /// Probe every usable row concurrently and diff the results
    /// against the previously persisted state.
    ///
    /// Rules per row:
    /// - deletion marker (name and URL both empty): a clear-columns
    ///   record, no state entry;
    /// - no effective key: skipped entirely;
    /// - inert (name without URL): skipped, but its key stays live so
    ///   a previously persisted entry survives;
    /// - otherwise: probed, and `current[key]` is always overwritten.
    ///
    /// A key changes when its status *string* differs from the
    /// persisted one; a toggle between two error variants is a change.
    pub async fn diff(&self, rows: &[MonitoredRow], previous: &StatusMap) -> DiffOutcome {
        let mut outcome = DiffOutcome::default();
        let mut live_keys: BTreeSet<String> = BTreeSet::new();
        let mut jobs: Vec<(usize, String, String)> = Vec::new();

        for (index, row) in rows.iter().enumerate() {
            if row.is_deletion_marker() {
                outcome.changed.push(ChangeRecord::clear(index));
                continue;
            }
            let Some(key) = row.effective_key() else {
                continue;
            };
            live_keys.insert(key.to_string());
            if row.is_inert() {
                continue;
            }
            let url = row.url.clone().unwrap_or_default();
            jobs.push((index, key.to_string(), url));
        }

        // Fire all probes with a bounded fan-out and await them all.
        // The prober is infallible by contract; a panicking
        // implementation settles its own row as unreachable instead of
        // aborting the batch.
        let prober = &self.prober;
        let mut results: Vec<(usize, String, String, ProbeStatus)> =
            stream::iter(jobs.into_iter().map(|(index, key, url)| async move {
                let status = AssertUnwindSafe(prober.probe(&url))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        warn!(target = %url, "probe panicked");
                        ProbeStatus::Unreachable
                    });
                (index, key, url, status)
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(index, ..)| *index);

        for (index, key, url, status) in results {
            let new_status = status.to_string();
            let last_update = now_jst();
            outcome.current.insert(
                key.clone(),
                StatusEntry {
                    status: new_status.clone(),
                    last_update: last_update.clone(),
                },
            );

            let previous_status = previous.get(&key).map(|entry| entry.status.clone());
            if previous_status.as_deref() == Some(new_status.as_str()) {
                continue;
            }
            let color_hint = if is_ok_status(&new_status) {
                ColorHint::White
            } else {
                ColorHint::Red
            };
            outcome.changed.push(ChangeRecord {
                key,
                url,
                previous_status,
                new_status,
                last_update,
                row_index: index,
                notify: true,
                color_hint,
                clear_columns: false,
            });
        }
        outcome.changed.sort_by_key(|record| record.row_index);

        // Keys that vanished from the row set entirely are dropped
        // from the merged snapshot; no tombstones are persisted.
        for key in previous.keys() {
            if !live_keys.contains(key) {
                outcome.removed_keys.insert(key.clone());
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::MockProber;

    fn row(name: &str, url: &str) -> MonitoredRow {
        MonitoredRow {
            name: (!name.is_empty()).then(|| name.to_string()),
            url: (!url.is_empty()).then(|| url.to_string()),
            stale_status: None,
            stale_timestamp: None,
        }
    }

    fn entry(status: &str) -> StatusEntry {
        StatusEntry {
            status: status.to_string(),
            last_update: "2024-01-01 00:00:00 UTC+0900 (JST)".to_string(),
        }
    }

    fn scripted(script: fn(&str) -> ProbeStatus) -> StatusDiffer {
        let mut prober = MockProber::new();
        prober.expect_probe().returning(move |target| script(target));
        StatusDiffer::new(Arc::new(prober), DEFAULT_CONCURRENCY)
    }

    #[tokio::test]
    async fn test_first_pass_emits_change() {
        let differ = scripted(|_| ProbeStatus::Ok);
        let rows = vec![row("Server1", "https://a.com")];

        let outcome = differ.diff(&rows, &StatusMap::new()).await;

        assert_eq!(outcome.current["Server1"].status, "OK: Status 200");
        assert_eq!(outcome.changed.len(), 1);
        let change = &outcome.changed[0];
        assert_eq!(change.key, "Server1");
        assert_eq!(change.url, "https://a.com");
        assert!(change.notify);
        assert_eq!(change.color_hint, ColorHint::White);
        assert!(change.previous_status.is_none());
        assert!(outcome.removed_keys.is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_status_is_suppressed() {
        let differ = scripted(|_| ProbeStatus::Ok);
        let rows = vec![row("Server1", "https://a.com")];
        let mut previous = StatusMap::new();
        previous.insert("Server1".to_string(), entry("OK: Status 200"));

        let outcome = differ.diff(&rows, &previous).await;

        // State is still overwritten wholesale, but nothing changed.
        assert_eq!(outcome.current["Server1"].status, "OK: Status 200");
        assert!(outcome.changed.is_empty());
    }

    #[tokio::test]
    async fn test_error_to_error_toggle_is_a_change() {
        let differ = scripted(|_| ProbeStatus::HttpStatus(503));
        let rows = vec![row("Server1", "https://a.com")];
        let mut previous = StatusMap::new();
        previous.insert("Server1".to_string(), entry("ERROR: Status 500"));

        let outcome = differ.diff(&rows, &previous).await;

        assert_eq!(outcome.changed.len(), 1);
        let change = &outcome.changed[0];
        assert_eq!(change.new_status, "ERROR: Status 503");
        assert_eq!(change.previous_status.as_deref(), Some("ERROR: Status 500"));
        assert_eq!(change.color_hint, ColorHint::Red);
    }

    #[tokio::test]
    async fn test_url_only_row_keys_on_url() {
        let differ = scripted(|_| ProbeStatus::Ok);
        let rows = vec![row("", "https://c.com")];

        let outcome = differ.diff(&rows, &StatusMap::new()).await;

        assert!(outcome.current.contains_key("https://c.com"));
    }

    #[tokio::test]
    async fn test_deletion_marker_produces_clear_record() {
        let differ = scripted(|_| ProbeStatus::Ok);
        let rows = vec![row("", "")];

        let outcome = differ.diff(&rows, &StatusMap::new()).await;

        assert!(outcome.current.is_empty());
        assert!(outcome.removed_keys.is_empty());
        assert_eq!(outcome.changed.len(), 1);
        assert!(outcome.changed[0].clear_columns);
        assert!(!outcome.changed[0].notify);
    }

    #[tokio::test]
    async fn test_inert_row_keeps_previous_entry_alive() {
        let differ = scripted(|_| ProbeStatus::Ok);
        let rows = vec![row("Server5", "")];
        let mut previous = StatusMap::new();
        previous.insert("Server5".to_string(), entry("OK: Status 200"));

        let outcome = differ.diff(&rows, &previous).await;

        // Nothing probed, no entry produced, but the key is not
        // treated as removed.
        assert!(outcome.current.is_empty());
        assert!(outcome.changed.is_empty());
        assert!(outcome.removed_keys.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_key_is_removed() {
        let differ = scripted(|_| ProbeStatus::Ok);
        let rows = vec![row("Server1", "https://a.com")];
        let mut previous = StatusMap::new();
        previous.insert("Server1".to_string(), entry("OK: Status 200"));
        previous.insert("Retired".to_string(), entry("ERROR: Unreachable"));

        let outcome = differ.diff(&rows, &previous).await;

        assert_eq!(outcome.removed_keys.len(), 1);
        assert!(outcome.removed_keys.contains("Retired"));
    }

    #[tokio::test]
    async fn test_changes_are_in_row_order() {
        let differ = scripted(|target| {
            if target.contains("b.com") {
                ProbeStatus::HttpStatus(500)
            } else {
                ProbeStatus::Ok
            }
        });
        let rows = vec![
            row("A", "https://a.com"),
            row("", ""),
            row("B", "https://b.com"),
        ];

        let outcome = differ.diff(&rows, &StatusMap::new()).await;

        let indices: Vec<usize> = outcome.changed.iter().map(|c| c.row_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_panicking_prober_settles_as_unreachable() {
        let mut prober = MockProber::new();
        prober
            .expect_probe()
            .returning(|target| -> ProbeStatus { panic!("probe blew up on {target}") });
        let differ = StatusDiffer::new(Arc::new(prober), 2);
        let rows = vec![row("Server1", "https://a.com")];

        let outcome = differ.diff(&rows, &StatusMap::new()).await;

        assert_eq!(outcome.current["Server1"].status, "ERROR: Unreachable");
    }
}
