//! History and status sinks the swap loop reports into.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::models::{BotStatus, HistoryEntry, SwapOutcome, SwapResult};

/// Append-only trade history. Entries are never touched once recorded.
pub trait HistorySink: Send + Sync {
    /// Called right after a swap transaction is accepted by the node.
    fn record_submitted(&self, entry: &HistoryEntry);

    /// Called once the submitted transaction confirmed or failed.
    fn record_result(&self, result: &SwapResult);
}

pub trait StatusSink: Send + Sync {
    fn publish(&self, status: BotStatus);
}

/// In-process history, handy for tests and one-shot commands.
#[derive(Debug, Default, Clone)]
pub struct MemoryHistory {
    submitted: Arc<Mutex<Vec<HistoryEntry>>>,
    results: Arc<Mutex<Vec<SwapResult>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> Vec<HistoryEntry> {
        self.submitted.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn results(&self) -> Vec<SwapResult> {
        self.results.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl HistorySink for MemoryHistory {
    fn record_submitted(&self, entry: &HistoryEntry) {
        if let Ok(mut v) = self.submitted.lock() {
            v.push(entry.clone());
        }
    }

    fn record_result(&self, result: &SwapResult) {
        if let Ok(mut v) = self.results.lock() {
            v.push(result.clone());
        }
    }
}

/// Writes every history record as a JSON log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHistory;

impl HistorySink for TracingHistory {
    fn record_submitted(&self, entry: &HistoryEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => info!(target: "history", entry = %json, "[HISTORY] submitted"),
            Err(e) => warn!(error = %e, "[HISTORY] failed to encode entry"),
        }
    }

    fn record_result(&self, result: &SwapResult) {
        let json = match serde_json::to_string(result) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "[HISTORY] failed to encode result");
                return;
            }
        };
        match result.outcome {
            SwapOutcome::Confirmed { .. } => {
                info!(target: "history", result = %json, "[HISTORY] settled")
            }
            SwapOutcome::Failed { .. } => {
                warn!(target: "history", result = %json, "[HISTORY] settled")
            }
        }
    }
}

impl StatusSink for watch::Sender<BotStatus> {
    fn publish(&self, status: BotStatus) {
        self.send_replace(status);
    }
}

impl StatusSink for mpsc::UnboundedSender<BotStatus> {
    fn publish(&self, status: BotStatus) {
        let _ = self.send(status);
    }
}
