//! Work Records
//!
//! RAII timing span around each tool operation. On drop the span writes a
//! `work_records` row with `{"duration_ms": n}` as its resource ledger.
//!
//! Usage:
//! ```ignore
//! let _work = WorkSpan::start(store.clone(), "verify", "Deductor");
//! // ... do work ...
//! ```

use crate::knowledge::KnowledgeStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A timing span that records itself when dropped
pub struct WorkSpan {
    store: Arc<KnowledgeStore>,
    method: String,
    performer: String,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl WorkSpan {
    /// Start a new span for a method
    pub fn start(store: Arc<KnowledgeStore>, method: &str, performer: &str) -> Self {
        Self {
            store,
            method: method.to_string(),
            performer: performer.to_string(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds so far
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for WorkSpan {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        let ledger = serde_json::json!({ "duration_ms": elapsed_ms }).to_string();
        let id = format!("work-{}", uuid::Uuid::new_v4());

        match self.store.record_work(
            &id,
            &self.method,
            &self.performer,
            self.started_at,
            Utc::now(),
            &ledger,
        ) {
            Ok(()) => debug!(method = %self.method, elapsed_ms, "work recorded"),
            Err(e) => warn!(method = %self.method, "Failed to record work: {}", e),
        }
    }
}
