//! Audit Log v0.4.0
//!
//! Structured audit trail for every tool call and integrity event.
//! Rows land in the `audit_log` table of the knowledge store.
//!
//! Writing is best-effort: a failed insert is logged and swallowed so the
//! bookkeeping never blocks the workflow it records.

use crate::knowledge::KnowledgeStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Audit result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditResult {
    Success,
    Error,
    Blocked,
    /// Integrity event worth an operator's attention
    Alert,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Success => "SUCCESS",
            AuditResult::Error => "ERROR",
            AuditResult::Blocked => "BLOCKED",
            AuditResult::Alert => "ALERT",
        }
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    pub operation: String,
    /// Role or subsystem that acted
    pub actor: String,
    pub target_id: Option<String>,
    /// Short hash of the serialised input
    pub input_hash: Option<String>,
    pub result: AuditResult,
    pub details: Option<String>,
    pub context_id: String,
}

impl AuditEntry {
    /// Create a new audit entry
    pub fn new(tool_name: &str, operation: &str, result: AuditResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            operation: operation.to_string(),
            actor: "agent".to_string(),
            target_id: None,
            input_hash: None,
            result,
            details: None,
            context_id: crate::knowledge::DEFAULT_CONTEXT_ID.to_string(),
        }
    }

    /// Set actor
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    /// Set target holon / file
    pub fn with_target(mut self, target_id: &str) -> Self {
        self.target_id = Some(target_id.to_string());
        self
    }

    /// Hash the tool input
    pub fn with_input<T: Serialize>(mut self, input: &T) -> Self {
        self.input_hash = Some(hash_input(input));
        self
    }

    /// Set details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Set bounded context
    pub fn with_context(mut self, context_id: &str) -> Self {
        self.context_id = context_id.to_string();
        self
    }
}

/// First 8 bytes of SHA-256 over the JSON form, hex encoded
pub fn hash_input<T: Serialize>(input: &T) -> String {
    let json = serde_json::to_vec(input).unwrap_or_default();
    let digest = Sha256::digest(&json);
    hex::encode(&digest[..8])
}

/// Best-effort write; failures only reach the log
pub fn record(store: &KnowledgeStore, entry: &AuditEntry) {
    if let Err(e) = store.insert_audit_log(entry) {
        warn!(
            tool = %entry.tool_name,
            operation = %entry.operation,
            "Failed to write audit log: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builder_sets_fields() {
        let entry = AuditEntry::new("assay_verify", "verify", AuditResult::Success)
            .with_actor("Deductor")
            .with_target("redis-cache")
            .with_details("promoted to L1");

        assert_eq!(entry.actor, "Deductor");
        assert_eq!(entry.target_id.as_deref(), Some("redis-cache"));
        assert_eq!(entry.result.as_str(), "SUCCESS");
    }

    #[test]
    fn test_input_hash_is_short_and_stable() {
        let input = serde_json::json!({"holon_id": "x", "verdict": "PASS"});
        let a = hash_input(&input);
        let b = hash_input(&input);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, hash_input(&serde_json::json!({"holon_id": "y"})));
    }

    #[test]
    fn test_record_persists_row() {
        let dir = tempdir().unwrap();
        let store = KnowledgeStore::open(&dir.path().join("a.db")).unwrap();
        let entry = AuditEntry::new("integrity", "tampering_detected", AuditResult::Alert)
            .with_target("knowledge/L0/x.md");
        record(&store, &entry);

        let rows = store.audit_entries_for("knowledge/L0/x.md").unwrap();
        assert_eq!(
            rows,
            vec![("tampering_detected".to_string(), "ALERT".to_string())]
        );
    }
}
