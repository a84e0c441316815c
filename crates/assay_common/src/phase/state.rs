//! Phase, role and persisted state types

use crate::paths::atomic_write_str;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Threshold used when none (or a non-positive one) is configured
pub const DEFAULT_ASSURANCE_THRESHOLD: f64 = 0.8;

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    #[default]
    Idle,
    Abduction,
    Deduction,
    Induction,
    Audit,
    Decision,
    Operation,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Abduction => "ABDUCTION",
            Phase::Deduction => "DEDUCTION",
            Phase::Induction => "INDUCTION",
            Phase::Audit => "AUDIT",
            Phase::Decision => "DECISION",
            Phase::Operation => "OPERATION",
        }
    }

    /// Case-insensitive parse
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IDLE" => Some(Phase::Idle),
            "ABDUCTION" => Some(Phase::Abduction),
            "DEDUCTION" => Some(Phase::Deduction),
            "INDUCTION" => Some(Phase::Induction),
            "AUDIT" => Some(Phase::Audit),
            "DECISION" => Some(Phase::Decision),
            "OPERATION" => Some(Phase::Operation),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasoning role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Abductor,
    Deductor,
    Inductor,
    Auditor,
    Decider,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Abductor => "Abductor",
            Role::Deductor => "Deductor",
            Role::Inductor => "Inductor",
            Role::Auditor => "Auditor",
            Role::Decider => "Decider",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Abductor" => Some(Role::Abductor),
            "Deductor" => Some(Role::Deductor),
            "Inductor" => Some(Role::Inductor),
            "Auditor" => Some(Role::Auditor),
            "Decider" => Some(Role::Decider),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is acting. `role` stays a string so unknown roles reach the
/// machine and are denied there with a readable reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub context: String,
}

impl RoleAssignment {
    pub fn new(role: Role) -> Self {
        Self {
            role: role.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }
}

/// Artifact reference accompanying a transition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceStub {
    #[serde(rename = "type", default)]
    pub evidence_type: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holon_id: Option<String>,
}

/// Persisted per-project phase state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub active_role: RoleAssignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    #[serde(default)]
    pub assurance_threshold: f64,
}

impl State {
    /// Load from disk; a missing file is a fresh IDLE state
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state {}", path.display()))?;
        let state = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse state {}", path.display()))?;
        Ok(state)
    }

    /// Pretty JSON, written atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        atomic_write_str(path, &data)
            .with_context(|| format!("Failed to write state {}", path.display()))?;
        Ok(())
    }

    /// Configured threshold, falling back to the default when unset
    pub fn effective_threshold(&self) -> f64 {
        if self.assurance_threshold <= 0.0 {
            DEFAULT_ASSURANCE_THRESHOLD
        } else {
            self.assurance_threshold
        }
    }
}
