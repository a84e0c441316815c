//! Phase providers
//!
//! Two read paths for the current phase. The persisted one trusts
//! `state.json`; the derived one reads the knowledge store so independent
//! agents agree on phase from shared data.

use super::state::{Phase, State};
use crate::knowledge::KnowledgeStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// Strategy for reading the current phase
pub trait PhaseProvider: Send + Sync {
    fn current_phase(&self, state: &State) -> Phase;

    /// Short label for status output
    fn name(&self) -> &'static str;
}

/// Phase as last written to `state.json`
pub struct PersistedPhase;

impl PhaseProvider for PersistedPhase {
    fn current_phase(&self, state: &State) -> Phase {
        state.phase
    }

    fn name(&self) -> &'static str {
        "persisted"
    }
}

/// Phase derived from holon layers in one bounded context
pub struct DerivedPhase {
    store: Arc<KnowledgeStore>,
    context_id: String,
}

impl DerivedPhase {
    pub fn new(store: Arc<KnowledgeStore>, context_id: &str) -> Self {
        Self {
            store,
            context_id: context_id.to_string(),
        }
    }

    /// Derivation over layer counts and the most recently touched holon
    pub fn derive(&self) -> Result<Phase> {
        let counts = self.store.count_holons_by_layer(&self.context_id)?;
        let count = |layer: &str| counts.get(layer).copied().unwrap_or(0);
        let (l0, l1, l2, drr) = (count("L0"), count("L1"), count("L2"), count("DRR"));

        if l0 == 0 && l1 == 0 && l2 == 0 && drr == 0 {
            return Ok(Phase::Idle);
        }

        let latest = match self.store.latest_holon_layer(&self.context_id)? {
            Some(layer) => layer,
            None => return Ok(Phase::Idle),
        };

        let phase = match latest.as_str() {
            "L0" => Phase::Abduction,
            "L1" if l2 == 0 => Phase::Deduction,
            "L1" | "L2" => Phase::Induction,
            "DRR" => Phase::Decision,
            _ if l2 > 0 => Phase::Audit,
            _ if l1 > 0 => Phase::Deduction,
            _ => Phase::Abduction,
        };
        Ok(phase)
    }
}

impl PhaseProvider for DerivedPhase {
    fn current_phase(&self, _state: &State) -> Phase {
        match self.derive() {
            Ok(phase) => phase,
            Err(e) => {
                warn!(context = %self.context_id, "Phase derivation failed, reporting IDLE: {}", e);
                Phase::Idle
            }
        }
    }

    fn name(&self) -> &'static str {
        "derived"
    }
}
