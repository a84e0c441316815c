//! Phase State Machine
//!
//! Checks are read-only. `can_transition` never mutates; the caller commits
//! an allowed move with `commit` and persists with `save`.

use super::anchor::validate_anchor;
use super::provider::{DerivedPhase, PersistedPhase, PhaseProvider};
use super::state::{EvidenceStub, Phase, Role, RoleAssignment, State};
use crate::knowledge::KnowledgeStore;
use crate::reliability::ReliabilityEngine;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Legal (from, to, role) moves
const TRANSITIONS: &[(Phase, Phase, Role)] = &[
    (Phase::Idle, Phase::Abduction, Role::Abductor),
    (Phase::Abduction, Phase::Deduction, Role::Deductor),
    (Phase::Deduction, Phase::Induction, Role::Inductor),
    (Phase::Induction, Phase::Deduction, Role::Deductor),
    (Phase::Induction, Phase::Audit, Role::Auditor),
    (Phase::Induction, Phase::Decision, Role::Decider),
    (Phase::Audit, Phase::Decision, Role::Decider),
    (Phase::Decision, Phase::Idle, Role::Decider),
    (Phase::Decision, Phase::Operation, Role::Decider),
];

/// Outcome of a transition check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionDecision {
    pub allowed: bool,
    /// "OK" or user-facing denial text
    pub reason: String,
}

impl TransitionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: "OK".to_string(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Whether a role may act within a phase
pub fn is_valid_role_for_phase(phase: Phase, role: &str) -> bool {
    let role = Role::parse(role);
    match phase {
        Phase::Idle => true,
        Phase::Abduction => role == Some(Role::Abductor),
        Phase::Deduction => role == Some(Role::Deductor),
        Phase::Induction => role == Some(Role::Inductor),
        Phase::Audit => role == Some(Role::Auditor),
        Phase::Decision => matches!(role, Some(Role::Decider) | Some(Role::Auditor)),
        Phase::Operation => role == Some(Role::Decider),
    }
}

/// Lifecycle state plus the strategy used to read the current phase
pub struct PhaseMachine {
    state: State,
    store: Option<Arc<KnowledgeStore>>,
    provider: Box<dyn PhaseProvider>,
}

impl PhaseMachine {
    /// Build over a loaded state. With a store, phase is derived from it.
    pub fn new(state: State, store: Option<Arc<KnowledgeStore>>, context_id: &str) -> Self {
        let provider: Box<dyn PhaseProvider> = match &store {
            Some(store) => Box::new(DerivedPhase::new(store.clone(), context_id)),
            None => Box::new(PersistedPhase),
        };
        Self {
            state,
            store,
            provider,
        }
    }

    /// Load `state.json` (missing file means IDLE)
    pub fn load(path: &Path, store: Option<Arc<KnowledgeStore>>, context_id: &str) -> Result<Self> {
        let state = State::load(path)?;
        Ok(Self::new(state, store, context_id))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.state.save(path)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn phase(&self) -> Phase {
        self.provider.current_phase(&self.state)
    }

    pub fn assurance_threshold(&self) -> f64 {
        self.state.effective_threshold()
    }

    /// Record a phase directly (bookkeeping by tools, not a gated move)
    pub fn set_phase(&mut self, phase: Phase) {
        self.state.phase = phase;
    }

    /// Apply an allowed transition to in-memory state
    pub fn commit(&mut self, target: Phase, assignment: &RoleAssignment) {
        info!(from = %self.state.phase, to = %target, role = %assignment.role, "phase transition");
        self.state.phase = target;
        self.state.active_role = assignment.clone();
    }

    /// Gate a move to `target`
    pub fn can_transition(
        &self,
        target: Phase,
        assignment: &RoleAssignment,
        evidence: Option<&EvidenceStub>,
    ) -> TransitionDecision {
        if assignment.role.is_empty() {
            return TransitionDecision::deny("Role is required");
        }

        let current = self.phase();

        if current == target {
            if is_valid_role_for_phase(current, &assignment.role) {
                return TransitionDecision::allow();
            }
            return TransitionDecision::deny(format!(
                "Role {} is not active in {} phase",
                assignment.role, current
            ));
        }

        let role = Role::parse(&assignment.role);
        let legal = TRANSITIONS
            .iter()
            .any(|(from, to, required)| *from == current && *to == target && Some(*required) == role);
        if !legal {
            return TransitionDecision::deny(format!(
                "Invalid transition: {} -> {} by {}",
                current, target, assignment.role
            ));
        }

        if !validate_anchor(target, evidence) {
            return TransitionDecision::deny(format!(
                "Transition to {} requires valid Evidence Anchor (A.10) from {}",
                target, current
            ));
        }

        if target == Phase::Operation {
            return self.assurance_guard(evidence);
        }

        debug!(from = %current, to = %target, "transition allowed");
        TransitionDecision::allow()
    }

    fn assurance_guard(&self, evidence: Option<&EvidenceStub>) -> TransitionDecision {
        let holon_id = match evidence.and_then(|e| e.holon_id.as_deref()) {
            Some(id) if !id.is_empty() => id,
            _ => {
                return TransitionDecision::deny(
                    "Transition to Operation requires a specific Holon ID in evidence stub",
                )
            }
        };

        let store = match &self.store {
            Some(store) => store,
            None => {
                return TransitionDecision::deny(
                    "Failed to calculate assurance: no knowledge store attached",
                )
            }
        };

        let report = match ReliabilityEngine::new(store).calculate_reliability(holon_id) {
            Ok(report) => report,
            Err(e) => {
                return TransitionDecision::deny(format!("Failed to calculate assurance: {}", e))
            }
        };

        let threshold = self.assurance_threshold();
        if report.final_score < threshold {
            return TransitionDecision::deny(format!(
                "Transition Denied: Reliability ({:.2}) is below threshold ({:.2}). Weakest link: {}",
                report.final_score,
                threshold,
                report.weakest_link_label()
            ));
        }
        TransitionDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn machine_in(phase: Phase) -> PhaseMachine {
        let state = State {
            phase,
            ..Default::default()
        };
        PhaseMachine::new(state, None, "default")
    }

    fn stub(uri: &str) -> EvidenceStub {
        EvidenceStub {
            evidence_type: "file".to_string(),
            uri: uri.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_role_required() {
        let machine = machine_in(Phase::Idle);
        let decision = machine.can_transition(Phase::Abduction, &RoleAssignment::default(), None);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, "Role is required");
    }

    #[test]
    fn test_self_loop_role_check() {
        let machine = machine_in(Phase::Deduction);
        let ok = machine.can_transition(
            Phase::Deduction,
            &RoleAssignment::new(Role::Deductor),
            None,
        );
        assert!(ok.allowed);
        assert_eq!(ok.reason, "OK");

        let denied = machine.can_transition(
            Phase::Deduction,
            &RoleAssignment::new(Role::Inductor),
            None,
        );
        assert_eq!(denied.reason, "Role Inductor is not active in DEDUCTION phase");
    }

    #[test]
    fn test_decision_accepts_auditor_loop() {
        let machine = machine_in(Phase::Decision);
        assert!(machine
            .can_transition(Phase::Decision, &RoleAssignment::new(Role::Auditor), None)
            .allowed);
        assert!(!machine
            .can_transition(Phase::Operation, &RoleAssignment::new(Role::Auditor), None)
            .allowed);
    }

    #[test]
    fn test_table_miss_is_denied() {
        let machine = machine_in(Phase::Idle);
        let decision = machine.can_transition(
            Phase::Audit,
            &RoleAssignment::new(Role::Auditor),
            Some(&stub("x")),
        );
        assert_eq!(decision.reason, "Invalid transition: IDLE -> AUDIT by Auditor");

        let wrong_role = machine.can_transition(
            Phase::Abduction,
            &RoleAssignment::new(Role::Decider),
            Some(&stub("x")),
        );
        assert!(!wrong_role.allowed);
    }

    #[test]
    fn test_anchor_required() {
        let machine = machine_in(Phase::Idle);
        let role = RoleAssignment::new(Role::Abductor);
        let denied = machine.can_transition(Phase::Abduction, &role, None);
        assert_eq!(
            denied.reason,
            "Transition to ABDUCTION requires valid Evidence Anchor (A.10) from IDLE"
        );
        assert!(machine
            .can_transition(Phase::Abduction, &role, Some(&stub("notes/brainstorm.md")))
            .allowed);
    }

    #[test]
    fn test_induction_anchor_needs_l1_file() {
        let dir = tempdir().unwrap();
        let l1 = dir.path().join(".assay/knowledge/L1");
        fs::create_dir_all(&l1).unwrap();
        let file = l1.join("h.md");
        fs::write(&file, "body").unwrap();

        let machine = machine_in(Phase::Deduction);
        let role = RoleAssignment::new(Role::Inductor);
        assert!(machine
            .can_transition(Phase::Induction, &role, Some(&stub(&file.to_string_lossy())))
            .allowed);
        assert!(!machine
            .can_transition(Phase::Induction, &role, Some(&stub("knowledge/L0/h.md")))
            .allowed);
    }

    #[test]
    fn test_operation_needs_holon_id() {
        let machine = machine_in(Phase::Decision);
        let decision = machine.can_transition(
            Phase::Operation,
            &RoleAssignment::new(Role::Decider),
            Some(&stub("decisions/DRR.md")),
        );
        assert_eq!(
            decision.reason,
            "Transition to Operation requires a specific Holon ID in evidence stub"
        );
    }

    #[test]
    fn test_commit_updates_state() {
        let mut machine = machine_in(Phase::Idle);
        let role = RoleAssignment::new(Role::Abductor).with_session("s-1");
        machine.commit(Phase::Abduction, &role);
        assert_eq!(machine.phase(), Phase::Abduction);
        assert_eq!(machine.state().active_role.session_id, "s-1");
    }

    #[test]
    fn test_threshold_default() {
        let machine = machine_in(Phase::Idle);
        assert_eq!(machine.assurance_threshold(), 0.8);
    }
}
