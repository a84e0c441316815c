//! Gated phase transitions

use super::Tools;
use crate::audit_log::AuditResult;
use crate::error::{ToolError, ToolResult};
use crate::phase::{EvidenceStub, Phase, RoleAssignment};
use tracing::info;

impl Tools {
    /// Ask the state machine for a move; on success persist phase and role
    pub fn transition(
        &mut self,
        target: &str,
        assignment: RoleAssignment,
        evidence: Option<EvidenceStub>,
    ) -> ToolResult<String> {
        let _work = self.work("transition");

        let target_phase = Phase::parse(target)
            .ok_or_else(|| ToolError::InvalidArgument(format!("unknown phase: {}", target)))?;

        let input = serde_json::json!({
            "target": target_phase.as_str(),
            "role": assignment.role,
            "evidence": evidence,
        });
        let from = self.machine.phase();
        let decision = self
            .machine
            .can_transition(target_phase, &assignment, evidence.as_ref());

        if !decision.allowed {
            self.audit(
                "assay_transition",
                "transition",
                "",
                AuditResult::Blocked,
                &input,
                &decision.reason,
            );
            return Err(ToolError::Denied(decision.reason));
        }

        self.machine.commit(target_phase, &assignment);
        self.machine.save(&self.paths.state_path())?;
        self.audit(
            "assay_transition",
            "transition",
            "",
            AuditResult::Success,
            &input,
            &format!("{} -> {}", from, target_phase),
        );
        info!(from = %from, to = %target_phase, role = %assignment.role, "transition committed");

        Ok(format!(
            "Transitioned to {} (role {})",
            target_phase, assignment.role
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::phase::{Role, State};

    #[test]
    fn test_transition_persists_role_and_phase() {
        let (mut tools, _dir) = test_tools();
        let out = tools
            .transition(
                "abduction",
                RoleAssignment::new(Role::Abductor).with_session("s1"),
                Some(EvidenceStub {
                    evidence_type: "note".to_string(),
                    uri: "session://s1".to_string(),
                    ..Default::default()
                }),
            )
            .unwrap();
        assert_eq!(out, "Transitioned to ABDUCTION (role Abductor)");

        let saved = State::load(&tools.paths().state_path()).unwrap();
        assert_eq!(saved.phase, Phase::Abduction);
        assert_eq!(saved.active_role.session_id, "s1");
    }

    #[test]
    fn test_missing_anchor_blocked() {
        let (mut tools, _dir) = test_tools();
        let err = tools
            .transition("ABDUCTION", RoleAssignment::new(Role::Abductor), None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Transition to ABDUCTION requires valid Evidence Anchor (A.10) from IDLE"
        );
        assert_eq!(tools.machine().state().phase, Phase::Idle);
    }

    #[test]
    fn test_denial_is_error_with_reason() {
        let (mut tools, _dir) = test_tools();
        let err = tools
            .transition("DECISION", RoleAssignment::new(Role::Decider), None)
            .unwrap_err();
        assert!(matches!(err, ToolError::Denied(_)));
        assert_eq!(err.to_string(), "Invalid transition: IDLE -> DECISION by Decider");

        let unknown = tools.transition("LIMBO", RoleAssignment::new(Role::Decider), None);
        assert!(matches!(unknown, Err(ToolError::InvalidArgument(_))));
    }

    #[test]
    fn test_role_required() {
        let (mut tools, _dir) = test_tools();
        let err = tools
            .transition("ABDUCTION", RoleAssignment::default(), None)
            .unwrap_err();
        assert_eq!(err.to_string(), "Role is required");
    }
}
