//! Deduction and induction: recording evidence and promoting hypotheses
//!
//! Promotion is two-tier. A PASS only moves a hypothesis when the evidence
//! carries enough assurance for the phase it was recorded in:
//! - DEDUCTION: L1 or L2 evidence promotes L0 -> L1
//! - INDUCTION: L2 evidence promotes L1 -> L2
//!
//! Otherwise the evidence is recorded and the layer stays put.

use super::{parse_date, Tools};
use crate::audit_log::AuditResult;
use crate::error::{ToolError, ToolResult};
use crate::knowledge::{HolonKind, Layer, NewEvidence, RelationType, Verdict};
use crate::phase::Phase;
use crate::projection;
use crate::reliability::ReliabilityEngine;
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::warn;

/// Suffix appended when a PASS is recorded without promotion
pub const INSUFFICIENT_ASSURANCE: &str =
    " (Evidence recorded, but Assurance Level insufficient for promotion)";

/// One evidence recording
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceRequest {
    pub phase: Phase,
    /// "add" or "check"
    pub action: String,
    pub target_id: String,
    pub evidence_type: String,
    pub content: String,
    pub verdict: String,
    pub assurance_level: String,
    pub carrier_ref: String,
    /// `YYYY-MM-DD` or RFC 3339; configured horizon when absent
    pub valid_until: Option<String>,
}

impl EvidenceRequest {
    pub fn add(phase: Phase, target_id: &str, evidence_type: &str, content: &str) -> Self {
        Self {
            phase,
            action: "add".to_string(),
            target_id: target_id.to_string(),
            evidence_type: evidence_type.to_string(),
            content: content.to_string(),
            verdict: Verdict::Pass.as_str().to_string(),
            assurance_level: String::new(),
            carrier_ref: String::new(),
            valid_until: None,
        }
    }

    pub fn verdict(mut self, verdict: &str) -> Self {
        self.verdict = verdict.to_string();
        self
    }

    pub fn level(mut self, level: &str) -> Self {
        self.assurance_level = level.to_string();
        self
    }

    pub fn carrier(mut self, carrier: &str) -> Self {
        self.carrier_ref = carrier.to_string();
        self
    }

    pub fn valid_until(mut self, until: &str) -> Self {
        self.valid_until = Some(until.to_string());
        self
    }
}

impl Tools {
    /// Shared evidence recorder with the two-tier promotion policy
    pub fn manage_evidence(&mut self, req: EvidenceRequest) -> ToolResult<String> {
        let _work = self.work("manage_evidence");

        if req.action == "check" {
            return self.list_evidence(&req.target_id);
        }

        let verdict = Verdict::parse(&req.verdict)
            .ok_or_else(|| ToolError::InvalidArgument(format!("unknown verdict: {}", req.verdict)))?;
        let holon = self.require_holon(&req.target_id)?;

        let should_promote = verdict == Verdict::Pass
            && match req.phase {
                Phase::Deduction => matches!(req.assurance_level.as_str(), "L1" | "L2"),
                Phase::Induction => req.assurance_level == "L2",
                _ => false,
            };

        let layer_move = match (verdict, req.phase) {
            (Verdict::Pass, Phase::Deduction) if should_promote => Some((Layer::L0, Layer::L1)),
            (Verdict::Pass, Phase::Induction) if should_promote => {
                if holon.layer == Layer::L0 {
                    return Err(ToolError::precondition(
                        "assay_test",
                        format!("hypothesis {} is still in L0", req.target_id),
                        "run assay_verify to promote it to L1 before testing",
                    ));
                }
                Some((Layer::L1, Layer::L2))
            }
            (Verdict::Fail | Verdict::Refine, Phase::Deduction) => Some((Layer::L0, Layer::Invalid)),
            (Verdict::Fail | Verdict::Refine, Phase::Induction) => Some((Layer::L1, Layer::Invalid)),
            _ => None,
        };

        if let Some((from, to)) = layer_move {
            // Fresh evidence for a holon already at the destination refreshes it in place
            if holon.layer != to {
                self.move_hypothesis(&req.target_id, from, to)
                    .map_err(|e| match e {
                        ToolError::NotFound(msg) => {
                            ToolError::NotFound(format!("failed to move hypothesis: {}", msg))
                        }
                        other => other,
                    })?;
            }
        }

        let path = self.record_evidence(&req, verdict)?;

        let mut out = path;
        if verdict == Verdict::Pass && !should_promote {
            out.push_str(INSUFFICIENT_ASSURANCE);
        }
        Ok(out)
    }

    /// Write the evidence row, its projection and the verifiedBy link
    fn record_evidence(&self, req: &EvidenceRequest, verdict: Verdict) -> ToolResult<String> {
        let now = Utc::now();
        let valid_until = match req.valid_until.as_deref().filter(|v| !v.is_empty()) {
            Some(raw) => parse_date(raw).ok_or_else(|| {
                ToolError::InvalidArgument(format!(
                    "invalid valid_until: {} (use YYYY-MM-DD or RFC3339)",
                    raw
                ))
            })?,
            None => now + Duration::days(self.config.evidence_validity_days),
        };

        let date = now.format("%Y-%m-%d").to_string();
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let id = format!("{}-{}-{}-{}", date, req.evidence_type, req.target_id, suffix);

        self.store.add_evidence(&NewEvidence {
            id: id.clone(),
            holon_id: req.target_id.clone(),
            evidence_type: req.evidence_type.clone(),
            content: req.content.clone(),
            verdict: verdict.as_str().to_string(),
            assurance_level: Some(req.assurance_level.clone()).filter(|l| !l.is_empty()),
            carrier_ref: Some(req.carrier_ref.clone()).filter(|c| !c.is_empty()),
            valid_until: Some(valid_until),
        })?;

        if let Err(e) = self
            .store
            .link(&id, RelationType::VerifiedBy, &req.target_id, None)
        {
            warn!(evidence = %id, "Failed to link evidence: {}", e);
        }

        let path = self.paths.evidence_file(&id);
        let valid_until_text = valid_until.format("%Y-%m-%d").to_string();
        projection::write_with_hash(
            &path,
            &[
                ("id", id.as_str()),
                ("type", req.evidence_type.as_str()),
                ("target", req.target_id.as_str()),
                ("verdict", verdict.as_str()),
                ("assurance_level", req.assurance_level.as_str()),
                ("carrier_ref", req.carrier_ref.as_str()),
                ("valid_until", valid_until_text.as_str()),
                ("date", date.as_str()),
            ],
            &format!("\n{}", req.content),
        )?;

        self.audit(
            "assay_evidence",
            "add_evidence",
            &req.target_id,
            AuditResult::Success,
            req,
            &id,
        );
        Ok(path.display().to_string())
    }

    fn list_evidence(&self, target_id: &str) -> ToolResult<String> {
        if target_id == "all" {
            return Ok("Global evidence audit is not supported. Please specify a target_id.".to_string());
        }
        let evidence = self.store.get_evidence(target_id)?;
        if evidence.is_empty() {
            return Ok(format!("No evidence found for {}", target_id));
        }
        let mut report = String::new();
        for e in evidence {
            report.push_str(&format!(
                "- [{}] {} (L:{}, Ref:{}): {}\n",
                e.verdict,
                e.evidence_type,
                e.assurance_level.as_deref().unwrap_or(""),
                e.carrier_ref.as_deref().unwrap_or(""),
                e.content
            ));
        }
        Ok(report)
    }

    /// Logical verification of an L0 hypothesis
    pub fn verify(&mut self, id: &str, checks_json: &str, verdict: &str) -> ToolResult<String> {
        let _work = self.work("verify");
        self.record_phase(Phase::Deduction);

        let holon = self.require_holon(id)?;
        let carrier = match holon.kind {
            Some(HolonKind::Episteme) => "formal-logic",
            _ => "internal-logic",
        };
        let input = serde_json::json!({ "hypothesis_id": id, "verdict": verdict });

        let parsed = Verdict::parse(verdict)
            .filter(|v| *v != Verdict::Degrade)
            .ok_or_else(|| ToolError::InvalidArgument(format!("unknown verdict: {}", verdict)))?;

        let result = match parsed {
            Verdict::Pass => self
                .manage_evidence(
                    EvidenceRequest::add(
                        Phase::Deduction,
                        id,
                        "verification",
                        &format!("Verification Checks:\n{}", checks_json),
                    )
                    .level("L1")
                    .carrier(carrier),
                )
                .map(|_| format!("Hypothesis {} (carrier: {}) promoted to L1", id, carrier)),
            Verdict::Fail => self
                .manage_evidence(
                    EvidenceRequest::add(
                        Phase::Deduction,
                        id,
                        "verification",
                        &format!("Verification Checks:\n{}", checks_json),
                    )
                    .verdict("fail")
                    .level("L1")
                    .carrier(carrier),
                )
                .map(|_| format!("Hypothesis {} moved to invalid", id)),
            _ => Ok(format!(
                "Hypothesis {} requires refinement (staying in L0)",
                id
            )),
        };

        match &result {
            Ok(_) => self.audit("assay_verify", "verify_hypothesis", id, AuditResult::Success, &input, ""),
            Err(e) => self.audit(
                "assay_verify",
                "verify_hypothesis",
                id,
                AuditResult::Error,
                &input,
                &e.to_string(),
            ),
        }
        result
    }

    /// Empirical validation of an L1 hypothesis
    pub fn test(
        &mut self,
        id: &str,
        test_type: &str,
        result: &str,
        verdict: &str,
    ) -> ToolResult<String> {
        let _work = self.work("test");
        self.record_phase(Phase::Induction);

        let level = if Verdict::parse(verdict) == Some(Verdict::Pass) {
            "L2"
        } else {
            "L1"
        };
        self.manage_evidence(
            EvidenceRequest::add(Phase::Induction, id, test_type, result)
                .verdict(verdict)
                .level(level)
                .carrier("test-runner"),
        )
    }

    /// Record an audit report and show the current R_eff
    pub fn audit_hypothesis(&mut self, id: &str, risks: &str) -> ToolResult<String> {
        let _work = self.work("audit");
        self.manage_evidence(
            EvidenceRequest::add(Phase::Decision, id, "audit_report", risks)
                .level("L2")
                .carrier("auditor"),
        )?;
        let report = ReliabilityEngine::new(&self.store).calculate_reliability(id)?;
        Ok(format!(
            "Audit recorded for {} (R_eff: {:.2})",
            id, report.final_score
        ))
    }
}
