//! Evidence decay: deprecation, waivers and the freshness report

use super::{parse_date, Tools};
use crate::audit_log::AuditResult;
use crate::error::{ToolError, ToolResult};
use crate::knowledge::{Layer, StaleEvidence, Waiver};
use crate::reliability::ReliabilityEngine;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{info, warn};

impl Tools {
    /// One of three modes, in order of precedence: deprecate a holon one
    /// layer down, waive an evidence record, or report freshness.
    pub fn check_decay(
        &mut self,
        deprecate: Option<&str>,
        waive_id: Option<&str>,
        waive_until: Option<&str>,
        rationale: Option<&str>,
    ) -> ToolResult<String> {
        let _work = self.work("check_decay");

        if let Some(id) = deprecate.filter(|d| !d.is_empty()) {
            return self.deprecate(id);
        }
        if let Some(evidence_id) = waive_id.filter(|w| !w.is_empty()) {
            let until = waive_until.unwrap_or_default();
            let rationale = rationale.unwrap_or_default();
            if until.is_empty() || rationale.is_empty() {
                return Err(ToolError::InvalidArgument(
                    "waive_until and rationale are required when waiving".to_string(),
                ));
            }
            return self.waive(evidence_id, until, rationale);
        }
        self.freshness_report(Utc::now())
    }

    fn deprecate(&mut self, id: &str) -> ToolResult<String> {
        let holon = self.require_holon(id)?;
        let to = match holon.layer {
            Layer::L2 => Layer::L1,
            Layer::L1 => Layer::L0,
            other => {
                return Err(ToolError::InvalidArgument(format!(
                    "cannot deprecate {} from {} (only L2 and L1 can be deprecated)",
                    id, other
                )))
            }
        };
        self.move_hypothesis(id, holon.layer, to)?;

        let input = serde_json::json!({ "deprecate": id });
        self.audit(
            "assay_check_decay",
            "deprecate",
            id,
            AuditResult::Success,
            &input,
            &format!("{} -> {}", holon.layer, to),
        );
        info!(holon = id, from = %holon.layer, to = %to, "holon deprecated");

        Ok(format!(
            "Deprecated: {} {} → {}\n\nThe holon now requires fresh evidence before it can be relied on again.\n\nNext step: run assay_propose to explore alternatives",
            id, holon.layer, to
        ))
    }

    fn waive(&mut self, evidence_id: &str, until: &str, rationale: &str) -> ToolResult<String> {
        let evidence = self
            .store
            .get_evidence_by_id(evidence_id)?
            .ok_or_else(|| ToolError::NotFound(format!("evidence {}", evidence_id)))?;

        let waived_until = parse_date(until).ok_or_else(|| {
            ToolError::InvalidArgument(format!(
                "invalid date format: {} (use YYYY-MM-DD or RFC3339)",
                until
            ))
        })?;
        if waived_until <= Utc::now() {
            return Err(ToolError::InvalidArgument(
                "waive_until must be a future date".to_string(),
            ));
        }

        let waiver = Waiver {
            id: format!("waiver-{}", uuid::Uuid::new_v4()),
            evidence_id: evidence_id.to_string(),
            waived_by: "user".to_string(),
            waived_until,
            rationale: rationale.to_string(),
        };
        self.store.create_waiver(&waiver)?;

        let input = serde_json::json!({
            "evidence_id": evidence_id,
            "until": until,
            "rationale": rationale,
        });
        self.audit(
            "assay_check_decay",
            "waive",
            &evidence.holon_id,
            AuditResult::Success,
            &input,
            rationale,
        );

        Ok(format!(
            "Waiver recorded: {} (holon {}) waived until {}\nRationale: {}",
            evidence_id,
            evidence.holon_id,
            waived_until.format("%Y-%m-%d"),
            rationale
        ))
    }

    fn freshness_report(&self, now: DateTime<Utc>) -> ToolResult<String> {
        let stale = self.store.stale_evidence(now)?;
        let waivers = self.store.active_waivers(now)?;

        let mut out = String::from("## Evidence Freshness Report\n\n");

        if stale.is_empty() {
            out.push_str("### All holons FRESH\n\n");
        } else {
            let mut by_holon: BTreeMap<&str, Vec<&StaleEvidence>> = BTreeMap::new();
            for row in &stale {
                by_holon.entry(row.holon_id.as_str()).or_default().push(row);
            }
            out.push_str(&format!(
                "### STALE ({} holons require action)\n\n",
                by_holon.len()
            ));
            for (holon_id, rows) in &by_holon {
                let first = rows[0];
                out.push_str(&format!(
                    "#### {} ({}) [{}]\n\n",
                    first.holon_title, holon_id, first.holon_layer
                ));
                out.push_str("| Evidence | Type | Days overdue |\n|---|---|---|\n");
                for row in rows {
                    out.push_str(&format!(
                        "| {} | {} | {} |\n",
                        row.evidence_id, row.evidence_type, row.days_overdue
                    ));
                }
                out.push('\n');
            }
            out.push_str("Actions: refresh (assay_test), deprecate (deprecate=<id>), or waive (waive_id=<evidence>)\n\n");
        }

        if !waivers.is_empty() {
            out.push_str("### WAIVED\n\n");
            out.push_str("| Evidence | Holon | Until | By | Rationale |\n|---|---|---|---|---|\n");
            for w in &waivers {
                out.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    w.evidence_id,
                    w.holon_title,
                    w.waived_until.format("%Y-%m-%d"),
                    w.waived_by,
                    w.rationale
                ));
            }
            out.push('\n');

            for w in waivers
                .iter()
                .filter(|w| w.days_until_expiry <= self.config.waiver_warning_days)
            {
                out.push_str(&format!(
                    "Warning: waiver for {} expires in {} days\n",
                    w.evidence_id, w.days_until_expiry
                ));
            }
        }

        Ok(out)
    }

    /// Recompute and cache R for every holon. Returns the number refreshed.
    pub fn run_decay(&mut self) -> ToolResult<usize> {
        let _work = self.work("run_decay");
        let engine = ReliabilityEngine::new(&self.store);
        let mut updated = 0;
        for id in self.store.list_holon_ids()? {
            match engine.calculate_reliability(&id) {
                Ok(_) => updated += 1,
                Err(e) => warn!(holon = %id, "Failed to recompute reliability: {}", e),
            }
        }
        info!(updated, "decay pass complete");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::phase::Phase;
    use crate::tools::EvidenceRequest;

    /// L1 holon with one expired verification
    fn stale_holon(tools: &mut Tools, title: &str) -> (String, String) {
        let id = propose_simple(tools, title);
        tools
            .manage_evidence(
                EvidenceRequest::add(Phase::Deduction, &id, "verification", "old check")
                    .level("L1")
                    .valid_until("2020-01-01"),
            )
            .unwrap();
        let evidence_id = tools.store().get_evidence(&id).unwrap()[0].id.clone();
        (id, evidence_id)
    }

    #[test]
    fn test_report_fresh_project() {
        let (mut tools, _dir) = test_tools();
        let out = tools.check_decay(None, None, None, None).unwrap();
        assert!(out.starts_with("## Evidence Freshness Report"));
        assert!(out.contains("### All holons FRESH"));
    }

    #[test]
    fn test_report_lists_stale_then_waiver_clears_it() {
        let (mut tools, _dir) = test_tools();
        let (id, evidence_id) = stale_holon(&mut tools, "Old");

        let out = tools.check_decay(None, None, None, None).unwrap();
        assert!(out.contains("### STALE (1 holons require action)"));
        assert!(out.contains(&evidence_id));

        let waived = tools
            .check_decay(None, Some(&evidence_id), Some("2099-01-01"), Some("migration pending"))
            .unwrap();
        assert!(waived.contains(&format!("(holon {})", id)));

        let out = tools.check_decay(None, None, None, None).unwrap();
        assert!(out.contains("### All holons FRESH"));
        assert!(out.contains("### WAIVED"));
        assert!(out.contains("migration pending"));
    }

    #[test]
    fn test_waiver_validation() {
        let (mut tools, _dir) = test_tools();
        let (_, evidence_id) = stale_holon(&mut tools, "Thing");

        let missing = tools.check_decay(None, Some(&evidence_id), None, Some("r"));
        assert!(matches!(missing, Err(ToolError::InvalidArgument(_))));

        let bad = tools
            .check_decay(None, Some(&evidence_id), Some("soon"), Some("r"))
            .unwrap_err();
        assert!(bad.to_string().contains("invalid date format: soon"));

        let past = tools
            .check_decay(None, Some(&evidence_id), Some("2001-01-01"), Some("r"))
            .unwrap_err();
        assert!(past.to_string().contains("must be a future date"));

        let ghost = tools.check_decay(None, Some("nope"), Some("2099-01-01"), Some("r"));
        assert!(matches!(ghost, Err(ToolError::NotFound(_))));
    }

    #[test]
    fn test_deprecate_steps_down_one_layer() {
        let (mut tools, _dir) = test_tools();
        let id = propose_simple(&mut tools, "Aging");
        tools.verify(&id, "{}", "PASS").unwrap();

        let out = tools.check_decay(Some(&id), None, None, None).unwrap();
        assert!(out.starts_with("Deprecated: aging L1 → L0"));
        assert_eq!(tools.store().get_holon(&id).unwrap().unwrap().layer, Layer::L0);

        let err = tools.check_decay(Some(&id), None, None, None).unwrap_err();
        assert!(err.to_string().contains("only L2 and L1 can be deprecated"));
    }

    #[test]
    fn test_run_decay_caches_scores() {
        let (mut tools, _dir) = test_tools();
        let (id, _) = stale_holon(&mut tools, "Cached");
        propose_simple(&mut tools, "Fresh");

        assert_eq!(tools.run_decay().unwrap(), 2);
        let holon = tools.store().get_holon(&id).unwrap().unwrap();
        assert!((holon.cached_reliability - 0.1).abs() < 1e-9);
    }
}
