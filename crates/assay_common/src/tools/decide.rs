//! Decision: design rationale records

use super::{slugify, Tools};
use crate::audit_log::AuditResult;
use crate::error::{ToolError, ToolResult};
use crate::knowledge::{HolonType, Layer, NewHolon, RelationType, DEFAULT_CONGRUENCE_LEVEL};
use crate::phase::Phase;
use crate::projection;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// Arguments of a decision record
#[derive(Debug, Clone, Default, Serialize)]
pub struct DecideRequest {
    pub title: String,
    pub winner_id: String,
    pub rejected_ids: Vec<String>,
    pub context: String,
    pub decision: String,
    pub rationale: String,
    pub consequences: String,
    /// Characteristic space, rendered when non-empty
    pub characteristics: String,
}

impl DecideRequest {
    pub fn new(title: &str, winner_id: &str) -> Self {
        Self {
            title: title.to_string(),
            winner_id: winner_id.to_string(),
            ..Default::default()
        }
    }

    fn body(&self) -> String {
        let mut body = format!("\n# {}\n\n", self.title);
        body.push_str(&format!("## Context\n{}\n\n", self.context));
        body.push_str(&format!(
            "## Decision\n**Selected Option:** {}\n\n{}\n\n",
            self.winner_id, self.decision
        ));
        body.push_str(&format!("## Rationale\n{}\n\n", self.rationale));
        if !self.characteristics.is_empty() {
            body.push_str(&format!(
                "### Characteristic Space (C.16)\n{}\n\n",
                self.characteristics
            ));
        }
        body.push_str(&format!("## Consequences\n{}\n", self.consequences));
        body
    }
}

impl Tools {
    /// Finalise a decision: DRR file and holon, edges, winner promotion.
    /// The project returns to IDLE afterwards.
    pub fn decide(&mut self, req: DecideRequest) -> ToolResult<String> {
        let _work = self.work("decide");

        let slug = slugify(&req.title);
        if slug.is_empty() {
            return Err(ToolError::InvalidArgument(
                "title must contain at least one letter or digit".to_string(),
            ));
        }
        let now = Utc::now();
        let drr_id = format!("DRR-{}-{}", now.format("%Y-%m-%d"), slug);
        if self.store.get_holon(&drr_id)?.is_some() {
            self.audit("assay_decide", "create_drr", &drr_id, AuditResult::Error, &req, "duplicate id");
            return Err(ToolError::InvalidArgument(format!(
                "decision {} already exists",
                drr_id
            )));
        }

        self.record_phase(Phase::Decision);
        let body = req.body();

        let path = self.paths.decisions_dir().join(format!("{}.md", drr_id));
        let created = now.to_rfc3339();
        projection::write_with_hash(
            &path,
            &[
                ("type", "DRR"),
                ("winner_id", req.winner_id.as_str()),
                ("created", created.as_str()),
            ],
            &body,
        )?;

        let mut notes = Vec::new();

        // Promote first so the record is the most recent write
        match self.store.get_holon(&req.winner_id)? {
            Some(winner) if winner.layer == Layer::L1 => {
                self.move_hypothesis(&req.winner_id, Layer::L1, Layer::L2)?;
            }
            Some(winner) => {
                warn!(winner = %req.winner_id, layer = %winner.layer, "winner not in L1, leaving in place");
                notes.push(format!(
                    "Warning: winner {} is in {}, not promoted",
                    req.winner_id, winner.layer
                ));
            }
            None => {
                warn!(winner = %req.winner_id, "winner not found");
                notes.push(format!("Warning: winner {} not found", req.winner_id));
            }
        }

        self.store.create_holon(&NewHolon {
            id: drr_id.clone(),
            holon_type: HolonType::Drr,
            kind: None,
            layer: Layer::Drr,
            title: req.title.clone(),
            content: body,
            context_id: self.config.context_id.clone(),
            scope: String::new(),
            parent_id: Some(req.winner_id.clone()).filter(|w| !w.is_empty()),
        })?;

        if !req.winner_id.is_empty() {
            if let Err(e) = self.store.link(
                &drr_id,
                RelationType::Selects,
                &req.winner_id,
                Some(DEFAULT_CONGRUENCE_LEVEL),
            ) {
                warn!(drr = %drr_id, "Failed to link winner: {}", e);
            }
        }
        for rejected in req
            .rejected_ids
            .iter()
            .filter(|r| !r.is_empty() && **r != req.winner_id)
        {
            if let Err(e) = self.store.link(
                &drr_id,
                RelationType::Rejects,
                rejected,
                Some(DEFAULT_CONGRUENCE_LEVEL),
            ) {
                warn!(drr = %drr_id, rejected = %rejected, "Failed to link rejected: {}", e);
            }
        }

        self.audit("assay_decide", "create_drr", &drr_id, AuditResult::Success, &req, "");

        self.machine.set_phase(Phase::Idle);
        self.machine.save(&self.paths.state_path())?;
        info!(drr = %drr_id, winner = %req.winner_id, "decision recorded");

        let mut out = format!("Decision recorded: {}", path.display());
        for note in notes {
            out.push('\n');
            out.push_str(&note);
        }
        Ok(out)
    }
}
