//! Reliability Engine v0.4.0
//!
//! Effective reliability (R_eff) of a holon:
//! - Self score: mean of per-evidence verdict scores, with decay for
//!   expired evidence not covered by an active waiver
//! - Dependency score: weakest propagating dependency after the
//!   congruence-level penalty
//! - Final score: min(self, weakest dependency)
//!
//! `compute` is a pure read. `calculate_reliability` adds the best-effort
//! write of the final score into the holon's cached column.

use crate::knowledge::{KnowledgeStore, Verdict};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Contribution of an expired, unwaived evidence row
pub const DECAYED_SCORE: f64 = 0.1;

/// Reliability report for one holon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityReport {
    pub holon_id: String,
    pub final_score: f64,
    pub self_score: f64,
    /// Dependency that set the minimum, if any
    pub weakest_link: Option<String>,
    pub decay_penalty: f64,
    /// Ordered, human-readable notes
    pub factors: Vec<String>,
}

impl ReliabilityReport {
    fn new(holon_id: &str) -> Self {
        Self {
            holon_id: holon_id.to_string(),
            final_score: 0.0,
            self_score: 0.0,
            weakest_link: None,
            decay_penalty: 0.0,
            factors: Vec::new(),
        }
    }

    /// Weakest link for display
    pub fn weakest_link_label(&self) -> &str {
        self.weakest_link.as_deref().unwrap_or("none")
    }
}

/// Verdict to base score; anything unrecognised scores nothing
pub fn verdict_score(verdict: &str) -> f64 {
    match Verdict::parse(verdict) {
        Some(Verdict::Pass) => 1.0,
        Some(Verdict::Degrade) => 0.5,
        _ => 0.0,
    }
}

/// Penalty for a dependency edge by congruence level.
/// Anything outside 1..=3 lands in the distrust bucket.
pub fn cl_penalty(congruence_level: Option<i64>) -> f64 {
    match congruence_level {
        Some(3) => 0.0,
        Some(2) => 0.1,
        Some(1) => 0.4,
        _ => 0.9,
    }
}

/// Computes reliability over a borrowed store
pub struct ReliabilityEngine<'a> {
    store: &'a KnowledgeStore,
}

impl<'a> ReliabilityEngine<'a> {
    pub fn new(store: &'a KnowledgeStore) -> Self {
        Self { store }
    }

    /// Pure computation against the current clock
    pub fn compute(&self, holon_id: &str) -> Result<ReliabilityReport> {
        self.compute_at(holon_id, Utc::now())
    }

    /// Pure computation against a fixed clock
    pub fn compute_at(&self, holon_id: &str, now: DateTime<Utc>) -> Result<ReliabilityReport> {
        let mut visited = HashSet::new();
        self.evaluate(holon_id, now, &mut visited)
    }

    /// Compute, then cache the final score. Cache failure is non-fatal.
    pub fn calculate_reliability(&self, holon_id: &str) -> Result<ReliabilityReport> {
        let mut report = self.compute(holon_id)?;
        if let Err(e) = self.store.update_cached_score(holon_id, report.final_score) {
            warn!(holon = holon_id, "Failed to cache reliability score: {}", e);
            report
                .factors
                .push("Warning: cache update failed".to_string());
        }
        Ok(report)
    }

    fn evaluate(
        &self,
        holon_id: &str,
        now: DateTime<Utc>,
        visited: &mut HashSet<String>,
    ) -> Result<ReliabilityReport> {
        let mut report = ReliabilityReport::new(holon_id);

        if !visited.insert(holon_id.to_string()) {
            report.final_score = 1.0;
            report.self_score = 1.0;
            report
                .factors
                .push("Cycle detected, skipping re-evaluation".to_string());
            return Ok(report);
        }

        // Self score
        let evidence = self.store.get_evidence(holon_id)?;
        if evidence.is_empty() {
            report.self_score = 0.0;
            report.factors.push("No evidence found (L0)".to_string());
        } else {
            let mut total = 0.0;
            for record in &evidence {
                let mut score = verdict_score(&record.verdict);
                if record.is_expired_at(now) {
                    match self.store.active_waiver_until(&record.id, now)? {
                        Some(until) => report.factors.push(format!(
                            "Evidence {} expiry waived until {}",
                            record.id,
                            until.format("%Y-%m-%d")
                        )),
                        None => {
                            score = DECAYED_SCORE;
                            report.decay_penalty += 1.0 - DECAYED_SCORE;
                            report
                                .factors
                                .push("Evidence expired (Decay applied)".to_string());
                        }
                    }
                }
                total += score;
            }
            report.self_score = total / evidence.len() as f64;
        }

        // Dependency score
        let dependencies = self.store.dependencies_of(holon_id)?;
        if dependencies.is_empty() {
            report.final_score = report.self_score;
            return Ok(report);
        }

        let mut min_dep_score = 1.0;
        for dep in &dependencies {
            let dep_score = match self.evaluate(&dep.holon_id, now, visited) {
                Ok(dep_report) => dep_report.final_score,
                Err(e) => {
                    warn!(
                        holon = holon_id,
                        dependency = %dep.holon_id,
                        "Dependency evaluation failed, scoring as 0.0: {}",
                        e
                    );
                    0.0
                }
            };

            let penalty = cl_penalty(dep.congruence_level);
            let effective = (dep_score - penalty).max(0.0);
            if penalty > 0.0 {
                report
                    .factors
                    .push(format!("CL Penalty applied for {}", dep.holon_id));
            }

            if effective < min_dep_score {
                min_dep_score = effective;
                report.weakest_link = Some(dep.holon_id.clone());
            }
        }

        report.final_score = report.self_score.min(min_dep_score);
        debug!(
            holon = holon_id,
            self_score = report.self_score,
            final_score = report.final_score,
            "reliability computed"
        );
        Ok(report)
    }
}
