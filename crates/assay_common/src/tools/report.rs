//! Reliability reports and the assurance tree

use super::Tools;
use crate::error::ToolResult;
use crate::knowledge::{Dependency, RelationType};
use crate::reliability::ReliabilityEngine;
use std::collections::HashSet;

impl Tools {
    /// Markdown reliability report for one holon
    pub fn calculate_r(&self, id: &str) -> ToolResult<String> {
        let _work = self.work("calculate_r");
        self.require_holon(id)?;
        let report = ReliabilityEngine::new(&self.store).calculate_reliability(id)?;

        let mut out = format!("## Reliability Report: {}\n\n", id);
        out.push_str(&format!("**R_eff: {:.2}**\n", report.final_score));
        out.push_str(&format!("- Self Score: {:.2}\n", report.self_score));
        if let Some(weakest) = &report.weakest_link {
            out.push_str(&format!("- Weakest Link: {}\n", weakest));
        }
        if report.decay_penalty > 0.0 {
            out.push_str(&format!("- Decay Penalty: {:.2}\n", report.decay_penalty));
        }
        if !report.factors.is_empty() {
            out.push_str("\n**Factors:**\n");
            for factor in &report.factors {
                out.push_str(&format!("- {}\n", factor));
            }
        }
        Ok(out)
    }

    /// Indented tree of what a holon depends on, with scores and CL labels.
    /// Members of a decision context are listed separately, each scored on
    /// its own.
    pub fn visualize_audit(&self, id: &str) -> ToolResult<String> {
        let _work = self.work("visualize_audit");
        if id == "all" {
            return Ok("Please specify a root ID for the audit tree.".to_string());
        }
        self.require_holon(id)?;

        let mut out = String::new();
        let mut visited = HashSet::new();
        self.render_node(id, 0, &mut visited, &mut out)?;

        let members = self.store.members_of(id)?;
        if !members.is_empty() {
            out.push_str("\n[members]\n");
            for member in members {
                let mut visited = HashSet::new();
                self.render_node(&member, 1, &mut visited, &mut out)?;
            }
        }
        Ok(out)
    }

    fn render_node(
        &self,
        id: &str,
        level: usize,
        visited: &mut HashSet<String>,
        out: &mut String,
    ) -> ToolResult<()> {
        let indent = "  ".repeat(level);
        if !visited.insert(id.to_string()) {
            out.push_str(&format!("{}[{}] (already shown)\n", indent, id));
            return Ok(());
        }

        let report = ReliabilityEngine::new(&self.store).compute(id)?;
        out.push_str(&format!(
            "{}[{} R:{:.2}] {}\n",
            indent,
            id,
            report.final_score,
            self.title_or_id(id)
        ));
        for factor in &report.factors {
            out.push_str(&format!("{}  ! {}\n", indent, factor));
        }

        let children: Vec<(Dependency, &str)> = self
            .store
            .components_of(id)?
            .into_iter()
            .map(|d| (d, ""))
            .chain(
                self.store
                    .relations_from(id)?
                    .into_iter()
                    .filter(|r| r.relation_type == RelationType::DependsOn)
                    .map(|r| {
                        (
                            Dependency {
                                holon_id: r.target_id,
                                congruence_level: r.congruence_level,
                            },
                            "dependsOn, ",
                        )
                    }),
            )
            .collect();

        for (child, label) in children {
            out.push_str(&format!(
                "{}  --({}CL:{})-->\n",
                indent,
                label,
                child.congruence_level.unwrap_or_default()
            ));
            self.render_node(&child.holon_id, level + 2, visited, out)?;
        }
        Ok(())
    }
}
