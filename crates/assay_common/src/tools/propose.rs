//! Abduction: proposing hypotheses and refinement loopbacks

use super::{slugify, Tools};
use crate::audit_log::AuditResult;
use crate::error::{ToolError, ToolResult};
use crate::knowledge::{
    HolonKind, Layer, NewHolon, RelationOutcome, RelationType, DEFAULT_CONGRUENCE_LEVEL,
};
use crate::paths::atomic_write_str;
use crate::phase::Phase;
use crate::projection;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

/// Arguments of a proposal
#[derive(Debug, Clone, Serialize)]
pub struct ProposeRequest {
    pub title: String,
    pub content: String,
    pub scope: String,
    pub kind: String,
    pub rationale: String,
    /// Decision context to group under (memberOf)
    pub decision_context: Option<String>,
    /// Holons this hypothesis needs
    pub depends_on: Vec<String>,
    pub dependency_cl: i64,
}

impl ProposeRequest {
    pub fn new(title: &str, content: &str, scope: &str, kind: &str, rationale: &str) -> Self {
        Self {
            title: title.to_string(),
            content: content.to_string(),
            scope: scope.to_string(),
            kind: kind.to_string(),
            rationale: rationale.to_string(),
            decision_context: None,
            depends_on: Vec::new(),
            dependency_cl: DEFAULT_CONGRUENCE_LEVEL,
        }
    }

    pub fn with_decision_context(mut self, context: &str) -> Self {
        self.decision_context = Some(context.to_string());
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str], cl: i64) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self.dependency_cl = cl;
        self
    }
}

/// Out-of-range levels fall back to the no-discount level
fn clamp_cl(cl: i64) -> i64 {
    if (1..=3).contains(&cl) {
        cl
    } else {
        DEFAULT_CONGRUENCE_LEVEL
    }
}

impl Tools {
    /// Create an L0 hypothesis with its projection and relations.
    ///
    /// Missing dependencies, a missing decision context and edges that
    /// would close a cycle are skipped with a warning line in the output.
    pub fn propose(&mut self, req: ProposeRequest) -> ToolResult<String> {
        let _work = self.work("propose");

        let kind = HolonKind::parse(&req.kind).ok_or_else(|| {
            ToolError::InvalidArgument(format!(
                "kind must be 'system' or 'episteme', got '{}'",
                req.kind
            ))
        })?;

        let id = slugify(&req.title);
        if id.is_empty() {
            return Err(ToolError::InvalidArgument(
                "title must contain at least one letter or digit".to_string(),
            ));
        }
        if self.store.get_holon(&id)?.is_some() {
            self.audit("assay_propose", "create_hypothesis", &id, AuditResult::Error, &req, "duplicate id");
            return Err(ToolError::InvalidArgument(format!(
                "hypothesis {} already exists",
                id
            )));
        }
        self.record_phase(Phase::Abduction);

        let content = format!("{}\n\n## Rationale\n{}", req.content, req.rationale);
        let holon = NewHolon::hypothesis(
            &id,
            kind,
            &req.title,
            content,
            &req.scope,
            &self.config.context_id,
        );
        self.store.create_holon(&holon)?;

        let path = self.paths.holon_file(Layer::L0.as_str(), &id);
        let stored = self.require_holon(&id)?;
        projection::write_holon(&path, &stored)?;

        let mut notes = Vec::new();

        if let Some(context) = req.decision_context.as_deref().filter(|c| !c.is_empty()) {
            if self.store.get_holon(context)?.is_some() {
                self.relate(&id, RelationType::MemberOf, context, DEFAULT_CONGRUENCE_LEVEL, &mut notes);
            } else {
                warn!(holon = %id, context, "decision context not found, skipping memberOf");
                notes.push(format!(
                    "Warning: decision_context '{}' not found, skipping MemberOf",
                    context
                ));
            }
        }

        let cl = clamp_cl(req.dependency_cl);
        let relation = kind.dependency_relation();
        for dep in req.depends_on.iter().filter(|d| !d.is_empty()) {
            if self.store.get_holon(dep)?.is_none() {
                warn!(holon = %id, dependency = %dep, "dependency not found, skipping");
                notes.push(format!("Warning: dependency '{}' not found, skipping", dep));
                continue;
            }
            // The dependency is the part, the new holon the whole
            self.relate(dep, relation, &id, cl, &mut notes);
        }

        self.audit("assay_propose", "create_hypothesis", &id, AuditResult::Success, &req, "");
        info!(holon = %id, "hypothesis proposed");

        let mut out = format!("Hypothesis {} proposed (L0): {}", id, path.display());
        for note in notes {
            out.push('\n');
            out.push_str(&note);
        }
        Ok(out)
    }

    fn relate(
        &self,
        source: &str,
        relation: RelationType,
        target: &str,
        cl: i64,
        notes: &mut Vec<String>,
    ) {
        let input = serde_json::json!({
            "relation": relation.as_str(),
            "target": target,
            "cl": cl,
        });
        match self.store.create_relation(source, relation, target, cl) {
            Ok(RelationOutcome::Created) => {
                self.audit("assay_propose", "create_relation", source, AuditResult::Success, &input, "");
            }
            Ok(RelationOutcome::SkippedCycle) => notes.push(format!(
                "Warning: {} {} {} would create cycle, skipping",
                source,
                relation.as_str(),
                target
            )),
            Err(e) => {
                warn!(source, target, "Failed to create {} relation: {}", relation.as_str(), e);
                notes.push(format!(
                    "Warning: failed to create {} relation from {}: {}",
                    relation.as_str(),
                    source,
                    e
                ));
            }
        }
    }

    /// Invalidate a parent hypothesis and propose its refined successor
    pub fn refine_loopback(
        &mut self,
        parent_id: &str,
        insight: &str,
        title: &str,
        content: &str,
        scope: &str,
    ) -> ToolResult<String> {
        let _work = self.work("refine_loopback");

        let parent = self.require_holon(parent_id)?;
        let parent_layer = match parent.layer {
            Layer::L0 | Layer::L1 => parent.layer,
            other => {
                return Err(ToolError::InvalidArgument(format!(
                    "loopback not applicable to {} in layer {}",
                    parent_id, other
                )))
            }
        };
        self.move_hypothesis(parent_id, parent_layer, Layer::Invalid)?;

        let rationale = serde_json::json!({
            "source": "loopback",
            "parent_id": parent_id,
            "insight": insight,
        })
        .to_string();
        let kind = parent.kind.unwrap_or(HolonKind::System);
        let child = self.propose(ProposeRequest::new(
            title,
            content,
            scope,
            kind.as_str(),
            &rationale,
        ))?;

        let note_path = self
            .paths
            .sessions_dir()
            .join(format!("loopback-{}.md", Utc::now().timestamp()));
        let note = format!(
            "# Loopback Event\n\nParent: {} (moved to invalid)\nInsight: {}\nChild: {}\n",
            parent_id,
            insight,
            slugify(title)
        );
        atomic_write_str(&note_path, &note)?;

        Ok(format!(
            "Parent {} moved to invalid.\n{}",
            parent_id, child
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::fs;

    #[test]
    fn test_propose_creates_row_and_projection() {
        let (mut tools, _dir) = test_tools();
        let out = tools
            .propose(ProposeRequest::new(
                "Use Redis",
                "Cache hot reads",
                "api",
                "system",
                "latency budget",
            ))
            .unwrap();
        assert!(out.starts_with("Hypothesis use-redis proposed (L0)"));

        let holon = tools.store().get_holon("use-redis").unwrap().unwrap();
        assert_eq!(holon.layer, Layer::L0);
        assert_eq!(holon.content, "Cache hot reads\n\n## Rationale\nlatency budget");

        let file = fs::read_to_string(tools.paths().holon_file("L0", "use-redis")).unwrap();
        assert!(file.contains("# Hypothesis: Use Redis"));
        assert!(file.contains("kind: system\nscope: api\n"));
        assert_eq!(tools.machine().state().phase, Phase::Abduction);
    }

    #[test]
    fn test_rejected_proposals_leave_phase_alone() {
        let (mut tools, _dir) = test_tools();
        let bad = tools.propose(ProposeRequest::new("A", "c", "", "banana", ""));
        assert!(matches!(bad, Err(ToolError::InvalidArgument(_))));
        assert_eq!(tools.machine().state().phase, Phase::Idle);
        let blank = tools.propose(ProposeRequest::new("!!", "c", "", "system", ""));
        assert!(matches!(blank, Err(ToolError::InvalidArgument(_))));
        assert_eq!(tools.machine().state().phase, Phase::Idle);

        propose_simple(&mut tools, "A");
        let dup = tools.propose(ProposeRequest::new("A", "c", "", "system", ""));
        assert!(matches!(dup, Err(ToolError::InvalidArgument(_))));
    }

    #[test]
    fn test_dependencies_and_context_wired() {
        let (mut tools, _dir) = test_tools();
        let base = propose_simple(&mut tools, "Base");
        let ctx = propose_simple(&mut tools, "Caching Decision");

        let out = tools
            .propose(
                ProposeRequest::new("Top", "c", "", "episteme", "")
                    .with_decision_context(&ctx)
                    .with_dependencies(&[&base, "ghost"], 9),
            )
            .unwrap();
        assert!(out.contains("Warning: dependency 'ghost' not found, skipping"));

        let deps = tools.store().dependencies_of("top").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].holon_id, base);
        // Out of range level clamped to 3
        assert_eq!(deps[0].congruence_level, Some(3));

        let parts = tools.store().relations_from(&base).unwrap();
        assert_eq!(parts[0].relation_type, RelationType::ConstituentOf);
        assert_eq!(tools.store().members_of(&ctx).unwrap(), vec!["top".to_string()]);
    }

    #[test]
    fn test_missing_context_is_warning() {
        let (mut tools, _dir) = test_tools();
        let out = tools
            .propose(ProposeRequest::new("Alt", "c", "", "system", "").with_decision_context("nope"))
            .unwrap();
        assert!(out.contains("decision_context 'nope' not found"));
        assert!(tools.store().get_holon("alt").unwrap().is_some());
    }

    #[test]
    fn test_loopback_invalidates_parent() {
        let (mut tools, _dir) = test_tools();
        let parent = propose_simple(&mut tools, "First Try");

        let out = tools
            .refine_loopback(&parent, "missed latency", "Second Try", "better", "api")
            .unwrap();
        assert!(out.contains("Parent first-try moved to invalid"));
        assert_eq!(
            tools.store().get_holon(&parent).unwrap().unwrap().layer,
            Layer::Invalid
        );
        assert!(tools.paths().holon_file("invalid", &parent).exists());
        assert!(tools.store().get_holon("second-try").unwrap().is_some());
        let notes: Vec<_> = fs::read_dir(tools.paths().sessions_dir()).unwrap().collect();
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_loopback_refused_for_invalid_parent() {
        let (mut tools, _dir) = test_tools();
        let parent = propose_simple(&mut tools, "Idea");
        tools.refine_loopback(&parent, "x", "Other", "c", "").unwrap();
        let err = tools
            .refine_loopback(&parent, "x", "Third", "c", "")
            .unwrap_err();
        assert!(err.to_string().contains("loopback not applicable to idea in layer invalid"));
    }
}
