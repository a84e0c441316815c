//! Tool Façade v0.4.0
//!
//! Externally named operations over the engine. Each operation:
//! - wraps its body in a work-record span
//! - mutates the store first, then the file projections
//! - writes audit-log entries (best-effort)
//!
//! Submodules group the operations by lifecycle stage.

pub mod actualize;
pub mod decay;
pub mod decide;
pub mod evidence;
pub mod integrity;
pub mod preconditions;
pub mod propose;
pub mod report;
pub mod transition;

pub use decide::DecideRequest;
pub use evidence::EvidenceRequest;
pub use propose::ProposeRequest;

use crate::audit_log::{self, AuditEntry, AuditResult};
use crate::config::AssayConfig;
use crate::error::{ToolError, ToolResult};
use crate::knowledge::{Holon, KnowledgeStore, Layer};
use crate::paths::AssayPaths;
use crate::phase::{Phase, PhaseMachine};
use crate::projection;
use crate::work_record::WorkSpan;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Lower-case; every run of non-alphanumerics becomes `-`; dashes trimmed
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// `YYYY-MM-DD` (midnight UTC) or RFC 3339
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The engine as seen by the RPC layer
pub struct Tools {
    config: AssayConfig,
    paths: AssayPaths,
    store: Arc<KnowledgeStore>,
    machine: PhaseMachine,
}

impl Tools {
    /// Open a project: directories, config, store and phase state
    pub fn open(root: &Path) -> anyhow::Result<Self> {
        let paths = AssayPaths::new(root);
        paths
            .ensure_directories()
            .with_context(|| format!("Failed to create {}", paths.state_dir.display()))?;
        let config = AssayConfig::load(&paths.config_path())?;
        let store = Arc::new(KnowledgeStore::open(&paths.db_path())?);
        let machine = PhaseMachine::load(
            &paths.state_path(),
            Some(store.clone()),
            &config.context_id,
        )?;
        info!(root = %root.display(), context = %config.context_id, "project opened");
        Ok(Self::new(config, paths, store, machine))
    }

    pub fn new(
        config: AssayConfig,
        paths: AssayPaths,
        store: Arc<KnowledgeStore>,
        machine: PhaseMachine,
    ) -> Self {
        Self {
            config,
            paths,
            store,
            machine,
        }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn paths(&self) -> &AssayPaths {
        &self.paths
    }

    pub fn config(&self) -> &AssayConfig {
        &self.config
    }

    pub fn machine(&self) -> &PhaseMachine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut PhaseMachine {
        &mut self.machine
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// Work span attributed to the active role
    fn work(&self, method: &str) -> WorkSpan {
        let role = &self.machine.state().active_role.role;
        let performer = if role.is_empty() { "System" } else { role.as_str() };
        WorkSpan::start(self.store.clone(), method, performer)
    }

    fn audit<T: Serialize>(
        &self,
        tool: &str,
        operation: &str,
        target: &str,
        result: AuditResult,
        input: &T,
        details: &str,
    ) {
        let mut entry = AuditEntry::new(tool, operation, result)
            .with_context(&self.config.context_id)
            .with_input(input);
        if !target.is_empty() {
            entry = entry.with_target(target);
        }
        if !details.is_empty() {
            entry = entry.with_details(details);
        }
        audit_log::record(&self.store, &entry);
    }

    /// Record the phase a tool moved the project into; persistence is best-effort
    fn record_phase(&mut self, phase: Phase) {
        self.machine.set_phase(phase);
        if let Err(e) = self.machine.save(&self.paths.state_path()) {
            warn!("Failed to save state: {}", e);
        }
    }

    fn require_holon(&self, id: &str) -> ToolResult<Holon> {
        self.store
            .get_holon(id)?
            .ok_or_else(|| ToolError::NotFound(format!("holon {}", id)))
    }

    fn title_or_id(&self, id: &str) -> String {
        match self.store.get_holon_title(id) {
            Ok(Some(title)) if !title.is_empty() => title,
            _ => id.to_string(),
        }
    }

    /// Move a hypothesis between layers: store first, then its projection
    pub fn move_hypothesis(&self, id: &str, from: Layer, to: Layer) -> ToolResult<PathBuf> {
        let input = serde_json::json!({ "from": from.as_str(), "to": to.as_str() });

        let holon = match self.store.get_holon(id)? {
            Some(holon) if holon.layer == from => holon,
            _ => {
                let message = format!("hypothesis {} not found in {}", id, from);
                self.audit("assay_move", "move_hypothesis", id, AuditResult::Error, &input, &message);
                return Err(ToolError::NotFound(message));
            }
        };

        self.store.update_holon_layer(id, to)?;

        let src = self.paths.holon_file(from.as_str(), id);
        let dest = self.paths.holon_file(to.as_str(), id);
        if src.exists() {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&src, &dest)?;
        } else {
            warn!(holon = id, "projection missing, regenerating at {}", dest.display());
            let moved = Holon { layer: to, ..holon };
            projection::write_holon(&dest, &moved)?;
        }

        self.audit("assay_move", "move_hypothesis", id, AuditResult::Success, &input, "");
        Ok(dest)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Current phase, role and threshold
    pub fn status(&self) -> ToolResult<String> {
        let state = self.machine.state();
        let counts = self.store.count_holons_by_layer(&self.config.context_id)?;
        let count = |layer: &str| counts.get(layer).copied().unwrap_or(0);

        let mut out = format!(
            "Phase: {} ({})\n",
            self.machine.phase(),
            self.machine.provider_name()
        );
        if state.active_role.role.is_empty() {
            out.push_str("Active role: none\n");
        } else {
            out.push_str(&format!("Active role: {}", state.active_role.role));
            if !state.active_role.session_id.is_empty() {
                out.push_str(&format!(" (session {})", state.active_role.session_id));
            }
            out.push('\n');
        }
        out.push_str(&format!(
            "Assurance threshold: {:.2}\n",
            self.machine.assurance_threshold()
        ));
        if let Some(commit) = &state.last_commit {
            out.push_str(&format!("Last commit: {}\n", commit));
        }
        out.push_str(&format!(
            "Holons: L0={} L1={} L2={} invalid={} DRR={}\n",
            count("L0"),
            count("L1"),
            count("L2"),
            count("invalid"),
            count("DRR")
        ));
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A project rooted in a temp dir
    pub fn test_tools() -> (Tools, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let tools = Tools::open(dir.path()).unwrap();
        (tools, dir)
    }

    /// Propose a system hypothesis with no relations; returns its id
    pub fn propose_simple(tools: &mut Tools, title: &str) -> String {
        tools
            .propose(ProposeRequest::new(title, "content", "global", "system", "{}"))
            .unwrap();
        slugify(title)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Use Redis for Caching"), "use-redis-for-caching");
        assert_eq!(slugify("  --Hello,  World!!  "), "hello-world");
        assert_eq!(slugify("v2.0 API"), "v2-0-api");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_parse_date() {
        let day = parse_date("2030-01-15").unwrap();
        assert_eq!(day.format("%Y-%m-%d").to_string(), "2030-01-15");
        assert!(parse_date("2030-01-15T10:00:00Z").is_some());
        assert!(parse_date("next tuesday").is_none());
    }

    #[test]
    fn test_move_hypothesis_moves_row_and_file() {
        let (mut tools, _dir) = test_tools();
        let id = propose_simple(&mut tools, "Move Me");

        let dest = tools.move_hypothesis(&id, Layer::L0, Layer::L1).unwrap();
        assert!(dest.exists());
        assert!(!tools.paths().holon_file("L0", &id).exists());
        assert_eq!(tools.store().get_holon(&id).unwrap().unwrap().layer, Layer::L1);

        let err = tools.move_hypothesis(&id, Layer::L0, Layer::L1).unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn test_move_regenerates_missing_projection() {
        let (mut tools, _dir) = test_tools();
        let id = propose_simple(&mut tools, "Lost File");
        fs::remove_file(tools.paths().holon_file("L0", &id)).unwrap();

        let dest = tools.move_hypothesis(&id, Layer::L0, Layer::L1).unwrap();
        assert!(!projection::validate_file(&dest).unwrap().tampered);
    }

    #[test]
    fn test_status_reports_phase() {
        let (mut tools, _dir) = test_tools();
        assert!(tools.status().unwrap().starts_with("Phase: IDLE (derived)"));
        propose_simple(&mut tools, "Something");
        let status = tools.status().unwrap();
        assert!(status.starts_with("Phase: ABDUCTION"));
        assert!(status.contains("L0=1"));
        assert!(status.contains("Assurance threshold: 0.80"));
    }
}
