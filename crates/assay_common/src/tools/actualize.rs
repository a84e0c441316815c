//! Reconciliation of the knowledge base against the working tree

use super::Tools;
use crate::error::ToolResult;
use std::process::Command;
use tracing::{debug, warn};

/// `git <args>` in `dir`; None when git is missing or exits non-zero
fn git(dir: &std::path::Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(dir).output().ok()?;
    if !output.status.success() {
        debug!(?args, status = ?output.status, "git command failed");
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

impl Tools {
    /// Compare HEAD with the last seen commit and report drift
    pub fn actualize(&mut self) -> ToolResult<String> {
        let _work = self.work("actualize");
        let root = self.paths.root.clone();

        let current = match git(&root, &["rev-parse", "HEAD"]) {
            Some(out) => out.trim().to_string(),
            None => return Ok("RECONCILIATION: Not a git repository or git error.\n".to_string()),
        };

        let mut report = String::new();
        match self.machine.state().last_commit.clone() {
            None => {
                report.push_str(&format!(
                    "RECONCILIATION: Initializing baseline commit to {}\n",
                    current
                ));
            }
            Some(last) if last != current => {
                report.push_str(&format!("RECONCILIATION: Detected changes since {}\n", last));
                match git(&root, &["diff", "--name-status", &last, "HEAD"]) {
                    Some(diff) => {
                        report.push_str("Changed files:\n");
                        report.push_str(&diff);
                    }
                    None => report.push_str("Warning: Failed to get diff\n"),
                }
            }
            Some(_) => {
                return Ok("RECONCILIATION: No changes detected (Clean).\n".to_string());
            }
        }

        self.machine.state_mut().last_commit = Some(current);
        if let Err(e) = self.machine.save(&self.paths.state_path()) {
            warn!("Failed to save state: {}", e);
            report.push_str(&format!("Warning: Failed to save state: {}\n", e));
        }
        Ok(report)
    }
}
