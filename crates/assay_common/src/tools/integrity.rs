//! Projection integrity sweep

use super::Tools;
use crate::error::{ToolError, ToolResult};
use crate::projection::{self, TamperingEvent};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

impl Tools {
    /// Validate one projection, or every `.md` file under `knowledge/`.
    /// Tampered holon files are regenerated from the store.
    pub fn check_integrity(&self, path: Option<&str>) -> ToolResult<String> {
        let _work = self.work("check_integrity");

        let files: Vec<PathBuf> = match path.filter(|p| !p.is_empty()) {
            Some(p) => {
                let candidate = Path::new(p);
                let resolved = if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    self.paths.root.join(candidate)
                };
                if !resolved.is_file() {
                    return Err(ToolError::NotFound(format!("file {}", resolved.display())));
                }
                vec![resolved]
            }
            None => self.projection_files(),
        };

        let mut events: Vec<TamperingEvent> = Vec::new();
        let mut unreadable: Vec<(String, String)> = Vec::new();
        for file in &files {
            match projection::read_with_validation(&self.store, file) {
                Ok((_, Some(event))) => events.push(event),
                Ok((_, None)) => {}
                Err(e) => {
                    warn!(path = %file.display(), "Skipping unreadable projection: {:#}", e);
                    unreadable.push((file.display().to_string(), format!("{:#}", e)));
                }
            }
        }
        info!(
            checked = files.len(),
            tampered = events.len(),
            unreadable = unreadable.len(),
            "integrity check complete"
        );

        if events.is_empty() && unreadable.is_empty() {
            return Ok(format!("Integrity OK: {} file(s) checked", files.len()));
        }

        let mut out = format!(
            "Integrity check: {} file(s) checked, {} tampered",
            files.len(),
            events.len()
        );
        if !unreadable.is_empty() {
            out.push_str(&format!(", {} unreadable", unreadable.len()));
        }
        out.push('\n');
        for event in &events {
            let status = if event.regenerated {
                "regenerated from store"
            } else {
                "NOT regenerated"
            };
            out.push_str(&format!(
                "- {} (expected {}, actual {}): {}\n",
                event.path, event.expected_hash, event.actual_hash, status
            ));
        }
        for (path, reason) in &unreadable {
            out.push_str(&format!("- {}: unreadable ({})\n", path, reason));
        }
        Ok(out)
    }

    fn projection_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(self.paths.knowledge_dir()).follow_links(false) {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && path.extension().and_then(|e| e.to_str()) == Some("md")
                    {
                        files.push(path.to_path_buf());
                    }
                }
                Err(e) => debug!("Error walking knowledge directory: {}", e),
            }
        }
        files.sort();
        files
    }
}
