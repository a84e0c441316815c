//! Project State Layout
//!
//! Owns every path under `<project>/.assay/` and the atomic write helper
//! used for state and projection files.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// Path Constants
// ============================================================================

/// Hidden state directory under the project root
pub const STATE_DIR: &str = ".assay";

pub const DB_FILE: &str = "assay.db";
pub const STATE_FILE: &str = "state.json";
pub const CONFIG_FILE: &str = "config.toml";

pub const KNOWLEDGE_DIR: &str = "knowledge";
pub const EVIDENCE_DIR: &str = "evidence";
pub const DECISIONS_DIR: &str = "decisions";
pub const SESSIONS_DIR: &str = "sessions";

/// Layer directories created under `knowledge/`
pub const LAYER_DIRS: [&str; 4] = ["L0", "L1", "L2", "invalid"];

// ============================================================================
// Atomic File Operations
// ============================================================================

/// Write data to a file atomically using temp file + rename
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Write string data atomically
pub fn atomic_write_str(path: &Path, data: &str) -> io::Result<()> {
    atomic_write(path, data.as_bytes())
}

// ============================================================================
// Paths
// ============================================================================

/// Resolved locations for one project
#[derive(Debug, Clone)]
pub struct AssayPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
}

impl AssayPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            state_dir: root.join(STATE_DIR),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join(DB_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join(CONFIG_FILE)
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.state_dir.join(KNOWLEDGE_DIR)
    }

    /// `knowledge/<layer>/`
    pub fn layer_dir(&self, layer: &str) -> PathBuf {
        self.knowledge_dir().join(layer)
    }

    /// `knowledge/<layer>/<id>.md`
    pub fn holon_file(&self, layer: &str, id: &str) -> PathBuf {
        self.layer_dir(layer).join(format!("{}.md", id))
    }

    pub fn evidence_file(&self, id: &str) -> PathBuf {
        self.state_dir.join(EVIDENCE_DIR).join(format!("{}.md", id))
    }

    pub fn decisions_dir(&self) -> PathBuf {
        self.state_dir.join(DECISIONS_DIR)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.state_dir.join(SESSIONS_DIR)
    }

    /// Create the directory skeleton if missing
    pub fn ensure_directories(&self) -> io::Result<()> {
        for layer in LAYER_DIRS {
            fs::create_dir_all(self.layer_dir(layer))?;
        }
        fs::create_dir_all(self.state_dir.join(EVIDENCE_DIR))?;
        fs::create_dir_all(self.decisions_dir())?;
        fs::create_dir_all(self.sessions_dir())?;
        Ok(())
    }
}
