//! Evidence anchor validation
//!
//! Every non-loop transition must carry an artifact reference whose shape
//! fits the phase being entered:
//! - DEDUCTION: a non-empty directory (the abductive artifact set)
//! - INDUCTION: a non-empty `knowledge/L1/*.md` file
//! - AUDIT, DECISION: a non-empty `knowledge/L2/*.md` file
//! - anything else: any non-empty reference

use super::state::{EvidenceStub, Phase};
use std::fs;
use std::path::Path;

/// Whether the stub anchors a move into `target`
pub fn validate_anchor(target: Phase, stub: Option<&EvidenceStub>) -> bool {
    let uri = match stub {
        Some(stub) if !stub.uri.is_empty() => stub.uri.as_str(),
        _ => return false,
    };

    match target {
        Phase::Deduction => is_populated_dir(Path::new(uri)),
        Phase::Induction => is_layer_file(uri, "L1"),
        Phase::Audit | Phase::Decision => is_layer_file(uri, "L2"),
        _ => true,
    }
}

fn is_populated_dir(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}

/// `.../knowledge/<layer>/<name>.md`, readable and non-empty
fn is_layer_file(uri: &str, layer: &str) -> bool {
    let segment = format!("knowledge/{}/", layer);
    let path = Path::new(uri);
    if !uri.contains(&segment) || path.extension().and_then(|e| e.to_str()) != Some("md") {
        return false;
    }
    if !path.is_file() {
        return false;
    }
    matches!(fs::read(path), Ok(content) if !content.is_empty())
}
