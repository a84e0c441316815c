//! Projection & Integrity Layer v0.4.0
//!
//! Holons are rendered to `knowledge/<layer>/<id>.md` with a header block:
//!
//! ```text
//! ---
//! kind: system
//! scope: global
//! content_hash: <hex>
//! ---
//! <body>
//! ```
//!
//! The hash covers the body only (first 16 bytes of SHA-256, hex). A file
//! without a header or without a hash is legacy content and never counts as
//! tampered. Tampered files are regenerated from the store when the path's
//! layer still matches the holon's layer.

use crate::audit_log::{self, AuditEntry, AuditResult};
use crate::knowledge::{Holon, KnowledgeStore, Layer};
use crate::paths::atomic_write_str;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

const HEADER_OPEN: &str = "---\n";
const HEADER_CLOSE: &str = "\n---\n";

static HASH_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^content_hash:\s*([a-f0-9]+)\s*$").expect("static regex")
});

static HOLON_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|/)knowledge/(L[012]|invalid)/([^/]+)\.md$").expect("static regex")
});

// ============================================================================
// Hashing and rendering
// ============================================================================

/// Hash of a projection body
pub fn content_hash(body: &str) -> String {
    content_hash_bytes(body.as_bytes())
}

/// Hash of raw body bytes; files on disk need not be UTF-8
pub fn content_hash_bytes(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    hex::encode(&digest[..16])
}

/// Split `---\n<header>\n---\n<body>`; None when there is no header block
fn split_header_bytes(content: &[u8]) -> Option<(&[u8], &[u8])> {
    let rest = content.strip_prefix(HEADER_OPEN.as_bytes())?;
    let close = HEADER_CLOSE.as_bytes();
    let end = rest.windows(close.len()).position(|w| w == close)?;
    Some((&rest[..end], &rest[end + close.len()..]))
}

/// Render header fields (in order) plus the hash line, then the body
pub fn render(fields: &[(&str, &str)], body: &str) -> String {
    let mut out = String::from(HEADER_OPEN);
    for (key, value) in fields {
        out.push_str(&format!("{}: {}\n", key, value));
    }
    out.push_str(&format!("content_hash: {}\n", content_hash(body)));
    out.push_str("---\n");
    out.push_str(body);
    out
}

/// Write a hashed projection atomically
pub fn write_with_hash(path: &Path, fields: &[(&str, &str)], body: &str) -> io::Result<()> {
    atomic_write_str(path, &render(fields, body))
}

/// Body of a hypothesis projection
pub fn holon_body(title: &str, content: &str) -> String {
    format!("\n# Hypothesis: {}\n\n{}", title, content)
}

/// Render a holon from its stored fields
pub fn write_holon(path: &Path, holon: &Holon) -> io::Result<()> {
    let kind = holon.kind.map(|k| k.as_str()).unwrap_or("");
    write_with_hash(
        path,
        &[("kind", kind), ("scope", holon.scope.as_str())],
        &holon_body(&holon.title, &holon.content),
    )
}

/// `(layer, holon id)` from `.../knowledge/<layer>/<id>.md`
pub fn parse_holon_path(path: &Path) -> Option<(Layer, String)> {
    let text = path.to_string_lossy().replace('\\', "/");
    let caps = HOLON_PATH.captures(&text)?;
    let layer = Layer::parse(caps.get(1)?.as_str())?;
    Some((layer, caps.get(2)?.as_str().to_string()))
}

// ============================================================================
// Validation
// ============================================================================

/// Result of checking a projection against its header hash
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub content: String,
    pub tampered: bool,
    pub expected_hash: Option<String>,
    pub actual_hash: Option<String>,
}

/// Check a file's body against its recorded hash. Errors only on I/O.
///
/// The body is hashed as raw bytes, so stray non-UTF-8 bytes show up as a
/// mismatch. `content` is a lossy rendering for display.
pub fn validate_file(path: &Path) -> io::Result<Validation> {
    let bytes = fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes).into_owned();

    let legacy = |content: String| Validation {
        content,
        tampered: false,
        expected_hash: None,
        actual_hash: None,
    };

    let (header, body) = match split_header_bytes(&bytes) {
        Some(parts) => parts,
        None => return Ok(legacy(content)),
    };

    let header = String::from_utf8_lossy(header);
    let expected = match HASH_LINE.captures(&header).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().to_string(),
        None => return Ok(legacy(content)),
    };

    let actual = content_hash_bytes(body);
    let tampered = expected != actual;
    Ok(Validation {
        content,
        tampered,
        expected_hash: Some(expected),
        actual_hash: Some(actual),
    })
}

/// A detected mismatch and whether it was repaired
#[derive(Debug, Clone, Serialize)]
pub struct TamperingEvent {
    pub path: String,
    pub expected_hash: String,
    pub actual_hash: String,
    pub regenerated: bool,
}

/// Rewrite a tampered projection from the store.
/// Ok(false) when the path is not a holon projection or the layers disagree.
pub fn regenerate_from_store(store: &KnowledgeStore, path: &Path) -> Result<bool> {
    let (layer, holon_id) = match parse_holon_path(path) {
        Some(parsed) => parsed,
        None => return Ok(false),
    };

    let holon = match store.get_holon(&holon_id)? {
        Some(holon) => holon,
        None => return Ok(false),
    };
    if holon.layer != layer {
        return Ok(false);
    }

    write_holon(path, &holon).with_context(|| format!("Failed to rewrite {}", path.display()))?;
    Ok(true)
}

/// Read a projection, detecting and repairing tampering.
///
/// Returns the (possibly regenerated) content and the event, if any. The
/// detection and the repair outcome are both written to the audit log.
pub fn read_with_validation(
    store: &KnowledgeStore,
    path: &Path,
) -> Result<(String, Option<TamperingEvent>)> {
    let validation =
        validate_file(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if !validation.tampered {
        return Ok((validation.content, None));
    }

    let path_str = path.to_string_lossy().to_string();
    let mut event = TamperingEvent {
        path: path_str.clone(),
        expected_hash: validation.expected_hash.clone().unwrap_or_default(),
        actual_hash: validation.actual_hash.clone().unwrap_or_default(),
        regenerated: false,
    };

    warn!(path = %path_str, expected = %event.expected_hash, actual = %event.actual_hash, "content hash mismatch");
    audit_log::record(
        store,
        &AuditEntry::new("projection_validate", "tampering_detected", AuditResult::Alert)
            .with_actor("system")
            .with_target(&path_str)
            .with_details(format!(
                "Content hash mismatch detected (expected {}, actual {})",
                event.expected_hash, event.actual_hash
            )),
    );

    match regenerate_from_store(store, path) {
        Ok(true) => {
            event.regenerated = true;
            info!(path = %path_str, "projection regenerated from store");
            audit_log::record(
                store,
                &AuditEntry::new("projection_validate", "file_regenerated", AuditResult::Success)
                    .with_actor("system")
                    .with_target(&path_str)
                    .with_details("File regenerated from database"),
            );
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to re-read {}", path.display()))?;
            Ok((content, Some(event)))
        }
        Ok(false) => {
            warn!(path = %path_str, "no matching store record, projection left as is");
            audit_log::record(
                store,
                &AuditEntry::new("projection_validate", "file_regenerated", AuditResult::Error)
                    .with_actor("system")
                    .with_target(&path_str)
                    .with_details("No store record for this id and layer"),
            );
            Ok((validation.content, Some(event)))
        }
        Err(e) => {
            warn!(path = %path_str, "Failed to regenerate from store: {}", e);
            audit_log::record(
                store,
                &AuditEntry::new("projection_validate", "file_regenerated", AuditResult::Error)
                    .with_actor("system")
                    .with_target(&path_str)
                    .with_details(format!("Regeneration failed: {}", e)),
            );
            Ok((validation.content, Some(event)))
        }
    }
}
