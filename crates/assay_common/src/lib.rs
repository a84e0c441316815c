//! Assay Common - knowledge engine for evidence-gated reasoning v0.4.0
//!
//! Hypotheses move through evidence layers (L0 -> L1 -> L2) under a phase
//! state machine. Reliability is the weakest link of a holon's own evidence
//! and its structural dependencies. Every holon is mirrored to a hashed
//! markdown projection that is regenerated from the store when edited.

pub mod audit_log;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod paths;
pub mod phase;
pub mod projection;
pub mod reliability;
pub mod tools;
pub mod work_record;

pub use config::AssayConfig;
pub use error::{ToolError, ToolResult};
pub use knowledge::KnowledgeStore;
pub use paths::AssayPaths;
pub use phase::{EvidenceStub, Phase, PhaseMachine, Role, RoleAssignment, TransitionDecision};
pub use reliability::{ReliabilityEngine, ReliabilityReport};
pub use tools::Tools;
