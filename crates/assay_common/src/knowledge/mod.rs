//! Knowledge Store v0.4.0
//!
//! Relational persistence for the evidentiary lifecycle:
//! - Holons (hypotheses, decisions, decision records) with their layer
//! - Append-only evidence with validity windows
//! - Typed relations, with cycle-safe creation for propagating edges
//! - Time-boxed waivers against evidence decay
//!
//! Storage: `<project>/.assay/assay.db`

pub mod schema;
pub mod store;

pub use schema::*;
pub use store::KnowledgeStore;
