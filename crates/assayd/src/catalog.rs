//! Tool catalogue served by `tools/list`

use crate::protocol::ToolSpec;
use serde_json::{json, Value};

pub const SERVER_NAME: &str = "assayd";

pub const INSTRUCTIONS: &str = "Evidence-gated reasoning over a project knowledge base. \
Workflow: assay_propose (hypothesize) > assay_verify (logical checks) > \
assay_test (empirical validation) > assay_audit (risks, R_eff) > assay_decide (record the DRR). \
Use assay_status to check the phase. State lives in .assay/ per project.";

fn verdict_enum() -> Value {
    json!({ "type": "string", "enum": ["PASS", "FAIL", "REFINE"] })
}

fn holon_id_only(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "holon_id": { "type": "string", "description": description }
        },
        "required": ["holon_id"]
    })
}

/// Every tool the server exposes, in display order
pub fn tool_catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "assay_status",
            description: "Show the current phase, active role, assurance threshold and layer counts.",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "assay_propose",
            description: "Propose a new hypothesis (L0). Use depends_on for holons it needs and decision_context to group alternatives.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Title" },
                    "content": { "type": "string", "description": "Description" },
                    "scope": { "type": "string", "description": "Where this hypothesis applies" },
                    "kind": {
                        "type": "string",
                        "enum": ["system", "episteme"],
                        "description": "system=code/architecture, episteme=process/methodology"
                    },
                    "rationale": { "type": "string", "description": "Why this hypothesis is worth testing" },
                    "decision_context": {
                        "type": "string",
                        "description": "Decision holon grouping competing alternatives (memberOf). Does not affect R_eff."
                    },
                    "depends_on": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Holons this hypothesis requires. Their R_eff caps this one."
                    },
                    "dependency_cl": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 3,
                        "default": 3,
                        "description": "Congruence level of the dependencies: 3 same context, 2 similar, 1 different"
                    }
                },
                "required": ["title", "content", "scope", "kind", "rationale"]
            }),
        },
        ToolSpec {
            name: "assay_verify",
            description: "Record logical verification (L0 -> L1).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "hypothesis_id": { "type": "string" },
                    "checks_json": { "type": "string", "description": "JSON of checks" },
                    "verdict": verdict_enum()
                },
                "required": ["hypothesis_id", "checks_json", "verdict"]
            }),
        },
        ToolSpec {
            name: "assay_test",
            description: "Record empirical validation (L1 -> L2).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "hypothesis_id": { "type": "string" },
                    "test_type": { "type": "string", "description": "internal or research" },
                    "result": { "type": "string", "description": "Test output or findings" },
                    "verdict": verdict_enum()
                },
                "required": ["hypothesis_id", "test_type", "result", "verdict"]
            }),
        },
        ToolSpec {
            name: "assay_audit",
            description: "Record an audit report and show the current R_eff.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "hypothesis_id": { "type": "string" },
                    "risks": { "type": "string", "description": "Risk analysis" }
                },
                "required": ["hypothesis_id", "risks"]
            }),
        },
        ToolSpec {
            name: "assay_decide",
            description: "Finalize a decision as a design rationale record (DRR).",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "winner_id": { "type": "string" },
                    "rejected_ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "IDs of rejected alternatives"
                    },
                    "context": { "type": "string" },
                    "decision": { "type": "string" },
                    "rationale": { "type": "string" },
                    "consequences": { "type": "string" },
                    "characteristics": { "type": "string" }
                },
                "required": ["title", "winner_id", "context", "decision", "rationale", "consequences"]
            }),
        },
        ToolSpec {
            name: "assay_loopback",
            description: "Invalidate a hypothesis and propose its refined successor.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "parent_id": { "type": "string" },
                    "insight": { "type": "string", "description": "What was learned" },
                    "new_title": { "type": "string" },
                    "new_content": { "type": "string" },
                    "scope": { "type": "string" }
                },
                "required": ["parent_id", "insight", "new_title", "new_content"]
            }),
        },
        ToolSpec {
            name: "assay_transition",
            description: "Move to another phase. Requires a role and an evidence anchor; OPERATION also requires R_eff above the threshold.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "target_phase": {
                        "type": "string",
                        "enum": ["IDLE", "ABDUCTION", "DEDUCTION", "INDUCTION", "AUDIT", "DECISION", "OPERATION"]
                    },
                    "role": {
                        "type": "string",
                        "enum": ["Abductor", "Deductor", "Inductor", "Auditor", "Decider"]
                    },
                    "session_id": { "type": "string" },
                    "evidence_type": { "type": "string" },
                    "evidence_uri": { "type": "string", "description": "Artifact anchoring the move" },
                    "evidence_description": { "type": "string" },
                    "holon_id": { "type": "string", "description": "Holon whose R_eff gates OPERATION" }
                },
                "required": ["target_phase", "role"]
            }),
        },
        ToolSpec {
            name: "assay_calculate_r",
            description: "Effective reliability (R_eff) of a holon with a detailed breakdown.",
            input_schema: holon_id_only("ID of the holon"),
        },
        ToolSpec {
            name: "assay_audit_tree",
            description: "Assurance tree of a holon: R scores, dependencies and CL penalties.",
            input_schema: holon_id_only("ID of the holon to audit"),
        },
        ToolSpec {
            name: "assay_check_decay",
            description: "Evidence freshness. No arguments: report. deprecate: step a holon down one layer. waive_id: accept stale evidence until a date.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "deprecate": { "type": "string", "description": "Hypothesis ID to deprecate (L2->L1 or L1->L0)" },
                    "waive_id": { "type": "string", "description": "Evidence ID to waive" },
                    "waive_until": { "type": "string", "description": "YYYY-MM-DD or RFC 3339 (required with waive_id)" },
                    "waive_rationale": { "type": "string", "description": "Reason for accepting stale evidence (required with waive_id)" }
                }
            }),
        },
        ToolSpec {
            name: "assay_actualize",
            description: "Reconcile the knowledge base with repository changes since the last seen commit.",
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        ToolSpec {
            name: "assay_check_integrity",
            description: "Validate projection hashes; tampered files are regenerated from the store.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Single file to check; omit to sweep knowledge/" }
                }
            }),
        },
    ]
}
