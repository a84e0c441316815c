//! Argument and lifecycle checks run before a tool is dispatched
//!
//! Each failure names the tool, the unmet condition, and a suggestion for
//! the caller. A failed check never touches the store beyond reads.

use super::Tools;
use crate::error::{ToolError, ToolResult};
use crate::knowledge::{HolonKind, Layer, Verdict};
use crate::phase::Phase;
use serde_json::{Map, Value};

/// String argument, empty when missing or not a string
pub fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or("")
}

fn require(tool: &str, args: &Map<String, Value>, key: &str) -> ToolResult<()> {
    if str_arg(args, key).trim().is_empty() {
        return Err(ToolError::precondition(
            tool,
            format!("{} is required", key),
            format!("provide a non-empty {}", key),
        ));
    }
    Ok(())
}

fn require_verdict(tool: &str, args: &Map<String, Value>) -> ToolResult<()> {
    let verdict = str_arg(args, "verdict");
    match Verdict::parse(verdict) {
        Some(Verdict::Pass | Verdict::Fail | Verdict::Refine) => Ok(()),
        _ => Err(ToolError::precondition(
            tool,
            format!("invalid verdict '{}'", verdict),
            "use PASS, FAIL or REFINE",
        )),
    }
}

impl Tools {
    fn require_existing(&self, tool: &str, id: &str) -> ToolResult<Layer> {
        match self.store.get_holon(id)? {
            Some(holon) => Ok(holon.layer),
            None => Err(ToolError::precondition(
                tool,
                format!("holon '{}' not found", id),
                "check the id with assay_status or propose it first",
            )),
        }
    }

    /// Validate a tool call before dispatch
    pub fn check_preconditions(&self, tool: &str, args: &Map<String, Value>) -> ToolResult<()> {
        match tool {
            "assay_propose" => {
                require(tool, args, "title")?;
                require(tool, args, "content")?;
                let kind = str_arg(args, "kind");
                if !kind.is_empty() && HolonKind::parse(kind).is_none() {
                    return Err(ToolError::precondition(
                        tool,
                        format!("invalid kind '{}'", kind),
                        "use 'system' or 'episteme'",
                    ));
                }
            }
            "assay_verify" => {
                require(tool, args, "hypothesis_id")?;
                let id = str_arg(args, "hypothesis_id");
                if self.require_existing(tool, id)? != Layer::L0 {
                    return Err(ToolError::precondition(
                        tool,
                        format!("hypothesis '{}' is not in L0", id),
                        "only L0 hypotheses can be verified",
                    ));
                }
                require_verdict(tool, args)?;
            }
            "assay_test" => {
                require(tool, args, "hypothesis_id")?;
                let id = str_arg(args, "hypothesis_id");
                if self.require_existing(tool, id)? == Layer::L0 {
                    return Err(ToolError::precondition(
                        tool,
                        format!("hypothesis '{}' is still in L0", id),
                        "run assay_verify to promote it to L1 before testing",
                    ));
                }
                require_verdict(tool, args)?;
            }
            "assay_audit" => {
                require(tool, args, "hypothesis_id")?;
                self.require_existing(tool, str_arg(args, "hypothesis_id"))?;
            }
            "assay_decide" => {
                require(tool, args, "title")?;
                require(tool, args, "winner_id")?;
                let counts = self.store.count_holons_by_layer(&self.config.context_id)?;
                if counts.get(Layer::L2.as_str()).copied().unwrap_or(0) == 0 {
                    return Err(ToolError::precondition(
                        tool,
                        "no L2 hypotheses exist",
                        "validate at least one hypothesis with assay_test first",
                    ));
                }
            }
            "assay_calculate_r" | "assay_audit_tree" => {
                require(tool, args, "holon_id")?;
                let id = str_arg(args, "holon_id");
                if !(tool == "assay_audit_tree" && id == "all") {
                    self.require_existing(tool, id)?;
                }
            }
            "assay_loopback" => {
                require(tool, args, "parent_id")?;
                require(tool, args, "insight")?;
                require(tool, args, "new_title")?;
            }
            "assay_transition" => {
                let target = str_arg(args, "target_phase");
                if Phase::parse(target).is_none() {
                    return Err(ToolError::precondition(
                        tool,
                        format!("invalid target_phase '{}'", target),
                        "use IDLE, ABDUCTION, DEDUCTION, INDUCTION, AUDIT, DECISION or OPERATION",
                    ));
                }
                require(tool, args, "role")?;
            }
            "assay_check_decay" => {
                if !str_arg(args, "waive_id").is_empty() {
                    require(tool, args, "waive_until")?;
                    require(tool, args, "waive_rationale")?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_propose_requires_title_and_valid_kind() {
        let (tools, _dir) = test_tools();
        let err = tools
            .check_preconditions("assay_propose", &args(json!({"content": "c"})))
            .unwrap_err();
        assert!(err.to_string().starts_with("[assay_propose] precondition failed: title is required"));

        assert!(tools
            .check_preconditions(
                "assay_propose",
                &args(json!({"title": "t", "content": "c", "kind": "rock"}))
            )
            .is_err());
        assert!(tools
            .check_preconditions("assay_propose", &args(json!({"title": "t", "content": "c"})))
            .is_ok());
    }

    #[test]
    fn test_verify_and_test_layer_gates() {
        let (mut tools, _dir) = test_tools();
        let id = propose_simple(&mut tools, "Gate");

        let verify = args(json!({"hypothesis_id": id, "verdict": "PASS"}));
        assert!(tools.check_preconditions("assay_verify", &verify).is_ok());

        let test = args(json!({"hypothesis_id": id, "verdict": "PASS"}));
        let err = tools.check_preconditions("assay_test", &test).unwrap_err();
        assert!(err.to_string().contains("still in L0"));

        tools.verify(&id, "{}", "PASS").unwrap();
        assert!(tools.check_preconditions("assay_verify", &verify).is_err());
        assert!(tools.check_preconditions("assay_test", &test).is_ok());

        let bad = args(json!({"hypothesis_id": id, "verdict": "MAYBE"}));
        assert!(tools.check_preconditions("assay_test", &bad).is_err());
    }

    #[test]
    fn test_decide_needs_l2() {
        let (mut tools, _dir) = test_tools();
        let id = propose_simple(&mut tools, "Choice");
        let call = args(json!({"title": "Final", "winner_id": id}));
        let err = tools.check_preconditions("assay_decide", &call).unwrap_err();
        assert!(err.to_string().contains("no L2 hypotheses exist"));

        tools.verify(&id, "{}", "PASS").unwrap();
        tools.test(&id, "internal", "ok", "PASS").unwrap();
        assert!(tools.check_preconditions("assay_decide", &call).is_ok());
    }

    #[test]
    fn test_misc_checks() {
        let (tools, _dir) = test_tools();
        assert!(tools
            .check_preconditions("assay_calculate_r", &args(json!({"holon_id": "ghost"})))
            .is_err());
        assert!(tools
            .check_preconditions("assay_audit_tree", &args(json!({"holon_id": "all"})))
            .is_ok());
        assert!(tools
            .check_preconditions("assay_transition", &args(json!({"target_phase": "NOWHERE", "role": "Decider"})))
            .is_err());
        assert!(tools
            .check_preconditions("assay_check_decay", &args(json!({"waive_id": "e1"})))
            .is_err());
        assert!(tools.check_preconditions("assay_status", &Map::new()).is_ok());
    }
}
