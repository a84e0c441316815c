//! Line-oriented JSON-RPC server over stdio
//!
//! One request per line in, one response per line out. Requests are handled
//! strictly in order; a tool call runs to completion before the next line
//! is read. Tool failures are returned as results with `isError` set, never
//! as transport errors.

use crate::catalog::{tool_catalog, INSTRUCTIONS, SERVER_NAME};
use crate::protocol::{
    CallParams, CallToolResult, RpcRequest, RpcResponse, INVALID_PARAMS, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use anyhow::Result;
use assay_common::audit_log::{self, AuditEntry, AuditResult};
use assay_common::tools::preconditions::str_arg;
use assay_common::tools::{DecideRequest, ProposeRequest};
use assay_common::{EvidenceStub, RoleAssignment, ToolError, ToolResult, Tools};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Serve until the reader is exhausted
pub async fn serve<R, W>(tools: &mut Tools, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(response) = handle_line(tools, &line) {
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    info!("input closed, shutting down");
    Ok(())
}

/// Handle one input line; None when no reply is due
pub fn handle_line(tools: &mut Tools, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    debug!("Received RPC request: {}", line);

    let response = match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => handle_request(tools, request)?,
        Err(e) => {
            warn!("Failed to parse request: {}", e);
            RpcResponse::error(Value::Null, PARSE_ERROR, "Parse error")
        }
    };

    match serde_json::to_string(&response) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            None
        }
    }
}

fn handle_request(tools: &mut Tools, request: RpcRequest) -> Option<RpcResponse> {
    let RpcRequest {
        method, params, id, ..
    } = request;
    let reply_id = id.clone().unwrap_or(Value::Null);

    match method.as_str() {
        "initialize" => Some(RpcResponse::success(
            reply_id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "instructions": INSTRUCTIONS,
            }),
        )),
        "tools/list" => Some(RpcResponse::success(
            reply_id,
            json!({ "tools": tool_catalog() }),
        )),
        "tools/call" => {
            let params: CallParams =
                match params.map(serde_json::from_value::<CallParams>) {
                    Some(Ok(params)) => params,
                    _ => {
                        return Some(RpcResponse::error(reply_id, INVALID_PARAMS, "Invalid params"))
                    }
                };
            let result = call_tool(tools, &params.name, &params.arguments);
            match serde_json::to_value(result) {
                Ok(value) => Some(RpcResponse::success(reply_id, value)),
                Err(e) => Some(RpcResponse::error(
                    reply_id,
                    INVALID_PARAMS,
                    format!("Failed to encode result: {}", e),
                )),
            }
        }
        "notifications/initialized" => None,
        other => {
            if id.is_some() {
                debug!(method = other, "unknown method");
                Some(RpcResponse::error(reply_id, METHOD_NOT_FOUND, "Method not found"))
            } else {
                None
            }
        }
    }
}

/// Precondition check, then dispatch
pub fn call_tool(tools: &mut Tools, name: &str, args: &Map<String, Value>) -> CallToolResult {
    if let Err(e) = tools.check_preconditions(name, args) {
        audit_log::record(
            tools.store(),
            &AuditEntry::new(name, "precondition_failed", AuditResult::Blocked)
                .with_actor("agent")
                .with_context(&tools.config().context_id)
                .with_input(args)
                .with_details(e.to_string()),
        );
        return CallToolResult::failure(e.to_string());
    }

    match dispatch(tools, name, args) {
        Ok(text) => CallToolResult::text(text),
        Err(e) => {
            info!(tool = name, "tool call failed: {}", e);
            CallToolResult::failure(e.to_string())
        }
    }
}

fn opt_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    Some(str_arg(args, key)).filter(|v| !v.is_empty())
}

fn list_arg(args: &Map<String, Value>, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn dispatch(tools: &mut Tools, name: &str, args: &Map<String, Value>) -> ToolResult<String> {
    let arg = |key: &str| str_arg(args, key);

    match name {
        "assay_status" => tools.status(),
        "assay_propose" => {
            let mut req = ProposeRequest::new(
                arg("title"),
                arg("content"),
                arg("scope"),
                arg("kind"),
                arg("rationale"),
            );
            if let Some(context) = opt_arg(args, "decision_context") {
                req = req.with_decision_context(context);
            }
            req.depends_on = list_arg(args, "depends_on");
            if let Some(cl) = args.get("dependency_cl").and_then(Value::as_i64) {
                req.dependency_cl = cl;
            }
            tools.propose(req)
        }
        "assay_verify" => tools.verify(arg("hypothesis_id"), arg("checks_json"), arg("verdict")),
        "assay_test" => tools.test(
            arg("hypothesis_id"),
            arg("test_type"),
            arg("result"),
            arg("verdict"),
        ),
        "assay_audit" => tools.audit_hypothesis(arg("hypothesis_id"), arg("risks")),
        "assay_decide" => tools.decide(DecideRequest {
            title: arg("title").to_string(),
            winner_id: arg("winner_id").to_string(),
            rejected_ids: list_arg(args, "rejected_ids"),
            context: arg("context").to_string(),
            decision: arg("decision").to_string(),
            rationale: arg("rationale").to_string(),
            consequences: arg("consequences").to_string(),
            characteristics: arg("characteristics").to_string(),
        }),
        "assay_loopback" => tools.refine_loopback(
            arg("parent_id"),
            arg("insight"),
            arg("new_title"),
            arg("new_content"),
            arg("scope"),
        ),
        "assay_transition" => {
            let assignment = RoleAssignment {
                role: arg("role").to_string(),
                session_id: arg("session_id").to_string(),
                context: tools.config().context_id.clone(),
            };
            let stub = EvidenceStub {
                evidence_type: arg("evidence_type").to_string(),
                uri: arg("evidence_uri").to_string(),
                description: arg("evidence_description").to_string(),
                holon_id: opt_arg(args, "holon_id").map(str::to_string),
            };
            let has_stub = !stub.uri.is_empty()
                || !stub.evidence_type.is_empty()
                || stub.holon_id.is_some();
            tools.transition(arg("target_phase"), assignment, has_stub.then_some(stub))
        }
        "assay_calculate_r" => tools.calculate_r(arg("holon_id")),
        "assay_audit_tree" => tools.visualize_audit(arg("holon_id")),
        "assay_check_decay" => tools.check_decay(
            opt_arg(args, "deprecate"),
            opt_arg(args, "waive_id"),
            opt_arg(args, "waive_until"),
            opt_arg(args, "waive_rationale"),
        ),
        "assay_actualize" => tools.actualize(),
        "assay_check_integrity" => tools.check_integrity(opt_arg(args, "path")),
        other => Err(ToolError::InvalidArgument(format!("unknown tool: {}", other))),
    }
}
