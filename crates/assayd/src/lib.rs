//! Assay Daemon - JSON-RPC front end over stdio
//!
//! Maps `tools/call` requests onto the tool façade in `assay_common`.

pub mod catalog;
pub mod protocol;
pub mod rpc_server;

pub use rpc_server::{call_tool, handle_line, serve};
