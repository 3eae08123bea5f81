//! `webscout` crate (library surface).
//!
//! The `webscout` binary (CLI + MCP stdio) is the primary entrypoint. The library exposes the
//! dispatcher and envelope so an agent loop can call the five capabilities in-process.

pub mod dispatch;
pub mod envelope;

pub use dispatch::{Dispatcher, TOOLS, TOOL_NAMES};
pub use envelope::{ErrorCode, ToolEnvelope};
pub use webscout_core as core;
pub use webscout_local as local;
