// crates/mcs-core/src/lib.rs
// ============================================================================
// Module: MCS Core Library
// Description: Tool contract and RPC wire model for the MCS gateway.
// Purpose: Give native tools, remote backends, and the gateway one vocabulary.
// Dependencies: serde, serde_json, base64, thiserror
// ============================================================================

//! ## Overview
//! `mcs-core` defines what a tool is ([`ToolSource`]), what it produces
//! ([`OutputItem`] sequences), and how results travel over the RPC surface
//! ([`ToolCallChunk`]). It has no I/O of its own; the gateway and tool crates
//! build on these types.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod native;
pub mod protocol;
pub mod tool;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use native::NativeToolSource;
pub use protocol::CALL_TOOL_PATH;
pub use protocol::ChunkContent;
pub use protocol::HEALTH_PATH;
pub use protocol::ImagePayload;
pub use protocol::LIST_TOOLS_PATH;
pub use protocol::ListToolsResponse;
pub use protocol::NDJSON_CONTENT_TYPE;
pub use protocol::RpcCode;
pub use protocol::RpcStatus;
pub use protocol::ToolCallChunk;
pub use protocol::ToolCallRequest;
pub use protocol::ToolDefinition;
pub use tool::FaultKind;
pub use tool::OutputItem;
pub use tool::OutputStream;
pub use tool::ToolArguments;
pub use tool::ToolFault;
pub use tool::ToolOutput;
pub use tool::ToolSource;
