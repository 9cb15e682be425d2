//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the CSV operations to AI assistants as MCP tools and
//! resources. The server communicates over stdio transport using JSON-RPC 2.0
//! messages.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         MCP Server                          │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│   Server    │───▶│ Tools and   │    │
//! │   │   (stdio)   │    │  (lifecycle)│    │ resources   │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          │                  │                  │            │
//! │          ▼                  ▼                  ▼            │
//! │   ┌──────────────────┐            ┌──────────────────┐     │
//! │   │ JSON-RPC Messages│            │   CsvAnalyzer    │     │
//! │   └──────────────────┘            └──────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod protocol;
pub mod resources;
pub mod server;
pub mod transport;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, ServerState};
pub use transport::{StdioTransport, Transport};
