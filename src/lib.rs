//! csv-analyzer-mcp: MCP server giving AI assistants read-only access to CSV files
//!
//! An AI client connects over stdio and works with the CSV files in one
//! configured directory:
//!
//! - **Tools**: `read_csv`, `get_csv_info`, `query_csv`, `get_csv_statistics`
//! - **Resources**: `csv://list` (directory listing) and `csv://{filename}`
//!   (preview of a file)
//!
//! Each request loads the file fresh; nothing is cached and nothing is
//! written.
//!
//! # Modules
//!
//! - [`analyzer`] - The CSV operations and their JSON result envelopes
//! - [`config`] - Configuration loading and validation
//! - [`data`] - In-memory tables, type inference, filtering and statistics
//! - [`error`] - Configuration error types
//! - [`mcp`] - MCP protocol implementation

pub mod analyzer;
pub mod config;
pub mod data;
pub mod error;
pub mod mcp;
