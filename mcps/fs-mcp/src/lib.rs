//! Read-only filesystem MCP server
//!
//! Exposes `read_file`, `list` and `file_info` for paths under a single root
//! directory, taken from `FS_MCP_ROOT` or the working directory.

pub mod handlers;
pub mod params;
pub mod root;
pub mod server;
pub mod types;

pub use server::FsMcpServer;
