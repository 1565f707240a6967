//! Helpers shared by the hub and the tool servers it launches
//!
//! [`init_tracing`] and `serve_stdio!` set up a process; [`json_success`],
//! [`text_success`] and [`text_error`] build tool responses; [`invalid_params`]
//! and [`internal_error`] build protocol errors.
//!
//! ```rust,ignore
//! mcp_common::serve_stdio!(FsMcpServer, "fs_mcp");
//! ```

pub mod error;
pub mod init;
pub mod result;

pub use error::{internal_error, invalid_params, McpResult};
pub use init::init_tracing;
pub use result::{json_success, text_error, text_success};

pub use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
