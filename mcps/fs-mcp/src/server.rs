//! MCP server exposing the read-only filesystem tools

use mcp_common::{CallToolResult, McpError};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

use crate::handlers;
use crate::params::{FileInfoParams, ListParams, ReadFileParams};
use crate::root::Root;

#[derive(Clone)]
pub struct FsMcpServer {
    root: Root,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl FsMcpServer {
    /// Serve the directory named by `FS_MCP_ROOT`, or the working directory
    pub fn new() -> Self {
        Self::with_root(Root::from_env())
    }

    pub fn with_root(root: Root) -> Self {
        tracing::info!("Serving {}", root.base().display());
        Self {
            root,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Read the complete contents of a text file.")]
    async fn read_file(
        &self,
        Parameters(params): Parameters<ReadFileParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::read_file(&self.root, params).await
    }

    #[tool(description = "List the entries of a directory with their type and size.")]
    async fn list(
        &self,
        Parameters(params): Parameters<ListParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list(&self.root, params).await
    }

    #[tool(description = "Get size, type and modification time of a file or directory.")]
    async fn file_info(
        &self,
        Parameters(params): Parameters<FileInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::file_info(&self.root, params).await
    }
}

#[tool_handler]
impl rmcp::ServerHandler for FsMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Read-only filesystem access confined to one root directory. \
                 Paths are relative to that root."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

impl Default for FsMcpServer {
    fn default() -> Self {
        Self::new()
    }
}
