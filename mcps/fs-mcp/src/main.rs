//! fs-mcp - read-only filesystem tools over stdio

use fs_mcp::FsMcpServer;

mcp_common::serve_stdio!(FsMcpServer, "fs_mcp");
