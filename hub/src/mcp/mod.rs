//! MCP tool-server sessions
//!
//! Spawns tool servers over stdio, keeps one session per server name and
//! exposes their tools under `{server}__{tool}` names.

pub mod namespace;
pub mod session;
pub mod transport;
pub mod types;

pub use namespace::{ToolCatalog, ToolFormat};
pub use session::{SessionConfig, SessionManager};
pub use types::{ServerSpec, ToolDescriptor, ToolOutput};
