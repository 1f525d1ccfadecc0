//! Hubbridge MCP (Model Context Protocol) Server
//!
//! This crate exposes HubSpot CRM operations as MCP tools so AI agents can
//! read and update tasks, meetings, notes, deals and contacts.
//!
//! ## Architecture
//!
//! - `HubbridgeMcpServer`: tool router over [`hubbridge_core::HubSpotService`]
//! - `tools`: tool catalog grouped by category
//!
//! ## Example Usage
//!
//! ```no_run
//! use hubbridge_core::config::{AppConfig, LoadOptions};
//! use hubbridge_mcp::HubbridgeMcpServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(LoadOptions::default())?;
//!     HubbridgeMcpServer::from_config(&config)?.run_stdio().await
//! }
//! ```

mod server;
mod tools;

pub use server::*;
pub use tools::*;

use hubbridge_core::config::ConfigError;
use hubbridge_core::{CrmError, ErrorKind, TransportError};
use rmcp::ErrorData;
use thiserror::Error;

/// Errors specific to MCP server operations
#[derive(Error, Debug)]
pub enum McpServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("http client error: {0}")]
    Transport(#[from] TransportError),

    #[error("crm error: {0}")]
    Crm(#[from] CrmError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl McpServerError {
    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            McpServerError::Crm(error) => match error.kind {
                ErrorKind::Validation | ErrorKind::NotFound => -32602, // Invalid params
                ErrorKind::Authentication => -32001,                   // Server error (permission)
                _ => -32603,
            },
            McpServerError::Config(_)
            | McpServerError::Transport(_)
            | McpServerError::Serialization(_) => -32603, // Internal error
        }
    }
}

impl From<McpServerError> for ErrorData {
    fn from(error: McpServerError) -> Self {
        match error.error_code() {
            -32602 => ErrorData::invalid_params(error.to_string(), None),
            _ => ErrorData::internal_error(error.to_string(), None),
        }
    }
}
