use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::tool::ToolDescriptor;

pub mod stdio;
pub mod sysinfo;

/// Transport and protocol failures talking to the tool-execution peer.
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("failed to spawn peer process `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("peer connection lost: {0}")]
    Transport(String),

    #[error("peer returned error {code}: {message}")]
    Rpc { code: i64, message: String },
}

/// The discovery and invocation contract offered by the tool-execution peer.
///
/// The peer, not the caller, is responsible for executing a tool's side
/// effects; the caller treats tools as opaque named functions.
#[async_trait]
pub trait ToolPeer: Send + Sync {
    /// List the tools currently advertised by the peer, in advertisement order.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, PeerError>;

    /// Execute one named tool and return its payload, or the peer's error.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, PeerError>;
}
