use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::{PeerError, ToolPeer};
use crate::models::tool::ToolDescriptor;

const PROTOCOL_VERSION: &str = "2025-06-18";

/// A tool peer reached over JSON-RPC on a child process's stdin/stdout.
///
/// One JSON message per line in each direction. Requests are correlated with
/// responses through numeric ids; a background task drains the child's stdout
/// and completes the matching pending request. If the child exits, every
/// in-flight request fails with a transport error.
pub struct StdioPeer {
    inner: Arc<Inner>,
}

struct Inner {
    command: String,
    writer: Mutex<BufWriter<ChildStdin>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, PeerError>>>>,
    next_id: AtomicU64,
    child: Mutex<Child>,
}

impl StdioPeer {
    /// Spawn `command args...` and run the initialization handshake.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self, PeerError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PeerError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PeerError::Transport("failed to capture peer stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PeerError::Transport("failed to capture peer stdout".into()))?;

        let inner = Arc::new(Inner {
            command: command.to_string(),
            writer: Mutex::new(BufWriter::new(stdin)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            child: Mutex::new(child),
        });

        let reader = Arc::clone(&inner);
        tokio::spawn(async move {
            reader.reader_loop(stdout).await;
        });

        let peer = StdioPeer { inner };
        peer.initialize().await?;
        Ok(peer)
    }

    async fn initialize(&self) -> Result<(), PeerError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        self.inner.request("initialize", params).await?;
        self.inner
            .notify("notifications/initialized", json!({}))
            .await
    }
}

#[async_trait]
impl ToolPeer for StdioPeer {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, PeerError> {
        let result = self.inner.request("tools/list", json!({})).await?;
        let entries = result
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut descriptors = Vec::with_capacity(entries.len());
        for entry in &entries {
            match descriptor_from_value(entry) {
                Some(descriptor) => descriptors.push(descriptor),
                None => {
                    warn!(command = %self.inner.command, "skipping tool advertised without a name")
                }
            }
        }
        Ok(descriptors)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, PeerError> {
        let params = json!({
            "name": name,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        let result = self.inner.request("tools/call", params).await?;
        payload_from_result(result)
    }
}

impl Inner {
    async fn request(&self, method: &str, params: Value) -> Result<Value, PeerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(err) = self.write_message(&message).await {
            let mut pending = self.pending.lock().await;
            pending.remove(&id);
            return Err(err);
        }

        rx.await
            .unwrap_or_else(|_| Err(PeerError::Transport("peer closed the connection".into())))
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), PeerError> {
        let message = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_message(&message).await
    }

    async fn write_message(&self, message: &Value) -> Result<(), PeerError> {
        let mut writer = self.writer.lock().await;
        let line = message.to_string();
        let io = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        io.await
            .map_err(|err| PeerError::Transport(format!("failed to write to peer: {err}")))
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(raw)) = lines.next_line().await {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => self.route_inbound(value).await,
                Err(source) => {
                    warn!(command = %self.command, line = trimmed, %source, "peer sent invalid JSON");
                }
            }
        }

        // Peer stdout closed; fail everything still waiting.
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(PeerError::Transport(
                "peer closed the connection".into(),
            )));
        }
        let mut child = self.child.lock().await;
        let _ = child.kill().await;
    }

    async fn route_inbound(&self, value: Value) {
        let has_method = value.get("method").is_some();
        match value.get("id").and_then(Value::as_u64) {
            Some(id) if !has_method => self.resolve_pending(id, value).await,
            Some(id) => self.answer_server_request(id, &value).await,
            None if has_method => {
                debug!(command = %self.command, "ignoring peer notification");
            }
            None => {}
        }
    }

    async fn resolve_pending(&self, id: u64, value: Value) {
        let sender = {
            let mut pending = self.pending.lock().await;
            pending.remove(&id)
        };
        let Some(sender) = sender else {
            debug!(command = %self.command, response_id = id, "response for unknown request");
            return;
        };

        let outcome = if let Some(error) = value.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            Err(PeerError::Rpc { code, message })
        } else {
            Ok(value.get("result").cloned().unwrap_or(Value::Null))
        };
        let _ = sender.send(outcome);
    }

    async fn answer_server_request(&self, id: u64, value: &Value) {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let reply = match method {
            "ping" => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
            other => {
                warn!(command = %self.command, method = other, "peer sent unsupported request");
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32601,
                        "message": format!("client does not implement method '{other}'"),
                    }
                })
            }
        };
        if let Err(err) = self.write_message(&reply).await {
            warn!(command = %self.command, %err, "failed to answer peer request");
        }
    }
}

fn descriptor_from_value(value: &Value) -> Option<ToolDescriptor> {
    let name = value.get("name")?.as_str()?;
    let description = value
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let input_schema = value
        .get("inputSchema")
        .cloned()
        .unwrap_or_else(|| json!({"type": "object"}));
    Some(ToolDescriptor::new(name, description, input_schema))
}

/// Unwrap a `tools/call` result: tool-reported errors become `PeerError::Rpc`,
/// content arrays collapse to their joined text.
fn payload_from_result(result: Value) -> Result<Value, PeerError> {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let text = result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        });

    if is_error {
        return Err(PeerError::Rpc {
            code: -32000,
            message: text.unwrap_or_else(|| "tool reported an error".into()),
        });
    }
    match text {
        Some(text) => Ok(Value::String(text)),
        None => Ok(result),
    }
}
