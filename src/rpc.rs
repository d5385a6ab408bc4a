//! Connection handle for the remote node.
//!
//! The node speaks JSON-framed RPC over a single WebSocket. Requests carry
//! a numeric `id`; the matching response echoes it with either `params` or
//! `error`. Frames with any other id (notifications) are skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::ConnectError;
use crate::resolver::{Resolver, WsStream};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Readiness snapshot reported by the node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub is_synced: bool,
    pub has_utxo_index: bool,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub server_version: Option<String>,
    #[serde(default)]
    pub virtual_daa_score: Option<u64>,
}

/// The single logical connection the orchestrator owns.
#[async_trait]
pub trait NodeConnection: Send + Sync {
    async fn connect(&self) -> Result<(), ConnectError>;

    async fn get_server_info(&self) -> Result<ServerInfo, ConnectError>;

    /// Endpoint of the live connection, once connected.
    fn url(&self) -> Option<String>;
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: Option<u64>,
    params: Option<Value>,
    error: Option<Value>,
}

fn error_message(error: Value) -> String {
    if let Some(s) = error.as_str() {
        return s.to_string();
    }
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

/// Match a text frame against request `id`.
///
/// `Ok(None)` means the frame belongs to something else and should be skipped.
fn decode_response(id: u64, method: &'static str, text: &str) -> Result<Option<Value>, ConnectError> {
    let response: RpcResponse = serde_json::from_str(text)
        .map_err(|e| ConnectError::Protocol(format!("{method}: {e}")))?;

    if response.id != Some(id) {
        return Ok(None);
    }
    if let Some(error) = response.error {
        return Err(ConnectError::Rpc {
            method,
            message: error_message(error),
        });
    }
    response
        .params
        .map(Some)
        .ok_or_else(|| ConnectError::Protocol(format!("{method}: response without params")))
}

async fn read_reply(stream: &mut WsStream, id: u64, method: &'static str) -> Result<Value, ConnectError> {
    while let Some(frame) = stream.next().await {
        match frame? {
            Message::Text(text) => {
                if let Some(params) = decode_response(id, method, &text)? {
                    return Ok(params);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(ConnectError::Protocol(format!("{method}: connection closed by node")))
}

/// WebSocket JSON RPC client.
///
/// The socket is only read while a request is outstanding. Between calls
/// nobody polls it, so node pings go unanswered and a dropped connection is
/// not noticed; there is no reconnect path.
pub struct WrpcClient {
    network_id: String,
    resolver_hint: String,
    stream: Mutex<Option<WsStream>>,
    url: OnceLock<Url>,
    next_id: AtomicU64,
}

impl WrpcClient {
    pub fn new(network_id: impl Into<String>, resolver_hint: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            resolver_hint: resolver_hint.into(),
            stream: Mutex::new(None),
            url: OnceLock::new(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, ConnectError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&RpcRequest { id, method, params })
            .map_err(|e| ConnectError::Protocol(e.to_string()))?;

        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(ConnectError::NotConnected)?;

        stream.send(Message::Text(frame)).await?;
        let params = tokio::time::timeout(REQUEST_TIMEOUT, read_reply(stream, id, method))
            .await
            .map_err(|_| ConnectError::Timeout(method))??;

        serde_json::from_value(params).map_err(|e| ConnectError::Protocol(format!("{method}: {e}")))
    }
}

#[async_trait]
impl NodeConnection for WrpcClient {
    async fn connect(&self) -> Result<(), ConnectError> {
        let resolver = Resolver::from_hint(&self.resolver_hint, &self.network_id)?;
        let (url, stream) = resolver.connect().await?;

        *self.stream.lock().await = Some(stream);
        tracing::info!(url = %url, network_id = %self.network_id, "Connected to node");
        let _ = self.url.set(url);
        Ok(())
    }

    async fn get_server_info(&self) -> Result<ServerInfo, ConnectError> {
        self.call("getServerInfo", serde_json::json!({})).await
    }

    fn url(&self) -> Option<String> {
        self.url.get().map(Url::to_string)
    }
}
