use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::ConnectError;

/// How long a single endpoint handshake may take.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of one handshake attempt against an endpoint.
#[derive(Debug)]
struct Handshake<S> {
    url: Url,
    latency: Option<Duration>,
    stream: Option<S>,
}

/// Reachable endpoints first, fastest first; unreachable ones keep hint order.
fn rank<S>(attempts: &mut [Handshake<S>]) {
    attempts.sort_by_key(|h| (h.latency.is_none(), h.latency));
}

/// Well-known local JSON RPC port for each network.
fn default_port(network_id: &str) -> Option<u16> {
    match network_id {
        "mainnet" => Some(18110),
        "testnet-10" => Some(18210),
        "testnet-11" => Some(18310),
        "simnet" => Some(18610),
        "devnet" => Some(18710),
        _ => None,
    }
}

/// Candidate node endpoints taken from the resolver hint.
#[derive(Debug, Clone)]
pub struct Resolver {
    urls: Vec<Url>,
}

impl Resolver {
    /// Parse the comma-separated hint, falling back to the network's local endpoint.
    pub fn from_hint(hint: &str, network_id: &str) -> Result<Self, ConnectError> {
        let mut raw: Vec<String> = hint
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if raw.is_empty() {
            let port = default_port(network_id)
                .ok_or_else(|| ConnectError::NoEndpoint(network_id.to_string()))?;
            raw.push(format!("ws://127.0.0.1:{port}"));
        }

        let urls = raw
            .into_iter()
            .map(|url| Url::parse(&url).map_err(|source| ConnectError::InvalidUrl { url, source }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { urls })
    }

    pub fn candidates(&self) -> impl Iterator<Item = &Url> {
        self.urls.iter()
    }

    /// Handshake with every candidate at once and keep the fastest live stream.
    pub async fn connect(&self) -> Result<(Url, WsStream), ConnectError> {
        let results = join_all(self.urls.iter().map(|url| async move {
            let start = Instant::now();
            let result = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(url.as_str())).await;
            (url, start.elapsed(), result)
        }))
        .await;

        let mut attempts: Vec<Handshake<WsStream>> = results
            .into_iter()
            .map(|(url, elapsed, result)| match result {
                Ok(Ok((stream, _response))) => {
                    tracing::debug!(url = %url, elapsed_ms = elapsed.as_millis() as u64, "Endpoint handshake succeeded");
                    Handshake {
                        url: url.clone(),
                        latency: Some(elapsed),
                        stream: Some(stream),
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %url, error = %e, "Endpoint handshake failed");
                    Handshake {
                        url: url.clone(),
                        latency: None,
                        stream: None,
                    }
                }
                Err(_) => {
                    tracing::warn!(url = %url, "Endpoint handshake timed out");
                    Handshake {
                        url: url.clone(),
                        latency: None,
                        stream: None,
                    }
                }
            })
            .collect();

        rank(&mut attempts);
        let tried = attempts.len();

        attempts
            .into_iter()
            .find_map(|h| h.stream.map(|stream| (h.url, stream)))
            .ok_or(ConnectError::Unreachable { tried })
    }
}
