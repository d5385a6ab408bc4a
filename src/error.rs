use thiserror::Error;

/// Configuration defects detected before any network activity.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TREASURY_PRIVATE_KEY is not set")]
    MissingCredential,

    #[error("network_id is not set")]
    MissingNetworkId,

    #[error("PUSHGATEWAY is not set")]
    MissingMetricsEndpoint,

    #[error("PUSHGATEWAY `{0}` is not an http(s) url")]
    InvalidMetricsEndpoint(String),

    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("payouts_per_day = {payouts_per_day} gives a payment interval outside 1..=24 hours")]
    IntervalOutOfRange { payouts_per_day: i64 },

    #[error("payouts_per_day = {payouts_per_day} does not divide a day into whole hours")]
    IntervalNotWhole { payouts_per_day: i64 },

    #[error("heartbeat_minutes must be at least 1")]
    HeartbeatTooShort,

    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// Failures while establishing or talking to the node connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("no node endpoint known for network `{0}`; set `resolver`")]
    NoEndpoint(String),

    #[error("invalid node url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unable to reach any node endpoint (tried {tried})")]
    Unreachable { tried: usize },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("request `{0}` timed out")]
    Timeout(&'static str),

    #[error("node returned an error for `{method}`: {message}")]
    Rpc { method: &'static str, message: String },

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("not connected")]
    NotConnected,
}

/// Anything that stops the startup sequence. Every variant is fatal.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("connection failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("node not ready: not synced")]
    NodeNotSynced,

    #[error("node not ready: utxo index is not enabled")]
    MissingUtxoIndex,

    #[error("node is on network `{actual}`, expected `{expected}`")]
    NetworkMismatch { expected: String, actual: String },

    #[error("failed to construct task manager: {0:#}")]
    TaskManager(anyhow::Error),
}
