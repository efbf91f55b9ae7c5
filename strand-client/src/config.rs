/// Client configuration and per-session / per-transaction options
use std::time::Duration;
use strand_proto as proto;

/// Default server address
pub const DEFAULT_ADDRESS: &str = "http://localhost:1729";

/// Connection-level configuration for [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, including scheme
    pub address: String,

    /// Timeout for establishing the channel (None = transport default)
    pub connect_timeout: Option<Duration>,

    /// How long `close` waits for open transactions to drain
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            connect_timeout: None,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set server address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set channel connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set shutdown drain timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Options sent with session, transaction and query requests.
///
/// Unset fields defer to the server's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Enable rule inference
    pub infer: Option<bool>,

    /// Return explanations for inferred answers
    pub explain: Option<bool>,

    /// Answers per streamed batch
    pub batch_size: Option<u32>,

    /// Server-side transaction lifetime
    pub transaction_timeout: Option<Duration>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_infer(mut self, infer: bool) -> Self {
        self.infer = Some(infer);
        self
    }

    pub fn with_explain(mut self, explain: bool) -> Self {
        self.explain = Some(explain);
        self
    }

    /// Set answers per batch (clamped to at least 1)
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = Some(timeout);
        self
    }

    pub(crate) fn to_proto(&self) -> proto::Options {
        proto::Options {
            infer: self.infer,
            explain: self.explain,
            batch_size: self
                .batch_size
                .map(|size| i32::try_from(size).unwrap_or(i32::MAX)),
            transaction_timeout_millis: self
                .transaction_timeout
                .map(|t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX)),
        }
    }
}
