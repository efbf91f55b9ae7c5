/// Strand gRPC client implementation
use crate::config::{ClientConfig, Options};
use crate::database::DatabaseManager;
use crate::error::{ClientError, Result};
use crate::session::{Session, SessionInner};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use futures::future::join_all;
use std::sync::{Arc, Weak};
use strand_proto::{strand_client::StrandClient, SessionType};
use tokio::time::Instant;
use tonic::transport::{Channel, Endpoint};
use tracing::{info, warn};

/// Strand remote client
///
/// Holds one gRPC channel shared by every session and transaction opened
/// through it.
pub struct Client {
    rpc: StrandClient<Channel>,
    config: ClientConfig,
    open: AtomicBool,
    sessions: Mutex<Vec<Weak<SessionInner>>>,
}

impl Client {
    /// Connect to a Strand server
    ///
    /// # Arguments
    /// * `addr` - Server address (e.g., "http://127.0.0.1:1729")
    ///
    /// # Example
    /// ```no_run
    /// # use strand_client::Client;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = Client::connect("http://localhost:1729").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig::default().with_address(addr)).await
    }

    /// Connect using an explicit configuration
    ///
    /// # Example
    /// ```no_run
    /// # use strand_client::{Client, ClientConfig};
    /// # use std::time::Duration;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ClientConfig::new()
    ///     .with_address("http://db.internal:1729")
    ///     .with_connect_timeout(Duration::from_secs(5));
    /// let client = Client::with_config(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        let mut endpoint = Endpoint::from_shared(config.address.clone())
            .map_err(|e| ClientError::ConnectionError(format!("Invalid address: {}", e)))?;
        if let Some(timeout) = config.connect_timeout {
            endpoint = endpoint.connect_timeout(timeout);
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ClientError::ConnectionError(format!("Failed to connect: {}", e)))?;

        info!(address = %config.address, "Connected to Strand server");

        Ok(Self {
            rpc: StrandClient::new(channel),
            config,
            open: AtomicBool::new(true),
            sessions: Mutex::new(Vec::new()),
        })
    }

    /// Database management operations
    pub fn databases(&self) -> DatabaseManager {
        DatabaseManager::new(self.rpc.clone())
    }

    /// Open a session with default options
    ///
    /// # Arguments
    /// * `database` - Database name
    /// * `kind` - `SessionType::Data` for data queries, `SessionType::Schema` for definitions
    pub async fn session(&self, database: &str, kind: SessionType) -> Result<Session> {
        self.session_with_options(database, kind, Options::default())
            .await
    }

    /// Open a session with explicit options
    pub async fn session_with_options(
        &self,
        database: &str,
        kind: SessionType,
        options: Options,
    ) -> Result<Session> {
        if !self.is_open() {
            return Err(ClientError::ConnectionError("client is closed".to_string()));
        }

        let session = Session::open(
            &self.rpc,
            database,
            kind,
            options,
            self.config.shutdown_timeout,
        )
        .await?;

        let mut sessions = self.sessions.lock();
        sessions.retain(|s| s.strong_count() > 0);
        sessions.push(Arc::downgrade(&session.inner));
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Close every live session, then stop accepting new ones. Idempotent.
    ///
    /// Sessions close concurrently; the whole shutdown, including each
    /// session's transactions, is bounded by `shutdown_timeout`.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        let live: Vec<Arc<SessionInner>> = self
            .sessions
            .lock()
            .drain(..)
            .filter_map(|s| s.upgrade())
            .collect();

        let results = join_all(live.iter().map(|session| session.close_by(deadline))).await;
        for e in results.into_iter().filter_map(|r| r.err()) {
            warn!(error = %e, "Failed to close session during shutdown");
        }

        info!(sessions = live.len(), "Client closed");
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.config.address)
            .field("open", &self.is_open())
            .finish()
    }
}
