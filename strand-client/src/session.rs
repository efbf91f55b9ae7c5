/// Sessions: a database binding under which transactions are opened
use crate::config::Options;
use crate::error::{ClientError, Result};
use crate::multiplexer::TransactionMultiplexer;
use crate::transaction::Transaction;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use futures::future::join_all;
use std::time::Duration;
use strand_proto::{self as proto, strand_client::StrandClient, SessionType, TransactionType};
use tokio::time::Instant;
use tonic::transport::Channel;
use tracing::{debug, warn};

pub(crate) struct SessionInner {
    rpc: StrandClient<Channel>,
    id: Bytes,
    database: String,
    kind: SessionType,
    options: Options,
    network_latency: Duration,
    shutdown_timeout: Duration,
    open: AtomicBool,
    transactions: Mutex<Vec<Weak<TransactionMultiplexer>>>,
}

impl SessionInner {
    /// Close live transactions, then the session itself, all within
    /// `shutdown_timeout`. Idempotent.
    pub(crate) async fn close(&self) -> Result<()> {
        self.close_by(Instant::now() + self.shutdown_timeout).await
    }

    /// Close against a deadline that may be shared with other sessions.
    pub(crate) async fn close_by(&self, deadline: Instant) -> Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let live: Vec<Arc<TransactionMultiplexer>> = self
            .transactions
            .lock()
            .drain(..)
            .filter_map(|tx| tx.upgrade())
            .collect();
        let remaining = deadline.saturating_duration_since(Instant::now());
        join_all(live.iter().map(|mux| mux.close_within(remaining))).await;

        let mut rpc = self.rpc.clone();
        let request = rpc.session_close(proto::SessionCloseReq {
            session_id: self.id.clone(),
        });
        match tokio::time::timeout_at(deadline, request).await {
            Ok(response) => {
                response?;
            }
            Err(_) => {
                warn!(
                    database = %self.database,
                    transactions = live.len(),
                    "Shutdown deadline elapsed before the session close was acknowledged"
                );
                return Err(ClientError::Timeout(format!(
                    "closing session on '{}'",
                    self.database
                )));
            }
        }

        debug!(database = %self.database, transactions = live.len(), "Session closed");
        Ok(())
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.open.load(Ordering::SeqCst) {
            return;
        }
        // Best effort: tell the server unless the runtime is already gone
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let mut rpc = self.rpc.clone();
            let session_id = self.id.clone();
            let database = self.database.clone();
            handle.spawn(async move {
                if let Err(e) = rpc.session_close(proto::SessionCloseReq { session_id }).await {
                    warn!(database = %database, error = %e, "Failed to close dropped session");
                }
            });
        }
    }
}

/// An open session on one database.
///
/// # Example
/// ```no_run
/// # use strand_client::{Client, SessionType, TransactionType};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::connect("http://localhost:1729").await?;
/// let session = client.session("social", SessionType::Data).await?;
///
/// let tx = session.transaction(TransactionType::Write).await?;
/// tx.query().insert("insert $p isa person;")?.collect_all().await?;
/// tx.commit().await?;
///
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) async fn open(
        rpc: &StrandClient<Channel>,
        database: &str,
        kind: SessionType,
        options: Options,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        if database.is_empty() {
            return Err(ClientError::InvalidArgument(
                "database name is empty".to_string(),
            ));
        }

        let mut rpc = rpc.clone();
        let started = Instant::now();
        let response = rpc
            .session_open(proto::SessionOpenReq {
                database: database.to_string(),
                r#type: kind as i32,
                options: Some(options.to_proto()),
            })
            .await?
            .into_inner();
        let network_latency = started.elapsed();

        debug!(
            database = %database,
            session_type = ?kind,
            latency_ms = network_latency.as_millis() as u64,
            "Session opened"
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                rpc,
                id: response.session_id,
                database: database.to_string(),
                kind,
                options,
                network_latency,
                shutdown_timeout,
                open: AtomicBool::new(true),
                transactions: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Open a transaction with the session's options
    pub async fn transaction(&self, kind: TransactionType) -> Result<Transaction> {
        self.transaction_with_options(kind, self.inner.options.clone())
            .await
    }

    /// Open a transaction with explicit options
    pub async fn transaction_with_options(
        &self,
        kind: TransactionType,
        options: Options,
    ) -> Result<Transaction> {
        if !self.is_open() {
            return Err(ClientError::SessionClosed(format!(
                "session on '{}' is closed",
                self.inner.database
            )));
        }

        let tx = Transaction::open(
            &self.inner.rpc,
            self.inner.id.clone(),
            kind,
            options,
            self.inner.network_latency,
            self.inner.shutdown_timeout,
        )
        .await?;

        let mut transactions = self.inner.transactions.lock();
        transactions.retain(|tx| tx.strong_count() > 0);
        transactions.push(Arc::downgrade(&tx.mux));
        Ok(tx)
    }

    /// Close open transactions and the session, within the client's
    /// `shutdown_timeout`
    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn session_type(&self) -> SessionType {
        self.inner.kind
    }

    /// Round trip measured when the session was opened
    pub fn network_latency(&self) -> Duration {
        self.inner.network_latency
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.inner.database)
            .field("type", &self.inner.kind)
            .field("open", &self.is_open())
            .finish()
    }
}
