/// Remote transactions
use crate::config::Options;
use crate::convert;
use crate::error::Result;
use crate::future::RequestFuture;
use crate::multiplexer::TransactionMultiplexer;
use crate::query::QueryManager;
use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use strand_proto::{self as proto, strand_client::StrandClient, transaction_req, TransactionType};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::transport::Channel;
use tracing::debug;

/// A transaction on an open session.
///
/// All requests share one bidirectional stream. Queries may be issued
/// concurrently from several tasks holding `&Transaction`; each gets its own
/// future or cursor.
///
/// Dropping the transaction releases the stream without waiting; pending
/// requests fail with [`ClientError::TransactionClosed`](crate::ClientError::TransactionClosed).
pub struct Transaction {
    pub(crate) mux: Arc<TransactionMultiplexer>,
    kind: TransactionType,
    options: Options,
    close_timeout: Duration,
}

impl Transaction {
    /// Open a transaction over the `Transaction` RPC.
    pub(crate) async fn open(
        rpc: &StrandClient<Channel>,
        session_id: Bytes,
        kind: TransactionType,
        options: Options,
        network_latency: Duration,
        close_timeout: Duration,
    ) -> Result<Self> {
        let (outbound, requests) = mpsc::unbounded_channel();

        // Issued lazily by the reader task: the call does not resolve until
        // the server has read the open request.
        let mut rpc = rpc.clone();
        let inbound = futures::stream::once(async move {
            rpc.transaction(UnboundedReceiverStream::new(requests))
                .await
                .map(|response| response.into_inner())
        })
        .try_flatten();

        let mux = Arc::new(TransactionMultiplexer::new(outbound, inbound));
        let mut tx = Self::open_with_multiplexer(mux, session_id, kind, options, network_latency).await?;
        tx.close_timeout = close_timeout;
        Ok(tx)
    }

    /// Open a transaction on an already established stream.
    ///
    /// Sends the open request as the stream's first request and waits for
    /// the server to accept it. On failure the stream is released.
    ///
    /// # Arguments
    /// * `mux` - Multiplexer owning a fresh transaction stream
    /// * `session_id` - Id returned when the session was opened
    /// * `kind` - Read or write
    /// * `options` - Options for the transaction and its queries
    /// * `network_latency` - Measured round trip, used by the server for timeouts
    pub async fn open_with_multiplexer(
        mux: Arc<TransactionMultiplexer>,
        session_id: Bytes,
        kind: TransactionType,
        options: Options,
        network_latency: Duration,
    ) -> Result<Self> {
        let open_req = proto::OpenReq {
            session_id,
            r#type: kind as i32,
            options: Some(options.to_proto()),
            network_latency_millis: i32::try_from(network_latency.as_millis()).unwrap_or(i32::MAX),
        };

        let result = match mux.send_single(transaction_req::Req::OpenReq(open_req), convert::expect_open) {
            Ok(open) => open.get().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            mux.close_within(Duration::ZERO).await;
            return Err(e);
        }

        debug!(transaction_type = ?kind, "Transaction opened");
        Ok(Self {
            mux,
            kind,
            options,
            close_timeout: crate::multiplexer::DEFAULT_CLOSE_TIMEOUT,
        })
    }

    /// Query operations on this transaction
    pub fn query(&self) -> QueryManager<'_> {
        QueryManager::new(&self.mux, self.options.clone())
    }

    /// Commit and close the transaction
    ///
    /// The transaction is closed whether or not the commit succeeds.
    pub async fn commit(&self) -> Result<()> {
        let result = match self.mux.send_single(
            transaction_req::Req::CommitReq(proto::CommitReq {}),
            convert::expect_commit,
        ) {
            Ok(commit) => commit.get().await,
            Err(e) => Err(e),
        };
        self.close().await;

        if result.is_ok() {
            debug!("Transaction committed");
        }
        result
    }

    /// Discard uncommitted writes; the transaction stays open
    pub fn rollback(&self) -> Result<RequestFuture<()>> {
        self.mux.send_single(
            transaction_req::Req::RollbackReq(proto::RollbackReq {}),
            convert::expect_rollback,
        )
    }

    /// Close the transaction, letting in-flight requests finish first
    pub async fn close(&self) {
        self.mux.close_within(self.close_timeout).await;
    }

    pub fn is_open(&self) -> bool {
        self.mux.is_open()
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.kind
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The multiplexer carrying this transaction's requests
    pub fn multiplexer(&self) -> &TransactionMultiplexer {
        &self.mux
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("type", &self.kind)
            .field("mux", &self.mux)
            .finish()
    }
}
