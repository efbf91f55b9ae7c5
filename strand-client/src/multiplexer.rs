/// Transaction multiplexer: many logical requests over one bidirectional stream
///
/// Every outbound request gets a fresh [`RequestId`] and a response collector
/// registered under it *before* the request is written, so a response can never
/// arrive ahead of its registration. A single reader task owns the inbound half
/// and routes each response to its collector by id.

use crate::collector::{ends_stream, SingleCollector, StreamingCollector};
use crate::cursor::ResultCursor;
use crate::error::{ClientError, Result};
use crate::future::RequestFuture;
use crate::request_id::RequestId;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use strand_proto::{transaction_req, StreamReq, StreamSignal, TransactionReq, TransactionRes};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tonic::Status;
use tracing::{debug, error, warn};

/// Deadline used by [`TransactionMultiplexer::close`].
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of the shared stream.
///
/// `Draining` is entered only by a client-initiated
/// [`close_within`](TransactionMultiplexer::close_within). When the channel
/// itself ends or breaks, the state moves straight from `Open` (or
/// `Draining`) to `Closed` and every pending request fails with that cause
/// in the same step, so no waiter is left behind on a dead stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting new requests
    Open,
    /// Closing: no new requests, pending ones may still finish
    Draining,
    /// Terminated; every later send fails with the recorded cause
    Closed(ClientError),
}

#[derive(Clone)]
enum Pending {
    Single(Arc<SingleCollector>),
    Streaming(Arc<StreamingCollector>),
}

impl Pending {
    fn deliver(&self, res: TransactionRes) -> Result<()> {
        match self {
            Pending::Single(collector) => collector.deliver(res),
            Pending::Streaming(collector) => collector.deliver(res),
        }
    }

    fn fail(&self, cause: ClientError) {
        match self {
            Pending::Single(collector) => {
                collector.fail(cause);
            }
            Pending::Streaming(collector) => {
                collector.fail(cause);
            }
        }
    }
}

struct Dispatch {
    pending: HashMap<RequestId, Pending>,
    outbound: Option<mpsc::UnboundedSender<TransactionReq>>,
    state: StreamState,
}

impl Dispatch {
    fn ensure_open(&self) -> Result<&mpsc::UnboundedSender<TransactionReq>> {
        match &self.state {
            StreamState::Open => self
                .outbound
                .as_ref()
                .ok_or_else(|| ClientError::Transport("outbound stream released".to_string())),
            StreamState::Draining => Err(ClientError::TransactionClosed(
                "transaction is closing".to_string(),
            )),
            StreamState::Closed(cause) => Err(cause.clone()),
        }
    }
}

fn stream_req(id: RequestId, signal: StreamSignal) -> TransactionReq {
    TransactionReq {
        id: id.to_wire(),
        metadata: HashMap::new(),
        req: Some(transaction_req::Req::StreamReq(StreamReq {
            signal: signal as i32,
        })),
    }
}

/// State shared between the multiplexer handle, its reader task and any
/// outstanding cursors.
pub(crate) struct Shared {
    dispatch: Mutex<Dispatch>,
    drained: Notify,
}

impl Shared {
    /// Register `pending` under a fresh id and write the request.
    ///
    /// Registration and transmission happen under one lock so that the table
    /// never holds an id whose request failed to go out.
    fn register_and_send(&self, pending: Pending, req: transaction_req::Req) -> Result<RequestId> {
        let mut dispatch = self.dispatch.lock();
        let outbound = dispatch.ensure_open()?.clone();

        let id = loop {
            let id = RequestId::generate();
            if !dispatch.pending.contains_key(&id) {
                break id;
            }
        };

        dispatch.pending.insert(id, pending);
        let request = TransactionReq {
            id: id.to_wire(),
            metadata: HashMap::new(),
            req: Some(req),
        };

        if outbound.send(request).is_err() {
            dispatch.pending.remove(&id);
            return Err(ClientError::Transport(
                "outbound stream closed".to_string(),
            ));
        }

        debug!(
            request_id = %id,
            pending = dispatch.pending.len(),
            "Request sent"
        );
        Ok(id)
    }

    /// Route one inbound response to its collector.
    fn on_message(&self, res: TransactionRes) {
        let Some(id) = RequestId::parse(&res.id) else {
            warn!(request_id = %res.id, "Dropping response with unparsable request id");
            return;
        };

        let pending = {
            let mut dispatch = self.dispatch.lock();
            let Some(pending) = dispatch.pending.get(&id).cloned() else {
                warn!(request_id = %id, "Dropping response for unknown request");
                return;
            };

            let complete = match &pending {
                Pending::Single(_) => true,
                Pending::Streaming(_) => ends_stream(&res),
            };
            if complete {
                dispatch.pending.remove(&id);
                if dispatch.pending.is_empty() {
                    self.drained.notify_waiters();
                }
            }
            pending
        };

        if let Err(e) = pending.deliver(res) {
            warn!(request_id = %id, error = %e, "Dropping undeliverable response");
        }
    }

    /// Terminate the stream and fail everything still pending with `cause`.
    ///
    /// Only the first cause is recorded; later calls are no-ops.
    pub(crate) fn on_stream_closed(&self, cause: ClientError) {
        let orphaned: Vec<Pending> = {
            let mut dispatch = self.dispatch.lock();
            if matches!(dispatch.state, StreamState::Closed(_)) {
                return;
            }
            dispatch.state = StreamState::Closed(cause.clone());
            dispatch.outbound = None;
            dispatch.pending.drain().map(|(_, pending)| pending).collect()
        };
        self.drained.notify_waiters();

        debug!(
            failed_requests = orphaned.len(),
            cause = %cause,
            "Transaction stream closed"
        );

        for pending in orphaned {
            pending.fail(cause.clone());
        }
    }

    /// Ask the server for the next batch of a streamed request.
    ///
    /// Reuses the request's id and registers nothing. Allowed while draining
    /// so that open cursors can still finish.
    pub(crate) fn send_continue(&self, id: RequestId) -> Result<()> {
        let dispatch = self.dispatch.lock();
        if let StreamState::Closed(cause) = &dispatch.state {
            return Err(cause.clone());
        }
        if !dispatch.pending.contains_key(&id) {
            return Err(ClientError::ProtocolViolation(format!(
                "continue requested for finished stream {}",
                id
            )));
        }

        let outbound = dispatch
            .outbound
            .as_ref()
            .ok_or_else(|| ClientError::Transport("outbound stream released".to_string()))?;
        outbound
            .send(stream_req(id, StreamSignal::Continue))
            .map_err(|_| ClientError::Transport("outbound stream closed".to_string()))?;

        debug!(request_id = %id, "Requested next batch");
        Ok(())
    }

    /// Deregister a streamed request and tell the server to release it.
    ///
    /// Best effort: a closed stream or an already finished request is ignored.
    pub(crate) fn cancel_stream(&self, id: RequestId) {
        let mut dispatch = self.dispatch.lock();
        if dispatch.pending.remove(&id).is_none() {
            return;
        }
        if dispatch.pending.is_empty() {
            self.drained.notify_waiters();
        }
        if let Some(outbound) = &dispatch.outbound {
            let _ = outbound.send(stream_req(id, StreamSignal::Done));
        }
        debug!(request_id = %id, "Stream cancelled by client");
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            let empty = self.dispatch.lock().pending.is_empty();
            if empty {
                return;
            }
            notified.await;
        }
    }
}

async fn read_loop<S>(shared: Arc<Shared>, inbound: S)
where
    S: Stream<Item = std::result::Result<TransactionRes, Status>> + Send + 'static,
{
    let mut inbound = Box::pin(inbound);

    while let Some(next) = inbound.next().await {
        match next {
            Ok(res) => shared.on_message(res),
            Err(status) => {
                error!(
                    code = ?status.code(),
                    message = %status.message(),
                    "Transaction stream failed"
                );
                shared.on_stream_closed(ClientError::from_stream_status(&status));
                return;
            }
        }
    }

    shared.on_stream_closed(ClientError::Transport(
        "stream closed by server".to_string(),
    ));
}

/// Owner of one transaction stream serving any number of concurrent requests.
///
/// The multiplexer is transport agnostic: it takes the sending half of the
/// outbound request channel and any stream of inbound responses. With tonic
/// these are the two halves of the `Transaction` RPC.
///
/// # Example
/// ```no_run
/// # use strand_client::TransactionMultiplexer;
/// # use strand_client::proto::{transaction_req, CommitReq};
/// # async fn example(
/// #     outbound: tokio::sync::mpsc::UnboundedSender<strand_client::proto::TransactionReq>,
/// #     inbound: tonic::Streaming<strand_client::proto::TransactionRes>,
/// # ) -> strand_client::Result<()> {
/// let mux = TransactionMultiplexer::new(outbound, inbound);
///
/// let commit = mux.send_single(
///     transaction_req::Req::CommitReq(CommitReq {}),
///     |_res| Ok(()),
/// )?;
/// commit.get().await?;
///
/// mux.close().await;
/// # Ok(())
/// # }
/// ```
pub struct TransactionMultiplexer {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TransactionMultiplexer {
    /// Start multiplexing over the given stream halves.
    ///
    /// Spawns the reader task, so this must be called from within a tokio
    /// runtime.
    pub fn new<S>(outbound: mpsc::UnboundedSender<TransactionReq>, inbound: S) -> Self
    where
        S: Stream<Item = std::result::Result<TransactionRes, Status>> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            dispatch: Mutex::new(Dispatch {
                pending: HashMap::new(),
                outbound: Some(outbound),
                state: StreamState::Open,
            }),
            drained: Notify::new(),
        });

        let reader = tokio::spawn(read_loop(Arc::clone(&shared), inbound));

        Self {
            shared,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Send a request answered by exactly one response.
    ///
    /// # Arguments
    /// * `req` - Request body; the id is assigned here
    /// * `transform` - Converts the raw response into the caller's value
    pub fn send_single<T, F>(&self, req: transaction_req::Req, transform: F) -> Result<RequestFuture<T>>
    where
        F: Fn(TransactionRes) -> Result<T> + Send + Sync + 'static,
    {
        let collector = Arc::new(SingleCollector::new());
        let id = self
            .shared
            .register_and_send(Pending::Single(Arc::clone(&collector)), req)?;
        Ok(RequestFuture::new(id, collector, Arc::new(transform)))
    }

    /// Send a request answered by a stream of batches.
    ///
    /// # Arguments
    /// * `req` - Request body; the id is assigned here
    /// * `transform` - Converts one response into the items it carries
    pub fn send_stream<T, F>(&self, req: transaction_req::Req, transform: F) -> Result<ResultCursor<T>>
    where
        F: Fn(TransactionRes) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        let collector = Arc::new(StreamingCollector::new());
        let id = self
            .shared
            .register_and_send(Pending::Streaming(Arc::clone(&collector)), req)?;
        Ok(ResultCursor::new(
            id,
            collector,
            Arc::clone(&self.shared),
            Arc::new(transform),
        ))
    }

    /// Close with the default deadline.
    pub async fn close(&self) {
        self.close_within(DEFAULT_CLOSE_TIMEOUT).await
    }

    /// Stop accepting requests, give pending ones until `deadline` to finish,
    /// then release the stream.
    ///
    /// Requests still pending after the deadline fail with
    /// [`ClientError::TransactionClosed`]. Calling this again is a no-op.
    pub async fn close_within(&self, deadline: Duration) {
        let already_closed = {
            let mut dispatch = self.shared.dispatch.lock();
            if matches!(dispatch.state, StreamState::Closed(_)) {
                true
            } else {
                dispatch.state = StreamState::Draining;
                false
            }
        };
        if already_closed {
            self.stop_reader();
            return;
        }

        debug!(
            pending = self.pending_count(),
            deadline_ms = deadline.as_millis() as u64,
            "Draining transaction stream"
        );

        if tokio::time::timeout(deadline, self.shared.wait_drained())
            .await
            .is_err()
        {
            warn!(
                pending = self.pending_count(),
                "Close deadline elapsed with requests still pending"
            );
        }

        self.shared.on_stream_closed(ClientError::TransactionClosed(
            "transaction closed by client".to_string(),
        ));
        self.stop_reader();
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.dispatch.lock().pending.len()
    }

    /// Current stream state.
    pub fn state(&self) -> StreamState {
        self.shared.dispatch.lock().state.clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.shared.dispatch.lock().state, StreamState::Open)
    }

    fn stop_reader(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

impl Drop for TransactionMultiplexer {
    fn drop(&mut self) {
        self.shared.on_stream_closed(ClientError::TransactionClosed(
            "transaction dropped".to_string(),
        ));
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

impl std::fmt::Debug for TransactionMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dispatch = self.shared.dispatch.lock();
        f.debug_struct("TransactionMultiplexer")
            .field("state", &dispatch.state)
            .field("pending", &dispatch.pending.len())
            .finish()
    }
}
