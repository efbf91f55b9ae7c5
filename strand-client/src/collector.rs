/// Response collectors: per-request buffers filled by the stream reader
///
/// A collector is written by exactly one party, the multiplexer's reader task,
/// and read by whichever caller tasks hold the request handle. Synchronization
/// is internal (a short `parking_lot` lock plus a `Notify` for the wait/wake
/// handoff); nothing here is held across an await.

use crate::error::{ClientError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use strand_proto::{transaction_res, StreamSignal, TransactionRes};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Bound a collector wait by `timeout`.
///
/// Expiry maps to [`ClientError::Timeout`]; the awaited future is dropped,
/// which every collector wait tolerates without losing data.
pub(crate) async fn wait_timeout<T, F>(timeout: Duration, wait: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(format!(
            "no response within {} ms",
            timeout.as_millis()
        ))),
    }
}

/// Abort a collector wait when `token` is cancelled.
///
/// A token that is already cancelled aborts immediately. The token itself is
/// left cancelled so the caller's context still observes the interruption.
pub(crate) async fn wait_interruptible<T, F>(token: &CancellationToken, wait: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ClientError::Interrupted(
            "wait for response was interrupted".to_string(),
        )),
        result = wait => result,
    }
}

// ============================================================================
// Single
// ============================================================================

enum SingleState {
    Pending,
    Delivered(TransactionRes),
    Failed(ClientError),
}

/// Collector for a request answered by exactly one response.
pub(crate) struct SingleCollector {
    state: Mutex<SingleState>,
    notify: Notify,
}

impl SingleCollector {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SingleState::Pending),
            notify: Notify::new(),
        }
    }

    /// Store the response and wake every waiter.
    ///
    /// A second delivery (or a delivery after `fail`) is rejected.
    pub(crate) fn deliver(&self, res: TransactionRes) -> Result<()> {
        {
            let mut state = self.state.lock();
            if !matches!(*state, SingleState::Pending) {
                return Err(ClientError::ProtocolViolation(format!(
                    "second response for completed request {}",
                    res.id
                )));
            }
            *state = SingleState::Delivered(res);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Complete with a failure. Returns false if already complete.
    pub(crate) fn fail(&self, cause: ClientError) -> bool {
        {
            let mut state = self.state.lock();
            if !matches!(*state, SingleState::Pending) {
                return false;
            }
            *state = SingleState::Failed(cause);
        }
        self.notify.notify_waiters();
        true
    }

    pub(crate) fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), SingleState::Pending)
    }

    fn peek(&self) -> Option<Result<TransactionRes>> {
        match &*self.state.lock() {
            SingleState::Pending => None,
            SingleState::Delivered(res) => Some(Ok(res.clone())),
            SingleState::Failed(cause) => Some(Err(cause.clone())),
        }
    }

    /// Wait until the collector completes.
    ///
    /// Every waiter observes the same outcome; the stored response is never
    /// consumed, so an abandoned wait can simply be retried.
    pub(crate) async fn take(&self) -> Result<TransactionRes> {
        loop {
            // Register interest before checking so a delivery racing with the
            // check still wakes us.
            let notified = self.notify.notified();
            if let Some(result) = self.peek() {
                return result;
            }
            notified.await;
        }
    }

    pub(crate) async fn take_timeout(&self, timeout: Duration) -> Result<TransactionRes> {
        wait_timeout(timeout, self.take()).await
    }

    pub(crate) async fn take_or_interrupt(
        &self,
        token: &CancellationToken,
    ) -> Result<TransactionRes> {
        wait_interruptible(token, self.take()).await
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// One buffered element of a streamed response.
#[derive(Debug)]
pub(crate) enum Part {
    /// A response carrying (possibly zero) answers, or a server error.
    Answer(TransactionRes),
    /// End of a batch; the server holds more answers until asked.
    Continue,
}

#[derive(Debug)]
enum Terminal {
    Exhausted,
    Failed(ClientError),
    Closed,
}

struct StreamingState {
    parts: VecDeque<Part>,
    terminal: Option<Terminal>,
}

/// Collector for a request answered by a sequence of batches.
pub(crate) struct StreamingCollector {
    state: Mutex<StreamingState>,
    notify: Notify,
}

/// Whether `res` is the last message the server sends for a streamed request.
///
/// `DONE` ends the stream normally; an error response ends it abnormally and
/// is still delivered so the cursor can surface it.
pub(crate) fn ends_stream(res: &TransactionRes) -> bool {
    match &res.res {
        Some(transaction_res::Res::StreamRes(stream)) => {
            stream.signal == StreamSignal::Done as i32
        }
        Some(transaction_res::Res::ErrorRes(_)) => true,
        _ => false,
    }
}

impl StreamingCollector {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(StreamingState {
                parts: VecDeque::new(),
                terminal: None,
            }),
            notify: Notify::new(),
        }
    }

    /// Append one inbound message in arrival order.
    pub(crate) fn deliver(&self, res: TransactionRes) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return Err(ClientError::ProtocolViolation(format!(
                    "response for finished stream {}",
                    res.id
                )));
            }

            match &res.res {
                Some(transaction_res::Res::StreamRes(stream)) => {
                    match StreamSignal::try_from(stream.signal) {
                        Ok(StreamSignal::Continue) => state.parts.push_back(Part::Continue),
                        Ok(StreamSignal::Done) => state.terminal = Some(Terminal::Exhausted),
                        Err(_) => {
                            return Err(ClientError::ProtocolViolation(format!(
                                "unknown stream signal {} for {}",
                                stream.signal, res.id
                            )));
                        }
                    }
                }
                Some(transaction_res::Res::ErrorRes(_)) => {
                    state.parts.push_back(Part::Answer(res));
                    state.terminal = Some(Terminal::Exhausted);
                }
                _ => state.parts.push_back(Part::Answer(res)),
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Terminate with a failure; parts already buffered are still drained
    /// first. Returns false if the stream had already terminated.
    pub(crate) fn fail(&self, cause: ClientError) -> bool {
        {
            let mut state = self.state.lock();
            if state.terminal.is_some() {
                return false;
            }
            state.terminal = Some(Terminal::Failed(cause));
        }
        self.notify.notify_waiters();
        true
    }

    /// Drop buffered parts and stop accepting more.
    ///
    /// Returns true if the server side of the stream may still be open,
    /// meaning the caller should tell the server to release it.
    pub(crate) fn close(&self) -> bool {
        let was_open = {
            let mut state = self.state.lock();
            state.parts.clear();
            let was_open = state.terminal.is_none();
            if was_open {
                state.terminal = Some(Terminal::Closed);
            }
            was_open
        };
        self.notify.notify_waiters();
        was_open
    }

    /// True once no part will ever be returned again.
    pub(crate) fn is_done(&self) -> bool {
        let state = self.state.lock();
        state.parts.is_empty() && state.terminal.is_some()
    }

    fn poll_part(&self) -> Option<Result<Option<Part>>> {
        let mut state = self.state.lock();
        if let Some(part) = state.parts.pop_front() {
            return Some(Ok(Some(part)));
        }
        match &state.terminal {
            None => None,
            Some(Terminal::Exhausted) | Some(Terminal::Closed) => Some(Ok(None)),
            Some(Terminal::Failed(cause)) => Some(Err(cause.clone())),
        }
    }

    /// Wait for the next part in FIFO order.
    ///
    /// `Ok(None)` means the stream ended normally. A part is only removed
    /// from the buffer when this future returns it, so dropping the future
    /// mid-wait loses nothing.
    pub(crate) async fn next_part(&self) -> Result<Option<Part>> {
        loop {
            let notified = self.notify.notified();
            if let Some(result) = self.poll_part() {
                return result;
            }
            notified.await;
        }
    }
}
