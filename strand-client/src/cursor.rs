/// Lazy cursor over a result streamed in batches
use crate::collector::{wait_interruptible, wait_timeout, Part, StreamingCollector};
use crate::error::{ClientError, Result};
use crate::multiplexer::Shared;
use crate::request_id::RequestId;
use futures::Stream;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strand_proto::TransactionRes;
use tokio_util::sync::CancellationToken;

pub(crate) type BatchTransform<T> = Arc<dyn Fn(TransactionRes) -> Result<Vec<T>> + Send + Sync>;

/// Forward-only sequence of answers for one streamed request.
///
/// The server sends answers in batches and pauses after each one. The cursor
/// hands out buffered answers first and only asks for the next batch once the
/// current one is used up, so at most one batch is ever in flight.
///
/// Dropping the cursor before the end releases the server-side stream.
///
/// # Example
/// ```no_run
/// # use strand_client::{Client, SessionType, TransactionType};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::connect("http://localhost:1729").await?;
/// let session = client.session("social", SessionType::Data).await?;
/// let tx = session.transaction(TransactionType::Read).await?;
///
/// let mut answers = tx.query().match_query("match $p isa person;")?;
/// while let Some(answer) = answers.next().await {
///     println!("{:?}", answer?.get("p"));
/// }
/// # Ok(())
/// # }
/// ```
pub struct ResultCursor<T> {
    id: RequestId,
    collector: Arc<StreamingCollector>,
    shared: Arc<Shared>,
    transform: BatchTransform<T>,
    buffered: VecDeque<T>,
    finished: bool,
}

impl<T> ResultCursor<T> {
    pub(crate) fn new(
        id: RequestId,
        collector: Arc<StreamingCollector>,
        shared: Arc<Shared>,
        transform: BatchTransform<T>,
    ) -> Self {
        Self {
            id,
            collector,
            shared,
            transform,
            buffered: VecDeque::new(),
            finished: false,
        }
    }

    /// Next answer, or `None` once the stream is exhausted.
    ///
    /// An error ends the cursor. Dropping the returned future before it
    /// completes loses nothing.
    pub async fn next(&mut self) -> Option<Result<T>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }

            match self.collector.next_part().await {
                Ok(Some(Part::Answer(res))) => match (self.transform)(res) {
                    Ok(items) => self.buffered.extend(items),
                    Err(e) => {
                        self.finish();
                        return Some(Err(e));
                    }
                },
                Ok(Some(Part::Continue)) => {
                    // Batch boundary reached with the buffer empty
                    if let Err(e) = self.shared.send_continue(self.id) {
                        self.finish();
                        return Some(Err(e));
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Like [`next`](Self::next) but gives up after `timeout`.
    ///
    /// A timeout does not end the cursor; the next call resumes where this
    /// one stopped without asking the server again.
    pub async fn next_timeout(&mut self, timeout: Duration) -> Option<Result<T>> {
        match wait_timeout(timeout, async { Ok::<_, ClientError>(self.next().await) }).await {
            Ok(next) => next,
            Err(e) => Some(Err(e)),
        }
    }

    /// Like [`next`](Self::next) but gives up when `token` is cancelled.
    pub async fn next_or_interrupt(&mut self, token: &CancellationToken) -> Option<Result<T>> {
        match wait_interruptible(token, async { Ok::<_, ClientError>(self.next().await) }).await {
            Ok(next) => next,
            Err(e) => Some(Err(e)),
        }
    }

    /// Stop reading and release the server-side stream if still open.
    pub fn close(&mut self) {
        self.finish();
    }

    pub fn request_id(&self) -> RequestId {
        self.id
    }

    fn finish(&mut self) {
        self.finished = true;
        self.buffered.clear();
        if self.collector.close() {
            self.shared.cancel_stream(self.id);
        }
    }

    /// Drain the cursor into a vector, stopping at the first error.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
    where
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut cursor| async move {
            cursor.next().await.map(|item| (item, cursor))
        })
    }
}

impl<T> Drop for ResultCursor<T> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl<T> fmt::Debug for ResultCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCursor")
            .field("id", &self.id)
            .field("buffered", &self.buffered.len())
            .field("finished", &self.finished)
            .finish()
    }
}
