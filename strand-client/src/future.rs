/// Awaitable handle for a request answered by a single response
use crate::collector::SingleCollector;
use crate::error::Result;
use crate::request_id::RequestId;
use futures::future::BoxFuture;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use strand_proto::TransactionRes;
use tokio_util::sync::CancellationToken;

pub(crate) type Transform<T> = Arc<dyn Fn(TransactionRes) -> Result<T> + Send + Sync>;

/// Result of a request sent on a transaction.
///
/// Waiting is the only thing a caller can do with it: once written to the
/// stream a request cannot be withdrawn, so [`cancel`](Self::cancel) always
/// reports failure. Waits may be abandoned freely (timeout, interruption,
/// dropping the future); the response is kept and a later wait returns it.
///
/// Clones share the same underlying response.
///
/// # Example
/// ```no_run
/// # use strand_client::{Client, SessionType, TransactionType};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::connect("http://localhost:1729").await?;
/// let session = client.session("social", SessionType::Schema).await?;
/// let tx = session.transaction(TransactionType::Write).await?;
///
/// let defined = tx.query().define("define person sub entity;")?;
/// defined.await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct RequestFuture<T> {
    id: RequestId,
    collector: Arc<SingleCollector>,
    transform: Transform<T>,
}

impl<T> RequestFuture<T> {
    pub(crate) fn new(id: RequestId, collector: Arc<SingleCollector>, transform: Transform<T>) -> Self {
        Self {
            id,
            collector,
            transform,
        }
    }

    /// Wait for the response and convert it.
    pub async fn get(&self) -> Result<T> {
        let res = self.collector.take().await?;
        (self.transform)(res)
    }

    /// Wait at most `timeout`.
    ///
    /// Expiry returns [`ClientError::Timeout`](crate::ClientError::Timeout)
    /// and leaves the request pending.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<T> {
        let res = self.collector.take_timeout(timeout).await?;
        (self.transform)(res)
    }

    /// Wait until the response arrives or `token` is cancelled.
    pub async fn get_or_interrupt(&self, token: &CancellationToken) -> Result<T> {
        let res = self.collector.take_or_interrupt(token).await?;
        (self.transform)(res)
    }

    /// True once a response or a failure has been recorded.
    pub fn is_done(&self) -> bool {
        self.collector.is_done()
    }

    /// Requests cannot be aborted once sent. Always returns `false`.
    pub fn cancel(&self) -> bool {
        false
    }

    /// Always `false`; see [`cancel`](Self::cancel).
    pub fn is_cancelled(&self) -> bool {
        false
    }

    pub fn request_id(&self) -> RequestId {
        self.id
    }

    /// Replace the conversion applied to the response.
    pub fn map<U, F>(self, f: F) -> RequestFuture<U>
    where
        T: 'static,
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let inner = self.transform;
        RequestFuture {
            id: self.id,
            collector: self.collector,
            transform: Arc::new(move |res| inner(res).map(&f)),
        }
    }
}

impl<T> Clone for RequestFuture<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            collector: Arc::clone(&self.collector),
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<T: Send + 'static> IntoFuture for RequestFuture<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.get().await })
    }
}

impl<T> fmt::Debug for RequestFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestFuture")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use strand_proto::{transaction_res, ErrorRes, OpenRes};

    fn future_with<T>(
        transform: impl Fn(TransactionRes) -> Result<T> + Send + Sync + 'static,
    ) -> (RequestFuture<T>, Arc<SingleCollector>) {
        let collector = Arc::new(SingleCollector::new());
        let future = RequestFuture::new(
            RequestId::generate(),
            Arc::clone(&collector),
            Arc::new(transform),
        );
        (future, collector)
    }

    fn res(body: transaction_res::Res) -> TransactionRes {
        TransactionRes {
            id: String::new(),
            res: Some(body),
        }
    }

    #[tokio::test]
    async fn test_transform_applied_on_get() {
        let (future, collector) = future_with(|res| Ok(res.res.is_some()));
        collector
            .deliver(res(transaction_res::Res::OpenRes(OpenRes {})))
            .unwrap();

        assert!(future.is_done());
        assert!(future.get().await.unwrap());
        // Repeatable
        assert!(future.clone().await.unwrap());
    }

    #[tokio::test]
    async fn test_transform_error_surfaces() {
        let (future, collector) = future_with(|res| match res.res {
            Some(transaction_res::Res::ErrorRes(e)) => Err(ClientError::Server(e.message)),
            _ => Ok(()),
        });
        collector
            .deliver(res(transaction_res::Res::ErrorRes(ErrorRes {
                message: "type not found".to_string(),
            })))
            .unwrap();

        assert_eq!(
            future.get().await,
            Err(ClientError::Server("type not found".to_string()))
        );
    }

    #[test]
    fn test_cannot_be_cancelled() {
        let (future, _collector) = future_with(|_| Ok(()));
        assert!(!future.cancel());
        assert!(!future.is_cancelled());
        assert!(!future.is_done());
    }

    #[tokio::test]
    async fn test_timeout_then_later_success() {
        let (future, collector) = future_with(|_| Ok(7));

        assert!(matches!(
            future.get_timeout(Duration::from_millis(10)).await,
            Err(ClientError::Timeout(_))
        ));

        collector
            .deliver(res(transaction_res::Res::OpenRes(OpenRes {})))
            .unwrap();
        assert_eq!(future.get_timeout(Duration::from_secs(1)).await, Ok(7));
    }

    #[tokio::test]
    async fn test_map_composes_transform() {
        let (future, collector) = future_with(|_| Ok(20));
        let future = future.map(|n| n + 1);
        collector
            .deliver(res(transaction_res::Res::OpenRes(OpenRes {})))
            .unwrap();

        assert_eq!(future.await, Ok(21));
    }
}
