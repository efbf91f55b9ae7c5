//! In-process Strand server for session and client lifecycle tests
//!
//! Answers just enough of the protocol to open sessions and transactions.
//! A stalled server never acknowledges `SessionClose` and leaves queries
//! unanswered, which is how shutdown bounds are exercised.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use strand_client::proto::{
    self, query_req, query_res,
    strand_server::{Strand, StrandServer},
    transaction_req, transaction_res, TransactionReq, TransactionRes,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{TcpListenerStream, UnboundedReceiverStream};
use tonic::{Request, Response, Status, Streaming};

#[derive(Default)]
pub struct Recorded {
    pub opened_sessions: Vec<Bytes>,
    pub closed_sessions: Vec<Bytes>,
    pub transactions: usize,
}

#[derive(Clone, Default)]
pub struct FakeStrand {
    recorded: Arc<Mutex<Recorded>>,
    databases: Arc<Mutex<HashSet<String>>>,
    stalled: bool,
}

impl FakeStrand {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server that opens sessions and transactions but answers nothing else.
    pub fn stalled() -> Self {
        Self {
            stalled: true,
            ..Self::default()
        }
    }

    pub fn with_database(self, name: &str) -> Self {
        self.databases.lock().insert(name.to_string());
        self
    }
}

fn reply(req: TransactionReq, stalled: bool) -> Option<TransactionRes> {
    let res = match req.req? {
        transaction_req::Req::OpenReq(_) => transaction_res::Res::OpenRes(proto::OpenRes {}),
        transaction_req::Req::CommitReq(_) => transaction_res::Res::CommitRes(proto::CommitRes {}),
        transaction_req::Req::RollbackReq(_) => {
            transaction_res::Res::RollbackRes(proto::RollbackRes {})
        }
        transaction_req::Req::QueryReq(_) if stalled => return None,
        transaction_req::Req::QueryReq(query) => match query.req? {
            query_req::Req::DefineReq(_) => transaction_res::Res::QueryRes(proto::QueryRes {
                res: Some(query_res::Res::DefineRes(proto::DefineRes {})),
            }),
            _ => transaction_res::Res::ErrorRes(proto::ErrorRes {
                message: "unsupported query".to_string(),
            }),
        },
        transaction_req::Req::StreamReq(_) => return None,
    };
    Some(TransactionRes {
        id: req.id,
        res: Some(res),
    })
}

#[tonic::async_trait]
impl Strand for FakeStrand {
    async fn database_contains(
        &self,
        request: Request<proto::DatabaseContainsReq>,
    ) -> Result<Response<proto::DatabaseContainsRes>, Status> {
        let contains = self.databases.lock().contains(&request.into_inner().name);
        Ok(Response::new(proto::DatabaseContainsRes { contains }))
    }

    async fn database_create(
        &self,
        request: Request<proto::DatabaseCreateReq>,
    ) -> Result<Response<proto::DatabaseCreateRes>, Status> {
        let name = request.into_inner().name;
        if !self.databases.lock().insert(name.clone()) {
            return Err(Status::already_exists(name));
        }
        Ok(Response::new(proto::DatabaseCreateRes {}))
    }

    async fn database_all(
        &self,
        _request: Request<proto::DatabaseAllReq>,
    ) -> Result<Response<proto::DatabaseAllRes>, Status> {
        let names = self.databases.lock().iter().cloned().collect();
        Ok(Response::new(proto::DatabaseAllRes { names }))
    }

    async fn database_delete(
        &self,
        request: Request<proto::DatabaseDeleteReq>,
    ) -> Result<Response<proto::DatabaseDeleteRes>, Status> {
        let name = request.into_inner().name;
        if !self.databases.lock().remove(&name) {
            return Err(Status::not_found(name));
        }
        Ok(Response::new(proto::DatabaseDeleteRes {}))
    }

    async fn session_open(
        &self,
        request: Request<proto::SessionOpenReq>,
    ) -> Result<Response<proto::SessionOpenRes>, Status> {
        let database = request.into_inner().database;
        if !self.databases.lock().contains(&database) {
            return Err(Status::not_found(database));
        }
        let mut recorded = self.recorded.lock();
        let session_id = Bytes::from(format!("session-{}", recorded.opened_sessions.len()));
        recorded.opened_sessions.push(session_id.clone());
        Ok(Response::new(proto::SessionOpenRes { session_id }))
    }

    async fn session_close(
        &self,
        request: Request<proto::SessionCloseReq>,
    ) -> Result<Response<proto::SessionCloseRes>, Status> {
        if self.stalled {
            std::future::pending::<()>().await;
        }
        self.recorded
            .lock()
            .closed_sessions
            .push(request.into_inner().session_id);
        Ok(Response::new(proto::SessionCloseRes {}))
    }

    type TransactionStream = UnboundedReceiverStream<Result<TransactionRes, Status>>;

    async fn transaction(
        &self,
        request: Request<Streaming<TransactionReq>>,
    ) -> Result<Response<Self::TransactionStream>, Status> {
        self.recorded.lock().transactions += 1;
        let mut inbound = request.into_inner();
        let (tx, rx) = mpsc::unbounded_channel();
        let stalled = self.stalled;
        tokio::spawn(async move {
            while let Ok(Some(req)) = inbound.message().await {
                if let Some(res) = reply(req, stalled) {
                    if tx.send(Ok(res)).is_err() {
                        break;
                    }
                }
            }
        });
        Ok(Response::new(UnboundedReceiverStream::new(rx)))
    }
}

/// A server listening on a loopback port for the rest of the test.
pub struct RunningServer {
    pub address: String,
    recorded: Arc<Mutex<Recorded>>,
}

impl RunningServer {
    pub async fn start(server: FakeStrand) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = format!("http://{}", listener.local_addr().expect("local addr"));
        let recorded = Arc::clone(&server.recorded);
        tokio::spawn(
            tonic::transport::Server::builder()
                .add_service(StrandServer::new(server))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );
        Self { address, recorded }
    }

    pub fn closed_sessions(&self) -> Vec<Bytes> {
        self.recorded.lock().closed_sessions.clone()
    }

    pub fn transactions(&self) -> usize {
        self.recorded.lock().transactions
    }

    /// Wait until the server has seen `count` session closes.
    pub async fn wait_for_closed_sessions(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.recorded.lock().closed_sessions.len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session close never reached the server");
    }
}
