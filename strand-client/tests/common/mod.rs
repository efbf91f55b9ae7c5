//! In-memory transaction stream used in place of a server
//!
//! The test drives the server side by hand: read what the client sent with
//! [`Wire::recv`], answer with [`Wire::send`] or [`Wire::reset`].
#![allow(dead_code)]

pub mod server;

use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use strand_client::proto::{
    self, query_res, transaction_req, transaction_res, StreamSignal, TransactionReq,
    TransactionRes,
};
use strand_client::TransactionMultiplexer;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::Status;
use tracing_subscriber::EnvFilter;

pub struct Wire {
    requests: mpsc::UnboundedReceiver<TransactionReq>,
    responses: mpsc::UnboundedSender<Result<TransactionRes, Status>>,
}

/// Route client logs to the test harness; set RUST_LOG to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A multiplexer connected to a scripted server end.
pub fn connect() -> (TransactionMultiplexer, Wire) {
    init_tracing();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let mux = TransactionMultiplexer::new(out_tx, UnboundedReceiverStream::new(in_rx));
    (
        mux,
        Wire {
            requests: out_rx,
            responses: in_tx,
        },
    )
}

impl Wire {
    /// Next request written by the client; panics if none arrives promptly.
    pub async fn recv(&mut self) -> TransactionReq {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("client sent nothing")
            .expect("client closed the stream")
    }

    /// Request already queued by the client, if any.
    pub fn try_recv(&mut self) -> Option<TransactionReq> {
        self.requests.try_recv().ok()
    }

    pub fn send(&self, res: TransactionRes) {
        self.responses.send(Ok(res)).expect("client reader stopped");
    }

    pub fn reset(&self, status: Status) {
        self.responses.send(Err(status)).expect("client reader stopped");
    }

    /// End the response stream normally.
    pub fn hang_up(self) -> mpsc::UnboundedReceiver<TransactionReq> {
        self.requests
    }
}

pub fn is_continue(req: &TransactionReq) -> bool {
    matches!(
        &req.req,
        Some(transaction_req::Req::StreamReq(s)) if s.signal == StreamSignal::Continue as i32
    )
}

pub fn is_done(req: &TransactionReq) -> bool {
    matches!(
        &req.req,
        Some(transaction_req::Req::StreamReq(s)) if s.signal == StreamSignal::Done as i32
    )
}

pub fn query_text(req: &TransactionReq) -> Option<&str> {
    match &req.req {
        Some(transaction_req::Req::QueryReq(q)) => match &q.req {
            Some(proto::query_req::Req::MatchReq(r)) => Some(&r.query),
            Some(proto::query_req::Req::MatchAggregateReq(r)) => Some(&r.query),
            Some(proto::query_req::Req::InsertReq(r)) => Some(&r.query),
            Some(proto::query_req::Req::DeleteReq(r)) => Some(&r.query),
            Some(proto::query_req::Req::DefineReq(r)) => Some(&r.query),
            Some(proto::query_req::Req::UndefineReq(r)) => Some(&r.query),
            None => None,
        },
        _ => None,
    }
}

fn response(id: &str, res: transaction_res::Res) -> TransactionRes {
    TransactionRes {
        id: id.to_string(),
        res: Some(res),
    }
}

pub fn open_res(id: &str) -> TransactionRes {
    response(id, transaction_res::Res::OpenRes(proto::OpenRes {}))
}

pub fn commit_res(id: &str) -> TransactionRes {
    response(id, transaction_res::Res::CommitRes(proto::CommitRes {}))
}

pub fn rollback_res(id: &str) -> TransactionRes {
    response(id, transaction_res::Res::RollbackRes(proto::RollbackRes {}))
}

pub fn error_res(id: &str, message: &str) -> TransactionRes {
    response(
        id,
        transaction_res::Res::ErrorRes(proto::ErrorRes {
            message: message.to_string(),
        }),
    )
}

pub fn signal(id: &str, signal: StreamSignal) -> TransactionRes {
    response(
        id,
        transaction_res::Res::StreamRes(proto::StreamRes {
            signal: signal as i32,
        }),
    )
}

fn query(id: &str, body: query_res::Res) -> TransactionRes {
    response(
        id,
        transaction_res::Res::QueryRes(proto::QueryRes { res: Some(body) }),
    )
}

/// One answer binding `$x` to a thing of type `label`.
pub fn answer(label: &str, iid: u8) -> proto::ConceptMap {
    let mut map = HashMap::new();
    map.insert(
        "x".to_string(),
        proto::Concept {
            iid: Bytes::copy_from_slice(&[iid]),
            type_label: label.to_string(),
            is_type: false,
        },
    );
    proto::ConceptMap { map }
}

/// A match batch whose answers carry iids `iids`.
pub fn match_batch(id: &str, iids: impl IntoIterator<Item = u8>) -> TransactionRes {
    query(
        id,
        query_res::Res::MatchRes(proto::MatchRes {
            answers: iids.into_iter().map(|iid| answer("person", iid)).collect(),
        }),
    )
}

pub fn insert_batch(id: &str, iids: impl IntoIterator<Item = u8>) -> TransactionRes {
    query(
        id,
        query_res::Res::InsertRes(proto::InsertRes {
            answers: iids.into_iter().map(|iid| answer("person", iid)).collect(),
        }),
    )
}

pub fn define_res(id: &str) -> TransactionRes {
    query(id, query_res::Res::DefineRes(proto::DefineRes {}))
}

pub fn delete_res(id: &str) -> TransactionRes {
    query(id, query_res::Res::DeleteRes(proto::DeleteRes {}))
}

pub fn aggregate_res(id: &str, value: proto::numeric::Value) -> TransactionRes {
    query(
        id,
        query_res::Res::MatchAggregateRes(proto::MatchAggregateRes {
            answer: Some(proto::Numeric { value: Some(value) }),
        }),
    )
}
