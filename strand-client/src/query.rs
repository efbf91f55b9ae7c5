/// Query operations within a transaction
use crate::answer::{ConceptMap, Numeric};
use crate::config::Options;
use crate::convert;
use crate::cursor::ResultCursor;
use crate::error::{ClientError, Result};
use crate::future::RequestFuture;
use crate::multiplexer::TransactionMultiplexer;
use strand_proto::{self as proto, query_req, transaction_req};

/// Issues queries on a transaction's shared stream.
///
/// Every method returns as soon as the query is written; answers arrive
/// through the returned future or cursor. Queries are opaque strings and are
/// validated by the server only.
pub struct QueryManager<'a> {
    mux: &'a TransactionMultiplexer,
    options: Options,
}

impl<'a> QueryManager<'a> {
    pub(crate) fn new(mux: &'a TransactionMultiplexer, options: Options) -> Self {
        Self { mux, options }
    }

    /// Override the transaction's options for queries issued through this manager
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    fn request(&self, query: &str, body: impl FnOnce(String) -> query_req::Req) -> Result<transaction_req::Req> {
        if query.trim().is_empty() {
            return Err(ClientError::InvalidArgument("query is empty".to_string()));
        }
        Ok(transaction_req::Req::QueryReq(proto::QueryReq {
            options: Some(self.options.to_proto()),
            req: Some(body(query.to_string())),
        }))
    }

    /// Run a match query
    ///
    /// # Arguments
    /// * `query` - Query text, e.g. `match $p isa person;`
    ///
    /// # Returns
    /// A cursor over the answers, fetched batch by batch
    pub fn match_query(&self, query: &str) -> Result<ResultCursor<ConceptMap>> {
        let req = self.request(query, |query| {
            query_req::Req::MatchReq(proto::MatchReq { query })
        })?;
        self.mux.send_stream(req, convert::match_answers)
    }

    /// Run an aggregate match query (count, sum, mean, ...)
    pub fn match_aggregate(&self, query: &str) -> Result<RequestFuture<Numeric>> {
        let req = self.request(query, |query| {
            query_req::Req::MatchAggregateReq(proto::MatchAggregateReq { query })
        })?;
        self.mux.send_single(req, convert::aggregate_answer)
    }

    /// Run an insert query
    ///
    /// # Returns
    /// A cursor over the inserted answers
    pub fn insert(&self, query: &str) -> Result<ResultCursor<ConceptMap>> {
        let req = self.request(query, |query| {
            query_req::Req::InsertReq(proto::InsertReq { query })
        })?;
        self.mux.send_stream(req, convert::insert_answers)
    }

    pub fn delete(&self, query: &str) -> Result<RequestFuture<()>> {
        let req = self.request(query, |query| {
            query_req::Req::DeleteReq(proto::DeleteReq { query })
        })?;
        self.mux.send_single(req, convert::expect_delete)
    }

    /// Run a schema definition; requires a schema session
    pub fn define(&self, query: &str) -> Result<RequestFuture<()>> {
        let req = self.request(query, |query| {
            query_req::Req::DefineReq(proto::DefineReq { query })
        })?;
        self.mux.send_single(req, convert::expect_define)
    }

    /// Remove schema definitions; requires a schema session
    pub fn undefine(&self, query: &str) -> Result<RequestFuture<()>> {
        let req = self.request(query, |query| {
            query_req::Req::UndefineReq(proto::UndefineReq { query })
        })?;
        self.mux.send_single(req, convert::expect_undefine)
    }
}
