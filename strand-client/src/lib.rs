/// Strand gRPC Client Library
///
/// This crate provides a Rust client for Strand transactional graph database
/// servers. Each transaction runs over a single bidirectional stream on which
/// any number of queries can be in flight at once; responses are routed back
/// to the request that produced them and delivered through a
/// [`RequestFuture`] or a [`ResultCursor`].

pub mod error;
pub mod config;
pub mod answer;
pub mod convert;
pub mod request_id;
mod collector;
pub mod multiplexer;
pub mod future;
pub mod cursor;
pub mod query;
pub mod transaction;
pub mod session;
pub mod database;
pub mod client;

pub use bytes::Bytes;
pub use strand_proto as proto;

// Re-export key types
pub use answer::{Concept, ConceptMap, Numeric};
pub use client::Client;
pub use config::{ClientConfig, Options};
pub use cursor::ResultCursor;
pub use database::DatabaseManager;
pub use error::{ClientError, Result};
pub use future::RequestFuture;
pub use multiplexer::{StreamState, TransactionMultiplexer};
pub use query::QueryManager;
pub use request_id::RequestId;
pub use session::Session;
pub use strand_proto::{SessionType, TransactionType};
pub use transaction::Transaction;
