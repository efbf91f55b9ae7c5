/// Conversions between protocol messages and client types
use crate::answer::{Concept, ConceptMap, Numeric};
use crate::error::{ClientError, Result};
use strand_proto::{self as proto, query_res, transaction_res, TransactionRes};

/// Convert protobuf Concept to Concept
pub fn proto_concept_to_concept(concept: proto::Concept) -> Concept {
    Concept {
        iid: concept.iid,
        type_label: concept.type_label,
        is_type: concept.is_type,
    }
}

/// Convert protobuf ConceptMap to ConceptMap
pub fn proto_concept_map_to_answer(answer: proto::ConceptMap) -> ConceptMap {
    ConceptMap::new(
        answer
            .map
            .into_iter()
            .map(|(var, concept)| (var, proto_concept_to_concept(concept)))
            .collect(),
    )
}

/// Convert protobuf Numeric to Numeric
pub fn proto_numeric_to_numeric(numeric: proto::Numeric) -> Result<Numeric> {
    match numeric.value {
        Some(proto::numeric::Value::LongValue(v)) => Ok(Numeric::Long(v)),
        Some(proto::numeric::Value::DoubleValue(v)) => Ok(Numeric::Double(v)),
        Some(proto::numeric::Value::Nan(_)) => Ok(Numeric::NaN),
        None => Err(ClientError::UnexpectedResponse(
            "numeric answer without a value".to_string(),
        )),
    }
}

fn describe(res: &Option<transaction_res::Res>) -> &'static str {
    match res {
        Some(transaction_res::Res::OpenRes(_)) => "open_res",
        Some(transaction_res::Res::CommitRes(_)) => "commit_res",
        Some(transaction_res::Res::RollbackRes(_)) => "rollback_res",
        Some(transaction_res::Res::QueryRes(_)) => "query_res",
        Some(transaction_res::Res::StreamRes(_)) => "stream_res",
        Some(transaction_res::Res::ErrorRes(_)) => "error_res",
        None => "empty response",
    }
}

fn unexpected(expected: &str, res: &Option<transaction_res::Res>) -> ClientError {
    ClientError::UnexpectedResponse(format!("expected {}, got {}", expected, describe(res)))
}

/// Unwrap a query response body, surfacing server errors.
fn query_body(res: TransactionRes, expected: &str) -> Result<query_res::Res> {
    match res.res {
        Some(transaction_res::Res::QueryRes(proto::QueryRes { res: Some(body) })) => Ok(body),
        Some(transaction_res::Res::ErrorRes(e)) => Err(ClientError::Server(e.message)),
        other => Err(unexpected(expected, &other)),
    }
}

pub(crate) fn expect_open(res: TransactionRes) -> Result<()> {
    match res.res {
        Some(transaction_res::Res::OpenRes(_)) => Ok(()),
        Some(transaction_res::Res::ErrorRes(e)) => Err(ClientError::Server(e.message)),
        other => Err(unexpected("open_res", &other)),
    }
}

pub(crate) fn expect_commit(res: TransactionRes) -> Result<()> {
    match res.res {
        Some(transaction_res::Res::CommitRes(_)) => Ok(()),
        Some(transaction_res::Res::ErrorRes(e)) => Err(ClientError::Server(e.message)),
        other => Err(unexpected("commit_res", &other)),
    }
}

pub(crate) fn expect_rollback(res: TransactionRes) -> Result<()> {
    match res.res {
        Some(transaction_res::Res::RollbackRes(_)) => Ok(()),
        Some(transaction_res::Res::ErrorRes(e)) => Err(ClientError::Server(e.message)),
        other => Err(unexpected("rollback_res", &other)),
    }
}

/// Answers carried by one batch of a match query.
pub(crate) fn match_answers(res: TransactionRes) -> Result<Vec<ConceptMap>> {
    match query_body(res, "match_res")? {
        query_res::Res::MatchRes(batch) => Ok(batch
            .answers
            .into_iter()
            .map(proto_concept_map_to_answer)
            .collect()),
        _ => Err(ClientError::UnexpectedResponse(
            "expected match_res".to_string(),
        )),
    }
}

/// Answers carried by one batch of an insert query.
pub(crate) fn insert_answers(res: TransactionRes) -> Result<Vec<ConceptMap>> {
    match query_body(res, "insert_res")? {
        query_res::Res::InsertRes(batch) => Ok(batch
            .answers
            .into_iter()
            .map(proto_concept_map_to_answer)
            .collect()),
        _ => Err(ClientError::UnexpectedResponse(
            "expected insert_res".to_string(),
        )),
    }
}

pub(crate) fn aggregate_answer(res: TransactionRes) -> Result<Numeric> {
    match query_body(res, "match_aggregate_res")? {
        query_res::Res::MatchAggregateRes(proto::MatchAggregateRes {
            answer: Some(numeric),
        }) => proto_numeric_to_numeric(numeric),
        _ => Err(ClientError::UnexpectedResponse(
            "expected match_aggregate_res with an answer".to_string(),
        )),
    }
}

pub(crate) fn expect_delete(res: TransactionRes) -> Result<()> {
    match query_body(res, "delete_res")? {
        query_res::Res::DeleteRes(_) => Ok(()),
        _ => Err(ClientError::UnexpectedResponse(
            "expected delete_res".to_string(),
        )),
    }
}

pub(crate) fn expect_define(res: TransactionRes) -> Result<()> {
    match query_body(res, "define_res")? {
        query_res::Res::DefineRes(_) => Ok(()),
        _ => Err(ClientError::UnexpectedResponse(
            "expected define_res".to_string(),
        )),
    }
}

pub(crate) fn expect_undefine(res: TransactionRes) -> Result<()> {
    match query_body(res, "undefine_res")? {
        query_res::Res::UndefineRes(_) => Ok(()),
        _ => Err(ClientError::UnexpectedResponse(
            "expected undefine_res".to_string(),
        )),
    }
}
