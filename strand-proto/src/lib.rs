//! Strand protocol messages and gRPC stubs, generated from `proto/strand.proto`.
//!
//! `strand_client::StrandClient` is what the client library talks through;
//! `strand_server` lets tests stand up an in-process server.

tonic::include_proto!("strand.protocol");

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_transaction_req_wire_format() {
        let req = TransactionReq {
            id: "7f0c2a54-6a0e-4c1e-9d0b-1d4a2b3c4d5e".to_string(),
            metadata: Default::default(),
            req: Some(transaction_req::Req::StreamReq(StreamReq {
                signal: StreamSignal::Continue as i32,
            })),
        };

        let bytes = req.encode_to_vec();
        let decoded = TransactionReq::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_unknown_signal_value_is_preserved_as_raw_i32() {
        let res = StreamRes { signal: 42 };
        let decoded = StreamRes::decode(res.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.signal, 42);
        assert!(StreamSignal::try_from(decoded.signal).is_err());
    }

    #[test]
    fn test_concept_map_answers_survive_encoding() {
        let mut map = std::collections::HashMap::new();
        map.insert(
            "x".to_string(),
            Concept {
                iid: bytes::Bytes::from_static(&[0x01, 0x02]),
                type_label: "person".to_string(),
                is_type: false,
            },
        );
        let res = TransactionRes {
            id: "a".to_string(),
            res: Some(transaction_res::Res::QueryRes(QueryRes {
                res: Some(query_res::Res::MatchRes(MatchRes {
                    answers: vec![ConceptMap { map }],
                })),
            })),
        };

        let decoded = TransactionRes::decode(res.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, res);
    }
}
