// Messages exchanged between a dispatcher and its execution context.
//
// Wire shape (JSON, tagged by `kind`):
//   {"kind": "init", "args": ...}            -> {"kind": "init", "error"?: "..."}
//   {"kind": "job", "id": 7, "data": ...}    -> {"kind": "job", "id": 7, "result"?: ..., "error"?: "..."}

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-dispatcher job identifier. Allocated in increasing order and never reused.
pub type CorrelationId = u64;

/// Result of one job as carried back over the wire.
pub type JobOutcome<R> = std::result::Result<R, String>;

/// Coordinator → execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Request<A, J> {
    Init { args: A },
    Job { id: CorrelationId, data: J },
}

/// Execution context → coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Response<R> {
    Init {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Job {
        id: CorrelationId,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<R>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl<R> Response<R> {
    pub fn init_ok() -> Self {
        Response::Init { error: None }
    }

    pub fn init_failed(error: impl ToString) -> Self {
        Response::Init {
            error: Some(error.to_string()),
        }
    }

    pub fn job(id: CorrelationId, outcome: JobOutcome<R>) -> Self {
        match outcome {
            Ok(result) => Response::Job {
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => Response::Job {
                id,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// A response whose shape has been validated.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<R> {
    InitAck { error: Option<String> },
    Job { id: CorrelationId, outcome: JobOutcome<R> },
}

impl<R> TryFrom<Response<R>> for Reply<R> {
    type Error = Error;

    fn try_from(response: Response<R>) -> Result<Self> {
        match response {
            Response::Init { error } => Ok(Reply::InitAck { error }),
            Response::Job {
                id,
                result: Some(result),
                error: None,
            } => Ok(Reply::Job {
                id,
                outcome: Ok(result),
            }),
            Response::Job {
                id,
                result: None,
                error: Some(error),
            } => Ok(Reply::Job {
                id,
                outcome: Err(error),
            }),
            Response::Job { id, .. } => Err(Error::TransportFault(format!(
                "Job response {} must carry exactly one of result or error",
                id
            ))),
        }
    }
}

/// Encodes a message for the wire.
pub fn encode<T: Serialize>(message: &T) -> Result<Value> {
    Ok(serde_json::to_value(message)?)
}

/// Decodes an inbound message.
///
/// Returns `Ok(None)` for messages without a recognised `kind`; those are discarded.
/// A recognised `kind` whose body cannot be interpreted is a transport fault.
pub fn decode<T: DeserializeOwned>(value: &Value) -> Result<Option<T>> {
    match value.get("kind").and_then(Value::as_str) {
        Some("init") | Some("job") => T::deserialize(value)
            .map(Some)
            .map_err(|e| Error::TransportFault(format!("Malformed message: {}", e))),
        _ => Ok(None),
    }
}

pub fn decode_request<A: DeserializeOwned, J: DeserializeOwned>(
    value: &Value,
) -> Result<Option<Request<A, J>>> {
    decode(value)
}

pub fn decode_reply<R: DeserializeOwned>(value: &Value) -> Result<Option<Reply<R>>> {
    decode::<Response<R>>(value)?
        .map(Reply::try_from)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FullProof;
    use serde_json::json;

    #[test]
    fn wire_shapes() {
        let init: Request<Value, Value> = Request::Init {
            args: json!({"a": 1}),
        };
        assert_eq!(encode(&init).unwrap(), json!({"kind": "init", "args": {"a": 1}}));

        let job: Request<Value, Value> = Request::Job {
            id: 7,
            data: json!({"sk": "5"}),
        };
        assert_eq!(
            encode(&job).unwrap(),
            json!({"kind": "job", "id": 7, "data": {"sk": "5"}})
        );

        assert_eq!(
            encode(&Response::<u32>::init_ok()).unwrap(),
            json!({"kind": "init"})
        );
        assert_eq!(
            encode(&Response::<u32>::job(3, Err("boom".into()))).unwrap(),
            json!({"kind": "job", "id": 3, "error": "boom"})
        );
    }

    #[test]
    fn replies_are_validated() {
        let ok: Reply<u32> = decode_reply(&json!({"kind": "job", "id": 1, "result": 9}))
            .unwrap()
            .unwrap();
        assert_eq!(ok, Reply::Job { id: 1, outcome: Ok(9) });

        let ack: Reply<u32> = decode_reply(&json!({"kind": "init", "error": "no ptau"}))
            .unwrap()
            .unwrap();
        assert_eq!(ack, Reply::InitAck {
            error: Some("no ptau".into())
        });

        for bad in [
            json!({"kind": "job", "id": 1}),
            json!({"kind": "job", "id": 1, "result": 2, "error": "x"}),
            json!({"kind": "job", "result": 2}),
            json!({"kind": "job", "id": "one", "result": 2}),
        ] {
            assert!(matches!(
                decode_reply::<u32>(&bad),
                Err(Error::TransportFault(_))
            ));
        }
    }

    #[test]
    fn proof_replies_decode() {
        let proof = json!({"proof": {"protocol": "plonk"}, "publicSignals": ["7"]});
        let reply: Reply<FullProof> =
            decode_reply(&json!({"kind": "job", "id": 2, "result": proof}))
                .unwrap()
                .unwrap();
        assert_eq!(reply, Reply::Job {
            id: 2,
            outcome: Ok(FullProof {
                proof: json!({"protocol": "plonk"}),
                public_signals: vec!["7".into()],
            }),
        });

        let failed: Reply<FullProof> =
            decode_reply(&json!({"kind": "job", "id": 3, "error": "witness failed"}))
                .unwrap()
                .unwrap();
        assert_eq!(failed, Reply::Job {
            id: 3,
            outcome: Err("witness failed".into()),
        });
    }

    #[test]
    fn unknown_kinds_are_discarded() {
        for stray in [
            json!({"kind": "ping"}),
            json!({"id": 1, "result": 2}),
            json!("hello"),
            json!(null),
        ] {
            assert_eq!(decode_reply::<u32>(&stray).unwrap(), None);
        }
    }
}
