// Wire shapes for the extension protocol
//
// Requests are `Request` serialized with its `type` tag. Responses use the
// extension's loose envelope:
//
//   {"success": true,  "data": {...}}          GET_DASHBOARD_DATA, GET_HISTORY
//   {"success": true,  "answer": "..."}        ASK_QUESTION
//   {"success": true}                          RECORD_ANALYSIS
//   {"success": false, "error": "...", "code": "storage_unavailable"}
//
// A host whose own dispatcher is gone answers with code `transport_failure`
// so the extension can tell "never delivered" from an explicit refusal.

use super::{ChannelError, Payload, RemoteError, Reply};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TRANSPORT_FAILURE: &str = "transport_failure";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl WireResponse {
    fn ok() -> Self {
        Self {
            success: true,
            data: None,
            answer: None,
            error: None,
            code: None,
        }
    }

    /// Failure envelope carrying a remote condition and its code
    pub fn failure(err: &RemoteError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
            ..Self::ok()
        }
    }

    /// Failure envelope for a request the host could not deliver
    pub fn transport_failure(message: &str) -> Self {
        Self {
            success: false,
            error: Some(message.to_string()),
            code: Some(TRANSPORT_FAILURE.to_string()),
            ..Self::ok()
        }
    }

    /// Envelope for whatever a `Transport::send` produced
    pub fn from_result(result: &Result<Payload, ChannelError>) -> Self {
        match result {
            Ok(payload) => Self::from_reply(&Ok(payload.clone())),
            Err(ChannelError::Remote(err)) => Self::failure(err),
            Err(ChannelError::Transport(msg)) => Self::transport_failure(msg),
        }
    }

    pub fn from_reply(reply: &Reply) -> Self {
        let payload = match reply {
            Ok(payload) => payload,
            Err(err) => return Self::failure(err),
        };

        let data = match payload {
            Payload::Dashboard(aggregate) => serde_json::to_value(aggregate),
            Payload::History(records) => serde_json::to_value(records),
            Payload::Answer(answer) => {
                return Self {
                    answer: Some(answer.clone()),
                    ..Self::ok()
                }
            }
            Payload::Recorded => return Self::ok(),
        };

        match data {
            Ok(data) => Self {
                data: Some(data),
                ..Self::ok()
            },
            // Plain structs of numbers and strings; unreachable in practice
            Err(e) => Self::failure(&RemoteError::InvalidRequest(format!(
                "failed to encode reply: {}",
                e
            ))),
        }
    }
}
