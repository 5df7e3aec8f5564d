//! JSON body encoding and response decoding.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use quill_common::{ClientError, ClientResult};

/// Platform error envelope carried by non-2xx responses.
#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Serialize a JSON body once, up front.
pub fn encode<T: Serialize>(value: &T) -> ClientResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Decode a response body into a typed result.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> ClientResult<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Build the error for a non-2xx, non-429, non-5xx response.
///
/// The platform error body is attached when it parses; an opaque or empty
/// body still yields the literal status.
#[must_use]
pub fn api_error(status: u16, body: &[u8]) -> ClientError {
    let parsed = serde_json::from_slice::<ErrorEnvelope>(body).ok();
    let (code, message) = parsed
        .map(|envelope| (envelope.error.code, envelope.error.message))
        .unwrap_or((None, None));

    ClientError::Api {
        status,
        code,
        message,
    }
}
