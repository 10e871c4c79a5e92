//! Wire protocol for the HTTP surface.

use execstream_core::{ApiError, ErrorCode, Execution, ExecutionStatus};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// SSE event name carrying an execution snapshot.
pub const EXECUTION_EVENT: &str = "execution";

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ApiError> for ErrorBody {
    fn from(err: &ApiError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Response of the list-by-session route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionList {
    pub executions: Vec<Execution>,
}

/// Decode a JSON request body.
///
/// # Errors
/// Returns `InvalidArgument` if the body is not valid JSON for `T`.
pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::invalid_argument(format!("invalid request body: {e}")))
}

/// Decode a partial status body. An empty body or `null` means no status.
///
/// # Errors
/// Returns `InvalidArgument` if the body is not a valid status.
pub fn decode_status(body: &[u8]) -> Result<Option<ExecutionStatus>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    decode_body(body)
}

#[cfg(test)]
mod tests {
    use execstream_core::ExecutionPhase;

    use super::*;

    #[test]
    fn test_error_body_from_api_error() {
        let body = ErrorBody::from(&ApiError::not_found("AgentExecution", "e1"));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"code": "not_found", "message": "AgentExecution not found: e1"})
        );
    }

    #[test]
    fn test_decode_status() {
        assert_eq!(decode_status(b"").unwrap(), None);
        assert_eq!(decode_status(b"  \n").unwrap(), None);
        assert_eq!(decode_status(b"null").unwrap(), None);

        let status = decode_status(br#"{"phase":"running"}"#).unwrap().unwrap();
        assert_eq!(status.phase, ExecutionPhase::Running);

        let err = decode_status(b"{").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }
}
