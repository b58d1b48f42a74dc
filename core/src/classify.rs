//! Outcome classification.
//!
//! Turns what a transport reported into either the untouched response or a
//! `RestError`. Attaching the JSON body of a failed response is best effort:
//! a body that does not parse is simply left off.

use crate::error::{RestError, TransportError};
use crate::http::{ResponsePayload, TransportResponse};

pub type TransportResult<P> = Result<TransportResponse<P>, TransportError>;

pub fn is_success(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// Classify a finished transport call.
pub fn classify<P: ResponsePayload>(outcome: TransportResult<P>) -> Result<TransportResponse<P>, RestError> {
    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "transport failure");
            return Err(RestError::Transport(err));
        }
    };

    if is_success(response.status) {
        return Ok(response);
    }

    let json_payload = response
        .payload
        .error_body()
        .and_then(|body| serde_json::from_slice(body).ok());
    tracing::debug!(
        status = response.status,
        has_payload = json_payload.is_some(),
        "non-success status"
    );
    response.payload.discard();

    Err(RestError::HttpStatus {
        status: response.status,
        json_payload,
    })
}
