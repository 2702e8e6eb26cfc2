//! Manual run trigger: an authenticated POST to the external dispatch
//! endpoint. Fire-and-poll by design -- triggering a run and observing its
//! result stay two separate interfaces, so success here only means the
//! dispatch was accepted, not that a booking happened.

use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("dispatch endpoint returned HTTP {status}")]
    Rejected { status: u16 },
}

/// Accepted-dispatch status code. The endpoint sends no body.
const ACCEPTED: u16 = 204;

/// Request a new run. `payload` is opaque to this client and forwarded
/// unchanged.
pub async fn trigger(
    endpoint: &str,
    token: &str,
    event: &str,
    payload: Value,
) -> Result<(), DispatchError> {
    let client = reqwest::Client::new();
    let response = client
        .post(endpoint)
        .bearer_auth(token)
        .header("Accept", "application/json")
        .json(&json!({
            "event_type": event,
            "client_payload": payload,
        }))
        .send()
        .await?;

    let status = response.status().as_u16();
    if status != ACCEPTED {
        return Err(DispatchError::Rejected { status });
    }

    info!(endpoint, event, "run dispatched");
    Ok(())
}
