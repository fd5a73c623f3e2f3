//! Transport-level error taxonomy.
//!
//! These never escape the public session API — room operations surface
//! failures as `None`/`false` plus a human-readable `error` string in
//! session state. The enum exists so internals can use `?` and so log
//! lines carry enough context to diagnose a failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The room service replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request could not be sent or the connection failed mid-flight.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response body could not be parsed as the expected JSON structure.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}
