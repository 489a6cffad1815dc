//! Streamed reply relay
//!
//! Producer: the provider's [`DeltaStream`] of text deltas. Sink: the HTTP
//! response body, which pulls bytes only as fast as the connection flushes
//! them. End of the returned stream is the completion signal; an `Err` item
//! is the error signal and is always the last item. Axum aborts the response
//! body on `Err`, so the client sees a truncated transfer rather than a clean
//! end of stream.

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::providers::{DeltaStream, ProviderError};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Upstream stream failed: {0}")]
    Upstream(#[from] ProviderError),
}

/// Relay deltas chunk-for-chunk as UTF-8 bytes, in arrival order
pub fn relay(mut deltas: DeltaStream) -> impl Stream<Item = Result<Bytes, RelayError>> + Send {
    async_stream::stream! {
        let mut chunks = 0usize;
        let mut bytes = 0usize;

        while let Some(delta) = deltas.next().await {
            match delta {
                Ok(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    chunks += 1;
                    bytes += text.len();
                    yield Ok(Bytes::from(text));
                }
                Err(e) => {
                    tracing::error!(error = %e, chunks, bytes, "Upstream stream failed, aborting response");
                    yield Err(RelayError::Upstream(e));
                    return;
                }
            }
        }

        tracing::debug!(chunks, bytes, "Stream relay complete");
    }
}
