//! Rewrites upstream responses before they reach the client.
//!
//! Everything except protocol-upgrade responses is buffered in memory: gzip bodies
//! are decoded, non-200 bodies get the `StatusCode error:` marker, and the framing
//! headers are rebuilt so `Content-Length` always matches the bytes sent.
use std::{
    io::{self, Read},
    time::Duration,
};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use http::{
    HeaderMap, HeaderValue, Response, StatusCode,
    header::{CONTENT_ENCODING, CONTENT_LENGTH},
};
use http_body_util::BodyExt;
use thiserror::Error;

use crate::core::headers::{connection_has_upgrade, strip_hop_by_hop};

/// Marker prepended to the body of every non-200 upstream response
pub const STATUS_ERROR_PREFIX: &str = "StatusCode error:";

/// Failure to produce a well-formed response from the upstream one
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransformError {
    #[error("failed to read upstream body")]
    Read(#[source] axum::Error),

    #[error("timed out after {0:?} reading upstream body")]
    ReadTimeout(Duration),

    #[error("failed to decompress gzip body")]
    Decompress(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct ResponseTransformer {
    body_read_timeout: Duration,
}

impl ResponseTransformer {
    pub fn new(body_read_timeout: Duration) -> Self {
        Self { body_read_timeout }
    }

    /// Produce the client-facing response, or fail without forwarding anything.
    pub async fn transform(
        &self,
        response: Response<AxumBody>,
    ) -> Result<Response<AxumBody>, TransformError> {
        if connection_has_upgrade(response.headers()) {
            tracing::debug!(status = %response.status(), "Upgrade response passed through untouched");
            return Ok(response);
        }

        let (mut parts, body) = response.into_parts();

        let raw = tokio::time::timeout(self.body_read_timeout, body.collect())
            .await
            .map_err(|_| TransformError::ReadTimeout(self.body_read_timeout))?
            .map_err(TransformError::Read)?
            .to_bytes();

        let mut payload = if is_gzip(&parts.headers) {
            parts.headers.remove(CONTENT_ENCODING);
            gunzip(raw).await.map_err(TransformError::Decompress)?
        } else {
            raw
        };

        if parts.status != StatusCode::OK {
            tracing::debug!(status = %parts.status, "Annotating non-200 upstream body");
            let mut annotated = Vec::with_capacity(STATUS_ERROR_PREFIX.len() + payload.len());
            annotated.extend_from_slice(STATUS_ERROR_PREFIX.as_bytes());
            annotated.extend_from_slice(&payload);
            payload = Bytes::from(annotated);
        }

        // The body is now fixed-length; chunking and other per-hop framing no longer apply.
        strip_hop_by_hop(&mut parts.headers, false);
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(payload.len()));

        Ok(Response::from_parts(parts, AxumBody::from(payload)))
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("gzip"))
}

/// Bodies up to this size are decoded on the calling task.
const INLINE_GUNZIP_LIMIT: usize = 64 * 1024;

/// Decode a complete gzip stream. Concatenated members are accepted; an empty body
/// decodes to an empty body. Large bodies are decoded on the blocking pool.
async fn gunzip(compressed: Bytes) -> io::Result<Bytes> {
    if compressed.len() <= INLINE_GUNZIP_LIMIT {
        return gunzip_blocking(&compressed);
    }
    tokio::task::spawn_blocking(move || gunzip_blocking(&compressed))
        .await
        .map_err(io::Error::other)?
}

fn gunzip_blocking(compressed: &[u8]) -> io::Result<Bytes> {
    if compressed.is_empty() {
        return Ok(Bytes::new());
    }
    let mut decoder = MultiGzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(Bytes::from(out))
}
