use thiserror::Error;

use crate::{
    core::{director::DirectorError, transformer::TransformError},
    ports::http_client::HttpClientError,
};

/// Every failure a request can hit on its way through the pipeline.
///
/// None of these is written to the client directly; the error boundary in
/// [`crate::adapters::HttpHandler`] turns them into a 500 response.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    /// Dial, TLS or timeout failure while talking to the upstream
    #[error(transparent)]
    Upstream(#[from] HttpClientError),

    /// Upstream body could not be read or decoded
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Director(#[from] DirectorError),
}

/// Result type for pipeline operations
pub type ProxyResult<T> = Result<T, ProxyError>;
