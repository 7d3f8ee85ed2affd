//! Rewrites an inbound request so that it is addressed to the selected upstream.
use std::net::SocketAddr;

use http::{
    HeaderValue, Request, Uri,
    header::{HOST, InvalidHeaderValue, USER_AGENT},
    uri::PathAndQuery,
};
use thiserror::Error;

use crate::core::{
    headers::{is_upgrade_request, strip_hop_by_hop},
    path::{join_paths, merge_query},
    target::Target,
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Errors raised while rewriting a request. With a validated target table these
/// are not expected in practice.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DirectorError {
    #[error("Failed to build upstream URI: {0}")]
    InvalidUri(#[from] http::Error),

    #[error("Invalid upstream path: {0}")]
    InvalidPath(#[from] http::uri::InvalidUri),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
}

/// Stateless request rewriter shared by every in-flight request.
#[derive(Debug, Clone)]
pub struct RequestDirector {
    default_user_agent: HeaderValue,
}

impl RequestDirector {
    pub fn new(default_user_agent: &str) -> Result<Self, DirectorError> {
        Ok(Self {
            default_user_agent: HeaderValue::from_str(default_user_agent)?,
        })
    }

    /// Mutate `req` in place so that it targets `target`.
    ///
    /// Scheme and authority come from the target, the path is joined with the
    /// target's base path, the target's base query goes first, and `Host` is set to
    /// the target authority. `User-Agent` is only filled in when absent.
    pub fn direct<B>(
        &self,
        req: &mut Request<B>,
        target: &Target,
        client_addr: Option<SocketAddr>,
    ) -> Result<(), DirectorError> {
        let path = join_paths(target.base_path(), req.uri().path());
        let query = merge_query(target.base_query(), req.uri().query().unwrap_or_default());
        let path_and_query = if query.is_empty() {
            PathAndQuery::try_from(path)?
        } else {
            PathAndQuery::try_from(format!("{path}?{query}"))?
        };

        *req.uri_mut() = Uri::builder()
            .scheme(target.scheme().clone())
            .authority(target.authority().clone())
            .path_and_query(path_and_query)
            .build()?;

        let keep_upgrade = is_upgrade_request(req.headers());
        let headers = req.headers_mut();
        strip_hop_by_hop(headers, keep_upgrade);

        headers.insert(HOST, HeaderValue::from_str(target.authority().as_str())?);

        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, self.default_user_agent.clone());
        }

        if let Some(addr) = client_addr {
            let client_ip = addr.ip().to_string();
            let prior = headers
                .get_all(X_FORWARDED_FOR)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(", ");
            let forwarded = if prior.is_empty() {
                client_ip
            } else {
                format!("{prior}, {client_ip}")
            };
            headers.insert(X_FORWARDED_FOR, HeaderValue::from_str(&forwarded)?);
        }

        Ok(())
    }
}
