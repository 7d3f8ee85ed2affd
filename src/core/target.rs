use std::{fmt, str::FromStr, sync::Arc};

use http::{
    Uri,
    uri::{Authority, Scheme},
};
use thiserror::Error;

use crate::core::selector::SelectionStrategy;

/// Errors raised while building the routing table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TargetError {
    /// Error when the URL cannot be parsed or is not an http(s) URL with a host
    #[error("Invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Error when no target is configured
    #[error("At least one target must be configured")]
    Empty,
}

/// Result type for target operations
pub type TargetResult<T> = Result<T, TargetError>;

/// An upstream endpoint descriptor parsed from a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: String,
}

impl Target {
    /// Parse a base URL such as `http://10.0.0.1:8080/api?key=abc`.
    ///
    /// Only `http` and `https` are accepted and a host is required. The fragment,
    /// if any, is ignored. The base path and query are kept exactly as written:
    /// `.` and `..` segments are not resolved and nothing is re-encoded.
    pub fn parse(url: &str) -> TargetResult<Self> {
        let invalid = |reason: String| TargetError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let parsed = url::Url::parse(url).map_err(|e| invalid(e.to_string()))?;

        let scheme = match parsed.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(invalid(format!("scheme must be http or https, got '{other}'"))),
        };

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("URL must have a host".to_string()))?;

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(invalid("credentials in target URLs are not supported".to_string()));
        }

        let authority = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority).map_err(|e| invalid(e.to_string()))?;

        // `url` normalizes dot segments, so the path is read from the raw URI instead.
        let raw = Uri::from_str(url).map_err(|e| invalid(e.to_string()))?;
        let (base_path, base_query) = match raw.path_and_query() {
            Some(pq) if !pq.path().is_empty() => {
                (pq.path().to_string(), pq.query().unwrap_or_default().to_string())
            }
            Some(pq) => ("/".to_string(), pq.query().unwrap_or_default().to_string()),
            None => ("/".to_string(), String::new()),
        };

        Ok(Self {
            scheme,
            authority,
            base_path,
            base_query,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// `host[:port]`, also used as the outgoing `Host` header
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn base_query(&self) -> &str {
        &self.base_query
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)?;
        if !self.base_query.is_empty() {
            write!(f, "?{}", self.base_query)?;
        }
        Ok(())
    }
}

/// The process-wide routing table: fixed, ordered and never empty.
///
/// Cloning is cheap and the table is shared across requests without locking.
#[derive(Debug, Clone)]
pub struct TargetTable {
    targets: Arc<[Target]>,
}

impl TargetTable {
    pub fn new(targets: Vec<Target>) -> TargetResult<Self> {
        if targets.is_empty() {
            return Err(TargetError::Empty);
        }
        Ok(Self {
            targets: targets.into(),
        })
    }

    /// Parse every base URL, failing on the first malformed one.
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> TargetResult<Self> {
        let targets = urls
            .iter()
            .map(|url| Target::parse(url.as_ref()))
            .collect::<TargetResult<Vec<_>>>()?;
        Self::new(targets)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    /// Pick exactly one target using the given strategy.
    pub fn select(&self, strategy: &dyn SelectionStrategy) -> &Target {
        let index = strategy.select_index(self.targets.len());
        // Strategies return an index below `len`; the modulo keeps a misbehaving one in range.
        &self.targets[index % self.targets.len()]
    }
}
