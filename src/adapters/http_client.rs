use std::{
    error::Error as StdError,
    future::Future,
    io,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Uri, Version, http::uri::Scheme};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::{TokioExecutor, TokioTimer},
};
use rustls_native_certs::load_native_certs;
use thiserror::Error;
use tower::Service;
use tracing::Instrument;

use crate::{
    config::TransportConfig,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    tracing_setup::create_backend_span,
};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Raised by [`HandshakeTimeout`] when dialing plus TLS setup ran over budget.
#[derive(Error, Debug)]
#[error("connection setup timed out after {0:?}")]
pub struct ConnectTimeout(Duration);

/// Connector wrapper bounding the whole connection setup.
///
/// Plain `http` dials get the connect timeout; `https` dials get the connect
/// timeout plus the TLS handshake timeout.
#[derive(Clone)]
pub struct HandshakeTimeout<C> {
    inner: C,
    connect_timeout: Duration,
    tls_handshake_timeout: Duration,
}

impl<C> HandshakeTimeout<C> {
    pub fn new(inner: C, connect_timeout: Duration, tls_handshake_timeout: Duration) -> Self {
        Self {
            inner,
            connect_timeout,
            tls_handshake_timeout,
        }
    }

    fn budget_for(&self, uri: &Uri) -> Duration {
        if uri.scheme() == Some(&Scheme::HTTPS) {
            self.connect_timeout + self.tls_handshake_timeout
        } else {
            self.connect_timeout
        }
    }
}

impl<C> Service<Uri> for HandshakeTimeout<C>
where
    C: Service<Uri> + Send,
    C::Response: Send + 'static,
    C::Error: Into<BoxError>,
    C::Future: Send + 'static,
{
    type Response = C::Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let budget = self.budget_for(&uri);
        let connecting = self.inner.call(uri);
        Box::pin(async move {
            match tokio::time::timeout(budget, connecting).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(Box::new(ConnectTimeout(budget)) as BoxError),
            }
        })
    }
}

type Connector = HandshakeTimeout<HttpsConnector<HttpConnector>>;

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Owns the shared connection pool, sized and timed from [`TransportConfig`]
/// * Forces the outbound request version to HTTP/1.1
/// * Attempts each request exactly once
/// * Converts between Hyper body and Axum body types, keeping the upgrade handle
pub struct HttpClientAdapter {
    client: Client<Connector, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new(transport: &TransportConfig) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_connect_timeout(Some(transport.connect_timeout()));
        http_connector.set_keepalive(transport.keepalive());
        http_connector.set_nodelay(true);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let connector = HandshakeTimeout::new(
            https_connector,
            transport.connect_timeout(),
            transport.tls_handshake_timeout(),
        );

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(transport.idle_timeout())
            .pool_max_idle_per_host(transport.max_idle_connections)
            .build::<_, AxumBody>(connector);

        tracing::debug!(
            connect_timeout = ?transport.connect_timeout(),
            keepalive = ?transport.keepalive(),
            idle_timeout = ?transport.idle_timeout(),
            max_idle = transport.max_idle_connections,
            tls_handshake_timeout = ?transport.tls_handshake_timeout(),
            "Created upstream HTTP client"
        );
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        let Some(authority) = req.uri().authority().cloned() else {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        };

        let backend_url = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            authority
        );
        let span = create_backend_span(&backend_url, req.method().as_str(), req.uri().path());

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let uri = parts.uri.clone();
        let outgoing = Request::from_parts(parts, body);

        async move {
            tracing::debug!("Outgoing request headers: {:?}", outgoing.headers());

            match self.client.request(outgoing).await {
                Ok(response) => {
                    tracing::Span::current().record("http.status_code", response.status().as_u16());
                    // `map` keeps the extensions, including the pending upgrade.
                    Ok(response.map(AxumBody::new))
                }
                Err(e) => {
                    tracing::Span::current().record("http.status_code", 599u16);
                    let err = classify(&e);
                    tracing::error!("Error making request to {} {}: {}", method, uri, err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Map a client failure onto the port's error kinds, keeping every cause in the message.
fn classify(err: &(dyn StdError + 'static)) -> HttpClientError {
    let mut timed_out = false;
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        if cause.is::<ConnectTimeout>()
            || cause
                .downcast_ref::<io::Error>()
                .is_some_and(|e| e.kind() == io::ErrorKind::TimedOut)
        {
            timed_out = true;
        }
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    if timed_out {
        HttpClientError::Timeout(message)
    } else {
        HttpClientError::ConnectionError(message)
    }
}
