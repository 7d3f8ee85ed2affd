use std::{convert::Infallible, error::Error as StdError, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    http::{HeaderValue, StatusCode, header},
    routing::any,
};
use hyper::Response;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::{core::ProxyService, tracing_setup::create_proxy_span};

/// Prefix of every body produced by the error boundary
pub const ERROR_HANDLER_PREFIX: &str = "ErrorHandler error:";

/// HTTP handler for Scatter: the error boundary around the proxy pipeline.
///
/// Every request gets exactly one response. Pipeline failures become a 500 whose
/// body names the cause; nothing partial from the upstream is ever written.
#[derive(Clone)]
pub struct HttpHandler {
    proxy_service: Arc<ProxyService>,
}

impl HttpHandler {
    pub fn new(proxy_service: Arc<ProxyService>) -> Self {
        Self { proxy_service }
    }

    /// Proxy one request, converting any failure into the error response.
    pub async fn handle_request(
        &self,
        req: Request,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let span = create_proxy_span(req.method().as_str(), req.uri().path(), client_addr);

        async move {
            let response = match self.proxy_service.handle(req, client_addr).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Proxy request failed: {}", e);
                    error_response(&e)
                }
            };
            tracing::Span::current().record("http.status_code", response.status().as_u16());
            response
        }
        .instrument(span)
        .await
    }
}

/// Build the 500 returned for any pipeline failure. The body is the marker
/// followed by the full cause chain.
pub fn error_response(err: &(dyn StdError + 'static)) -> Response<AxumBody> {
    let mut body = format!("{ERROR_HANDLER_PREFIX}{err}");
    let mut source = err.source();
    while let Some(cause) = source {
        body.push_str(": ");
        body.push_str(&cause.to_string());
        source = cause.source();
    }

    let mut response = Response::new(AxumBody::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

/// Catch-all router: every method and path goes to the proxy.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so the
/// client address reaches `X-Forwarded-For`.
pub fn router(handler: Arc<HttpHandler>) -> Router {
    let make_request_route = |handler: Arc<HttpHandler>| {
        any(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>, req: Request| {
                let handler = handler.clone();
                async move {
                    Ok::<Response<AxumBody>, Infallible>(
                        handler.handle_request(req, Some(client_addr)).await,
                    )
                }
            },
        )
    };

    Router::new()
        .route("/{*path}", make_request_route(handler.clone()))
        .route("/", make_request_route(handler))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use http_body_util::BodyExt;

    use super::*;
    use crate::{
        core::{
            ProxyError, RandomStrategy, RequestDirector, ResponseTransformer, SelectionStrategy,
            TargetTable, TransformError,
        },
        ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
    };

    struct RefusingClient;

    #[async_trait]
    impl HttpClient for RefusingClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            Err(HttpClientError::ConnectionError(
                "client error (Connect): tcp connect error: Connection refused (os error 111)"
                    .to_string(),
            ))
        }
    }

    struct TeapotClient;

    #[async_trait]
    impl HttpClient for TeapotClient {
        async fn send_request(
            &self,
            _req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            Ok(Response::builder()
                .status(StatusCode::IM_A_TEAPOT)
                .body(AxumBody::from("short and stout"))
                .unwrap())
        }
    }

    fn handler(client: Arc<dyn HttpClient>) -> HttpHandler {
        let service = ProxyService::new(
            TargetTable::from_urls(&["http://127.0.0.1:9"]).unwrap(),
            RandomStrategy::seeded(7).boxed(),
            RequestDirector::new("user-agent").unwrap(),
            ResponseTransformer::new(Duration::from_secs(5)),
            client,
        );
        HttpHandler::new(Arc::new(service))
    }

    fn request() -> Request {
        Request::builder()
            .uri("/anything")
            .body(AxumBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_failure_becomes_500() {
        let response = handler(Arc::new(RefusingClient))
            .handle_request(request(), None)
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers().get(header::X_CONTENT_TYPE_OPTIONS).unwrap(),
            "nosniff"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with(ERROR_HANDLER_PREFIX));
        assert!(body.contains("Connection refused"));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let response = handler(Arc::new(TeapotClient))
            .handle_request(request(), None)
            .await;

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "StatusCode error:short and stout");
    }

    #[tokio::test]
    async fn test_error_body_includes_cause_chain() {
        #[derive(thiserror::Error, Debug)]
        #[error("client error (Connect)")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::other("tcp connect error"));
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(
            body,
            "ErrorHandler error:client error (Connect): tcp connect error"
        );
    }

    #[tokio::test]
    async fn test_transform_cause_is_not_repeated() {
        let err = ProxyError::from(TransformError::Decompress(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "unexpected end of file",
        )));
        let body = error_response(&err)
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(
            body,
            "ErrorHandler error:failed to decompress gzip body: unexpected end of file"
        );
    }

    #[tokio::test]
    async fn test_error_body_format() {
        let err = HttpClientError::ConnectionError("dial failed".to_string());
        let body = error_response(&err)
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(body, "ErrorHandler error:Connection error: dial failed");
    }
}
