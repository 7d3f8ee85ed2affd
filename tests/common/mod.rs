//! Shared utilities for the proxy integration tests.
#![allow(dead_code)]

use std::{
    convert::Infallible,
    future::Future,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{Router, body::Body, extract::Request};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::{
    client::legacy::Client,
    rt::{TokioExecutor, TokioIo},
};
use scatter::{
    HttpClient, HttpClientAdapter, HttpHandler, ProxyService, adapters::router, config::ProxyConfig,
};
use tokio::net::{TcpListener, TcpStream};

/// Serve `app` on an ephemeral local port.
pub async fn spawn_upstream(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Upstream that reports what it received, one `key=value` per line.
pub async fn spawn_echo_upstream(name: &'static str) -> SocketAddr {
    let app = Router::new().fallback(move |req: Request| async move {
        let read = |key: header::HeaderName| {
            req.headers()
                .get(key)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        format!(
            "name={name}\nuri={}\nhost={}\nuser-agent={}\nx-forwarded-for={}\n",
            req.uri(),
            read(header::HOST),
            read(header::USER_AGENT),
            read(header::HeaderName::from_static("x-forwarded-for")),
        )
    });
    spawn_upstream(app).await
}

/// Accept raw TCP connections and hand each to `f`.
pub async fn spawn_raw_upstream<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move { f(socket).await });
        }
    });
    addr
}

/// Keep-alive HTTP/1.1 upstream that answers "done" after `delay` and tracks how
/// many of its connections are currently open.
pub async fn spawn_counting_upstream(delay: Duration) -> (SocketAddr, Arc<AtomicUsize>) {
    let open = Arc::new(AtomicUsize::new(0));
    let counter = open.clone();
    let addr = spawn_raw_upstream(move |socket| {
        let open = counter.clone();
        async move {
            open.fetch_add(1, Ordering::SeqCst);
            let service = service_fn(move |_req: http::Request<hyper::body::Incoming>| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, Infallible>(http::Response::new(Full::new(Bytes::from_static(b"done"))))
            });
            let _ = http1::Builder::new()
                .serve_connection(TokioIo::new(socket), service)
                .await;
            open.fetch_sub(1, Ordering::SeqCst);
        }
    })
    .await;
    (addr, open)
}

/// Reserve a local port and release it, so that dialing it is refused.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Run the full proxy stack for `config` on an ephemeral port.
pub async fn spawn_proxy(config: ProxyConfig) -> SocketAddr {
    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new(&config.transport).unwrap());
    let service = Arc::new(ProxyService::from_config(&config, http_client).unwrap());
    let app = router(Arc::new(HttpHandler::new(service)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of a `key=value` line written by the echo upstream
    pub fn echoed(&self, key: &str) -> String {
        self.text()
            .lines()
            .find_map(|line| line.strip_prefix(&format!("{key}=")).map(str::to_string))
            .unwrap_or_default()
    }
}

pub async fn send(req: http::Request<Full<Bytes>>) -> Reply {
    let client = Client::builder(TokioExecutor::new()).build_http::<Full<Bytes>>();
    let response = client.request(req).await.unwrap();
    let (parts, body) = response.into_parts();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: body.collect().await.unwrap().to_bytes(),
    }
}

pub async fn get(proxy: SocketAddr, path_and_query: &str) -> Reply {
    let req = http::Request::builder()
        .uri(format!("http://{proxy}{path_and_query}"))
        .body(Full::new(Bytes::new()))
        .unwrap();
    send(req).await
}

/// Build an upstream response with exactly the given headers
pub fn raw_response(
    status: StatusCode,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> http::Response<Body> {
    let mut builder = http::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body)).unwrap()
}
