//! Scatter - a small HTTP reverse proxy that spreads requests across a fixed set of upstreams.
//!
//! Every inbound request is sent to exactly one upstream, picked uniformly at random
//! (or round-robin) from a table built at startup. On the way out the request is
//! re-addressed: the upstream's base path and base query are combined with the
//! client's, `Host` is rewritten and a default `User-Agent` is filled in. On the way
//! back gzip bodies are decoded, non-200 bodies are marked with `StatusCode error:`
//! and `Content-Length` is recomputed. Failures never leak a partial response: the
//! client gets a 500 whose body starts with `ErrorHandler error:`.
//!
//! # Quick Example
//! ```no_run
//! use std::{net::SocketAddr, sync::Arc};
//!
//! use scatter::{HttpClientAdapter, HttpHandler, ProxyService, adapters::router, config};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = config::load_config("config.toml").await?;
//! let client = Arc::new(HttpClientAdapter::new(&cfg.transport)?);
//! let service = Arc::new(ProxyService::from_config(&cfg, client)?);
//! let app = router(Arc::new(HttpHandler::new(service)));
//!
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the request pipeline inside `core`. The pipeline only talks to the network through the
//! [`HttpClient`] port, so it can be driven by an in-memory client in tests.
//!
//! # Error Handling
//! Startup APIs return `eyre::Result<T>` with context attached via `WrapErr`. The request
//! pipeline uses typed `thiserror` errors that the HTTP handler turns into responses.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HttpClientAdapter, HttpHandler},
    core::ProxyService,
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
