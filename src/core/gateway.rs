//! Core proxy orchestration service.
//!
//! The `ProxyService` binds the immutable routing table to the request pipeline:
//! * Upstream selection through a pluggable [`SelectionStrategy`]
//! * Request rewriting via the [`RequestDirector`]
//! * A single outbound attempt through the [`HttpClient`] port
//! * Response rewriting via the [`ResponseTransformer`]
//!
//! Protocol upgrades (e.g. websockets) are tunnelled here once the upstream
//! answers `101 Switching Protocols`.
use std::{net::SocketAddr, sync::Arc};

use axum::body::Body as AxumBody;
use eyre::{Result, WrapErr};
use hyper::{Request, Response, StatusCode, upgrade::OnUpgrade};
use hyper_util::rt::TokioIo;

use crate::{
    config::ProxyConfig,
    core::{
        director::RequestDirector,
        error::ProxyResult,
        headers::is_upgrade_request,
        selector::{SelectionStrategy, SelectorFactory},
        target::TargetTable,
        transformer::ResponseTransformer,
    },
    ports::http_client::HttpClient,
};

/// Request handling entry point. Holds only read-only state plus the shared
/// transport, so one instance serves every connection.
pub struct ProxyService {
    targets: TargetTable,
    strategy: Box<dyn SelectionStrategy>,
    director: RequestDirector,
    transformer: ResponseTransformer,
    http_client: Arc<dyn HttpClient>,
}

impl ProxyService {
    pub fn new(
        targets: TargetTable,
        strategy: Box<dyn SelectionStrategy>,
        director: RequestDirector,
        transformer: ResponseTransformer,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            targets,
            strategy,
            director,
            transformer,
            http_client,
        }
    }

    /// Build the service from configuration. Any malformed target or header value
    /// is reported here, before the listener is bound.
    pub fn from_config(config: &ProxyConfig, http_client: Arc<dyn HttpClient>) -> Result<Self> {
        let targets =
            TargetTable::from_urls(&config.targets).wrap_err("Failed to build target table")?;
        let director = RequestDirector::new(&config.default_user_agent)
            .wrap_err("Invalid default_user_agent")?;

        for target in targets.iter() {
            tracing::info!(upstream = %target, "Registered upstream target");
        }

        Ok(Self::new(
            targets,
            SelectorFactory::create_strategy(config.selection),
            director,
            ResponseTransformer::new(config.transformer.body_read_timeout()),
            http_client,
        ))
    }

    pub fn targets(&self) -> &TargetTable {
        &self.targets
    }

    /// Run one request through the pipeline. Exactly one upstream is chosen and
    /// contacted at most once; any failure is returned, never written.
    pub async fn handle(
        &self,
        mut req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> ProxyResult<Response<AxumBody>> {
        let target = self.targets.select(self.strategy.as_ref());
        tracing::info!(upstream = %target.authority(), "send to upstream");

        let client_upgrade =
            is_upgrade_request(req.headers()).then(|| hyper::upgrade::on(&mut req));

        self.director.direct(&mut req, target, client_addr)?;

        let mut response = self.http_client.send_request(req).await?;

        if let Some(client_upgrade) = client_upgrade {
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                let upstream_upgrade = hyper::upgrade::on(&mut response);
                spawn_tunnel(client_upgrade, upstream_upgrade);
            }
        }

        Ok(self.transformer.transform(response).await?)
    }
}

/// Join both halves of an upgraded connection for the life of the session.
fn spawn_tunnel(client: OnUpgrade, upstream: OnUpgrade) {
    tokio::spawn(async move {
        let (client, upstream) = match tokio::try_join!(client, upstream) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!("Upgrade handshake failed: {}", e);
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((from_client, from_upstream)) => tracing::debug!(
                from_client,
                from_upstream,
                "Upgraded connection closed"
            ),
            Err(e) => tracing::debug!("Upgraded connection ended with error: {}", e),
        }
    });
}
