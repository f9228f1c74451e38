use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::response::Response as AxumResponse;
use http::Request;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::adapters::http_handler::ProxyHandler;
use crate::ports::http_client::UpstreamClient;

/// Axum front end: every method on every path falls through to the proxy
/// handler.
pub struct ProxyServer<C> {
    handler: Arc<ProxyHandler<C>>,
    port: u16,
}

impl<C: UpstreamClient> ProxyServer<C> {
    pub fn new(handler: Arc<ProxyHandler<C>>, port: u16) -> Self {
        Self { handler, port }
    }

    pub fn router(handler: Arc<ProxyHandler<C>>) -> Router {
        Router::new()
            .fallback(handle_request::<C>)
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(handler)
    }

    /// Serve until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to address: {addr}"))?;

        tracing::info!("Listening on {addr}");

        axum::serve(
            listener,
            Self::router(self.handler.clone())
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

        Ok(())
    }
}

async fn handle_request<C: UpstreamClient>(
    State(handler): State<Arc<ProxyHandler<C>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> AxumResponse {
    handler.handle(req, Some(peer)).await
}
