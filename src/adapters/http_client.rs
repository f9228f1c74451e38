use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use tokio::time::timeout;

use crate::ports::http_client::{UpstreamClient, UpstreamError, UpstreamResult};

/// Idle connections kept per upstream `ip:port`.
const POOL_MAX_IDLE_PER_HOST: usize = 20;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Hyper client with one connection pool per upstream `ip:port`. Redirects
/// are never followed; a load balancer must hand 3xx back to the client.
pub struct PooledHttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl PooledHttpClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build_http();

        Self { client }
    }

    /// Round trip plus full body read, bounded by `limit`.
    async fn dispatch(
        &self,
        req: Request<Full<Bytes>>,
        limit: Duration,
    ) -> UpstreamResult<Response<Bytes>> {
        let round_trip = async {
            let response = self
                .client
                .request(req)
                .await
                .map_err(|err| UpstreamError::Connection(err.to_string()))?;
            buffer_response(response).await
        };

        match timeout(limit, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(limit)),
        }
    }
}

impl Default for PooledHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain the streaming body into one buffer; the caller's timeout covers
/// this too, so TTFB measurements span the full response.
async fn buffer_response(
    response: Response<hyper::body::Incoming>,
) -> UpstreamResult<Response<Bytes>> {
    let (parts, body) = response.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|err| UpstreamError::Connection(err.to_string()))?
        .to_bytes();
    Ok(Response::from_parts(parts, bytes))
}

impl UpstreamClient for PooledHttpClient {
    fn send_request(
        &self,
        req: Request<Bytes>,
        timeout: Duration,
    ) -> impl std::future::Future<Output = UpstreamResult<Response<Bytes>>> + Send {
        async move {
            let (parts, body) = req.into_parts();
            self.dispatch(Request::from_parts(parts, Full::new(body)), timeout)
                .await
        }
    }

    fn probe(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl std::future::Future<Output = UpstreamResult<StatusCode>> + Send {
        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Full::new(Bytes::new()))
            .map_err(|err| UpstreamError::InvalidRequest(err.to_string()));

        async move {
            let response = self.dispatch(request?, timeout).await?;
            Ok(response.status())
        }
    }
}
