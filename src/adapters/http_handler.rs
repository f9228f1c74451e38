use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::response::Response as AxumResponse;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST};
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use http_body_util::BodyExt;
use uuid::Uuid;

use crate::core::proxy::ProxyService;
use crate::core::selector::ClientInfo;
use crate::core::target::Target;
use crate::ports::http_client::{UpstreamClient, UpstreamError};

/// Headers never forwarded to the upstream: the RFC 7230 hop-by-hop set,
/// plus Host which is regenerated per hop.
const HOP_BY_HOP_REQUEST_HEADERS: [&str; 4] = ["host", "connection", "keep-alive", "transfer-encoding"];

/// Hop-by-hop headers stripped from upstream responses. Bodies are
/// re-buffered, so a stale Transfer-Encoding must not survive the hop.
const HOP_BY_HOP_RESPONSE_HEADERS: [&str; 3] = ["connection", "keep-alive", "transfer-encoding"];

#[derive(Debug, Clone)]
pub struct ForwarderSettings {
    /// Port the listener accepts traffic on, advertised as X-Forwarded-Port.
    pub listener_port: u16,
    /// Budget for the complete upstream round trip.
    pub connection_timeout: Duration,
    /// Whether to synthesize the X-Forwarded-* header convention.
    pub header_convention: bool,
}

/// Everything the forwarder needs for a single upstream call.
pub struct ForwardRequest<'a> {
    pub target: &'a Target,
    pub method: Method,
    pub headers: &'a HeaderMap,
    pub body: Bytes,
    /// Path after the rule's prefix rewrite.
    pub path: &'a str,
    /// Original query string, carried through unchanged.
    pub query: Option<&'a str>,
    pub scheme: &'a str,
    pub client: &'a ClientInfo,
}

/// Translates a routed request into an upstream call and the upstream's
/// answer (or failure) into the client-facing response.
pub struct Forwarder<C> {
    client: Arc<C>,
    settings: ForwarderSettings,
}

impl<C: UpstreamClient> Forwarder<C> {
    pub fn new(client: Arc<C>, settings: ForwarderSettings) -> Self {
        Self { client, settings }
    }

    pub async fn forward(&self, args: ForwardRequest<'_>) -> AxumResponse {
        let target = args.target;

        let mut url = target.url_for(args.path);
        if let Some(query) = args.query {
            url.push('?');
            url.push_str(query);
        }

        let mut upstream_headers = filter_request_headers(args.headers);
        if self.settings.header_convention {
            apply_header_convention(
                &mut upstream_headers,
                args.headers,
                &self.settings,
                args.scheme,
                args.client,
            );
        }

        let request = match Request::builder()
            .method(args.method)
            .uri(url.as_str())
            .body(args.body)
        {
            Ok(mut request) => {
                *request.headers_mut() = upstream_headers;
                request
            }
            Err(err) => {
                tracing::error!(url = %url, error = %err, "failed to build upstream request");
                return empty_response(StatusCode::BAD_GATEWAY);
            }
        };

        target.metrics.inc_active();
        let started = Instant::now();
        let outcome = self
            .client
            .send_request(request, self.settings.connection_timeout)
            .await;
        target.metrics.dec_active();

        match outcome {
            Ok(response) => {
                // TTFB sample spans dispatch to fully-received response.
                target.metrics.record_ttfb(started.elapsed().as_secs_f64());
                into_client_response(response)
            }
            Err(err) => {
                tracing::warn!(target = %target, url = %url, error = %err, "upstream request failed");
                empty_response(status_for(&err))
            }
        }
    }
}

/// Glues routing and forwarding together for the listener: resolves the
/// request to a target, forwards it, and maps routing misses to their
/// synthetic statuses.
pub struct ProxyHandler<C> {
    proxy: Arc<ProxyService>,
    forwarder: Forwarder<C>,
}

impl<C: UpstreamClient> ProxyHandler<C> {
    pub fn new(proxy: Arc<ProxyService>, forwarder: Forwarder<C>) -> Self {
        Self { proxy, forwarder }
    }

    pub async fn handle(&self, req: Request<Body>, peer: Option<SocketAddr>) -> AxumResponse {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        let query = parts.uri.query().map(str::to_string);
        let scheme = parts.uri.scheme_str().unwrap_or("http").to_string();

        let client = ClientInfo {
            forwarded_for: parts
                .headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
            peer_addr: peer,
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::error!(path = %path, error = %err, "failed to read request body");
                return empty_response(StatusCode::BAD_GATEWAY);
            }
        };

        let routed = match self.proxy.resolve(&path, &client) {
            Ok(routed) => routed,
            Err(err) => {
                tracing::debug!(path = %path, error = %err, "request not routable");
                return empty_response(err.status_code());
            }
        };

        tracing::debug!(
            group = routed.group.name(),
            target = %routed.target,
            path = %routed.path,
            "forwarding request"
        );

        self.forwarder
            .forward(ForwardRequest {
                target: &routed.target,
                method: parts.method,
                headers: &parts.headers,
                body,
                path: &routed.path,
                query: query.as_deref(),
                scheme: &scheme,
                client: &client,
            })
            .await
    }
}

fn filter_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();
    for (name, value) in headers {
        // HeaderName::as_str is always lowercase.
        if HOP_BY_HOP_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Synthesize the X-Forwarded-* convention onto the already-filtered upstream
/// headers. `original` is consulted for the incoming Host value.
fn apply_header_convention(
    upstream_headers: &mut HeaderMap,
    original: &HeaderMap,
    settings: &ForwarderSettings,
    scheme: &str,
    client: &ClientInfo,
) {
    if let Some(client_ip) = client.client_ip() {
        let forwarded_for = match upstream_headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            Some(existing) => format!("{existing}, {client_ip}"),
            None => client_ip.clone(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            upstream_headers.insert("x-forwarded-for", value);
        }
        if let Ok(value) = HeaderValue::from_str(&client_ip) {
            upstream_headers.insert("x-real-ip", value);
        }
    }

    if let Some(host) = original.get(HOST) {
        upstream_headers.insert("x-forwarded-host", host.clone());
        // Restore the Host dropped with the hop-by-hop set.
        upstream_headers.insert(HOST, host.clone());
    }

    upstream_headers.insert("x-forwarded-port", HeaderValue::from(settings.listener_port));

    if let Ok(value) = HeaderValue::from_str(scheme) {
        upstream_headers.insert("x-forwarded-proto", value);
    }

    if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        upstream_headers.insert("x-request-id", value);
    }
}

/// Upstream responses pass through verbatim apart from hop-by-hop headers;
/// 4xx/5xx are never rewritten.
fn into_client_response(response: http::Response<Bytes>) -> AxumResponse {
    let (mut parts, body) = response.into_parts();
    for name in HOP_BY_HOP_RESPONSE_HEADERS {
        parts.headers.remove(name);
    }
    AxumResponse::from_parts(parts, Body::from(body))
}

fn status_for(err: &UpstreamError) -> StatusCode {
    match err {
        UpstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        UpstreamError::Connection(_) | UpstreamError::InvalidRequest(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Synthetic error responses carry an explicit empty body.
fn empty_response(status: StatusCode) -> AxumResponse {
    let mut response = AxumResponse::new(Body::empty());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}
