//! Public HTTP entry point.
//!
//! Every inbound request is routed by its Host header: resolve the hostname,
//! find the bound peer, and drive a dispatch through the tunnel. The gateway
//! itself only ever emits 400 (bad Host), 404 (no bound peer), 502 (peer
//! gone / send or decode failure), and 504 (buffered deadline); every other
//! status comes from the peer's response frame.
use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use tracing::Instrument;

use crate::{
    config::models::DispatchConfig,
    core::{
        dispatch::{DispatchRequest, Dispatcher},
        frame::ResponseMode,
        headers,
        registry::PeerRegistry,
    },
    tracing_setup,
    utils::host::normalize_hostname,
};

/// HTTP handler for forwarded (public) traffic.
pub struct GatewayHandler {
    registry: Arc<PeerRegistry>,
    dispatcher: Arc<Dispatcher>,
    max_request_body_bytes: usize,
}

impl GatewayHandler {
    pub fn new(
        registry: Arc<PeerRegistry>,
        dispatcher: Arc<Dispatcher>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            max_request_body_bytes: config.max_request_body_bytes,
        }
    }

    /// Main request handler: resolve, dispatch, reply.
    pub async fn handle_request(&self, req: Request<Body>) -> Response<Body> {
        let start_time = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let span = tracing_setup::create_request_span(method.as_str(), &path);
        let response = async { self.forward(req).await }.instrument(span.clone()).await;

        let duration = start_time.elapsed();
        span.record("http.status_code", response.status().as_u16());
        span.record("duration_ms", duration.as_millis() as u64);
        tracing::info!(
            parent: &span,
            status = response.status().as_u16(),
            duration_ms = duration.as_millis() as u64,
            "request completed"
        );

        response
    }

    async fn forward(&self, req: Request<Body>) -> Response<Body> {
        let hostname = match resolve_hostname(&req) {
            Ok(hostname) => hostname,
            Err(response) => return response,
        };
        tracing::Span::current().record("hostname", hostname.as_str());

        let Some(peer) = self.registry.lookup(&hostname) else {
            tracing::debug!(hostname = %hostname, "no peer bound for hostname");
            return text_response(
                StatusCode::NOT_FOUND,
                format!("no tunnel is connected for {hostname}"),
            );
        };

        let mode = if headers::wants_event_stream(req.headers()) {
            ResponseMode::Stream
        } else {
            ResponseMode::Buffer
        };

        let method = req.method().as_str().to_string();
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| req.uri().path().to_string());
        let frame_headers = headers::canonicalize(req.headers());

        let body = match axum::body::to_bytes(req.into_body(), self.max_request_body_bytes).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(hostname = %hostname, error = %err, "failed to read request body");
                return text_response(StatusCode::BAD_REQUEST, "unreadable request body".into());
            }
        };

        let dispatch_request = DispatchRequest {
            hostname,
            method,
            target,
            headers: frame_headers,
            body,
        };

        self.dispatcher.dispatch(&peer, dispatch_request, mode).await
    }
}

/// Pull the hostname out of a public request, or produce the 400 reply.
pub fn resolve_hostname(req: &Request<Body>) -> Result<String, Response<Body>> {
    let raw = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        // HTTP/2 carries the authority in the URI instead of a Host header.
        .or_else(|| req.uri().authority().map(|a| a.to_string()));

    let Some(raw) = raw else {
        return Err(text_response(
            StatusCode::BAD_REQUEST,
            "missing Host header".into(),
        ));
    };
    normalize_hostname(&raw).map_err(|err| {
        tracing::debug!(error = %err, "rejecting request with unparsable Host");
        text_response(StatusCode::BAD_REQUEST, "invalid Host header".into())
    })
}

pub(crate) fn text_response(status: StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::memory_store::MemoryLogStore,
        config::models::RecorderConfig,
        core::recorder::Recorder,
    };

    fn handler() -> GatewayHandler {
        let registry = Arc::new(PeerRegistry::new());
        let store = Arc::new(MemoryLogStore::new());
        let recorder = Recorder::spawn(store, &RecorderConfig::default());
        let dispatcher = Arc::new(Dispatcher::new(recorder, &DispatchConfig::default()));
        GatewayHandler::new(registry, dispatcher, &DispatchConfig::default())
    }

    fn request_for(host: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/ping");
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_host_is_bad_request() {
        let response = handler().handle_request(request_for(None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_host_is_bad_request() {
        let response = handler().handle_request(request_for(Some("bad host"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unbound_hostname_is_not_found_and_names_the_host() {
        let response = handler()
            .handle_request(request_for(Some("b.example")))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("b.example"));
    }
}
