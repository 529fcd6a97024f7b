use axum::{extract::ConnectInfo, extract::Request, routing::get, Router};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::Level;

use super::forwarded::ForwardedInfo;
use super::handlers::{status, AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status::status_page))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let forwarded = ForwardedInfo::from_headers(request.headers());
                    let peer = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip().to_string());
                    let client = forwarded.client.or(peer).unwrap_or_default();

                    tracing::span!(
                        Level::INFO,
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        client = %client,
                        proto = forwarded.proto.as_deref().unwrap_or("http"),
                        host = forwarded.host.as_deref().unwrap_or_default(),
                        port = ?forwarded.port,
                    )
                })
                .on_request(|_request: &Request, _span: &tracing::Span| {
                    tracing::event!(Level::DEBUG, "received request");
                })
                .on_response(
                    |_response: &axum::response::Response,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::event!(Level::INFO, latency = ?latency, "request completed");
                    },
                ),
        )
}
