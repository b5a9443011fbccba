//! Beacon-facing handlers: the only two operations a beacon ever calls.

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use lodestar_types::{CheckinRequest, CheckinResponse, HandshakeRequest, HandshakeResponse};
use std::net::SocketAddr;

/// The client address used for session bookkeeping. A reverse proxy in
/// front of the daemon rewrites the peer address, so a forwarded header
/// wins when present.
fn client_addr(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.to_string())
}

/// First contact: key exchange plus durable registration.
pub async fn beacon_handshake(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<HandshakeRequest>,
) -> ApiResult<Json<HandshakeResponse>> {
    let remote = client_addr(&headers, addr);
    let response = state.channel.handshake(request, &remote).await?;
    Ok(Json(response))
}

/// Authenticated envelope round-trip: result in, next directive out.
pub async fn beacon_checkin(
    State(state): State<AppState>,
    Json(request): Json<CheckinRequest>,
) -> ApiResult<Json<CheckinResponse>> {
    let response = state.channel.process(request).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_overrides_socket_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.9, 10.0.0.1".parse().unwrap());
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(client_addr(&headers, addr), "198.51.100.9");
    }

    #[test]
    fn socket_address_is_the_fallback() {
        let addr: SocketAddr = "203.0.113.7:4444".parse().unwrap();
        assert_eq!(client_addr(&HeaderMap::new(), addr), "203.0.113.7:4444");
    }
}
