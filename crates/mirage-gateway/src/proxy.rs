//! Request forwarding: legitimate upstream or decoy fan-out.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use mirage_common::constants::headers::{X_DECOY_ROUTED, X_FORWARDED_FOR, X_REAL_IP};

use crate::state::AppState;

/// Fallback handler: everything outside the control API is proxied.
pub async fn handle(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response {
    let source_ip = extract_source_ip(req.headers(), &peer);

    match state.blocks.lookup(&source_ip).await {
        Some(entry) => {
            let (decoy_url, count) = {
                let (url, count) = entry.select();
                (url.to_string(), count)
            };

            tracing::info!(
                action = "route_to_decoy",
                source_ip = %source_ip,
                selected_url = %decoy_url,
                round_robin_count = count,
                "Routing blocked address to decoy"
            );

            forward(&state, req, &decoy_url, &source_ip, true).await
        }
        None => {
            tracing::info!(
                action = "route_to_legitimate",
                source_ip = %source_ip,
                method = %req.method(),
                path = req.uri().path(),
                "Routing to legitimate upstream"
            );

            let upstream = state.config.legitimate_url.clone();
            forward(&state, req, &upstream, &source_ip, false).await
        }
    }
}

/// Source address precedence: forwarded-for header, then real-client
/// header, then the transport peer.
pub fn extract_source_ip(headers: &HeaderMap, peer: &SocketAddr) -> String {
    if let Some(ip) = header_ip(headers, X_FORWARDED_FOR) {
        return ip;
    }
    if let Some(ip) = header_ip(headers, X_REAL_IP) {
        return ip;
    }
    peer.ip().to_string()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Forward a request to `base`, preserving method, path, query, headers and
/// body. Decoy-bound requests are marked and carry the original source in
/// the forwarded-for header. A failed target yields 502; a decoy failure
/// never falls through to the legitimate upstream.
async fn forward(
    state: &AppState,
    req: Request<Body>,
    base: &str,
    source_ip: &str,
    decoy: bool,
) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("{}{}", base.trim_end_matches('/'), path_and_query);

    let method = req.method().clone();
    let req_headers = req.headers().clone();

    let body = match axum::body::to_bytes(req.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(action = "bad_request_body", source_ip = %source_ip, error = %e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let mut builder = state.http.request(method, &target);
    for (name, value) in req_headers.iter() {
        if *name == header::HOST || *name == header::CONTENT_LENGTH || *name == X_FORWARDED_FOR {
            continue;
        }
        builder = builder.header(name, value);
    }

    if decoy {
        builder = builder
            .header(X_FORWARDED_FOR, source_ip)
            .header(X_DECOY_ROUTED, "true");
    } else {
        // Preserve an existing chain, otherwise start one with the source
        let forwarded = match req_headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => existing.to_string(),
            None => source_ip.to_string(),
        };
        builder = builder.header(X_FORWARDED_FOR, forwarded);
    }

    let resp = match builder.body(body).send().await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::error!(
                action = if decoy { "decoy_error" } else { "upstream_error" },
                source_ip = %source_ip,
                target = %target,
                error = %e,
                "Forwarding failed"
            );
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = resp.status();
    let resp_headers = resp.headers().clone();
    let bytes = match resp.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(
                action = if decoy { "decoy_error" } else { "upstream_error" },
                source_ip = %source_ip,
                target = %target,
                error = %e,
                "Reading forwarded response failed"
            );
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let mut out = Response::builder().status(status);
    for (name, value) in resp_headers.iter() {
        if *name == header::CONTENT_LENGTH || *name == header::TRANSFER_ENCODING {
            continue;
        }
        out = out.header(name, value);
    }

    out.body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "203.0.113.7:51234".parse().unwrap()
    }

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.9"));
        headers.insert(X_REAL_IP, HeaderValue::from_static("10.0.0.1"));

        assert_eq!(extract_source_ip(&headers, &peer()), "10.0.0.9");
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            X_FORWARDED_FOR,
            HeaderValue::from_static("10.0.0.9, 172.16.0.1"),
        );

        assert_eq!(extract_source_ip(&headers, &peer()), "10.0.0.9");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REAL_IP, HeaderValue::from_static("10.0.0.1"));

        assert_eq!(extract_source_ip(&headers, &peer()), "10.0.0.1");
    }

    #[test]
    fn test_peer_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(extract_source_ip(&headers, &peer()), "203.0.113.7");
    }

    #[test]
    fn test_empty_header_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("  "));

        assert_eq!(extract_source_ip(&headers, &peer()), "203.0.113.7");
    }
}
