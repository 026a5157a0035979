//! Caller IP resolution.
//!
//! `X-Forwarded-For` is only honoured when the direct peer is a configured
//! trusted proxy; otherwise the socket address is the identity. Proxies
//! append to the header, so it is read right to left: the first hop that is
//! not itself a trusted proxy is the caller. Entries left of it are
//! client-supplied and ignored.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

pub fn resolve_client_ip(peer: SocketAddr, headers: &HeaderMap, trusted_proxies: &[IpAddr]) -> IpAddr {
    let peer_ip = peer.ip();
    if !trusted_proxies.contains(&peer_ip) {
        return peer_ip;
    }

    let Some(forwarded) = headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) else {
        return peer_ip;
    };

    for hop in forwarded.rsplit(',') {
        let Ok(ip) = hop.trim().parse::<IpAddr>() else {
            return peer_ip;
        };
        if !trusted_proxies.contains(&ip) {
            return ip;
        }
    }
    peer_ip
}
