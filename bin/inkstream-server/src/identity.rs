//! User identity resolution: first non-empty of `X-User-Id` header,
//! `mt-user-id` cookie, `ip:<client-host>`, literal `"anonymous"`.

use std::net::SocketAddr;

use axum::http::HeaderMap;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ID_COOKIE: &str = "mt-user-id";

pub fn resolve_user_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(header) = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return header.to_owned();
    }

    if let Some(cookie) = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| find_cookie(cookies, USER_ID_COOKIE))
        .filter(|v| !v.is_empty())
    {
        return cookie;
    }

    if let Some(addr) = peer {
        return format!("ip:{}", addr.ip());
    }

    "anonymous".to_owned()
}

fn find_cookie(cookie_header: &str, name: &str) -> Option<String> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_header_over_everything_else() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("mt-user-id=bob"));
        assert_eq!(resolve_user_id(&headers, None), "alice");
    }

    #[test]
    fn falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("foo=bar; mt-user-id=bob"));
        assert_eq!(resolve_user_id(&headers, None), "bob");
    }

    #[test]
    fn falls_back_to_peer_ip() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(resolve_user_id(&headers, Some(peer)), "ip:127.0.0.1");
    }

    #[test]
    fn falls_back_to_anonymous() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_user_id(&headers, None), "anonymous");
    }

    #[test]
    fn blank_header_is_treated_as_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  "));
        headers.insert(axum::http::header::COOKIE, HeaderValue::from_static("mt-user-id=bob"));
        assert_eq!(resolve_user_id(&headers, None), "bob");
    }
}
