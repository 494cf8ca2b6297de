//! Header transforms between the browser and the destination.

use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue};
use url::Url;

use crate::pipeline::context::{PipelineContext, XHR_REQUEST_MARKER_HEADER};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const SUPPORTED_ENCODINGS: &[&str] = &["gzip", "deflate"];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn insert_str(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::debug!(header = %name, "Dropping header with invalid value"),
    }
}

// Keep only encodings the content codecs can undo.
fn filter_accept_encoding(value: &str) -> Option<String> {
    let kept: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|token| {
            let coding = token.split(';').next().unwrap_or("").trim();
            SUPPORTED_ENCODINGS.iter().any(|e| coding.eq_ignore_ascii_case(e))
        })
        .collect();

    (!kept.is_empty()).then(|| kept.join(", "))
}

/// Headers for the outbound destination request.
pub fn for_request(ctx: &PipelineContext) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(ctx.req.headers.len());

    for (name, value) in &ctx.req.headers {
        let skip = is_hop_by_hop(name)
            || name == XHR_REQUEST_MARKER_HEADER
            || name == header::COOKIE
            || name == header::CONTENT_LENGTH
            || name == header::HOST
            || name == header::REFERER
            || name == header::ORIGIN
            || name == header::ACCEPT_ENCODING;

        if !skip {
            headers.append(name.clone(), value.clone());
        }
    }

    insert_str(&mut headers, header::HOST, &ctx.dest.host);

    if let Some(referer) = &ctx.dest.referer {
        insert_str(&mut headers, header::REFERER, referer);
    }

    if ctx.req.headers.contains_key(header::ORIGIN) {
        if let Some(req_origin) = &ctx.dest.req_origin {
            insert_str(&mut headers, header::ORIGIN, req_origin);
        }
    }

    let accept_encoding = ctx
        .req
        .headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .and_then(filter_accept_encoding);
    if let Some(accept_encoding) = accept_encoding {
        insert_str(&mut headers, header::ACCEPT_ENCODING, &accept_encoding);
    }

    if let Some(cookie) = ctx.session.cookie_header(&ctx.dest) {
        insert_str(&mut headers, header::COOKIE, &cookie);
    }

    headers
}

/// Headers for the response written back to the browser.
///
/// `Set-Cookie` values are handed to the session and never reach the browser.
pub fn for_response(ctx: &PipelineContext) -> HeaderMap {
    let processing = ctx.content_info.require_processing;
    let mut headers = HeaderMap::with_capacity(ctx.dest_headers.len());
    let mut set_cookies = Vec::new();

    for (name, value) in &ctx.dest_headers {
        if is_hop_by_hop(name) {
            continue;
        }

        if name == header::SET_COOKIE {
            if let Ok(cookie) = value.to_str() {
                set_cookies.push(cookie.to_string());
            }
        } else if name == header::LOCATION {
            match value.to_str().ok().and_then(|location| rewrite_location(ctx, location)) {
                Some(location) => insert_str(&mut headers, header::LOCATION, &location),
                None => {
                    headers.append(name.clone(), value.clone());
                }
            }
        } else if processing && name == header::CONTENT_LENGTH {
            continue;
        } else if processing && name == header::CONTENT_TYPE {
            insert_str(&mut headers, header::CONTENT_TYPE, &processed_content_type(ctx, value));
        } else {
            headers.append(name.clone(), value.clone());
        }
    }

    if !set_cookies.is_empty() {
        ctx.session.sync_cookies(&ctx.dest, set_cookies);
    }

    headers
}

fn rewrite_location(ctx: &PipelineContext, location: &str) -> Option<String> {
    let resolved = Url::parse(&ctx.dest.url).ok()?.join(location).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }

    Some(ctx.to_proxy_url(resolved.as_str(), false, ctx.dest.resource_type))
}

fn processed_content_type(ctx: &PipelineContext, value: &HeaderValue) -> String {
    if ctx.content_info.is_iframe_with_image_src {
        return "text/html".to_string();
    }

    let mime = value
        .to_str()
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim();

    format!("{}; charset={}", mime, ctx.content_info.charset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ServerInfo;
    use crate::proxy_url::Destination;
    use crate::session::{BasicSession, Session, SessionRegistry};
    use http::Request;
    use std::sync::Arc;

    fn ctx_with_session(uri: &str, headers: &[(&str, &str)], session: Arc<BasicSession>) -> PipelineContext {
        let registry = SessionRegistry::new();
        registry.insert(session);

        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        PipelineContext::dispatch(parts, ServerInfo::new("localhost", 1836, 1837), &registry).unwrap()
    }

    fn ctx(uri: &str, headers: &[(&str, &str)]) -> PipelineContext {
        ctx_with_session(uri, headers, Arc::new(BasicSession::new("sid")))
    }

    #[test]
    fn test_request_headers() {
        let ctx = ctx(
            "/sid/http://api.com:8080/data",
            &[
                ("referer", "http://localhost:1836/sid/http://page.com/index.html"),
                ("origin", "http://localhost:1836"),
                ("host", "localhost:1836"),
                ("cookie", "proxy=cookie"),
                ("connection", "keep-alive"),
                ("accept-encoding", "gzip, deflate, br"),
                (XHR_REQUEST_MARKER_HEADER, "16"),
                ("x-custom", "kept"),
            ],
        );
        let headers = for_request(&ctx);

        assert_eq!(headers[header::HOST], "api.com:8080");
        assert_eq!(headers[header::REFERER], "http://page.com/index.html");
        assert_eq!(headers[header::ORIGIN], "http://page.com");
        assert_eq!(headers[header::ACCEPT_ENCODING], "gzip, deflate");
        assert_eq!(headers["x-custom"], "kept");
        assert!(!headers.contains_key(header::COOKIE));
        assert!(!headers.contains_key(header::CONNECTION));
        assert!(!headers.contains_key(XHR_REQUEST_MARKER_HEADER));
    }

    #[test]
    fn test_request_headers_without_referer() {
        let ctx = ctx("/sid/http://api.com/", &[("referer", "http://unrelated.com/"), ("accept-encoding", "br")]);
        let headers = for_request(&ctx);
        assert!(!headers.contains_key(header::REFERER));
        assert!(!headers.contains_key(header::ACCEPT_ENCODING));
    }

    #[test]
    fn test_session_cookies_sent() {
        let session = Arc::new(BasicSession::new("sid"));
        let dest = Destination::parse("http://api.com/").unwrap();
        session.sync_cookies(&dest, vec!["token=1".to_string()]);

        let ctx = ctx_with_session("/sid/http://api.com/", &[], session);
        assert_eq!(for_request(&ctx)[header::COOKIE], "token=1");
    }

    #[test]
    fn test_response_headers_for_processed_page() {
        let session = Arc::new(BasicSession::new("sid"));
        let mut ctx = ctx_with_session("/sid/http://page.com/a/b", &[("accept", "text/html")], Arc::clone(&session));
        ctx.dest_headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=UTF8"));
        ctx.dest_headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        ctx.dest_headers
            .insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        ctx.dest_headers
            .append(header::SET_COOKIE, HeaderValue::from_static("a=1; Path=/"));
        ctx.dest_headers
            .insert(header::LOCATION, HeaderValue::from_static("../c?d=1"));
        ctx.build_content_info();

        let headers = for_response(&ctx);
        assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(headers[header::LOCATION], "http://localhost:1836/sid/http://page.com/c?d=1");
        assert!(!headers.contains_key(header::CONTENT_LENGTH));
        assert!(!headers.contains_key(header::TRANSFER_ENCODING));
        assert!(!headers.contains_key(header::SET_COOKIE));

        let dest = Destination::parse("http://page.com/").unwrap();
        assert_eq!(session.cookie_header(&dest).as_deref(), Some("a=1"));
    }

    #[test]
    fn test_response_headers_for_piped_body() {
        let mut ctx = ctx("/sid/http://page.com/img.png", &[]);
        ctx.dest_headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        ctx.dest_headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        ctx.build_content_info();

        let headers = for_response(&ctx);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(headers[header::CONTENT_LENGTH], "10");
    }

    #[test]
    fn test_iframe_image_content_type() {
        let mut ctx = ctx("/sid!i/http://page.com/img.png", &[]);
        ctx.dest_headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        ctx.build_content_info();

        assert_eq!(for_response(&ctx)[header::CONTENT_TYPE], "text/html");
    }
}
