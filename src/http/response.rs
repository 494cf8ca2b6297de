//! Response construction helpers.
//!
//! Every response the proxy writes uses [`ProxyBody`], a boxed body that can
//! carry a buffered payload, a streamed destination body or a payload
//! followed by trailers.

use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full};
use serde::Serialize;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type of every proxy response.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

pub fn full(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed_unsync()
}

pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

fn with_status(status: StatusCode, body: ProxyBody) -> Response<ProxyBody> {
    let mut res = Response::new(body);
    *res.status_mut() = status;
    res
}

pub fn respond_404() -> Response<ProxyBody> {
    with_status(StatusCode::NOT_FOUND, empty())
}

/// 500 with an optional `text/html` error description.
pub fn respond_500(message: Option<&str>) -> Response<ProxyBody> {
    match message {
        Some(message) => {
            let mut res = with_status(StatusCode::INTERNAL_SERVER_ERROR, full(message.to_string()));
            res.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
            res
        }
        None => with_status(StatusCode::INTERNAL_SERVER_ERROR, empty()),
    }
}

pub fn respond_with_json<T: Serialize>(value: &T) -> Response<ProxyBody> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut res = with_status(StatusCode::OK, full(body));
            res.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            res
        }
        Err(e) => respond_500(Some(&e.to_string())),
    }
}

/// Mark a response as never cacheable.
pub fn add_prevent_caching_headers(res: &mut Response<ProxyBody>) {
    let headers = res.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_respond_500_with_message() {
        let res = respond_500(Some("boom"));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "text/html");

        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(b"boom"));
    }

    #[tokio::test]
    async fn test_respond_with_json() {
        let res = respond_with_json(&serde_json::json!({ "ok": true }));
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");

        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from_static(br#"{"ok":true}"#));
    }
}
