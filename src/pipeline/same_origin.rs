//! Same-origin policy emulation for proxied XHRs.
//!
//! Every proxied page shares the proxy's origin, so the browser can no
//! longer enforce CORS on its own. The pipeline re-applies the policy using
//! the destination origin of the requesting page and the destination's
//! CORS response headers.

use http::{header, HeaderMap, Method};
use url::Url;

use crate::pipeline::context::{PipelineContext, XHR_CORS_SUPPORTED_FLAG, XHR_WITH_CREDENTIALS_FLAG};

fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.origin() == b.origin(),
        _ => false,
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Whether the destination response may be handed to the requesting XHR.
pub fn check(ctx: &PipelineContext) -> bool {
    let Some(req_origin) = ctx.dest.req_origin.as_deref() else {
        return true;
    };
    if same_origin(req_origin, &ctx.dest.domain) {
        return true;
    }

    if ctx.xhr_flags & XHR_CORS_SUPPORTED_FLAG == 0 {
        return false;
    }

    // Preflights are answered by the destination itself.
    if ctx.req.method == Method::OPTIONS {
        return true;
    }

    let Some(allow_origin) = header_value(&ctx.dest_headers, &header::ACCESS_CONTROL_ALLOW_ORIGIN) else {
        return false;
    };

    let with_credentials = ctx.xhr_flags & XHR_WITH_CREDENTIALS_FLAG != 0;
    if with_credentials {
        let allow_credentials = header_value(&ctx.dest_headers, &header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        if !allow_credentials || allow_origin == "*" {
            return false;
        }
    }

    allow_origin == "*" || same_origin(allow_origin, req_origin)
}
