//! Default content processor: resource injection into pages.

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use regex::bytes::Regex;
use std::sync::LazyLock;

use crate::pipeline::PipelineContext;
use crate::processing::content::{decode_content, encode_content};
use crate::processing::{ContentProcessor, ProcessingError};

/// Path of the client runtime served by every listener.
pub const CLIENT_SCRIPT_PATH: &str = "/hammerhead.js";

static HEAD_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("valid regex"));
static HTML_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html(?:\s[^>]*)?>").expect("valid regex"));

/// Injects the client runtime, the session's scripts and styles and the
/// task script at the top of every processed page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceInjector;

impl ResourceInjector {
    pub fn new() -> Self {
        Self
    }

    fn is_html(ctx: &PipelineContext) -> bool {
        let info = &ctx.content_info;
        (ctx.is_page || ctx.is_iframe)
            && !info.is_iframe_with_image_src
            && !info.is_css
            && !info.is_script
            && !info.is_manifest
            && !info.is_json
    }
}

impl ContentProcessor for ResourceInjector {
    fn process<'a>(&'a self, ctx: &'a PipelineContext) -> BoxFuture<'a, Result<Bytes, ProcessingError>> {
        async move {
            if !Self::is_html(ctx) {
                return Ok(ctx.dest_res_body.clone());
            }

            let encoding = ctx.content_info.encoding.as_deref();
            let html = decode_content(&ctx.dest_res_body, encoding)?;

            let mut scripts = vec![format!("{}{}", ctx.server_info.domain, CLIENT_SCRIPT_PATH)];
            scripts.extend(ctx.get_injectable_scripts());
            let injected = inject_resources(&html, &scripts, &ctx.get_injectable_styles());

            Ok(Bytes::from(encode_content(&injected, encoding)?))
        }
        .boxed()
    }
}

/// Insert `<script>` and `<link>` tags right after `<head>`, falling back to
/// `<html>` and then to the start of the document.
///
/// Operates on bytes: the inserted markup is ASCII, so any ASCII-compatible
/// charset survives unchanged.
pub fn inject_resources(html: &[u8], scripts: &[String], styles: &[String]) -> Vec<u8> {
    let mut markup = String::new();
    for style in styles {
        markup.push_str(&format!(
            r#"<link rel="stylesheet" type="text/css" class="ui-stylesheet-harness" href="{}">"#,
            style
        ));
    }
    for script in scripts {
        markup.push_str(&format!(
            r#"<script type="text/javascript" class="script-harness" charset="UTF-8" src="{}"></script>"#,
            script
        ));
    }

    let insert_at = HEAD_OPEN_RE
        .find(html)
        .or_else(|| HTML_OPEN_RE.find(html))
        .map_or(0, |m| m.end());

    let mut out = Vec::with_capacity(html.len() + markup.len());
    out.extend_from_slice(&html[..insert_at]);
    out.extend_from_slice(markup.as_bytes());
    out.extend_from_slice(&html[insert_at..]);
    out
}
