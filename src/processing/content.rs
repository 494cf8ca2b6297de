//! MIME classification, charsets and content encodings.

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use regex::Regex;
use std::io::{Read, Write};
use std::sync::LazyLock;

use crate::processing::ProcessingError;

const JSON_MIME: &str = "application/json";
const MANIFEST_MIME: &str = "text/cache-manifest";
const CSS_MIME: &str = "text/css";

const PAGE_MIMES: &[&str] = &[
    "text/html",
    "application/xhtml+xml",
    "application/xml",
    "application/x-ms-application",
];

const SCRIPT_MIMES: &[&str] = &[
    "application/javascript",
    "text/javascript",
    "application/x-javascript",
];

const CHARSETS: &[&str] = &[
    "iso-8859-1", "iso-8859-2", "iso-8859-3", "iso-8859-4",
    "iso-8859-5", "iso-8859-6", "iso-8859-7", "iso-8859-8",
    "iso-8859-9", "iso-8859-10", "iso-8859-11", "iso-8859-12",
    "iso-8859-13", "iso-8859-14", "iso-8859-15", "iso-8859-16",
    "windows-1250", "windows-1251", "windows-1252", "windows-1253",
    "windows-1254", "windows-1255", "windows-1256", "windows-1257",
    "windows-1258", "windows-874", "windows-866", "koi8-r",
    "koi8-u", "utf-8", "utf-16", "utf-32",
    "shift-jis", "x-euc", "big5", "euc-kr",
];

/// HTTP/1.1 default when no charset is declared.
pub const DEFAULT_CHARSET: &str = "iso-8859-1";

static CHARSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|;)\s*charset=([^;]+)").expect("valid regex"));

pub fn is_page(header: &str) -> bool {
    let header = header.to_ascii_lowercase();
    PAGE_MIMES.iter().any(|mime| header.contains(mime))
}

pub fn is_css_resource(content_type: &str, accept: &str) -> bool {
    content_type.to_ascii_lowercase().contains(CSS_MIME) || accept.eq_ignore_ascii_case(CSS_MIME)
}

pub fn is_script_resource(content_type: &str, accept: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    let accept = accept.to_ascii_lowercase();

    SCRIPT_MIMES.iter().any(|mime| content_type.contains(mime)) || SCRIPT_MIMES.contains(&accept.as_str())
}

pub fn is_manifest(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains(MANIFEST_MIME)
}

pub fn is_json(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains(JSON_MIME)
}

fn normalize_charset(charset: Option<&str>) -> &'static str {
    let Some(charset) = charset else {
        return DEFAULT_CHARSET;
    };
    let key = charset.trim().trim_matches('"').replace('-', "").to_ascii_lowercase();

    CHARSETS
        .iter()
        .find(|known| known.replace('-', "") == key)
        .copied()
        .unwrap_or(DEFAULT_CHARSET)
}

/// Charset declared by a `Content-Type` header, normalized to a known name.
pub fn parse_charset(content_type: &str) -> &'static str {
    let declared = CHARSET_RE.captures(content_type).map(|c| c.get(1).map_or("", |m| m.as_str()).to_string());
    normalize_charset(declared.as_deref())
}

/// Undo a `Content-Encoding`. Unknown encodings pass through untouched.
pub fn decode_content(content: &[u8], encoding: Option<&str>) -> Result<Vec<u8>, ProcessingError> {
    match encoding.map(str::to_ascii_lowercase).as_deref() {
        Some("gzip") => read_all(GzDecoder::new(content)),
        Some("deflate") => inflate_with_fallback(content),
        _ => Ok(content.to_vec()),
    }
}

pub fn encode_content(content: &[u8], encoding: Option<&str>) -> Result<Vec<u8>, ProcessingError> {
    match encoding.map(str::to_ascii_lowercase).as_deref() {
        Some("gzip") => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content)?;
            Ok(encoder.finish()?)
        }
        Some("deflate") => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content)?;
            Ok(encoder.finish()?)
        }
        _ => Ok(content.to_vec()),
    }
}

// Some servers answer `deflate` with a raw deflate stream instead of zlib.
fn inflate_with_fallback(content: &[u8]) -> Result<Vec<u8>, ProcessingError> {
    read_all(ZlibDecoder::new(content)).or_else(|_| read_all(DeflateDecoder::new(content)))
}

fn read_all(mut reader: impl Read) -> Result<Vec<u8>, ProcessingError> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out)?;
    Ok(out)
}
