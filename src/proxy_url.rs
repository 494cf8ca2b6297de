//! Proxy URL encoding.
//!
//! A proxy URL routes a browser request back through one of the listeners
//! while carrying everything needed to rebuild the real destination:
//!
//! ```text
//! http://{proxy_host}:{port}/{session_id}[!{tag}]/{destination_url}
//! ```
//!
//! `tag` is `s` for scripts and `i` for iframes. The destination URL is kept
//! verbatim so that decoding returns exactly what was encoded.

/// Classification of a destination carried inside the proxy URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceType {
    #[default]
    None,
    Script,
    Iframe,
}

impl ResourceType {
    /// URL token for this resource type, if any.
    pub fn tag(self) -> Option<&'static str> {
        match self {
            ResourceType::None => None,
            ResourceType::Script => Some("s"),
            ResourceType::Iframe => Some("i"),
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "s" => Some(ResourceType::Script),
            "i" => Some(ResourceType::Iframe),
            _ => None,
        }
    }
}

/// The real origin target of a proxied request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Destination {
    /// Full destination URL.
    pub url: String,
    /// Scheme with trailing colon, e.g. `http:`.
    pub protocol: String,
    /// Hostname plus `:port` when a port is present.
    pub host: String,
    pub hostname: String,
    /// Port as written, empty when absent.
    pub port: String,
    /// Path, query and fragment.
    pub part_after_host: String,
    pub resource_type: ResourceType,
    /// `protocol//host` of this destination.
    pub domain: String,
    /// Destination URL of the proxied page that issued the request.
    pub referer: Option<String>,
    /// Domain of the proxied page that issued the request.
    pub req_origin: Option<String>,
}

impl Destination {
    /// Parse an absolute `http`/`https` URL into a destination.
    pub fn parse(url: &str) -> Option<Destination> {
        let (scheme, rest) = url.split_once("://")?;
        let protocol = scheme.to_ascii_lowercase();
        if protocol != "http" && protocol != "https" {
            return None;
        }

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, part_after_host) = rest.split_at(authority_end);
        let host = authority.rsplit('@').next().unwrap_or(authority);
        let (hostname, port) = split_host_port(host)?;

        let mut dest = Destination {
            url: url.to_string(),
            protocol: format!("{}:", protocol),
            host: host.to_string(),
            hostname: hostname.to_string(),
            port: port.to_string(),
            part_after_host: part_after_host.to_string(),
            ..Default::default()
        };
        dest.domain = dest.compute_domain();
        Some(dest)
    }

    /// Rebuild the URL from its parts.
    pub fn format_url(&self) -> String {
        format!("{}//{}{}", self.protocol, self.host, self.part_after_host)
    }

    fn compute_domain(&self) -> String {
        format!("{}//{}", self.protocol, self.host)
    }

    pub fn is_https(&self) -> bool {
        self.protocol == "https:"
    }

    /// True when the written port is the scheme's default.
    pub fn is_default_port(&self) -> bool {
        (self.protocol == "https:" && self.port == "443")
            || (self.protocol == "http:" && self.port == "80")
    }

    /// Effective port number (explicit or scheme default).
    pub fn port_number(&self) -> u16 {
        self.port
            .parse()
            .unwrap_or(if self.is_https() { 443 } else { 80 })
    }

    /// Derive a destination for `path` on the same origin as `self`,
    /// dropping a default port so host matching stays canonical.
    pub fn with_path(&self, path: &str) -> Destination {
        let is_default_port = self.is_default_port();
        let mut dest = Destination {
            protocol: self.protocol.clone(),
            host: if is_default_port {
                self.hostname.clone()
            } else {
                self.host.clone()
            },
            hostname: self.hostname.clone(),
            port: if is_default_port {
                String::new()
            } else {
                self.port.clone()
            },
            part_after_host: path.to_string(),
            ..Default::default()
        };
        dest.url = dest.format_url();
        dest.domain = dest.compute_domain();
        dest
    }
}

fn split_host_port(host: &str) -> Option<(&str, &str)> {
    if host.is_empty() {
        return None;
    }

    // IPv6 literal: [::1]:8080
    if host.starts_with('[') {
        let close = host.find(']')?;
        let hostname = &host[..=close];
        let port = host[close + 1..].strip_prefix(':').unwrap_or("");
        return valid_port(port).then_some((hostname, port));
    }

    match host.rsplit_once(':') {
        Some((hostname, port)) if !hostname.is_empty() && valid_port(port) => Some((hostname, port)),
        Some(_) => None,
        None => Some((host, "")),
    }
}

fn valid_port(port: &str) -> bool {
    port.is_empty() || port.parse::<u16>().is_ok()
}

/// A decoded proxy URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedProxyUrl {
    pub dest_url: String,
    pub session_id: String,
    pub resource_type: ResourceType,
    pub dest: Destination,
}

/// Decode an absolute proxy URL or a path-only request target.
pub fn parse_proxy_url(url: &str) -> Option<ParsedProxyUrl> {
    let path = if url.starts_with('/') {
        url
    } else {
        let (_, rest) = url.split_once("://")?;
        &rest[rest.find('/')?..]
    };

    let (token, dest_url) = path.strip_prefix('/')?.split_once('/')?;
    let (session_id, resource_type) = match token.split_once('!') {
        Some((id, tag)) => (id, ResourceType::from_tag(tag)?),
        None => (token, ResourceType::None),
    };

    if session_id.is_empty() {
        return None;
    }

    let mut dest = Destination::parse(dest_url)?;
    dest.resource_type = resource_type;

    Some(ParsedProxyUrl {
        dest_url: dest_url.to_string(),
        session_id: session_id.to_string(),
        resource_type,
        dest,
    })
}

/// Encode a destination URL into a proxy URL served by `hostname:port`.
pub fn get_proxy_url(
    dest_url: &str,
    hostname: &str,
    port: u16,
    session_id: &str,
    resource_type: ResourceType,
) -> String {
    let tag = resource_type
        .tag()
        .map(|t| format!("!{}", t))
        .unwrap_or_default();

    format!("http://{}:{}/{}{}/{}", hostname, port, session_id, tag, dest_url)
}

/// Lowercase the scheme and host of a URL, leaving path, query and hash untouched.
pub fn convert_host_to_lower_case(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    format!(
        "{}://{}{}",
        scheme.to_ascii_lowercase(),
        authority.to_ascii_lowercase(),
        tail
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let urls = [
            "http://example.com",
            "http://example.com/",
            "https://example.com:8443/path/to?x=1&y=2#frag",
            "http://127.0.0.1:2000/page",
            "http://[::1]:8080/v6",
        ];

        for url in urls {
            let proxy_url = get_proxy_url(url, "localhost", 1836, "sid", ResourceType::None);
            let parsed = parse_proxy_url(&proxy_url).unwrap();
            assert_eq!(parsed.dest_url, url);
            assert_eq!(parsed.dest.url, url);
            assert_eq!(parsed.session_id, "sid");
        }
    }

    #[test]
    fn test_resource_type_tag() {
        let proxy_url = get_proxy_url("http://example.com/s.js", "localhost", 1836, "sid", ResourceType::Script);
        assert_eq!(proxy_url, "http://localhost:1836/sid!s/http://example.com/s.js");

        let parsed = parse_proxy_url("/sid!i/http://example.com/frame").unwrap();
        assert_eq!(parsed.resource_type, ResourceType::Iframe);
        assert_eq!(parsed.dest.resource_type, ResourceType::Iframe);
    }

    #[test]
    fn test_destination_parts() {
        let dest = Destination::parse("https://Example.com:8443/a/b?q=1").unwrap();
        assert_eq!(dest.protocol, "https:");
        assert_eq!(dest.host, "Example.com:8443");
        assert_eq!(dest.hostname, "Example.com");
        assert_eq!(dest.port, "8443");
        assert_eq!(dest.part_after_host, "/a/b?q=1");
        assert_eq!(dest.domain, "https://Example.com:8443");
        assert_eq!(dest.port_number(), 8443);

        let dest = Destination::parse("http://example.com?q").unwrap();
        assert_eq!(dest.port, "");
        assert_eq!(dest.part_after_host, "?q");
        assert_eq!(dest.port_number(), 80);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(parse_proxy_url("/favicon.ico").is_none());
        assert!(parse_proxy_url("/sid/not-a-url").is_none());
        assert!(parse_proxy_url("/sid!x/http://example.com").is_none());
        assert!(parse_proxy_url("//http://example.com").is_none());
        assert!(parse_proxy_url("/sid/ftp://example.com").is_none());
        assert!(parse_proxy_url("/sid/http://example.com:notaport/").is_none());
    }

    #[test]
    fn test_with_path_strips_default_port() {
        let https = Destination::parse("https://example.com:443/index.html").unwrap();
        let derived = https.with_path("/api/data");
        assert_eq!(derived.host, "example.com");
        assert_eq!(derived.port, "");
        assert_eq!(derived.url, "https://example.com/api/data");

        let http = Destination::parse("http://example.com:80/").unwrap();
        assert_eq!(http.with_path("/x").host, "example.com");

        let custom = Destination::parse("http://example.com:8080/").unwrap();
        let derived = custom.with_path("/x");
        assert_eq!(derived.host, "example.com:8080");
        assert_eq!(derived.url, "http://example.com:8080/x");
    }

    #[test]
    fn test_lower_case_host() {
        let url = convert_host_to_lower_case("hTtp://ExaMple.Com:123/paTh/Image?Name=Value&#Hash");
        assert_eq!(url, "http://example.com:123/paTh/Image?Name=Value&#Hash");
    }
}
