//! Templated route matching.
//!
//! # Responsibilities
//! - Compile `/path/{param}` templates into anchored regexes
//! - Extract parameter values in declaration order
//!
//! # Design Decisions
//! - A parameter matches exactly one non-empty path segment, non-greedily
//! - Literal segments are matched verbatim (regex metacharacters escaped)
//! - The method is part of the matched string, so `GET /a` never matches `POST /a`

use http::Method;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\{(\S+)\}$").expect("valid regex"));

/// Parameter name → captured segment.
pub type RouteParams = HashMap<String, String>;

/// Whether a route path contains `{param}` segments.
pub fn is_template(path: &str) -> bool {
    path.split('/').any(|token| PARAM_RE.is_match(token))
}

/// Key of an exact route: `METHOD path`.
pub fn route_key(method: &Method, path: &str) -> String {
    format!("{} {}", method, path)
}

/// A compiled `METHOD /path/{param}` template.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
    re: Regex,
    param_names: Vec<String>,
}

impl RouteTemplate {
    pub fn compile(method: &Method, path: &str) -> Result<Self, regex::Error> {
        let mut param_names = Vec::new();
        let parts: Vec<String> = path
            .split('/')
            .map(|token| match PARAM_RE.captures(token) {
                Some(captures) => {
                    param_names.push(captures[1].to_string());
                    r"([^/\s]+?)".to_string()
                }
                None => regex::escape(token),
            })
            .collect();

        let re = Regex::new(&format!("^{} {}$", regex::escape(method.as_str()), parts.join("/")))?;
        Ok(Self { re, param_names })
    }

    pub fn matches(&self, method: &Method, path: &str) -> Option<RouteParams> {
        let key = route_key(method, path);
        let captures = self.re.captures(&key)?;

        Some(
            self.param_names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| captures.get(i + 1).map(|m| (name.clone(), m.as_str().to_string())))
                .collect(),
        )
    }
}
