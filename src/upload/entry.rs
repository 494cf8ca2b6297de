//! A single `multipart/form-data` entry.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use std::sync::LazyLock;

use crate::upload::{FormDataError, UploadInfo};

static INPUT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i);\s*name="([^"]*)""#).expect("valid regex"));
static FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i);\s*filename="([^"]*)""#).expect("valid regex"));

const CONTENT_DISPOSITION: &str = "Content-Disposition";
const CONTENT_TYPE: &str = "Content-Type";

#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderLine {
    name: String,
    value: String,
    /// Line exactly as received, re-emitted untouched on serialization.
    raw: Vec<u8>,
}

/// One part of a multipart body: header lines, a blank separator and raw body lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormDataEntry {
    /// Field name from `Content-Disposition`.
    pub name: Option<String>,
    /// File name from `Content-Disposition`, for file fields.
    pub file_name: Option<String>,
    headers: Vec<HeaderLine>,
    has_separator: bool,
    body: Vec<Vec<u8>>,
}

impl FormDataEntry {
    /// Record a raw header line (`Name: value`).
    pub fn set_header_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let (name, value) = match text.split_once(':') {
            Some((name, value)) => (name.to_string(), value.trim().to_string()),
            None => (text.to_string(), String::new()),
        };

        if name.eq_ignore_ascii_case(CONTENT_DISPOSITION) {
            self.parse_content_disposition(&value);
        }

        self.headers.push(HeaderLine {
            name,
            value,
            raw: line.to_vec(),
        });
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Raw body bytes.
    pub fn body(&self) -> Vec<u8> {
        self.body.join(&b"\r\n"[..])
    }

    pub(crate) fn mark_separator(&mut self) {
        self.has_separator = true;
    }

    pub(crate) fn push_body_line(&mut self, line: &[u8]) {
        self.body.push(line.to_vec());
    }

    /// Overwrite this entry with the `idx`-th file of an upload descriptor.
    pub fn add_file_info(&mut self, info: &UploadInfo, idx: usize) -> Result<(), FormDataError> {
        let Some(file) = info.files.get(idx) else {
            return Ok(());
        };

        let content = STANDARD
            .decode(file.data.as_bytes())
            .map_err(|source| FormDataError::InvalidFileData {
                file: file.name.clone(),
                source,
            })?;

        self.set_header(
            CONTENT_DISPOSITION,
            format!(r#"form-data; name="{}"; filename="{}""#, info.name, file.name),
        );
        self.set_header(CONTENT_TYPE, file.mime_type.clone());
        self.name = Some(info.name.clone());
        self.file_name = Some(file.name.clone());
        self.has_separator = true;
        self.body = vec![content];

        Ok(())
    }

    /// Lines of this entry in wire order, without line terminators.
    pub(crate) fn segments(&self) -> impl Iterator<Item = &[u8]> {
        let separator: Option<&[u8]> = self.has_separator.then_some(&b""[..]);

        self.headers
            .iter()
            .map(|h| h.raw.as_slice())
            .chain(separator)
            .chain(self.body.iter().map(Vec::as_slice))
    }

    fn set_header(&mut self, name: &str, value: String) {
        let raw = format!("{}: {}", name, value).into_bytes();

        match self.headers.iter_mut().find(|h| h.name.eq_ignore_ascii_case(name)) {
            Some(existing) => {
                existing.value = value;
                existing.raw = raw;
            }
            None => self.headers.push(HeaderLine {
                name: name.to_string(),
                value,
                raw,
            }),
        }
    }

    fn parse_content_disposition(&mut self, value: &str) {
        let capture = |re: &Regex| re.captures(value).map(|c| c[1].to_string());

        self.name = capture(&*INPUT_NAME_RE);
        self.file_name = capture(&*FILE_NAME_RE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::UploadedFile;

    #[test]
    fn test_content_disposition_parsing() {
        let mut entry = FormDataEntry::default();
        entry.set_header_line(br#"Content-Disposition: form-data; name="avatar"; filename="me.png""#);
        entry.set_header_line(b"Content-Type: image/png");

        assert_eq!(entry.name.as_deref(), Some("avatar"));
        assert_eq!(entry.file_name.as_deref(), Some("me.png"));
        assert_eq!(entry.header("content-type"), Some("image/png"));
    }

    #[test]
    fn test_filename_does_not_shadow_name() {
        let mut entry = FormDataEntry::default();
        entry.set_header_line(br#"Content-Disposition: form-data; filename="a.txt"; name="doc""#);
        assert_eq!(entry.name.as_deref(), Some("doc"));
        assert_eq!(entry.file_name.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_add_file_info_replaces_headers_in_place() {
        let mut entry = FormDataEntry::default();
        entry.set_header_line(br#"Content-Disposition: form-data; name="doc"; filename="""#);
        entry.set_header_line(b"Content-Type: application/octet-stream");
        entry.mark_separator();

        let info = UploadInfo {
            name: "doc".to_string(),
            files: vec![UploadedFile {
                name: "hello.txt".to_string(),
                mime_type: "text/plain".to_string(),
                data: STANDARD.encode("hello"),
            }],
        };
        entry.add_file_info(&info, 0).unwrap();

        let lines: Vec<&[u8]> = entry.segments().collect();
        assert_eq!(
            lines,
            vec![
                &br#"Content-Disposition: form-data; name="doc"; filename="hello.txt""#[..],
                &b"Content-Type: text/plain"[..],
                &b""[..],
                &b"hello"[..],
            ]
        );
    }

    #[test]
    fn test_invalid_base64_is_an_error() {
        let info = UploadInfo {
            name: "doc".to_string(),
            files: vec![UploadedFile {
                name: "broken.bin".to_string(),
                mime_type: String::new(),
                data: "***".to_string(),
            }],
        };
        let err = FormDataEntry::default().add_file_info(&info, 0).unwrap_err();
        assert!(matches!(err, FormDataError::InvalidFileData { .. }));
    }
}
