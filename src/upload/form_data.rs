//! `multipart/form-data` parser and serializer.
//!
//! The parser is a single pass over CRLF-separated lines with four states.
//! Every line is kept verbatim, so serializing an untouched body yields the
//! exact input bytes; only `expand_uploads` changes the output.
//!
//! ```text
//! PREAMBLE --boundary--> HEADERS --blank line--> BODY --boundary--> HEADERS ...
//!     any state --terminator--> EPILOGUE (absorbs everything after it)
//! ```

use regex::Regex;
use std::sync::LazyLock;

use crate::upload::entry::FormDataEntry;
use crate::upload::{FormDataError, UploadInfo, UPLOAD_SANDBOX_HIDDEN_INPUT_NAME};

static BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i);\s*boundary=([^;]*)").expect("valid regex"));

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Preamble,
    Headers,
    Body,
    Epilogue,
}

/// A parsed multipart body.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    boundary: Option<Vec<u8>>,
    boundary_end: Option<Vec<u8>>,
    preamble: Vec<Vec<u8>>,
    epilogue: Vec<Vec<u8>>,
    /// Whether the terminator line was seen.
    terminated: bool,
    pub entries: Vec<FormDataEntry>,
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the boundary from a `multipart/form-data` content type.
    pub fn parse_content_type_header(&mut self, header: &str) {
        if !header.to_ascii_lowercase().contains("multipart/form-data") {
            return;
        }

        let token = BOUNDARY_RE
            .captures(header)
            .map(|c| c[1].trim().trim_matches('"').to_string())
            .filter(|token| !token.is_empty());

        if let Some(token) = token {
            self.boundary = Some(format!("--{}", token).into_bytes());
            self.boundary_end = Some(format!("--{}--", token).into_bytes());
        }
    }

    pub fn has_boundary(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn parse_body(&mut self, body: &[u8]) {
        let mut state = ParserState::Preamble;
        let mut current: Option<FormDataEntry> = None;

        for line in split_lines(body) {
            if state == ParserState::Epilogue {
                self.epilogue.push(line.to_vec());
            } else if self.is_boundary(line) {
                self.entries.extend(current.take());
                current = Some(FormDataEntry::default());
                state = ParserState::Headers;
            } else if self.is_boundary_end(line) {
                self.entries.extend(current.take());
                self.terminated = true;
                state = ParserState::Epilogue;
            } else {
                match (state, current.as_mut()) {
                    (ParserState::Headers, Some(entry)) if line.is_empty() => {
                        entry.mark_separator();
                        state = ParserState::Body;
                    }
                    (ParserState::Headers, Some(entry)) => entry.set_header_line(line),
                    (ParserState::Body, Some(entry)) => entry.push_body_line(line),
                    _ => self.preamble.push(line.to_vec()),
                }
            }
        }

        // Body cut off before the terminator line.
        self.entries.extend(current);
    }

    pub fn entries_by_name(&self, name: &str) -> Vec<&FormDataEntry> {
        self.entries
            .iter()
            .filter(|e| e.name.as_deref() == Some(name))
            .collect()
    }

    /// Replace the hidden upload marker entry with the files it describes.
    ///
    /// Returns `true` when the marker was present.
    pub fn expand_uploads(&mut self) -> Result<bool, FormDataError> {
        let Some(marker) = self.entries_by_name(UPLOAD_SANDBOX_HIDDEN_INPUT_NAME).first().copied() else {
            return Ok(false);
        };

        let infos: Vec<UploadInfo> = serde_json::from_slice(&marker.body())?;

        self.remove_entries(UPLOAD_SANDBOX_HIDDEN_INPUT_NAME);
        for info in &infos {
            self.inject_file_info(info)?;
        }

        Ok(true)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let (Some(boundary), Some(boundary_end)) = (&self.boundary, &self.boundary_end) else {
            return self.preamble.join(CRLF);
        };

        let mut lines: Vec<&[u8]> = self.preamble.iter().map(Vec::as_slice).collect();
        for entry in &self.entries {
            lines.push(boundary);
            lines.extend(entry.segments());
        }
        if self.terminated {
            lines.push(boundary_end);
            lines.extend(self.epilogue.iter().map(Vec::as_slice));
        }

        lines.join(CRLF)
    }

    fn remove_entries(&mut self, name: &str) {
        self.entries.retain(|e| e.name.as_deref() != Some(name));
    }

    fn inject_file_info(&mut self, info: &UploadInfo) -> Result<(), FormDataError> {
        let mut indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.name.as_deref() == Some(info.name.as_str()))
            .map(|(idx, _)| idx)
            .collect();

        while indices.len() < info.files.len() {
            self.entries.push(FormDataEntry::default());
            indices.push(self.entries.len() - 1);
        }

        for (file_idx, entry_idx) in indices.into_iter().enumerate().take(info.files.len()) {
            self.entries[entry_idx].add_file_info(info, file_idx)?;
        }

        Ok(())
    }

    fn is_boundary(&self, line: &[u8]) -> bool {
        self.boundary.as_deref() == Some(line)
    }

    fn is_boundary_end(&self, line: &[u8]) -> bool {
        self.boundary_end.as_deref() == Some(line)
    }
}

/// Split on CRLF, keeping a trailing empty line when the input ends with CRLF
/// so that joining the lines with CRLF reproduces the input.
fn split_lines(body: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i + 1 < body.len() {
        if body[i] == b'\r' && body[i + 1] == b'\n' {
            lines.push(&body[start..i]);
            i += 2;
            start = i;
        } else {
            i += 1;
        }
    }
    lines.push(&body[start..]);

    lines
}
