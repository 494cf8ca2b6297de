//! Multipart upload subsystem.
//!
//! # Data Flow
//! ```text
//! outbound multipart request body
//!     → form_data.rs (line-oriented parse, exact round trip)
//!     → expand_uploads (hidden marker entry → file entries)
//!     → serialized body forwarded to the destination
//!
//! POST /ie9-file-reader-shim
//!     → form_data.rs parse
//!     → read_file_for_shim (selected entry → base64 JSON)
//! ```

pub mod entry;
pub mod form_data;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use entry::FormDataEntry;
pub use form_data::FormData;

/// Field name of the hidden input the client upload shim fills with file descriptors.
pub const UPLOAD_SANDBOX_HIDDEN_INPUT_NAME: &str = "upload-89fc3-info";

/// Files the browser-side upload shim attached to one form field.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadInfo {
    pub name: String,
    #[serde(default)]
    pub files: Vec<UploadedFile>,
}

/// One file as described by the upload shim, content base64 encoded.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Error)]
pub enum FormDataError {
    #[error("upload marker is not valid JSON: {0}")]
    MalformedUploadInfo(#[from] serde_json::Error),

    #[error("file {file:?} carries invalid base64 data: {source}")]
    InvalidFileData {
        file: String,
        #[source]
        source: base64::DecodeError,
    },
}

/// Expand upload markers in a multipart request body.
///
/// Returns `Ok(None)` when the body is not multipart or carries no marker,
/// in which case the original bytes should be forwarded untouched.
pub fn inject_uploads(content_type: Option<&str>, body: &[u8]) -> Result<Option<Vec<u8>>, FormDataError> {
    let Some(content_type) = content_type else {
        return Ok(None);
    };

    let mut form = FormData::new();
    form.parse_content_type_header(content_type);
    if !form.has_boundary() {
        return Ok(None);
    }

    form.parse_body(body);
    if form.expand_uploads()? {
        Ok(Some(form.to_bytes()))
    } else {
        Ok(None)
    }
}

/// Metadata returned with a file read through the legacy file reader shim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShimFileInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: usize,
}

/// Payload of the legacy file reader shim response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShimFile {
    pub data: String,
    pub info: ShimFileInfo,
}

/// Read one file entry of a multipart form for browsers without `FileReader`.
///
/// `input_name` selects the entry; without it the first entry carrying a
/// file name is used. `file_name` overrides the reported name, matching the
/// path the browser showed in the input.
pub fn read_file_for_shim(
    content_type: &str,
    body: &[u8],
    input_name: Option<&str>,
    file_name: Option<&str>,
) -> Option<ShimFile> {
    let mut form = FormData::new();
    form.parse_content_type_header(content_type);
    if !form.has_boundary() {
        return None;
    }
    form.parse_body(body);

    let entry = match input_name {
        Some(name) => form.entries_by_name(name).into_iter().next(),
        None => form.entries.iter().find(|e| e.file_name.is_some()),
    }?;

    let content = entry.body();
    let name = file_name
        .map(|path| path.rsplit(['/', '\\']).next().unwrap_or(path).to_string())
        .or_else(|| entry.file_name.clone())
        .unwrap_or_default();

    Some(ShimFile {
        data: STANDARD.encode(&content),
        info: ShimFileInfo {
            name,
            mime_type: entry.header("Content-Type").unwrap_or_default().to_string(),
            size: content.len(),
        },
    })
}
