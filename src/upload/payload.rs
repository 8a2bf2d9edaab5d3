//! Request and response bodies of the upload protocol

use super::planner::ChunkDescriptor;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Body of the register-upload call (`POST /<collection>/`)
///
/// The parent identifier is flattened in under its kind-specific field name
/// (`project_suuid` or `run_suuid`).
#[derive(Debug, Clone, Serialize)]
pub struct RegisterUploadRequest {
    pub filename: String,
    pub size: u64,
    #[serde(flatten)]
    pub parent: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
}

impl RegisterUploadRequest {
    pub fn new(filename: &str, size: u64, parent_field: &str, parent_suuid: &str) -> Self {
        let mut parent = serde_json::Map::new();
        parent.insert(
            parent_field.to_string(),
            serde_json::Value::String(parent_suuid.to_string()),
        );
        Self {
            filename: filename.to_string(),
            size,
            parent,
            description: None,
            job_name: None,
        }
    }
}

/// Identifier returned by register calls; servers answer with either field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisteredObject {
    #[serde(default)]
    pub suuid: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

impl RegisteredObject {
    /// Server-assigned identifier, preferring the short SUUID
    pub fn identifier(&self) -> Option<&str> {
        self.suuid
            .as_deref()
            .or(self.uuid.as_deref())
            .filter(|id| !id.is_empty())
    }
}

/// Body of the register-chunk call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterChunkRequest {
    /// The one-based chunk number, as a string
    pub filename: String,
    pub size: u64,
    pub file_no: u64,
    pub is_last: bool,
}

impl From<&ChunkDescriptor> for RegisterChunkRequest {
    fn from(chunk: &ChunkDescriptor) -> Self {
        Self {
            filename: chunk.number().to_string(),
            size: chunk.length,
            file_no: chunk.number(),
            is_last: chunk.is_last,
        }
    }
}

/// Resumable-style transfer metadata
///
/// Sent as form fields alongside each chunk's bytes, and as JSON with the
/// finish call (snapshot of the last chunk).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferMetadata {
    #[serde(rename = "resumableChunkNumber")]
    pub chunk_number: u64,
    #[serde(rename = "resumableChunkSize")]
    pub chunk_size: u64,
    #[serde(rename = "resumableCurrentChunkSize")]
    pub current_chunk_size: u64,
    #[serde(rename = "resumableTotalSize")]
    pub total_size: u64,
    #[serde(rename = "resumableType")]
    pub mime_type: String,
    #[serde(rename = "resumableIdentifier")]
    pub identifier: String,
    #[serde(rename = "resumableFilename")]
    pub filename: String,
    #[serde(rename = "resumableRelativePath")]
    pub relative_path: String,
    #[serde(rename = "resumableTotalChunks")]
    pub total_chunks: u64,
}

impl TransferMetadata {
    /// Form fields in wire order
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("resumableChunkNumber", self.chunk_number.to_string()),
            ("resumableChunkSize", self.chunk_size.to_string()),
            ("resumableCurrentChunkSize", self.current_chunk_size.to_string()),
            ("resumableTotalSize", self.total_size.to_string()),
            ("resumableType", self.mime_type.clone()),
            ("resumableIdentifier", self.identifier.clone()),
            ("resumableFilename", self.filename.clone()),
            ("resumableRelativePath", self.relative_path.clone()),
            ("resumableTotalChunks", self.total_chunks.to_string()),
        ]
    }

    /// Multipart body carrying `bytes` under the `file` field
    ///
    /// The part's content type is the parent file's guessed type; a value
    /// reqwest cannot parse is still sent in `resumableType`.
    pub fn into_form(self, bytes: Bytes) -> Form {
        let length = bytes.len() as u64;
        let part = match Part::stream_with_length(bytes.clone(), length)
            .file_name(self.filename.clone())
            .mime_str(&self.mime_type)
        {
            Ok(part) if !self.mime_type.is_empty() => part,
            _ => Part::stream_with_length(bytes, length).file_name(self.filename.clone()),
        };

        let mut form = Form::new();
        for (name, value) in self.fields() {
            form = form.text(name, value);
        }
        form.part("file", part)
    }
}

/// Stable identifier of one transfer: `<size>-<filename with only [A-Za-z0-9_-]>`
pub fn transfer_identifier(size: u64, filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!("{}-{}", size, cleaned)
}

/// Guess a MIME type from the file extension; empty when unknown
pub fn guess_mime_type(filename: &str) -> String {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let mime = match extension.as_deref() {
        Some("txt" | "log") => "text/plain",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("md") => "text/markdown",
        Some("json") => "application/json",
        Some("yaml" | "yml") => "application/yaml",
        Some("xml") => "application/xml",
        Some("zip") => "application/zip",
        Some("gz" | "tgz") => "application/gzip",
        Some("tar") => "application/x-tar",
        Some("bz2") => "application/x-bzip2",
        Some("pdf") => "application/pdf",
        Some("py") => "text/x-python",
        Some("sh") => "application/x-sh",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("whl") => "application/zip",
        _ => "",
    };
    mime.to_string()
}
