//! Document encoding: [`SourceFile`] → base64 data URI.
//!
//! VLM APIs accept attachments as base64 payloads tagged with a MIME type.
//! A data URI (`data:<mime>;base64,<payload>`) carries both in one
//! self-describing string, which is what the session keeps and what the
//! extractor splits apart again right before the request is built.

use crate::error::DocumentError;
use crate::pipeline::input::SourceFile;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

const DATA_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A document ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDocument {
    data_uri: String,
}

impl EncodedDocument {
    /// Wrap an existing data URI without checking it.
    ///
    /// Malformed input is reported by [`parts`](Self::parts) /
    /// [`decode`](Self::decode), not here.
    pub fn from_data_uri(data_uri: impl Into<String>) -> Self {
        Self {
            data_uri: data_uri.into(),
        }
    }

    pub fn as_data_uri(&self) -> &str {
        &self.data_uri
    }

    /// Split into `(content_type, base64_payload)`.
    pub fn parts(&self) -> Result<(&str, &str), DocumentError> {
        let rest = self
            .data_uri
            .strip_prefix(DATA_PREFIX)
            .ok_or_else(|| DocumentError::Encoding("missing 'data:' prefix".into()))?;
        let (content_type, payload) = rest
            .split_once(BASE64_MARKER)
            .ok_or_else(|| DocumentError::Encoding("missing ';base64,' marker".into()))?;
        if content_type.is_empty() {
            return Err(DocumentError::Encoding("empty content type".into()));
        }
        Ok((content_type, payload))
    }

    /// Split and base64-decode into `(content_type, bytes)`.
    pub fn decode(&self) -> Result<(String, Vec<u8>), DocumentError> {
        let (content_type, payload) = self.parts()?;
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| DocumentError::Encoding(format!("invalid base64 payload: {e}")))?;
        Ok((content_type.to_string(), bytes))
    }
}

/// Encode a source file as a data URI.
pub fn encode_document(file: &SourceFile) -> EncodedDocument {
    let b64 = STANDARD.encode(&file.bytes);
    debug!(
        "Encoded {} ({}) → {} bytes base64",
        file.name,
        file.content_type,
        b64.len()
    );
    EncodedDocument {
        data_uri: format!("{DATA_PREFIX}{}{BASE64_MARKER}{b64}", file.content_type),
    }
}
