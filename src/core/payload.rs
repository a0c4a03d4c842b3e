//! Decoding of `contents` / `patch` payloads supplied by tool calls.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use crate::core::error::MutationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Plain,
    Base64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chunk {
    pub content: String,
    #[serde(default)]
    pub encoding: Option<Encoding>,
}

/// The ways a payload can arrive. Precedence: the `*_base64` field, then
/// `chunks`, then the plain field decoded with `encoding`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Payload<'a> {
    pub text: Option<&'a str>,
    pub base64: Option<&'a str>,
    pub encoding: Encoding,
    pub chunks: &'a [Chunk],
}

pub fn decode(raw: &str, encoding: Encoding) -> Result<String, MutationError> {
    match encoding {
        Encoding::Plain => Ok(raw.to_string()),
        Encoding::Base64 => {
            let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| MutationError::InvalidArgument(format!("invalid base64 payload: {e}")))?;
            String::from_utf8(bytes)
                .map_err(|_| MutationError::InvalidArgument("decoded payload is not valid UTF-8".into()))
        }
    }
}

impl Payload<'_> {
    /// Decoded text; empty when nothing was supplied.
    pub fn resolve(&self) -> Result<String, MutationError> {
        if let Some(b64) = self.base64.filter(|s| !s.is_empty()) {
            return decode(b64, Encoding::Base64);
        }
        if !self.chunks.is_empty() {
            return self
                .chunks
                .iter()
                .map(|c| decode(&c.content, c.encoding.unwrap_or(self.encoding)))
                .collect();
        }
        match self.text {
            Some(text) => decode(text, self.encoding),
            None => Ok(String::new()),
        }
    }

    /// Patch text, newline-terminated when non-empty.
    pub fn resolve_patch(&self) -> Result<String, MutationError> {
        let mut text = self.resolve()?;
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        Ok(text)
    }
}
