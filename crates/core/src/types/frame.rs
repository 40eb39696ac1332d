use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

// =============================================================================
// Output Frames
// =============================================================================

/// Stream an output frame was written to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum OutputType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// One chunk of output bytes tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFrame {
    pub kind: OutputType,
    pub payload: Bytes,
}

impl OutputFrame {
    pub fn new(kind: OutputType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn stdout(payload: impl Into<Bytes>) -> Self {
        Self::new(OutputType::Stdout, payload)
    }

    pub fn stderr(payload: impl Into<Bytes>) -> Self {
        Self::new(OutputType::Stderr, payload)
    }

    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn utf8_string(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Raw frame stream as delivered by the engine gateway (logs or exec output).
pub type FrameStream = BoxStream<'static, Result<OutputFrame>>;

// =============================================================================
// Output Encoding
// =============================================================================

/// Character encoding used to render accumulated output bytes as text.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum OutputEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    #[serde(rename = "utf-16le", alias = "utf16le")]
    Utf16Le,
    #[serde(rename = "utf-16be", alias = "utf16be")]
    Utf16Be,
    #[serde(rename = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl OutputEncoding {
    /// Decode `bytes`, substituting U+FFFD for anything malformed.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Self::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
            Self::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let chunks = bytes.chunks_exact(2);
    let dangling = !chunks.remainder().is_empty();
    let mut out: String = char::decode_utf16(chunks.map(|c| unit([c[0], c[1]])))
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if dangling {
        out.push(char::REPLACEMENT_CHARACTER);
    }
    out
}

impl FromStr for OutputEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-16le" | "utf16le" => Ok(Self::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Self::Utf16Be),
            "latin1" | "iso-8859-1" => Ok(Self::Latin1),
            other => Err(Error::unsupported(format!("output encoding '{}'", other))),
        }
    }
}
