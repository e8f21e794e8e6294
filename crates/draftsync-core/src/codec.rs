//! Compression Codec
//!
//! Serialized documents are compressed before upload and, on the read path, before
//! they are parked in the local read cache. The codec is chosen once at startup and
//! injected wherever it is needed:
//!
//! ```text
//! select_codec(true)  → GzipCodec      (Content-Encoding: gzip)
//! select_codec(false) → IdentityCodec  (Content-Encoding: identity)
//! ```
//!
//! A codec that reports `available() == false`, or that fails at runtime, never fails
//! the caller: [`compress_text`] falls back to the raw UTF-8 bytes and flags the
//! payload as uncompressed so the receiving side knows not to inflate it.

use crate::error::{Error, Result};
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::sync::Arc;

/// Gzip magic bytes
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest serialized document accepted after decoding (64 MiB)
pub const MAX_DOCUMENT_SIZE: usize = 64 * 1024 * 1024;

/// Wire encoding of an upload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncoding {
    Gzip,
    Identity,
}

impl ContentEncoding {
    /// Value for the `Content-Encoding` header
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentEncoding::Gzip => "gzip",
            ContentEncoding::Identity => "identity",
        }
    }

    /// Value for the `Content-Type` header of a direct upload
    pub fn content_type(&self) -> &'static str {
        match self {
            ContentEncoding::Gzip => "application/gzip",
            ContentEncoding::Identity => "application/json",
        }
    }

    /// Parse a header or query value. Unknown values are treated as identity.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("gzip") {
            ContentEncoding::Gzip
        } else {
            ContentEncoding::Identity
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, ContentEncoding::Gzip)
    }
}

/// Compression algorithm selected at startup.
pub trait Codec: Send + Sync {
    /// Encoding produced by `compress`
    fn encoding(&self) -> ContentEncoding;

    /// Whether the algorithm can be used in this process
    fn available(&self) -> bool {
        true
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Streaming gzip (deflate family) via flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: u32,
}

impl GzipCodec {
    pub fn new() -> Self {
        Self { level: 6 }
    }

    /// Compression level 0-9 (clamped)
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for GzipCodec {
    fn encoding(&self) -> ContentEncoding {
        ContentEncoding::Gzip
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2),
            Compression::new(self.level),
        );
        encoder
            .write_all(data)
            .map_err(|e| Error::Compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 4);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Decompression(e.to_string()))?;
        Ok(out)
    }
}

/// Pass-through codec used when compression is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn encoding(&self) -> ContentEncoding {
        ContentEncoding::Identity
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Pick the codec for this process.
pub fn select_codec(prefer_compression: bool) -> Arc<dyn Codec> {
    if prefer_compression {
        Arc::new(GzipCodec::new())
    } else {
        Arc::new(IdentityCodec)
    }
}

/// Output of [`compress_text`]
#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    pub bytes: Bytes,
    pub is_compressed: bool,
}

impl Compressed {
    pub fn encoding(&self) -> ContentEncoding {
        if self.is_compressed {
            ContentEncoding::Gzip
        } else {
            ContentEncoding::Identity
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Compress a serialized document, degrading to raw bytes instead of failing.
pub fn compress_text(codec: &dyn Codec, text: &str) -> Compressed {
    let raw = || Compressed {
        bytes: Bytes::copy_from_slice(text.as_bytes()),
        is_compressed: false,
    };

    if !codec.available() || !codec.encoding().is_compressed() {
        return raw();
    }

    match codec.compress(text.as_bytes()) {
        Ok(bytes) => Compressed {
            bytes: Bytes::from(bytes),
            is_compressed: true,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Compression failed, sending uncompressed");
            raw()
        }
    }
}

/// Undo [`compress_text`]. Uncompressed payloads are returned as-is.
pub fn decompress_payload(bytes: &[u8], is_compressed: bool) -> Result<Vec<u8>> {
    if is_compressed {
        GzipCodec::new().decompress(bytes)
    } else {
        Ok(bytes.to_vec())
    }
}

/// [`decompress_payload`] that refuses to produce more than `limit` bytes.
///
/// Inflation stops one byte past the limit, so a small body that expands without
/// bound costs at most `limit + 1` bytes of memory.
pub fn decompress_payload_limited(
    bytes: &[u8],
    is_compressed: bool,
    limit: usize,
) -> Result<Vec<u8>> {
    if !is_compressed {
        if bytes.len() > limit {
            return Err(Error::PayloadTooLarge { limit });
        }
        return Ok(bytes.to_vec());
    }

    let mut out = Vec::with_capacity(bytes.len().saturating_mul(4).min(limit));
    GzDecoder::new(bytes)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    if out.len() > limit {
        return Err(Error::PayloadTooLarge { limit });
    }
    Ok(out)
}

/// True if `bytes` starts with the gzip magic number
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}
