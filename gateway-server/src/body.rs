//! Reading of request bodies with size limits.

use std::io::{self, Write};

use axum::body::Body;
use axum::http::{HeaderMap, header};
use bytes::Bytes;
use flate2::write::MultiGzDecoder;
use futures::StreamExt;

/// A request body could not be read.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    /// The body, after decompression, is larger than the limit.
    #[error("request body exceeds the limit of {0} bytes")]
    TooLarge(usize),
    /// The body is not valid for its declared content encoding.
    #[error("failed to decompress request body: {0}")]
    Decompression(#[source] io::Error),
    /// The declared content encoding is not supported.
    #[error("unsupported content encoding {0:?}")]
    UnsupportedEncoding(String),
    /// Reading from the connection failed.
    #[error("failed to read request body")]
    Read(#[source] axum::Error),
}

/// Content encodings that can be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Encoding {
    Identity,
    Gzip,
}

impl Encoding {
    fn from_headers(headers: &HeaderMap) -> Result<Self, BodyError> {
        let Some(value) = headers.get(header::CONTENT_ENCODING) else {
            return Ok(Self::Identity);
        };

        let value = String::from_utf8_lossy(value.as_bytes());
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Ok(Self::Identity),
            "gzip" | "x-gzip" => Ok(Self::Gzip),
            _ => Err(BodyError::UnsupportedEncoding(value.into_owned())),
        }
    }
}

/// A buffer that refuses writes beyond its limit.
struct LimitedBuffer {
    data: Vec<u8>,
    limit: usize,
    overflow: bool,
}

impl LimitedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            overflow: false,
        }
    }
}

impl Write for LimitedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.data.len() + buf.len() > self.limit {
            self.overflow = true;
            return Err(io::Error::new(
                io::ErrorKind::FileTooLarge,
                "body size limit exceeded",
            ));
        }

        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Streaming decoder that writes into a [`LimitedBuffer`].
enum Decoder {
    Identity(LimitedBuffer),
    Gzip(Box<MultiGzDecoder<LimitedBuffer>>),
}

impl Decoder {
    fn new(encoding: Encoding, limit: usize) -> Self {
        let buffer = LimitedBuffer::new(limit);
        match encoding {
            Encoding::Identity => Self::Identity(buffer),
            Encoding::Gzip => Self::Gzip(Box::new(MultiGzDecoder::new(buffer))),
        }
    }

    fn buffer(&self) -> &LimitedBuffer {
        match self {
            Self::Identity(buffer) => buffer,
            Self::Gzip(decoder) => decoder.get_ref(),
        }
    }

    fn map_error(&self, error: io::Error) -> BodyError {
        let buffer = self.buffer();
        if buffer.overflow {
            BodyError::TooLarge(buffer.limit)
        } else {
            BodyError::Decompression(error)
        }
    }

    /// Decodes the next chunk of the body.
    fn decode(&mut self, chunk: &[u8]) -> Result<(), BodyError> {
        let result = match self {
            Self::Identity(buffer) => buffer.write_all(chunk),
            Self::Gzip(decoder) => decoder.write_all(chunk),
        };

        result.map_err(|error| self.map_error(error))
    }

    /// Flushes pending output and returns the decoded body.
    fn finish(self) -> Result<Bytes, BodyError> {
        match self {
            Self::Identity(buffer) => Ok(buffer.data.into()),
            Self::Gzip(mut decoder) => match decoder.try_finish() {
                Ok(()) => match decoder.finish() {
                    Ok(buffer) => Ok(buffer.data.into()),
                    Err(error) => Err(BodyError::Decompression(error)),
                },
                Err(error) => Err(Self::Gzip(decoder).map_error(error)),
            },
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn read_with(body: Body, mut decoder: Decoder) -> Result<Bytes, BodyError> {
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        decoder.decode(&chunk.map_err(BodyError::Read)?)?;
    }

    decoder.finish()
}

/// Reads a line protocol batch, decompressing it according to its `Content-Encoding`.
///
/// The `limit` applies to the decompressed size. Reading stops as soon as the decompressed
/// stream crosses the limit, so a small compressed body can still be rejected. Unsupported
/// encodings are rejected before any byte of the body is read.
pub async fn read_batch(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<Bytes, BodyError> {
    let encoding = Encoding::from_headers(headers)?;

    let declared = content_length(headers);
    if encoding == Encoding::Identity && declared.is_some_and(|len| len > limit) {
        return Err(BodyError::TooLarge(limit));
    }

    read_with(body, Decoder::new(encoding, limit)).await
}

/// Reads a body without decoding it, for forwarding as-is.
pub async fn read_raw(
    headers: &HeaderMap,
    body: Body,
    limit: usize,
) -> Result<Bytes, BodyError> {
    if content_length(headers).is_some_and(|len| len > limit) {
        return Err(BodyError::TooLarge(limit));
    }

    read_with(body, Decoder::new(Encoding::Identity, limit)).await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn encoding(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(value));
        headers
    }

    #[tokio::test]
    async fn test_identity() {
        let data = read_batch(&HeaderMap::new(), Body::from("cpu value=1"), 100)
            .await
            .unwrap();
        assert_eq!(data, Bytes::from_static(b"cpu value=1"));

        let data = read_batch(&encoding("identity"), Body::from("cpu value=1"), 100)
            .await
            .unwrap();
        assert_eq!(data, Bytes::from_static(b"cpu value=1"));
    }

    #[tokio::test]
    async fn test_identity_too_large() {
        let error = read_batch(&HeaderMap::new(), Body::from(vec![b'a'; 101]), 100)
            .await
            .unwrap_err();
        assert!(matches!(error, BodyError::TooLarge(100)));

        let data = read_batch(&HeaderMap::new(), Body::from(vec![b'a'; 100]), 100)
            .await
            .unwrap();
        assert_eq!(data.len(), 100);
    }

    #[tokio::test]
    async fn test_content_length_too_large() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("1000"));

        let error = read_batch(&headers, Body::from("short"), 100)
            .await
            .unwrap_err();
        assert!(matches!(error, BodyError::TooLarge(100)));
    }

    #[tokio::test]
    async fn test_gzip() {
        for value in ["gzip", "x-gzip", "GZIP"] {
            let body = Body::from(gzip(b"cpu value=1\ncpu value=2"));
            let data = read_batch(&encoding(value), body, 100).await.unwrap();
            assert_eq!(data, Bytes::from_static(b"cpu value=1\ncpu value=2"));
        }
    }

    #[tokio::test]
    async fn test_gzip_multiple_members() {
        let mut compressed = gzip(b"cpu value=1 1\n");
        compressed.extend(gzip(b"mem value=2 2\n"));

        let data = read_batch(&encoding("gzip"), Body::from(compressed), 1024)
            .await
            .unwrap();
        assert_eq!(data, Bytes::from_static(b"cpu value=1 1\nmem value=2 2\n"));
    }

    #[tokio::test]
    async fn test_gzip_bomb() {
        // Compresses to a few hundred bytes, but decompresses beyond the limit.
        let compressed = gzip(&vec![b'a'; 1024 * 1024]);
        assert!(compressed.len() < 100 * 1024);

        let error = read_batch(&encoding("gzip"), Body::from(compressed), 100 * 1024)
            .await
            .unwrap_err();
        assert!(matches!(error, BodyError::TooLarge(_)));
    }

    #[tokio::test]
    async fn test_gzip_invalid() {
        let error = read_batch(&encoding("gzip"), Body::from("not gzip at all"), 100)
            .await
            .unwrap_err();
        assert!(matches!(error, BodyError::Decompression(_)));
    }

    #[tokio::test]
    async fn test_unsupported_encoding() {
        let error = read_batch(&encoding("br"), Body::from("irrelevant"), 100)
            .await
            .unwrap_err();
        assert!(matches!(error, BodyError::UnsupportedEncoding(ref e) if e == "br"));
        assert_eq!(error.to_string(), "unsupported content encoding \"br\"");
    }

    #[tokio::test]
    async fn test_raw_keeps_encoding() {
        let compressed = gzip(b"payload");
        let data = read_raw(&encoding("gzip"), Body::from(compressed.clone()), 100)
            .await
            .unwrap();
        assert_eq!(data, Bytes::from(compressed));

        let error = read_raw(&HeaderMap::new(), Body::from(vec![0; 101]), 100)
            .await
            .unwrap_err();
        assert!(matches!(error, BodyError::TooLarge(100)));
    }
}
