//! A fully buffered HTTP response.

use std::{fmt, io::Read as _};

use bytes::Bytes;
use flate2::read::{GzDecoder, ZlibDecoder};
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::{
    error::{JsonPayloadError, PayloadError},
    h1::ResponseHead,
    header::HeaderMap,
};

/// A completed response: status line, headers, and the full body.
pub struct ClientResponse {
    head: ResponseHead,
    content: Bytes,
}

impl ClientResponse {
    pub(crate) fn new(head: ResponseHead, content: Bytes) -> ClientResponse {
        ClientResponse { head, content }
    }

    /// Response status code.
    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    /// Response headers, queried case-insensitively.
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Raw body bytes as received, before any content decoding.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Returns true when the body is gzip- or deflate-encoded.
    pub fn gzipped(&self) -> bool {
        self.encoding(b"gzip") || self.encoding(b"deflate")
    }

    /// Body decoded per `Content-Encoding` and interpreted as UTF-8.
    pub fn text(&self) -> Result<String, PayloadError> {
        let content = self.decoded_content()?;
        Ok(String::from_utf8(content)?)
    }

    /// Body parsed as JSON, after content decoding.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, JsonPayloadError> {
        let content = self.decoded_content().map_err(JsonPayloadError::Payload)?;
        Ok(serde_json::from_slice(&content)?)
    }

    fn decoded_content(&self) -> Result<Vec<u8>, PayloadError> {
        let mut content = Vec::new();

        if self.encoding(b"gzip") {
            GzDecoder::new(&self.content[..]).read_to_end(&mut content)?;
        } else if self.encoding(b"deflate") {
            ZlibDecoder::new(&self.content[..]).read_to_end(&mut content)?;
        } else {
            content.extend_from_slice(&self.content);
        }

        Ok(content)
    }

    fn encoding(&self, needle: &[u8]) -> bool {
        contains_token(self.head.headers.get("Content-Encoding"), needle)
            || contains_token(self.head.headers.get("Transfer-Encoding"), needle)
    }
}

impl fmt::Debug for ClientResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientResponse")
            .field("status", &self.head.status)
            .field("headers", &self.head.headers)
            .field("content_length", &self.content.len())
            .finish()
    }
}

fn contains_token(value: &[u8], needle: &[u8]) -> bool {
    value
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}
