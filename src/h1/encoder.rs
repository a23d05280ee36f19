//! Request serialization.

use bytes::{BufMut as _, Bytes, BytesMut};
use http::Method;

use crate::header::HeaderMap;

/// Serialize a request head and optional body into `dst`.
///
/// Emits `METHOD SP path SP HTTP/1.1 CRLF`, one `Name: Value CRLF` line per
/// header in the map (original casing, unspecified order), a blank line, and
/// the body. All framing decisions (Host, Content-Length) are made by the
/// caller before this point.
pub(crate) fn encode_request(
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: Option<&Bytes>,
    dst: &mut BytesMut,
) {
    let head_len = method.as_str().len() + path.len() + 11;
    let headers_len: usize = headers.iter().map(|(n, v)| n.len() + v.len() + 4).sum();
    dst.reserve(head_len + headers_len + 2 + body.map_or(0, |b| b.len()));

    dst.put_slice(method.as_str().as_bytes());
    dst.put_u8(b' ');
    dst.put_slice(path.as_bytes());
    dst.put_slice(b" HTTP/1.1\r\n");

    for (name, value) in headers.iter() {
        dst.put_slice(name);
        dst.put_slice(b": ");
        dst.put_slice(value);
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");

    if let Some(body) = body {
        dst.put_slice(body);
    }
}
