//! One HTTP/1.1 request/response cycle over an acquired connection.

use bytes::{Bytes, BytesMut};
use http::Method;
use log::trace;

use crate::{
    client::pool::Acquired,
    error::SendRequestError,
    h1::{encoder, ResponseDecoder},
    header::HeaderMap,
    response::ClientResponse,
};

/// Largest number of bytes requested from the socket per read.
const MAX_READ_CHUNK: usize = 65_536;

/// Write a serialized request and read the response off `conn`.
///
/// The request bytes are fully written before any response byte is read.
/// On every exit path the connection is released back to its pool (the
/// `Acquired` guard drops), closed first when the response demanded it or
/// when the failure left the stream in an unknown state.
pub(crate) async fn send_request(
    conn: Acquired,
    method: &Method,
    path: &str,
    headers: &HeaderMap,
    body: Option<&Bytes>,
) -> Result<ClientResponse, SendRequestError> {
    let mut wrt = BytesMut::new();
    encoder::encode_request(method, path, headers, body, &mut wrt);

    if let Err(err) = conn.send(&wrt).await {
        conn.close();
        return Err(SendRequestError::Io(err));
    }

    let mut decoder = ResponseDecoder::new(*method == Method::HEAD);
    let mut buf = BytesMut::new();

    loop {
        let chunk = match conn.read(MAX_READ_CHUNK).await {
            Ok(chunk) => chunk,
            Err(err) => {
                conn.close();
                return Err(SendRequestError::Io(err));
            }
        };

        if chunk.is_empty() {
            // EOF: acceptable only when the head carried a framing header
            if decoder.accept_eof() {
                trace!("EOF with framing header, keeping partial body");
                break;
            }
            conn.close();
            return Err(SendRequestError::Eof);
        }

        buf.extend_from_slice(&chunk);
        match decoder.decode(&mut buf) {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => {
                conn.close();
                return Err(SendRequestError::Response(err));
            }
        }
    }

    let (head, content) = decoder
        .into_parts()
        .ok_or(SendRequestError::Response(crate::error::ParseError::Incomplete))?;

    if !head.keep_alive() {
        conn.close();
    }
    conn.release();

    Ok(ClientResponse::new(head, content))
}
