//! Incremental HTTP/1.1 response decoding.
//!
//! The decoder is a state struct fed from the read loop: first the response
//! head is parsed with httparse, then a payload decoder consumes body bytes
//! (chunked, counted, or until-EOF) into a contiguous content buffer.

use bytes::{Buf as _, Bytes, BytesMut};
use http::StatusCode;
use log::trace;

use crate::error::ParseError;
use crate::header::HeaderMap;

const MAX_BUFFER_SIZE: usize = 131_072;
const MAX_HEADERS: usize = 96;

/// Parsed response status line and headers.
pub(crate) struct ResponseHead {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    keep_alive: bool,
}

impl ResponseHead {
    /// Keep-alive decision for the connection that carried this response.
    ///
    /// Anything other than a literal `close` (compared case-insensitively),
    /// including an absent `Connection` header, keeps the stream open. The
    /// client always speaks HTTP/1.1 and does not branch on the server
    /// version.
    pub(crate) fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Returns true when a header bounding the body is present.
    pub(crate) fn has_framing_header(&self) -> bool {
        self.headers.contains_key("Content-Length")
            || self.headers.contains_key("Transfer-Encoding")
            || self.headers.contains_key("Content-Encoding")
    }
}

/// How the body of a decoded head is delimited.
enum PayloadLength {
    None,
    Chunked,
    Length(u64),
    Eof,
}

/// Incremental response decoder for one request/response cycle.
pub(crate) struct ResponseDecoder {
    head: Option<ResponseHead>,
    payload: Option<PayloadDecoder>,
    content: BytesMut,
    head_request: bool,
}

impl ResponseDecoder {
    /// `head_request` suppresses the body: HEAD responses carry none by
    /// contract regardless of their framing headers.
    pub(crate) fn new(head_request: bool) -> ResponseDecoder {
        ResponseDecoder {
            head: None,
            payload: None,
            content: BytesMut::new(),
            head_request,
        }
    }

    /// Feed buffered bytes into the decoder.
    ///
    /// Returns `Ok(true)` once both the head and the body are complete;
    /// `Ok(false)` means more bytes are needed. Consumed bytes are split off
    /// the front of `src`.
    pub(crate) fn decode(&mut self, src: &mut BytesMut) -> Result<bool, ParseError> {
        if self.head.is_none() {
            let (head, length) = match decode_head(src)? {
                Some(parsed) => parsed,
                None => return Ok(false),
            };

            self.payload = if self.head_request || !may_have_body(head.status) {
                None
            } else {
                match length {
                    PayloadLength::None => None,
                    PayloadLength::Chunked => Some(PayloadDecoder::Chunked(ChunkParser::new())),
                    PayloadLength::Length(len) => Some(PayloadDecoder::Length(len)),
                    PayloadLength::Eof => Some(PayloadDecoder::Eof),
                }
            };
            self.head = Some(head);
        }

        if let Some(payload) = &mut self.payload {
            while let Some(chunk) = payload.decode(src)? {
                self.content.extend_from_slice(&chunk);
            }
            if !payload.done() {
                return Ok(false);
            }
            self.payload = None;
        }

        Ok(true)
    }

    /// Handle a connection EOF observed before `decode` reported completion.
    ///
    /// When the head was parsed and carries a framing header the partial
    /// body is accepted as-is and the message is marked complete; otherwise
    /// the EOF is a protocol error and `false` is returned.
    pub(crate) fn accept_eof(&mut self) -> bool {
        match &self.head {
            Some(head) if head.has_framing_header() => {
                self.payload = None;
                true
            }
            _ => false,
        }
    }

    /// Decompose into the parsed head and the accumulated body.
    pub(crate) fn into_parts(self) -> Option<(ResponseHead, Bytes)> {
        let ResponseDecoder { head, content, .. } = self;
        head.map(|head| (head, content.freeze()))
    }
}

fn may_have_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

fn trim_ascii(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |pos| pos + 1);
    &value[start..end]
}

fn decode_head(src: &mut BytesMut) -> Result<Option<(ResponseHead, PayloadLength)>, ParseError> {
    let mut indices = [EMPTY_HEADER_INDEX; MAX_HEADERS];

    let (len, status, header_count) = {
        let mut parsed: [httparse::Header<'_>; MAX_HEADERS] = [httparse::EMPTY_HEADER; MAX_HEADERS];

        let mut res = httparse::Response::new(&mut parsed);
        match res.parse(src)? {
            httparse::Status::Complete(len) => {
                let code = res.code.ok_or(ParseError::Status)?;
                let status = StatusCode::from_u16(code).map_err(|_| ParseError::Status)?;
                HeaderIndex::record(src, res.headers, &mut indices);

                (len, status, res.headers.len())
            }
            httparse::Status::Partial => {
                return if src.len() >= MAX_BUFFER_SIZE {
                    trace!("MAX_BUFFER_SIZE unprocessed data reached, closing");
                    Err(ParseError::TooLarge)
                } else {
                    Ok(None)
                };
            }
        }
    };

    let slice = src.split_to(len).freeze();

    let mut headers = HeaderMap::with_capacity(header_count);
    let mut keep_alive = true;
    let mut chunked = false;
    let mut content_length = None;

    for index in &indices[..header_count] {
        let name = slice.slice(index.name.0..index.name.1);
        let value = slice.slice(index.value.0..index.value.1);

        if name.eq_ignore_ascii_case(b"content-length") {
            let len = std::str::from_utf8(trim_ascii(&value))
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .ok_or(ParseError::Header)?;
            if len != 0 {
                content_length = Some(len);
            }
        } else if name.eq_ignore_ascii_case(b"transfer-encoding") {
            chunked = trim_ascii(&value).eq_ignore_ascii_case(b"chunked");
        } else if name.eq_ignore_ascii_case(b"connection") {
            keep_alive = !trim_ascii(&value).eq_ignore_ascii_case(b"close");
        }

        headers.insert(name, value);
    }

    // https://tools.ietf.org/html/rfc7230#section-3.3.3
    let length = if chunked {
        PayloadLength::Chunked
    } else if let Some(len) = content_length {
        PayloadLength::Length(len)
    } else if headers.contains_key("Content-Length") {
        // explicit zero length
        PayloadLength::None
    } else {
        // no framing: the body extends to connection close
        PayloadLength::Eof
    };

    let head = ResponseHead {
        status,
        headers,
        keep_alive,
    };

    Ok(Some((head, length)))
}

#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex {
    name: (0, 0),
    value: (0, 0),
};

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, index) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            index.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            index.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Decoder for one of the transfer framings.
#[derive(Debug)]
enum PayloadDecoder {
    /// Counted body; holds the bytes still owed.
    Length(u64),

    /// Body in chunked transfer coding.
    Chunked(ChunkParser),

    /// Body delimited by connection close. Only valid for responses that
    /// carry neither length nor chunking; completion is signalled by
    /// [`ResponseDecoder::accept_eof`].
    Eof,
}

impl PayloadDecoder {
    /// Pull the next run of body bytes out of `src`.
    ///
    /// `Ok(None)` means the buffer ran dry; whether the body is finished is
    /// a separate question, answered by [`done`](PayloadDecoder::done).
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
        match self {
            PayloadDecoder::Length(remaining) => {
                if *remaining == 0 || src.is_empty() {
                    return Ok(None);
                }
                let take = (*remaining).min(src.len() as u64) as usize;
                *remaining -= take as u64;
                Ok(Some(src.split_to(take).freeze()))
            }
            PayloadDecoder::Chunked(parser) => parser.decode(src),
            PayloadDecoder::Eof => {
                if src.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(src.split().freeze()))
                }
            }
        }
    }

    fn done(&self) -> bool {
        match self {
            PayloadDecoder::Length(remaining) => *remaining == 0,
            PayloadDecoder::Chunked(parser) => parser.phase == Phase::Finished,
            PayloadDecoder::Eof => false,
        }
    }
}

/// Incremental parser for the chunked transfer coding.
///
/// Input may be cut at any byte, so the parser records where it stands
/// inside the `size [;extension] CRLF data CRLF` framing between calls.
/// `pending` doubles as the size accumulator while a size line is being
/// read and as the countdown of unconsumed payload once it is.
#[derive(Debug)]
struct ChunkParser {
    phase: Phase,
    pending: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Hex digits of a chunk-size line.
    Size,
    /// Chunk extension or padding, skipped up to the closing CR.
    SizeTail,
    /// LF ending the size line.
    SizeLf,
    /// Chunk payload, `pending` bytes left.
    Data,
    /// CR after the payload.
    DataCr,
    /// LF after the payload.
    DataLf,
    /// CR of the blank line ending the message (trailers are rejected).
    EndCr,
    /// LF of the blank line ending the message.
    EndLf,
    /// Terminating chunk fully consumed.
    Finished,
}

impl ChunkParser {
    fn new() -> ChunkParser {
        ChunkParser {
            phase: Phase::Size,
            pending: 0,
        }
    }

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ParseError> {
        loop {
            match self.phase {
                Phase::Finished => return Ok(None),

                Phase::Data => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let take = self.pending.min(src.len() as u64) as usize;
                    self.pending -= take as u64;
                    if self.pending == 0 {
                        self.phase = Phase::DataCr;
                    }
                    return Ok(Some(src.split_to(take).freeze()));
                }

                phase => {
                    let byte = match src.first() {
                        Some(&byte) => byte,
                        None => return Ok(None),
                    };
                    src.advance(1);
                    self.phase = self.step(phase, byte)?;
                }
            }
        }
    }

    fn step(&mut self, phase: Phase, byte: u8) -> Result<Phase, ParseError> {
        let next = match (phase, byte) {
            (Phase::Size, b'0'..=b'9') => self.push_digit(byte - b'0')?,
            (Phase::Size, b'a'..=b'f') => self.push_digit(byte - b'a' + 10)?,
            (Phase::Size, b'A'..=b'F') => self.push_digit(byte - b'A' + 10)?,
            (Phase::Size, b';' | b' ' | b'\t') => Phase::SizeTail,
            (Phase::Size | Phase::SizeTail, b'\r') => Phase::SizeLf,
            (Phase::SizeTail, _) => Phase::SizeTail,

            (Phase::SizeLf, b'\n') if self.pending > 0 => Phase::Data,
            (Phase::SizeLf, b'\n') => Phase::EndCr,

            (Phase::DataCr, b'\r') => Phase::DataLf,
            (Phase::DataLf, b'\n') => Phase::Size,

            (Phase::EndCr, b'\r') => Phase::EndLf,
            (Phase::EndLf, b'\n') => Phase::Finished,

            (phase, _) => {
                return Err(ParseError::Chunked(match phase {
                    Phase::Size => "bad character in chunk size",
                    Phase::SizeLf => "chunk size line not closed by CRLF",
                    Phase::DataCr | Phase::DataLf => "chunk data not closed by CRLF",
                    Phase::EndCr | Phase::EndLf => "unexpected bytes after final chunk",
                    _ => "malformed framing",
                }));
            }
        };

        Ok(next)
    }

    fn push_digit(&mut self, digit: u8) -> Result<Phase, ParseError> {
        self.pending = self
            .pending
            .checked_mul(16)
            .and_then(|size| size.checked_add(u64::from(digit)))
            .ok_or(ParseError::Chunked("chunk size does not fit in u64"))?;

        Ok(Phase::Size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(decoder: &mut ResponseDecoder, buf: &mut BytesMut, bytes: &[u8]) -> bool {
        buf.extend_from_slice(bytes);
        decoder.decode(buf).unwrap()
    }

    #[test]
    fn content_length_body() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::new();

        assert!(!feed(
            &mut decoder,
            &mut buf,
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel",
        ));
        assert!(feed(&mut decoder, &mut buf, b"lo"));

        let (head, content) = decoder.into_parts().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers.get("content-length"), b"5");
        assert!(head.keep_alive());
        assert_eq!(&content[..], b"hello");
    }

    #[test]
    fn partial_head_across_reads() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::new();

        assert!(!feed(&mut decoder, &mut buf, b"HTTP/1.1 40"));
        assert!(feed(
            &mut decoder,
            &mut buf,
            b"4 Not Found\r\nContent-Length: 0\r\n\r\n",
        ));

        let (head, content) = decoder.into_parts().unwrap();
        assert_eq!(head.status, StatusCode::NOT_FOUND);
        assert!(content.is_empty());
    }

    #[test]
    fn head_response_has_no_body() {
        let mut decoder = ResponseDecoder::new(true);
        let mut buf = BytesMut::new();

        assert!(feed(
            &mut decoder,
            &mut buf,
            b"HTTP/1.1 200 OK\r\nContent-Length: 512\r\n\r\n",
        ));

        let (head, content) = decoder.into_parts().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert!(content.is_empty());
    }

    #[test]
    fn chunked_body() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::new();

        assert!(!feed(
            &mut decoder,
            &mut buf,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ndata\r\n",
        ));
        assert!(!feed(&mut decoder, &mut buf, b"6\r\n line1\r\n"));
        assert!(feed(&mut decoder, &mut buf, b"0\r\n\r\n"));

        let (_, content) = decoder.into_parts().unwrap();
        assert_eq!(&content[..], b"data line1");
    }

    #[test]
    fn chunked_size_with_extension() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::new();

        assert!(feed(
            &mut decoder,
            &mut buf,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4;ext=1\r\ndata\r\n0\r\n\r\n",
        ));

        let (_, content) = decoder.into_parts().unwrap();
        assert_eq!(&content[..], b"data");
    }

    #[test]
    fn invalid_chunk_size_is_an_error() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n"[..],
        );

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ParseError::Chunked(_))
        ));
    }

    #[test]
    fn oversized_chunk_size_is_an_error() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nfffffffffffffffff\r\n"[..],
        );

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ParseError::Chunked(_))
        ));
    }

    #[test]
    fn connection_close_disables_keep_alive() {
        let mut decoder = ResponseDecoder::new(true);
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nConnection: Close\r\n\r\n"[..],
        );

        assert!(decoder.decode(&mut buf).unwrap());
        let (head, _) = decoder.into_parts().unwrap();
        assert!(!head.keep_alive());
    }

    #[test]
    fn unframed_body_runs_to_eof() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::new();

        assert!(!feed(&mut decoder, &mut buf, b"HTTP/1.1 200 OK\r\n\r\npartial"));
        // no framing header: an EOF here is a protocol error
        assert!(!decoder.accept_eof());
    }

    #[test]
    fn eof_with_framing_header_keeps_partial_body() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::new();

        assert!(!feed(
            &mut decoder,
            &mut buf,
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial",
        ));
        assert!(decoder.accept_eof());

        let (head, content) = decoder.into_parts().unwrap();
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(&content[..], b"partial");
    }

    #[test]
    fn content_encoding_alone_counts_as_framing() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::new();

        assert!(!feed(
            &mut decoder,
            &mut buf,
            b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\n\r\nstuff",
        ));
        assert!(decoder.accept_eof());
    }

    #[test]
    fn no_content_status_completes_without_body() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::from(&b"HTTP/1.1 204 No Content\r\n\r\n"[..]);

        assert!(decoder.decode(&mut buf).unwrap());
    }

    #[test]
    fn invalid_content_length_is_an_error() {
        let mut decoder = ResponseDecoder::new(false);
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nContent-Length: banana\r\n\r\n"[..],
        );

        assert!(matches!(decoder.decode(&mut buf), Err(ParseError::Header)));
    }

    #[test]
    fn header_casing_survives_the_wire() {
        let mut decoder = ResponseDecoder::new(true);
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nX-CuStOm-HeAdEr: yes\r\n\r\n"[..],
        );

        assert!(decoder.decode(&mut buf).unwrap());
        let (head, _) = decoder.into_parts().unwrap();
        assert_eq!(head.headers.get("x-custom-header"), b"yes");
        let names: Vec<_> = head.headers.iter().map(|(n, _)| n.to_vec()).collect();
        assert!(names.contains(&b"X-CuStOm-HeAdEr".to_vec()));
    }
}
