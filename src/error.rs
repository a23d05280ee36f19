//! Error types surfaced by the client.

use std::{io, string::FromUtf8Error};

use derive_more::{Display, From};
use hickory_resolver::error::ResolveError;

/// A DNS name could not be resolved to a live address.
#[derive(Debug, Display, From)]
pub enum DnsError {
    /// No live record for the name after cache and network lookup.
    #[display("no DNS records found for host")]
    NoRecords,

    /// The backing resolver could not be constructed or queried.
    #[display("resolver error: {}", _0)]
    Resolver(ResolveError),
}

impl std::error::Error for DnsError {}

/// A set of errors that can occur while connecting to an HTTP host.
#[derive(Debug, Display, From)]
pub enum ConnectError {
    /// Failed to resolve the hostname.
    #[display("failed resolving hostname: {}", _0)]
    Dns(DnsError),

    /// Host cannot be used as a TLS server name.
    #[display("invalid TLS server name")]
    InvalidServerName,

    /// Connection I/O error.
    #[display("{}", _0)]
    Io(io::Error),
}

impl std::error::Error for ConnectError {}

/// A malformed request URL.
#[derive(Debug, Display, From)]
pub enum InvalidUrl {
    #[display("missing host name")]
    MissingHost,

    #[display("URL parse error: {}", _0)]
    Http(http::Error),
}

impl std::error::Error for InvalidUrl {}

/// A set of errors that can occur while parsing HTTP response bytes.
#[derive(Debug, Display)]
pub enum ParseError {
    /// An invalid header.
    #[display("invalid header provided")]
    Header,

    /// An invalid status, such as `1337 ELITE`.
    #[display("invalid status provided")]
    Status,

    /// An invalid HTTP version.
    #[display("invalid HTTP version specified")]
    Version,

    /// A message head is too large to be reasonable.
    #[display("message head is too large")]
    TooLarge,

    /// A message reached EOF but is not complete.
    #[display("message is incomplete")]
    Incomplete,

    /// Malformed chunked transfer coding.
    #[display("invalid chunked encoding: {}", _0)]
    Chunked(&'static str),
}

impl std::error::Error for ParseError {}

impl From<httparse::Error> for ParseError {
    fn from(err: httparse::Error) -> ParseError {
        match err {
            httparse::Error::HeaderName
            | httparse::Error::HeaderValue
            | httparse::Error::NewLine
            | httparse::Error::Token => ParseError::Header,
            httparse::Error::Status => ParseError::Status,
            httparse::Error::Version => ParseError::Version,
            httparse::Error::TooManyHeaders => ParseError::TooLarge,
        }
    }
}

/// A set of errors that can occur during request sending and response reading.
#[derive(Debug, Display, From)]
pub enum SendRequestError {
    /// Invalid URL.
    #[display("invalid URL: {}", _0)]
    Url(InvalidUrl),

    /// Failed to connect to host.
    #[display("failed to connect to host: {}", _0)]
    Connect(ConnectError),

    /// Transport error while writing the request or reading the response.
    #[display("{}", _0)]
    Io(io::Error),

    /// Error parsing the response.
    #[display("error parsing response: {}", _0)]
    Response(ParseError),

    /// Server closed the connection before a framed response completed.
    #[display("connection closed before response completed")]
    Eof,
}

impl std::error::Error for SendRequestError {}

/// A set of errors that can occur while interpreting a response body.
#[derive(Debug, Display, From)]
pub enum PayloadError {
    /// The body could not be decompressed.
    #[display("decompression error: {}", _0)]
    Decompress(io::Error),

    /// The body is not valid UTF-8.
    #[display("UTF-8 error: {}", _0)]
    Utf8(FromUtf8Error),
}

impl std::error::Error for PayloadError {}

/// A set of errors that can occur while parsing a JSON body.
#[derive(Debug, Display, From)]
pub enum JsonPayloadError {
    /// Error reading the payload.
    #[display("{}", _0)]
    Payload(PayloadError),

    /// JSON deserialize error.
    #[display("JSON deserialize error: {}", _0)]
    Deserialize(serde_json::Error),
}

impl std::error::Error for JsonPayloadError {}
