//! Minimal threaded HTTP/1.1 server for exercising the client end-to-end.
//!
//! Deliberately blunt: blocking std networking on its own threads, canned
//! responses built by the test, keep-alive until the handler says otherwise.

#![allow(dead_code)]

use std::io::{Read as _, Write as _};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

/// A request as seen by the test server.
pub struct TestRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// 1-based position of this request on its connection.
    pub serial: usize,
}

impl TestRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A canned response plus the close decision for its connection.
pub struct TestResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    raw: Option<Vec<u8>>,
    pub close: bool,
}

impl TestResponse {
    pub fn new(status: u16) -> TestResponse {
        TestResponse {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            raw: None,
            close: false,
        }
    }

    /// Bytes written to the socket verbatim, bypassing response assembly.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> TestResponse {
        TestResponse {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
            raw: Some(bytes.into()),
            close: false,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> TestResponse {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> TestResponse {
        self.body = body.into();
        self
    }

    /// Close the connection after writing this response.
    pub fn close(mut self) -> TestResponse {
        self.close = true;
        self
    }

    fn to_bytes(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }

        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason(self.status)).into_bytes();
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        if self.close {
            out.extend_from_slice(b"Connection: close\r\n");
        }
        if !self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        {
            out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&self.body);
        out
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        302 => "Found",
        404 => "Not Found",
        _ => "Unknown",
    }
}

pub struct TestServer {
    addr: SocketAddr,
}

impl TestServer {
    /// Bind an ephemeral port and serve `handler` on background threads.
    ///
    /// The listener thread is leaked; the process exit cleans it up.
    pub fn start<F>(handler: F) -> TestServer
    where
        F: Fn(&TestRequest) -> TestResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handler = Arc::new(handler);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                let handler = Arc::clone(&handler);
                thread::spawn(move || serve_connection(stream, handler));
            }
        });

        TestServer { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

type Handler = dyn Fn(&TestRequest) -> TestResponse + Send + Sync;

fn serve_connection(mut stream: TcpStream, handler: Arc<Handler>) {
    let mut buf = Vec::new();
    let mut serial = 0;

    loop {
        let mut request = match read_request(&mut stream, &mut buf) {
            Some(request) => request,
            None => return,
        };
        serial += 1;
        request.serial = serial;

        let response = handler(&request);
        if stream.write_all(&response.to_bytes()).is_err() {
            return;
        }
        if response.close {
            return;
        }
    }
}

fn read_request(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Option<TestRequest> {
    let head_end = loop {
        if let Some(pos) = find(buf, b"\r\n\r\n") {
            break pos + 4;
        }
        if !fill(stream, buf) {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");

    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_owned();
    let path = request_line.next()?.to_owned();

    let mut headers = Vec::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_owned(), value.trim().to_owned()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        if !fill(stream, buf) {
            return None;
        }
    }

    let body = buf[head_end..head_end + content_length].to_vec();
    buf.drain(..head_end + content_length);

    Some(TestRequest {
        method,
        path,
        headers,
        body,
        serial: 0,
    })
}

fn fill(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 4096];
    match stream.read(&mut chunk) {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
