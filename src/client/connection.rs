//! A single pooled connection.

use std::{
    cell::{Cell, RefCell},
    io,
    net::IpAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::{Bytes, BytesMut};
use log::trace;
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::TlsConnector;

use crate::tls::TlsConnect;

/// Established byte stream, plain or TLS.
pub(crate) enum Stream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_read(cx, buf),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_write(cx, buf),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_flush(cx),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(io) => Pin::new(io).poll_shutdown(cx),
            Stream::Tls(io) => Pin::new(io.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A single connection slot within a pool.
///
/// The connection is created unconnected; the stream is dialed on the first
/// `read`/`send` and re-dialed after a close. A connection is held by at most
/// one request at a time, which is what makes the plain `Cell` state sound on
/// a single-threaded runtime.
pub struct Connection {
    ip: IpAddr,
    port: u16,
    tls: Option<TlsConnect>,
    io: RefCell<Option<Stream>>,
    in_use: Cell<bool>,
    connect_count: Cell<usize>,
}

impl Connection {
    pub(crate) fn new(ip: IpAddr, port: u16, tls: Option<TlsConnect>) -> Connection {
        Connection {
            ip,
            port,
            tls,
            io: RefCell::new(None),
            in_use: Cell::new(false),
            connect_count: Cell::new(0),
        }
    }

    /// Number of times the stream has been opened.
    ///
    /// A cumulative measure of how often keep-alive failed for this slot.
    pub fn connect_count(&self) -> usize {
        self.connect_count.get()
    }

    /// Returns true while a request holds this connection.
    pub fn is_in_use(&self) -> bool {
        self.in_use.get()
    }

    /// Returns true while the stream is established.
    pub fn is_connected(&self) -> bool {
        self.io.borrow().is_some()
    }

    pub(crate) fn set_in_use(&self, in_use: bool) {
        self.in_use.set(in_use);
    }

    /// Read up to `max` bytes off the stream, dialing first if necessary.
    ///
    /// A zero-byte read means the server closed the stream; the connection
    /// transitions to disconnected and the empty buffer is returned so the
    /// caller can observe the EOF.
    pub async fn read(&self, max: usize) -> io::Result<Bytes> {
        let mut io = self.take_io().await?;
        let mut buf = BytesMut::with_capacity(max);

        match io.read_buf(&mut buf).await {
            Ok(0) => {
                trace!("{}:{} closed by peer", self.ip, self.port);
                Ok(Bytes::new())
            }
            Ok(_) => {
                *self.io.borrow_mut() = Some(io);
                Ok(buf.freeze())
            }
            Err(err) => Err(err),
        }
    }

    /// Write `msg` to the stream, dialing first if necessary.
    ///
    /// Writes are never retried; a broken stream surfaces here or on the
    /// next read.
    pub async fn send(&self, msg: &[u8]) -> io::Result<()> {
        let mut io = self.take_io().await?;

        io.write_all(msg).await?;
        io.flush().await?;

        *self.io.borrow_mut() = Some(io);
        Ok(())
    }

    /// Tear down the stream. The next `read`/`send` reconnects.
    pub fn close(&self) {
        if self.io.borrow_mut().take().is_some() {
            trace!("{}:{} closed", self.ip, self.port);
        }
    }

    async fn take_io(&self) -> io::Result<Stream> {
        let io = self.io.borrow_mut().take();
        match io {
            Some(io) => Ok(io),
            None => self.connect().await,
        }
    }

    async fn connect(&self) -> io::Result<Stream> {
        trace!("connecting to {}:{}", self.ip, self.port);
        let stream = TcpStream::connect((self.ip, self.port)).await?;
        stream.set_nodelay(true)?;

        let io = match &self.tls {
            None => Stream::Plain(stream),
            Some(tls) => {
                let connector = TlsConnector::from(Arc::clone(&tls.config));
                let stream = connector.connect(tls.server_name.clone(), stream).await?;
                Stream::Tls(Box::new(stream))
            }
        };

        self.connect_count.set(self.connect_count.get() + 1);
        Ok(io)
    }
}
