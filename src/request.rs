//! Request builder.

use std::{io, rc::Rc, sync::Arc};

use bytes::Bytes;
use http::{Method, Uri};
use rustls::{ClientConfig, ServerName};

use crate::{
    client::{h1proto, ClientInner},
    error::{ConnectError, InvalidUrl, SendRequestError},
    header::HeaderMap,
    response::ClientResponse,
    tls::TlsConnect,
};

/// An HTTP request under construction.
///
/// Created through [`Client::request`](crate::Client::request) or one of the
/// method shorthands, finished with [`send`](ClientRequest::send) or
/// [`send_body`](ClientRequest::send_body).
pub struct ClientRequest {
    inner: Rc<ClientInner>,
    method: Method,
    url: String,
    headers: HeaderMap,
    tls: Option<Arc<ClientConfig>>,
}

impl ClientRequest {
    pub(crate) fn new(inner: Rc<ClientInner>, method: Method, url: String) -> ClientRequest {
        ClientRequest {
            inner,
            method,
            url,
            headers: HeaderMap::new(),
            tls: None,
        }
    }

    /// Set a header, replacing any same-named header set earlier.
    ///
    /// Caller headers take precedence over the client defaults (`Host`,
    /// `User-Agent`, automatic `Content-Length`).
    pub fn header(mut self, name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> ClientRequest {
        self.headers.insert(
            Bytes::copy_from_slice(name.as_ref()),
            Bytes::copy_from_slice(value.as_ref()),
        );
        self
    }

    /// Use a specific TLS configuration for this request.
    ///
    /// Only consulted for `https` URLs; an `http` URL stays plain TCP even
    /// when a configuration is supplied.
    pub fn tls(mut self, config: Arc<ClientConfig>) -> ClientRequest {
        self.tls = Some(config);
        self
    }

    /// Send the request without a body and await the complete response.
    pub async fn send(self) -> Result<ClientResponse, SendRequestError> {
        self.send_inner(None).await
    }

    /// Send the request with `body` and await the complete response.
    ///
    /// `Content-Length` is set automatically unless the caller already did.
    pub async fn send_body(
        self,
        body: impl Into<Bytes>,
    ) -> Result<ClientResponse, SendRequestError> {
        self.send_inner(Some(body.into())).await
    }

    async fn send_inner(
        mut self,
        body: Option<Bytes>,
    ) -> Result<ClientResponse, SendRequestError> {
        // session-wide in-flight bound, held for the whole cycle
        let _request_permit = match &self.inner.request_permits {
            Some(permits) => Some(Arc::clone(permits).acquire_owned().await.map_err(|_| {
                SendRequestError::Connect(ConnectError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "request semaphore closed",
                )))
            })?),
            None => None,
        };

        let uri: Uri = self
            .url
            .parse()
            .map_err(|err: http::uri::InvalidUri| InvalidUrl::Http(err.into()))?;

        let host = uri
            .host()
            .ok_or(SendRequestError::Url(InvalidUrl::MissingHost))?
            .to_owned();

        // only `https` enables TLS; any other scheme is plain TCP on port 80
        let scheme = uri.scheme_str().unwrap_or("http");
        let tls_enabled = scheme == "https";
        let port = uri.port_u16().unwrap_or(if tls_enabled { 443 } else { 80 });

        let path = match uri.path_and_query() {
            Some(pq) if !pq.as_str().is_empty() => pq.as_str().to_owned(),
            _ => "/".to_owned(),
        };

        let tls = if tls_enabled {
            let config = self
                .tls
                .take()
                .unwrap_or_else(|| Arc::clone(&self.inner.tls_config));
            let server_name = ServerName::try_from(host.as_str())
                .map_err(|_| SendRequestError::Connect(ConnectError::InvalidServerName))?;
            Some(TlsConnect {
                config,
                server_name,
            })
        } else {
            None
        };

        let key = format!("{}:{}:{}", scheme, host, port);
        let pool = self.inner.pool(&key, &host, port);

        if !self.headers.contains_key("Host") {
            self.headers
                .insert("Host", Bytes::from(host.into_bytes()));
        }
        if !self.headers.contains_key("User-Agent") {
            self.headers
                .insert("User-Agent", self.inner.user_agent.clone());
        }
        if let Some(body) = &body {
            if !self.headers.contains_key("Content-Length") {
                let mut fmt = itoa::Buffer::new();
                self.headers.insert(
                    "Content-Length",
                    Bytes::copy_from_slice(fmt.format(body.len()).as_bytes()),
                );
            }
        }

        let conn = pool
            .acquire_with(tls)
            .await
            .map_err(SendRequestError::Connect)?;

        h1proto::send_request(conn, &self.method, &path, &self.headers, body.as_ref()).await
    }
}
