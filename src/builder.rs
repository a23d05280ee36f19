//! Client configuration builder.

use std::{rc::Rc, sync::Arc};

use bytes::Bytes;
use tokio::sync::Semaphore;

use crate::{
    client::{Client, ClientInner},
    resolver::Resolver,
    tls,
};

const DEFAULT_CAPACITY: usize = 100;
const DEFAULT_USER_AGENT: &str = concat!("stampede/", env!("CARGO_PKG_VERSION"));

/// Builder for a [`Client`] with non-default settings.
pub struct ClientBuilder {
    capacity: usize,
    resolver: Option<Rc<Resolver>>,
    tls_config: Option<Arc<rustls::ClientConfig>>,
    user_agent: Bytes,
    request_limit: Option<usize>,
}

impl Default for ClientBuilder {
    fn default() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl ClientBuilder {
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            capacity: DEFAULT_CAPACITY,
            resolver: None,
            tls_config: None,
            user_agent: Bytes::from_static(DEFAULT_USER_AGENT.as_bytes()),
            request_limit: None,
        }
    }

    /// Maximum concurrent connections per origin.
    pub fn limit(mut self, capacity: usize) -> ClientBuilder {
        self.capacity = capacity;
        self
    }

    /// Use a shared, possibly pre-seeded DNS resolver.
    pub fn resolver(mut self, resolver: Rc<Resolver>) -> ClientBuilder {
        self.resolver = Some(resolver);
        self
    }

    /// Default TLS configuration for `https` requests.
    ///
    /// Individual requests can still override it with
    /// [`ClientRequest::tls`](crate::ClientRequest::tls).
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> ClientBuilder {
        self.tls_config = Some(config);
        self
    }

    /// Default `User-Agent` header value.
    pub fn user_agent(mut self, user_agent: impl Into<Bytes>) -> ClientBuilder {
        self.user_agent = user_agent.into();
        self
    }

    /// Bound the total number of in-flight requests across all origins.
    ///
    /// Unlimited by default; the per-origin capacity still applies.
    pub fn request_limit(mut self, limit: usize) -> ClientBuilder {
        self.request_limit = Some(limit);
        self
    }

    /// Finish building the client.
    pub fn finish(self) -> Client {
        let resolver = self.resolver.unwrap_or_else(|| Rc::new(Resolver::new()));
        let tls_config = self.tls_config.unwrap_or_else(tls::default_config);
        let request_permits = self
            .request_limit
            .map(|limit| Arc::new(Semaphore::new(limit)));

        Client::from_inner(ClientInner::new(
            self.capacity,
            resolver,
            tls_config,
            self.user_agent,
            request_permits,
        ))
    }
}
