//! Multi-origin client: routes requests to per-origin connection pools.

pub mod connection;
pub(crate) mod h1proto;
pub mod pool;

use std::{cell::RefCell, collections::HashMap, rc::Rc, sync::Arc};

use bytes::Bytes;
use http::Method;
use log::debug;
use tokio::sync::Semaphore;

use crate::{builder::ClientBuilder, request::ClientRequest, resolver::Resolver};

pub use self::connection::Connection;
pub use self::pool::{Acquired, Pool};

/// An HTTP/1.1 client for high request volumes against few origins.
///
/// Each origin, keyed by the `(scheme, host, port)` triple with the host as
/// written in the URL, gets its own connection pool bounded by the per-pool
/// capacity. Pools are created on first use and never evicted for the
/// lifetime of the client. Cloning is cheap and clones share pools, the
/// resolver, and all configuration.
///
/// The client is single-threaded by design: it interleaves requests
/// cooperatively on one event loop and shares nothing across threads. Run
/// one client per worker.
#[derive(Clone)]
pub struct Client(Rc<ClientInner>);

pub(crate) struct ClientInner {
    pub(crate) capacity: usize,
    pub(crate) resolver: Rc<Resolver>,
    pub(crate) tls_config: Arc<rustls::ClientConfig>,
    pub(crate) user_agent: Bytes,
    pub(crate) request_permits: Option<Arc<Semaphore>>,
    pools: RefCell<HashMap<String, Rc<Pool>>>,
}

impl ClientInner {
    pub(crate) fn new(
        capacity: usize,
        resolver: Rc<Resolver>,
        tls_config: Arc<rustls::ClientConfig>,
        user_agent: Bytes,
        request_permits: Option<Arc<Semaphore>>,
    ) -> ClientInner {
        ClientInner {
            capacity,
            resolver,
            tls_config,
            user_agent,
            request_permits,
            pools: RefCell::new(HashMap::new()),
        }
    }

    /// Pool for the origin `key`, created on first use.
    pub(crate) fn pool(&self, key: &str, host: &str, port: u16) -> Rc<Pool> {
        let mut pools = self.pools.borrow_mut();
        match pools.get(key) {
            Some(pool) => Rc::clone(pool),
            None => {
                debug!("creating pool for {}", key);
                let pool = Rc::new(Pool::new(
                    host,
                    port,
                    self.capacity,
                    Rc::clone(&self.resolver),
                ));
                pools.insert(key.to_owned(), Rc::clone(&pool));
                pool
            }
        }
    }
}

impl Default for Client {
    fn default() -> Client {
        ClientBuilder::new().finish()
    }
}

impl Client {
    /// Create a client allowing up to `capacity` connections per origin.
    pub fn new(capacity: usize) -> Client {
        ClientBuilder::new().limit(capacity).finish()
    }

    /// Start building a client with non-default settings.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_inner(inner: ClientInner) -> Client {
        Client(Rc::new(inner))
    }

    /// Construct a request with the given method and URL.
    pub fn request(&self, method: Method, url: impl Into<String>) -> ClientRequest {
        ClientRequest::new(Rc::clone(&self.0), method, url.into())
    }

    /// Construct an HTTP *HEAD* request.
    pub fn head(&self, url: impl Into<String>) -> ClientRequest {
        self.request(Method::HEAD, url)
    }

    /// Construct an HTTP *GET* request.
    pub fn get(&self, url: impl Into<String>) -> ClientRequest {
        self.request(Method::GET, url)
    }

    /// Construct an HTTP *POST* request.
    pub fn post(&self, url: impl Into<String>) -> ClientRequest {
        self.request(Method::POST, url)
    }

    /// Construct an HTTP *PUT* request.
    pub fn put(&self, url: impl Into<String>) -> ClientRequest {
        self.request(Method::PUT, url)
    }

    /// Construct an HTTP *DELETE* request.
    pub fn delete(&self, url: impl Into<String>) -> ClientRequest {
        self.request(Method::DELETE, url)
    }

    /// Total connect count across all pools.
    ///
    /// Every dial a pooled connection ever made is counted, so this measures
    /// how well keep-alive reuse is working: a value close to the number of
    /// pool slots means nearly every request rode an existing connection.
    pub fn connections(&self) -> usize {
        self.0.pools.borrow().values().map(|pool| pool.stats()).sum()
    }

    /// The resolver shared by every pool of this client.
    pub fn resolver(&self) -> Rc<Resolver> {
        Rc::clone(&self.0.resolver)
    }
}
