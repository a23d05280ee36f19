//! Per-origin connection pool.

use std::{cell::RefCell, io, ops::Deref, rc::Rc, sync::Arc};

use log::trace;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{
    client::connection::Connection,
    error::ConnectError,
    resolver::{Record, Resolver},
    tls::TlsConnect,
};

/// A connection pool for a single origin.
///
/// The semaphore is the canonical capacity signal: its permit count bounds
/// the number of in-use connections, and waiters are served in FIFO order.
/// The connection list is the semaphore's materialization; slots are created
/// lazily until the list is full, after which acquisition reuses the first
/// free slot in insertion order.
pub struct Pool {
    host: String,
    port: u16,
    capacity: usize,
    resolver: Rc<Resolver>,
    conns: RefCell<Vec<Rc<Connection>>>,
    permits: Arc<Semaphore>,
}

impl Pool {
    /// Create a pool of up to `capacity` connections to `host:port`.
    ///
    /// `host` is kept as written; it is resolved through `resolver` when a
    /// connection slot is first created.
    pub fn new(host: impl Into<String>, port: u16, capacity: usize, resolver: Rc<Resolver>) -> Pool {
        Pool {
            host: host.into(),
            port,
            capacity,
            resolver,
            conns: RefCell::new(Vec::new()),
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Wait for a free slot and return a locked connection.
    pub async fn acquire(&self) -> Result<Acquired, ConnectError> {
        self.acquire_with(None).await
    }

    /// Like [`acquire`](Pool::acquire), with TLS parameters applied to any
    /// newly created slot. Reused slots keep the stream they already have.
    pub(crate) async fn acquire_with(
        &self,
        tls: Option<TlsConnect>,
    ) -> Result<Acquired, ConnectError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| {
                ConnectError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "connection pool semaphore closed",
                ))
            })?;

        let created = if self.conns.borrow().len() < self.capacity {
            let record = self.resolve().await?;

            // the list may have filled while resolution was in flight
            let mut conns = self.conns.borrow_mut();
            if conns.len() < self.capacity {
                let conn = Rc::new(Connection::new(record.ip, record.port, tls));
                conn.set_in_use(true);
                conns.push(Rc::clone(&conn));
                trace!(
                    "pool {}:{} created slot {}/{}",
                    self.host,
                    self.port,
                    conns.len(),
                    self.capacity
                );
                Some(conn)
            } else {
                None
            }
        } else {
            None
        };

        let conn = match created {
            Some(conn) => conn,
            None => self.take_free().ok_or_else(|| {
                // unreachable while a permit is held
                ConnectError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    "connection pool has no free slot",
                ))
            })?,
        };

        Ok(Acquired {
            conn,
            _permit: permit,
        })
    }

    /// Total connect count across all slots.
    ///
    /// Computed under the list borrow so concurrent slot creation cannot
    /// yield a torn read.
    pub fn stats(&self) -> usize {
        self.conns.borrow().iter().map(|conn| conn.connect_count()).sum()
    }

    /// First idle slot in insertion order, marked in-use.
    fn take_free(&self) -> Option<Rc<Connection>> {
        let conns = self.conns.borrow();
        let conn = conns.iter().find(|conn| !conn.is_in_use()).map(Rc::clone)?;
        conn.set_in_use(true);
        Some(conn)
    }

    async fn resolve(&self) -> Result<Record, ConnectError> {
        let record = self.resolver.resolve(&self.host, self.port).await?;
        Ok(record)
    }
}

/// A locked connection checked out of a [`Pool`].
///
/// Dropping the guard releases the slot: the in-use flag is cleared and the
/// capacity permit returns to the semaphore, exactly once, even when the
/// holding task is cancelled mid-request.
pub struct Acquired {
    conn: Rc<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl Acquired {
    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Release the connection back into the pool.
    pub fn release(self) {}
}

impl Deref for Acquired {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for Acquired {
    fn drop(&mut self) {
        self.conn.set_in_use(false);
    }
}
