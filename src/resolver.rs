//! Caching DNS resolution.
//!
//! The resolver keeps a per-`(name, port)` cache of address records with
//! individual expiry times and falls back to network resolution on a miss.
//! Caching by the *requested* port lets the same name hold independent record
//! lists for ports 80 and 443. Concurrent callers do not coordinate;
//! duplicate network queries are acceptable because the client is optimized
//! for a small set of unique hosts.

use std::{
    cell::RefCell,
    collections::{hash_map::Entry, HashMap},
    net::IpAddr,
    rc::Rc,
    str,
    time::{Duration, Instant},
};

use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    proto::rr::{RData, RecordType},
    TokioAsyncResolver,
};
use log::trace;
use rand::seq::SliceRandom;

use crate::error::DnsError;

/// Effective lifetime of records cached with a TTL of zero.
const FOREVER: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Returns true if `host` is an IPv4 or IPv6 address in presentation form.
pub fn is_ip(host: impl AsRef<[u8]>) -> bool {
    match str::from_utf8(host.as_ref()) {
        Ok(host) => host.parse::<IpAddr>().is_ok(),
        Err(_) => false,
    }
}

/// One cached address record.
#[derive(Debug, Clone)]
pub struct Record {
    pub ip: IpAddr,
    pub port: u16,
    pub expires: Instant,
}

impl Record {
    fn new(ip: IpAddr, port: u16, ttl: i64) -> Record {
        let now = Instant::now();
        let expires = if ttl > 0 {
            now + Duration::from_secs(ttl as u64)
        } else if ttl == 0 {
            now + FOREVER
        } else {
            // born expired
            now
        };

        Record { ip, port, expires }
    }
}

/// Caching DNS resolver.
///
/// Network resolution is delegated to hickory; results are cached per
/// `(name, requested-port)` with the TTL reported for each record. Expired
/// records are pruned lazily when an entry is read.
pub struct Resolver {
    prefer_ipv6: bool,
    config: Option<(ResolverConfig, ResolverOpts)>,
    network: RefCell<Option<Rc<TokioAsyncResolver>>>,
    cache: RefCell<HashMap<(String, u16), Vec<Record>>>,
}

impl Default for Resolver {
    fn default() -> Resolver {
        Resolver::new()
    }
}

impl Resolver {
    /// Create a resolver backed by the system configuration.
    ///
    /// The network resolver is constructed lazily on the first query, so
    /// creating a `Resolver` never fails and never touches the network.
    pub fn new() -> Resolver {
        Resolver {
            prefer_ipv6: true,
            config: None,
            network: RefCell::new(None),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Create a resolver that queries the given nameservers on port 53.
    pub fn with_nameservers(nameservers: &[IpAddr]) -> Resolver {
        let group = NameServerConfigGroup::from_ips_clear(nameservers, 53, true);
        let config = ResolverConfig::from_parts(None, Vec::new(), group);
        Resolver::with_config(config, ResolverOpts::default())
    }

    /// Create a resolver from an explicit hickory configuration.
    pub fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Resolver {
        Resolver {
            prefer_ipv6: true,
            config: Some((config, opts)),
            network: RefCell::new(None),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Set whether AAAA records are queried before A records.
    pub fn prefer_ipv6(mut self, prefer_ipv6: bool) -> Resolver {
        self.prefer_ipv6 = prefer_ipv6;
        self
    }

    /// Add a record for the `(host, host_port)` pair pointing at `ip:port`.
    ///
    /// The record lives for `ttl` seconds; a TTL of zero caches it forever
    /// and a negative TTL produces an already-expired record. When
    /// `overwrite` is true the record replaces any existing list, otherwise
    /// it is appended.
    pub fn add_to_cache(
        &self,
        host: &str,
        host_port: u16,
        ip: IpAddr,
        ttl: i64,
        port: u16,
        overwrite: bool,
    ) {
        let record = Record::new(ip, port, ttl);
        let mut cache = self.cache.borrow_mut();

        match cache.entry((host.to_owned(), host_port)) {
            Entry::Occupied(mut entry) if !overwrite => entry.get_mut().push(record),
            Entry::Occupied(mut entry) => *entry.get_mut() = vec![record],
            Entry::Vacant(entry) => {
                entry.insert(vec![record]);
            }
        }
    }

    /// Fetch a record for the `(host, host_port)` pair.
    ///
    /// Expired records are pruned as a side effect; when several live records
    /// remain, one is chosen uniformly at random. Returns `None` when the
    /// entry is absent or fully expired.
    pub fn fetch_from_cache(&self, host: &str, host_port: u16) -> Option<Record> {
        let mut cache = self.cache.borrow_mut();
        let records = cache.get_mut(&(host.to_owned(), host_port))?;

        let now = Instant::now();
        records.retain(|record| record.expires > now);

        records.choose(&mut rand::thread_rng()).cloned()
    }

    /// Resolve `host:port` to an address record.
    ///
    /// IP literals short-circuit without touching the cache or the network.
    /// Otherwise the cache is tried first; on a miss, AAAA and then A records
    /// are queried (A only when IPv6 is not preferred), every address of the
    /// first non-empty answer is cached with its reported TTL, and the cache
    /// is read again.
    pub async fn resolve(&self, host: &str, port: u16) -> Result<Record, DnsError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(Record::new(ip, port, 0));
        }

        if let Some(record) = self.fetch_from_cache(host, port) {
            return Ok(record);
        }

        let resolver = self.network()?;
        let query_types: &[RecordType] = if self.prefer_ipv6 {
            &[RecordType::AAAA, RecordType::A]
        } else {
            &[RecordType::A]
        };

        for &query_type in query_types {
            let lookup = match resolver.lookup(host, query_type).await {
                Ok(lookup) => lookup,
                Err(err) => {
                    trace!("{} lookup for {:?} failed: {}", query_type, host, err);
                    continue;
                }
            };

            let mut inserted = false;
            for record in lookup.record_iter() {
                let ip = match record.data() {
                    Some(RData::A(a)) => IpAddr::V4(a.0),
                    Some(RData::AAAA(aaaa)) => IpAddr::V6(aaaa.0),
                    _ => continue,
                };

                // first address replaces any stale entry, the rest append
                self.add_to_cache(host, port, ip, i64::from(record.ttl()), port, !inserted);
                inserted = true;
            }

            if inserted {
                break;
            }
        }

        self.fetch_from_cache(host, port).ok_or(DnsError::NoRecords)
    }

    fn network(&self) -> Result<Rc<TokioAsyncResolver>, DnsError> {
        if let Some(resolver) = self.network.borrow().as_ref() {
            return Ok(Rc::clone(resolver));
        }

        let resolver = match &self.config {
            Some((config, opts)) => TokioAsyncResolver::tokio(config.clone(), opts.clone()),
            None => TokioAsyncResolver::tokio_from_system_conf()?,
        };

        let resolver = Rc::new(resolver);
        *self.network.borrow_mut() = Some(Rc::clone(&resolver));
        Ok(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost(last: u8) -> IpAddr {
        IpAddr::from([127, 0, 0, last])
    }

    #[test]
    fn ip_literals() {
        assert!(is_ip("127.0.0.1"));
        assert!(is_ip("::1"));
        assert!(is_ip(b"::1".as_ref()));
        assert!(!is_ip("example"));
        assert!(!is_ip("256.0.0.0"));
        assert!(!is_ip(b"\xff\xfe".as_ref()));
    }

    #[test]
    fn caching() {
        let resolver = Resolver::new();
        assert!(resolver.fetch_from_cache("test", 80).is_none());

        resolver.add_to_cache("test", 80, localhost(1), 40, 80, true);

        let record = resolver.fetch_from_cache("test", 80).unwrap();
        assert_eq!(record.ip, localhost(1));
        assert_eq!(record.port, 80);
    }

    #[test]
    fn negative_ttl_expires_immediately() {
        let resolver = Resolver::new();
        resolver.add_to_cache("test", 80, localhost(1), -1, 80, true);

        assert!(resolver.fetch_from_cache("test", 80).is_none());
    }

    #[test]
    fn expired_records_are_pruned() {
        let resolver = Resolver::new();
        resolver.add_to_cache("test", 80, localhost(1), -1, 80, true);
        resolver.add_to_cache("test", 80, localhost(2), 40, 443, false);

        let record = resolver.fetch_from_cache("test", 80).unwrap();
        assert_eq!(record.ip, localhost(2));
        assert_eq!(record.port, 443);
    }

    #[test]
    fn zero_ttl_never_expires() {
        let resolver = Resolver::new();
        resolver.add_to_cache("test", 80, localhost(1), 0, 80, true);

        assert!(resolver.fetch_from_cache("test", 80).is_some());
    }

    #[test]
    fn requested_port_keys_are_independent() {
        let resolver = Resolver::new();
        resolver.add_to_cache("test", 80, localhost(1), 40, 80, true);

        assert!(resolver.fetch_from_cache("test", 443).is_none());
    }

    #[actix_rt::test]
    async fn resolve_from_cache() {
        let resolver = Resolver::new();
        resolver.add_to_cache("test", 80, localhost(1), 40, 80, true);

        let record = resolver.resolve("test", 80).await.unwrap();
        assert_eq!(record.ip, localhost(1));
        assert_eq!(record.port, 80);
    }

    #[actix_rt::test]
    async fn resolve_literal_bypasses_cache() {
        let resolver = Resolver::new();

        let record = resolver.resolve("127.0.0.1", 8080).await.unwrap();
        assert_eq!(record.ip, localhost(1));
        assert_eq!(record.port, 8080);
        assert!(resolver.fetch_from_cache("127.0.0.1", 8080).is_none());
    }
}
