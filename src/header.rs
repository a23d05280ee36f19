//! Case-insensitive header map that preserves wire casing.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;

/// A header map keyed by the ASCII-uppercased header name.
///
/// Lookup is case-insensitive while iteration yields names exactly as they
/// were inserted (for requests: as the caller wrote them; for responses: as
/// they appeared on the wire). Looking up a name that is not present returns
/// the empty byte slice rather than failing, since callers routinely probe
/// encoding headers without checking for presence first.
#[derive(Clone, Default)]
pub struct HeaderMap {
    inner: HashMap<Vec<u8>, (Bytes, Bytes)>,
}

impl HeaderMap {
    /// Create an empty header map.
    pub fn new() -> HeaderMap {
        HeaderMap {
            inner: HashMap::new(),
        }
    }

    /// Create an empty header map with capacity for `capacity` headers.
    pub fn with_capacity(capacity: usize) -> HeaderMap {
        HeaderMap {
            inner: HashMap::with_capacity(capacity),
        }
    }

    /// Number of headers in the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the map contains no headers.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Insert a header, replacing any entry whose name matches
    /// case-insensitively. The latest casing wins.
    pub fn insert(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        let name = name.into();
        let key = name.to_ascii_uppercase();
        self.inner.insert(key, (name, value.into()));
    }

    /// Value of the header `name`, or the empty byte slice when absent.
    pub fn get(&self, name: impl AsRef<[u8]>) -> &[u8] {
        let key = name.as_ref().to_ascii_uppercase();
        match self.inner.get(&key) {
            Some((_, value)) => value.as_ref(),
            None => b"",
        }
    }

    /// Returns true if a header with this name is present.
    pub fn contains_key(&self, name: impl AsRef<[u8]>) -> bool {
        self.inner.contains_key(&name.as_ref().to_ascii_uppercase())
    }

    /// Remove a header by name, returning its value if it was present.
    pub fn remove(&mut self, name: impl AsRef<[u8]>) -> Option<Bytes> {
        self.inner
            .remove(&name.as_ref().to_ascii_uppercase())
            .map(|(_, value)| value)
    }

    /// Iterate over `(name, value)` pairs with the original name casing.
    ///
    /// Iteration order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.inner
            .values()
            .map(|(name, value)| (name.as_ref(), value.as_ref()))
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.iter() {
            map.entry(
                &String::from_utf8_lossy(name),
                &String::from_utf8_lossy(value),
            );
        }
        map.finish()
    }
}
