//! SmallVec-Based HTTP Header Storage
//!
//! An ordered header multimap for requests and responses. Names compare
//! case-insensitively, and repeated headers keep the order they were added
//! in. Most messages carry fewer than a dozen headers, so they are stored
//! inline and a linear scan beats hashing.

use smallvec::SmallVec;
use std::fmt;

/// Number of headers to store inline (on stack).
pub const INLINE_HEADERS: usize = 12;

/// A header name-value pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    /// Header name as it was first written
    pub name: String,
    /// Header value
    pub value: String,
}

impl Header {
    /// Create a new header
    #[inline]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Check if name matches (case-insensitive)
    #[inline]
    pub fn name_eq(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Ordered, case-insensitive header multimap.
///
/// # Example
///
/// ```rust
/// use conduit_core::headers::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.append("Set-Cookie", "a=1");
/// headers.append("set-cookie", "b=2");
/// headers.insert("Content-Type", "application/json");
///
/// assert_eq!(headers.get("content-type"), Some("application/json"));
/// assert_eq!(headers.get_all("SET-COOKIE").collect::<Vec<_>>(), vec!["a=1", "b=2"]);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    inner: SmallVec<[Header; INLINE_HEADERS]>,
}

impl HeaderMap {
    /// Create a new empty header map.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }

    /// Create with pre-allocated capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: SmallVec::with_capacity(capacity),
        }
    }

    /// Check if storage is inline (no heap allocation).
    #[inline]
    pub fn is_inline(&self) -> bool {
        !self.inner.spilled()
    }

    /// Number of header lines, counting repeats.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// First value for `name` (case-insensitive).
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|h| h.name_eq(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |h| h.name_eq(name))
            .map(|h| h.value.as_str())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|h| h.name_eq(name))
    }

    /// Add a value, keeping any existing values for the same name.
    #[inline]
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push(Header::new(name, value));
    }

    /// Set a header, replacing every existing value for the same name.
    ///
    /// The replacement takes the position of the first replaced header.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let header = Header::new(name, value);
        match self.inner.iter().position(|h| h.name_eq(&header.name)) {
            Some(first) => {
                let name = header.name.clone();
                self.inner[first] = header;
                let mut index = first + 1;
                while index < self.inner.len() {
                    if self.inner[index].name_eq(&name) {
                        self.inner.remove(index);
                    } else {
                        index += 1;
                    }
                }
            }
            None => self.inner.push(header),
        }
    }

    /// Remove every value for `name`, returning how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.inner.len();
        self.inner.retain(|h| !h.name_eq(name));
        before - self.inner.len()
    }

    /// Iterate over headers in insertion order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.inner.iter()
    }

    /// Clear all headers.
    #[inline]
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

impl fmt::Debug for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.iter()).finish()
    }
}

impl<N, V> FromIterator<(N, V)> for HeaderMap
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in iter {
            map.append(name, value);
        }
        map
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = HeaderMap::new();
        headers.append("Content-Type", "text/plain");

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.contains("Content-type"));
        assert_eq!(headers.get("Accept"), None);
    }

    #[test]
    fn test_repeated_headers_keep_order() {
        let mut headers = HeaderMap::new();
        headers.append("Vary", "Accept");
        headers.append("X-Other", "1");
        headers.append("vary", "Accept-Encoding");

        let values: Vec<_> = headers.get_all("Vary").collect();
        assert_eq!(values, vec!["Accept", "Accept-Encoding"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_insert_replaces_all_values_in_place() {
        let mut headers = HeaderMap::new();
        headers.append("A", "1");
        headers.append("B", "2");
        headers.append("a", "3");
        headers.insert("A", "4");

        let names: Vec<_> = headers.iter().map(|h| h.value.as_str()).collect();
        assert_eq!(names, vec!["4", "2"]);
    }

    #[test]
    fn test_remove() {
        let mut headers: HeaderMap = [("A", "1"), ("a", "2"), ("B", "3")].into_iter().collect();
        assert_eq!(headers.remove("A"), 2);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.remove("missing"), 0);
    }

    #[test]
    fn test_inline_storage() {
        let mut headers = HeaderMap::new();
        for i in 0..INLINE_HEADERS {
            headers.append(format!("X-{}", i), "v");
        }
        assert!(headers.is_inline());
        headers.append("X-Spill", "v");
        assert!(!headers.is_inline());
    }
}
