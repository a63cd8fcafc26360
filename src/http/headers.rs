//! Ordered, case-insensitive HTTP header map.
//!
//! Field names compare case-insensitively (RFC 9110 §5.1). Caching headers are
//! single-valued, so besides the appending [`Headers::insert`] the map offers
//! [`Headers::set`], which replaces every earlier value for a name.

use std::fmt;

/// A case-insensitive, multi-value HTTP header map.
///
/// # Examples
///
/// ```
/// use rttp_caching::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("ETag", "first");
/// headers.set("etag", "second");
///
/// assert_eq!(headers.get("ETAG"), Some("second"));
/// assert_eq!(headers.get_all("etag").count(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every value stored under `name` with a single `value`.
    ///
    /// The replacement keeps the position of the first existing entry so the
    /// serialized header order stays stable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.inner.iter().position(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            Some(pos) => {
                let mut index = 0;
                self.inner.retain(|(k, _)| {
                    let keep = index <= pos || !k.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
                self.inner[pos] = (name, value);
            }
            None => self.inner.push((name, value)),
        }
    }

    /// Returns the first value for the given header name, or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all values for the given header name.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given header name.
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("If-None-Match", "abc");
        assert_eq!(h.get("if-none-match"), Some("abc"));
        assert_eq!(h.get("IF-NONE-MATCH"), Some("abc"));
    }

    #[test]
    fn set_replaces_all_previous_values() {
        let mut h = Headers::new();
        h.insert("ETag", "one");
        h.insert("Vary", "Origin");
        h.insert("etag", "two");
        h.set("ETag", "three");

        let vals: Vec<_> = h.get_all("etag").collect();
        assert_eq!(vals, vec!["three"]);
        // first position is kept
        assert_eq!(h.iter().next(), Some(("ETag", "three")));
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn set_appends_when_missing() {
        let mut h = Headers::new();
        h.set("Expires", "foobar");
        assert_eq!(h.get("expires"), Some("foobar"));
    }

    #[test]
    fn remove() {
        let mut h = Headers::new();
        h.insert("Cache-Control", "no-cache");
        assert!(h.remove("cache-control"));
        assert!(h.is_empty());
        assert!(!h.remove("cache-control"));
    }

    #[test]
    fn display_is_wire_format() {
        let mut h = Headers::new();
        h.insert("ETag", "123456");
        assert_eq!(h.to_string(), "ETag: 123456\r\n");
    }
}
