//! HTTP header map with case-insensitive name lookup.
//!
//! HTTP headers are order-preserving and case-insensitive per [RFC 9110 §5].
//! Cached responses carry their own `Headers`, so the map is `Clone` and
//! each clone is fully independent of the original.

/// A case-insensitive, multi-value HTTP header map.
///
/// # Examples
///
/// ```
/// use edgekit::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Cache-Control", "no-cache");
/// headers.set("cache-control", "public, max-age=120");
///
/// assert_eq!(headers.get("Cache-Control"), Some("public, max-age=120"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
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
    /// The entry keeps the position of the first existing occurrence, or is
    /// appended if the name was absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .inner
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(pos) => {
                self.inner[pos] = (name.clone(), value);
                let mut idx = 0;
                self.inner.retain(|(k, _)| {
                    let keep = idx <= pos || !k.eq_ignore_ascii_case(&name);
                    idx += 1;
                    keep
                });
            }
            None => self.inner.push((name, value)),
        }
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all values for the given header name (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("X-Cache", "HIT");
        assert_eq!(h.get("x-cache"), Some("HIT"));
        assert_eq!(h.get("X-CACHE"), Some("HIT"));
    }

    #[test]
    fn multi_value() {
        let mut h = Headers::new();
        h.insert("Vary", "Origin");
        h.insert("Vary", "Accept-Encoding");
        let vals: Vec<_> = h.get_all("vary").collect();
        assert_eq!(vals, vec!["Origin", "Accept-Encoding"]);
    }

    #[test]
    fn set_collapses_duplicates_in_place() {
        let mut h = Headers::new();
        h.insert("Content-Type", "application/json");
        h.insert("Cache-Control", "no-cache");
        h.insert("ETag", "\"abc\"");
        h.insert("cache-control", "private");

        h.set("Cache-Control", "public, max-age=60");

        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["Content-Type", "Cache-Control", "ETag"]);
        assert_eq!(h.get("cache-control"), Some("public, max-age=60"));
    }

    #[test]
    fn set_appends_when_absent() {
        let mut h = Headers::new();
        h.set("X-Cache", "MISS");
        assert_eq!(h.get("x-cache"), Some("MISS"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn clones_are_independent() {
        let mut original = Headers::new();
        original.insert("X-Cache", "MISS");
        let mut copy = original.clone();
        copy.set("X-Cache", "HIT");
        assert_eq!(original.get("x-cache"), Some("MISS"));
    }

    #[test]
    fn remove() {
        let mut h = Headers::new();
        h.insert("X-Foo", "bar");
        h.insert("X-Foo", "baz");
        assert!(h.remove("x-foo"));
        assert!(h.is_empty());
        assert!(!h.remove("x-foo"));
    }
}
