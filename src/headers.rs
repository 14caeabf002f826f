use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};

use crate::Result;
use crate::util::{parse_header_name, parse_header_value};

/// Header collection of a [`Request`](crate::Request) or
/// [`Response`](crate::Response).
///
/// Names compare case-insensitively. A name may carry several values:
/// [`set`](Self::set) replaces all of them, [`add`](Self::add) appends.
/// Distinct names keep their insertion order for serialization.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpHeaders {
    map: HeaderMap,
}

impl HttpHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        self.insert(name, value);
        Ok(())
    }

    /// Appends `value` to `name`, keeping values already present.
    pub fn add(&mut self, name: &str, value: &str) -> Result<()> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        self.append(name, value);
        Ok(())
    }

    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        self.map.insert(name, value);
    }

    pub fn append(&mut self, name: HeaderName, value: HeaderValue) {
        self.map.append(name, value);
    }

    /// First value of `name`.
    ///
    /// Values holding bytes outside visible ASCII are reported as absent;
    /// use [`header_map`](Self::header_map) to reach the raw bytes.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.map.get(name).and_then(|value| value.to_str().ok())
    }

    /// Every value of `name`, in the order they were added.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.map
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Removes `name` and returns its first value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map
            .remove(name)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.map.keys_len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Each distinct name once, with its values joined by `", "`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.map.keys().map(|name| {
            let combined = self
                .map
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str(), combined)
        })
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.map
    }
}

impl From<HeaderMap> for HttpHeaders {
    fn from(map: HeaderMap) -> Self {
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::HttpHeaders;

    #[test]
    fn lookups_ignore_name_case() {
        let mut headers = HttpHeaders::new();
        headers
            .set("X-Ms-Client-Request-Id", "abc")
            .expect("valid header");

        assert_eq!(headers.value("x-ms-client-request-id"), Some("abc"));
        assert_eq!(headers.value("X-MS-CLIENT-REQUEST-ID"), Some("abc"));
        assert!(headers.contains("x-MS-client-request-ID"));
    }

    #[test]
    fn set_replaces_every_prior_value() {
        let mut headers = HttpHeaders::new();
        headers.add("Accept", "text/plain").expect("valid header");
        headers.add("accept", "text/html").expect("valid header");
        headers.set("ACCEPT", "application/json").expect("valid header");

        assert_eq!(headers.values("accept"), vec!["application/json"]);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn add_keeps_prior_values_in_order() {
        let mut headers = HttpHeaders::new();
        headers.add("Set-Cookie", "a=1").expect("valid header");
        headers.add("set-cookie", "b=2").expect("valid header");

        assert_eq!(headers.value("Set-Cookie"), Some("a=1"));
        assert_eq!(headers.values("SET-COOKIE"), vec!["a=1", "b=2"]);
        let combined = headers.iter().collect::<Vec<_>>();
        assert_eq!(combined, vec![("set-cookie", "a=1, b=2".to_owned())]);
    }

    #[test]
    fn empty_values_round_trip() {
        let mut headers = HttpHeaders::new();
        headers.set("x-empty", "").expect("empty value is legal");

        assert_eq!(headers.value("X-Empty"), Some(""));
        assert_eq!(headers.values("x-empty"), vec![""]);
    }

    #[test]
    fn missing_names_yield_nothing() {
        let headers = HttpHeaders::new();

        assert_eq!(headers.value("host"), None);
        assert!(headers.values("host").is_empty());
        assert!(headers.is_empty());
    }

    #[test]
    fn invalid_names_and_values_are_rejected() {
        let mut headers = HttpHeaders::new();

        assert!(headers.set("bad name", "v").is_err());
        assert!(headers.set("x-ok", "line\nbreak").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn remove_returns_first_value() {
        let mut headers = HttpHeaders::new();
        headers.set("Authorization", "Bearer t").expect("valid header");

        assert_eq!(headers.remove("authorization").as_deref(), Some("Bearer t"));
        assert!(!headers.contains("Authorization"));
    }
}
