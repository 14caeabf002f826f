use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime};

use http::header::{HeaderName, HeaderValue};

use crate::error::Error;

const MAX_ERROR_BODY_LEN: usize = 2048;
pub(crate) const REDACTED: &str = "REDACTED";
const SENSITIVE_QUERY_PARAMS: &[&str] = &["sig"];
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
];

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}

fn is_sensitive_query_param(name: &str) -> bool {
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}

fn redact_query(query: &str) -> Option<String> {
    let pairs = url::form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();
    if !pairs.iter().any(|(name, _)| is_sensitive_query_param(name)) {
        return None;
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in &pairs {
        if is_sensitive_query_param(name) {
            serializer.append_pair(name, REDACTED);
        } else {
            serializer.append_pair(name, value);
        }
    }
    Some(serializer.finish())
}

/// Strips userinfo and masks SAS signatures so a URL can be logged or
/// carried inside an error.
pub(crate) fn redact_url_for_logs(url_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url_text) else {
        let Some((path, query)) = url_text.split_once('?') else {
            return url_text.to_owned();
        };
        return match redact_query(query) {
            Some(query) => format!("{path}?{query}"),
            None => url_text.to_owned(),
        };
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    if let Some(query) = parsed.query().and_then(redact_query) {
        parsed.set_query(Some(&query));
    }
    parsed.to_string()
}

/// Accepts absolute `http`/`https` endpoints without userinfo, query or
/// fragment.
pub(crate) fn validate_endpoint(endpoint: &str) -> Result<(), Error> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() || trimmed.len() != endpoint.len() {
        return Err(Error::malformed_url(
            endpoint,
            "endpoint must be a non-empty url without surrounding whitespace",
        ));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|source| Error::malformed_url(endpoint, source.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::malformed_url(endpoint, "endpoint scheme must be http or https"));
    }
    if parsed.host_str().is_none() {
        return Err(Error::malformed_url(endpoint, "endpoint has no host"));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(Error::malformed_url(endpoint, "endpoint must not carry credentials"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(Error::malformed_url(endpoint, "endpoint must not carry a query or fragment"));
    }
    Ok(())
}

pub(crate) fn join_base_path(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let relative = path.trim_start_matches('/');
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => relative.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{relative}"),
    }
}

pub(crate) fn resolve_url(endpoint: &str, path: &str) -> String {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        path.to_owned()
    } else {
        join_base_path(endpoint, path)
    }
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|source| Error::InvalidHeaderName {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

/// Delay requested by a `Retry-After` value, either delta-seconds or an
/// HTTP-date relative to `now`.
pub(crate) fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let raw_value = value.trim();
    if let Ok(seconds) = raw_value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = httpdate::parse_http_date(raw_value).ok()?;
    match date.duration_since(now) {
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}

/// `None` when sleeping for `retry_delay` would run into the deadline.
pub(crate) fn bounded_retry_delay(
    retry_delay: Duration,
    deadline: Option<Instant>,
) -> Option<Duration> {
    let Some(deadline) = deadline else {
        return Some(retry_delay);
    };

    let remaining = deadline.checked_duration_since(Instant::now())?;
    if retry_delay >= remaining {
        return None;
    }
    Some(retry_delay)
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant, SystemTime};

    use super::{
        bounded_retry_delay, join_base_path, parse_retry_after, redact_url_for_logs, resolve_url,
        validate_endpoint,
    };

    #[test]
    fn join_base_path_handles_slashes() {
        assert_eq!(
            join_base_path("https://vault.example.com/", "/secrets/a"),
            "https://vault.example.com/secrets/a"
        );
    }

    #[test]
    fn validate_endpoint_rejects_credentials_and_queries() {
        assert!(validate_endpoint("https://vault.example.com").is_ok());
        assert!(validate_endpoint("http://127.0.0.1:8080/base").is_ok());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint(" https://vault.example.com").is_err());
        assert!(validate_endpoint("ftp://vault.example.com").is_err());
        assert!(validate_endpoint("https://user:pw@vault.example.com").is_err());
        assert!(validate_endpoint("https://vault.example.com/?sig=x").is_err());
    }

    #[test]
    fn resolve_url_keeps_absolute_url_with_uppercase_scheme() {
        assert_eq!(
            resolve_url("https://vault.example.com", "HTTPS://other.example.com/a"),
            "HTTPS://other.example.com/a"
        );
    }

    #[test]
    fn redact_url_masks_userinfo_and_signature() {
        let redacted =
            redact_url_for_logs("https://user:pw@acct.blob.example.com/c/b?sv=2020&sig=abc%2Fdef");
        assert_eq!(
            redacted,
            "https://acct.blob.example.com/c/b?sv=2020&sig=REDACTED"
        );
    }

    #[test]
    fn redact_url_leaves_unsigned_query_untouched() {
        let url = "https://example.com/x?a=b%20c";
        assert_eq!(redact_url_for_logs(url), url);
    }

    #[test]
    fn redact_url_handles_relative_urls() {
        assert_eq!(redact_url_for_logs("/x?sig=s"), "/x?sig=REDACTED");
        assert_eq!(redact_url_for_logs("/x"), "/x");
    }

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(parse_retry_after(" 7 ", now), Some(Duration::from_secs(7)));

        let later = httpdate::fmt_http_date(now + Duration::from_secs(30));
        assert_eq!(parse_retry_after(&later, now), Some(Duration::from_secs(30)));

        let earlier = httpdate::fmt_http_date(now - Duration::from_secs(30));
        assert_eq!(parse_retry_after(&earlier, now), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn bounded_retry_delay_refuses_to_sleep_past_deadline() {
        let deadline = Instant::now() + Duration::from_millis(200);
        assert_eq!(
            bounded_retry_delay(Duration::from_millis(10), Some(deadline)),
            Some(Duration::from_millis(10))
        );
        assert_eq!(
            bounded_retry_delay(Duration::from_secs(5), Some(deadline)),
            None
        );
        assert_eq!(
            bounded_retry_delay(Duration::from_secs(5), None),
            Some(Duration::from_secs(5))
        );
    }
}
