//! In-memory cookie jar shared by the calls of a pipeline.
//!
//! Storage, domain and path matching and expiry follow RFC 6265 through
//! `cookie_store`, the jar behind `reqwest`'s cookie support. `Set-Cookie`
//! values are parsed with the `cookie` crate.

use std::fmt;
use std::sync::Mutex;

use cookie::Cookie as RawCookie;
use tracing::debug;
use url::Url;

use crate::util::lock_unpoisoned;

/// Cookie jar safe for concurrent use.
#[derive(Default)]
pub struct CookieStore {
    store: Mutex<cookie_store::CookieStore>,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the `Set-Cookie` values of a response to `request_url`.
    ///
    /// Malformed values and cookies for a domain the URL cannot set are
    /// ignored. An expiry in the past deletes the stored cookie.
    pub fn store_set_cookies<'a, I>(&self, request_url: &str, set_cookie_values: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let Ok(url) = Url::parse(request_url) else {
            return;
        };
        let cookies = set_cookie_values
            .into_iter()
            .filter_map(|value| match RawCookie::parse(value) {
                Ok(cookie) => Some(cookie.into_owned()),
                Err(error) => {
                    debug!(error = %error, "ignoring malformed set-cookie value");
                    None
                }
            })
            .collect::<Vec<_>>();
        if cookies.is_empty() {
            return;
        }
        lock_unpoisoned(&self.store).store_response_cookies(cookies.into_iter(), &url);
    }

    /// `Cookie` header value for a request to `request_url`.
    pub fn cookie_header(&self, request_url: &str) -> Option<String> {
        let url = Url::parse(request_url).ok()?;
        let store = lock_unpoisoned(&self.store);
        let pairs = store
            .get_request_values(&url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>();
        (!pairs.is_empty()).then(|| pairs.join("; "))
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.store).iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock_unpoisoned(&self.store).clear();
    }
}

// Values are sensitive, only names are printed.
impl fmt::Debug for CookieStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = lock_unpoisoned(&self.store);
        let names = store
            .iter_unexpired()
            .map(|cookie| cookie.name())
            .collect::<Vec<_>>();
        formatter
            .debug_struct("CookieStore")
            .field("cookies", &names)
            .finish()
    }
}

/// Adds the pairs of `stored` whose names `existing` does not already carry.
pub(crate) fn merge_cookie_header(existing: Option<&str>, stored: &str) -> String {
    let Some(existing) = existing.map(str::trim).filter(|value| !value.is_empty()) else {
        return stored.to_owned();
    };
    let present = existing
        .split(';')
        .filter_map(|pair| pair.split_once('=').map(|(name, _)| name.trim()))
        .collect::<Vec<_>>();
    let additions = stored
        .split("; ")
        .filter(|pair| {
            pair.split_once('=')
                .is_some_and(|(name, _)| !present.contains(&name))
        })
        .collect::<Vec<_>>();
    if additions.is_empty() {
        existing.to_owned()
    } else {
        format!("{existing}; {}", additions.join("; "))
    }
}
