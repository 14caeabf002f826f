use std::sync::Arc;

use async_trait::async_trait;
use http::header::{COOKIE, SET_COOKIE};

use super::{PolicyFactory, RequestPolicy};
use crate::Result;
use crate::cookie::{CookieStore, merge_cookie_header};
use crate::options::PipelineOptions;
use crate::request::Request;
use crate::response::Response;
use crate::util::parse_header_value;

/// Sends stored cookies and records `Set-Cookie` responses.
///
/// Every call built from one config shares its store.
#[derive(Clone, Debug, Default)]
pub struct CookieConfig {
    store: Arc<CookieStore>,
}

impl CookieConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<CookieStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<CookieStore> {
        &self.store
    }
}

impl PolicyFactory for CookieConfig {
    fn create(
        &self,
        next: Arc<dyn RequestPolicy>,
        _options: &PipelineOptions,
    ) -> Arc<dyn RequestPolicy> {
        Arc::new(CookiePolicy {
            store: Arc::clone(&self.store),
            next,
        })
    }
}

struct CookiePolicy {
    store: Arc<CookieStore>,
    next: Arc<dyn RequestPolicy>,
}

#[async_trait]
impl RequestPolicy for CookiePolicy {
    async fn send(&self, request: &mut Request) -> Result<Response> {
        // The merged header is undone after the attempt so a retry merges
        // the store again into what the caller sent.
        let mut caller_cookies = None;
        if let Some(stored) = self.store.cookie_header(request.url()) {
            let headers = request.headers_mut();
            let merged = merge_cookie_header(headers.value(COOKIE.as_str()), &stored);
            let value = parse_header_value(COOKIE.as_str(), &merged)?;
            caller_cookies = Some(
                headers
                    .header_map()
                    .get_all(COOKIE)
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>(),
            );
            headers.insert(COOKIE, value);
        }

        let outcome = self.next.send(request).await;
        if let Some(caller_cookies) = caller_cookies {
            let headers = request.headers_mut();
            headers.remove(COOKIE.as_str());
            for value in caller_cookies {
                headers.append(COOKIE, value);
            }
        }

        let response = outcome?;
        let set_cookies = response.headers().values(SET_COOKIE.as_str());
        if !set_cookies.is_empty() {
            self.store.store_set_cookies(request.url(), set_cookies);
        }
        Ok(response)
    }
}
