//! Paginated fetcher: one logical "fetch all pages of endpoint X".
//!
//! Pages are requested strictly in order, each through the [`ApiClient`]
//! (and therefore the rate governor). The sequence ends, in priority order, on
//! (a) an explicit "no next page" `Link` header, (b) a page shorter than the
//! page size, or (c) an empty page. An error ends the sequence after it is
//! yielded; pages already yielded stay with the caller.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::client::ApiClient;
use crate::error::RequestError;

/// Where the item array lives in a page body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageShape {
    /// Body is a JSON array
    Array,
    /// Body is an object holding the array under this key (e.g. search `items`)
    Field(&'static str),
}

impl PageShape {
    fn extract(self, body: &str) -> Option<Vec<Value>> {
        let value: Value = serde_json::from_str(body).ok()?;
        let array = match self {
            Self::Array => value,
            Self::Field(key) => match value {
                Value::Object(mut map) => map.remove(key)?,
                _ => return None,
            },
        };
        match array {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// One page of raw items
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub items: Vec<Value>,
}

/// Lazy, finite, non-restartable page sequence
#[derive(Debug)]
pub struct Paginator<'a> {
    client: &'a ApiClient,
    base_url: Url,
    per_page: usize,
    shape: PageShape,
    page_delay: Duration,
    next_page: u32,
    done: bool,
    malformed_pages: usize,
}

impl<'a> Paginator<'a> {
    /// `base_url` may already carry a query string; paging parameters are appended.
    pub fn new(client: &'a ApiClient, base_url: Url, per_page: usize, shape: PageShape) -> Self {
        Self {
            client,
            base_url,
            per_page: per_page.max(1),
            shape,
            page_delay: Duration::ZERO,
            next_page: 1,
            done: false,
            malformed_pages: 0,
        }
    }

    /// Pause on the client's clock before every page after the first
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Pages whose body did not have the expected shape (treated as empty)
    pub fn malformed_pages(&self) -> usize {
        self.malformed_pages
    }

    pub fn page_url(&self, page: u32) -> String {
        page_url(&self.base_url, self.per_page, page)
    }
}

/// `base_url` with `per_page`/`page` appended to its query; a fragment is dropped
pub fn page_url(base_url: &Url, per_page: usize, page: u32) -> String {
    let mut url = base_url.clone();
    url.set_fragment(None);
    url.query_pairs_mut()
        .append_pair("per_page", &per_page.to_string())
        .append_pair("page", &page.to_string());
    url.into()
}

impl Iterator for Paginator<'_> {
    type Item = Result<Page, RequestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let number = self.next_page;
        if number > 1 && !self.page_delay.is_zero() {
            self.client.clock().sleep(self.page_delay);
        }
        let url = self.page_url(number);

        let response = match self.client.get(&url) {
            Ok(r) => r,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let items = match self.shape.extract(&response.body) {
            Some(items) => items,
            None => {
                log::warn!("{url}: unexpected response shape, treating as empty page");
                self.malformed_pages += 1;
                Vec::new()
            }
        };

        // (c) empty page: end without yielding it
        if items.is_empty() {
            self.done = true;
            return None;
        }
        // (a) explicit signal, then (b) short page
        let no_next = response.has_next_page() == Some(false);
        if no_next || items.len() < self.per_page {
            self.done = true;
        }
        self.next_page += 1;
        Some(Ok(Page { number, items }))
    }
}
