//! Cursor-based pagination
//!
//! [`Scroll`] walks a query's results page by page using the engine's scroll
//! cursor. The first page comes from a search that opens the cursor; every
//! later page is a continuation request carrying only the cursor token and
//! its keep-alive.
//!
//! ## Termination and cleanup
//!
//! The read ends at the first empty page. The cursor is released exactly
//! once, on whichever happens first:
//! - an empty page
//! - a failed page fetch (the error is returned)
//! - a consumer error inside [`Scroll::for_each_hit`]
//! - the reader being dropped mid-read
//!
//! Release is best-effort: [`Client::clear_scroll`] logs and discards
//! failures.
//!
//! A reader is single-pass. Build a new one to run the query again.

use elastic_core::Result;
use elastic_engine::{Client, Hit, SearchRequest};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::vec;
use tracing::debug;

/// Default page size
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default cursor keep-alive
pub const DEFAULT_TTL: &str = "5m";

/// Query parameters of a scroll
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollOptions {
    /// Hits per page
    pub size: usize,
    /// Cursor keep-alive sent with every request
    pub ttl: String,
    /// Query body; an empty object is omitted from the request
    pub body: Value,
    /// Field projection; empty means full documents
    pub stored_fields: Vec<String>,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        ScrollOptions {
            size: DEFAULT_PAGE_SIZE,
            ttl: DEFAULT_TTL.to_string(),
            body: json!({}),
            stored_fields: Vec::new(),
        }
    }
}

impl ScrollOptions {
    /// Set the page size
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the cursor keep-alive
    pub fn ttl(mut self, ttl: impl Into<String>) -> Self {
        self.ttl = ttl.into();
        self
    }

    /// Set the query body
    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Set the field projection
    pub fn stored_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stored_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a non-empty query body is set
    pub fn has_body(&self) -> bool {
        !is_empty_value(&self.body)
    }

    /// Initial search request, omitting the empty keep-alive, body and
    /// projection. The page size is always sent, zero included.
    pub fn to_request(&self, index: &str) -> SearchRequest {
        let mut request = SearchRequest::new(index).size(self.size);
        if !self.ttl.is_empty() {
            request = request.scroll(self.ttl.clone());
        }
        if self.has_body() {
            request = request.body(self.body.clone());
        }
        if !self.stored_fields.is_empty() {
            request = request.stored_fields(self.stored_fields.clone());
        }
        request
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Forward-only reader over a scrolled query
pub struct Scroll {
    client: Arc<Client>,
    index: String,
    options: ScrollOptions,
    scroll_id: Option<String>,
    started: bool,
    finished: bool,
    released: bool,
}

impl fmt::Debug for Scroll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scroll")
            .field("index", &self.index)
            .field("options", &self.options)
            .field("scroll_id", &self.scroll_id)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Scroll {
    /// Prepare a scroll over `index`. Nothing is fetched until the first page
    /// is requested.
    pub fn new(client: Arc<Client>, index: impl Into<String>, options: ScrollOptions) -> Self {
        Scroll {
            client,
            index: index.into(),
            options,
            scroll_id: None,
            started: false,
            finished: false,
            released: false,
        }
    }

    /// Collection or alias being read
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Options the scroll was built with
    pub fn options(&self) -> &ScrollOptions {
        &self.options
    }

    /// Current continuation token
    pub fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    /// True once the read has ended, normally or by error
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fetch the next page.
    ///
    /// Returns an empty page once the read has ended; no request is made in
    /// that case. A fetch error releases the cursor, ends the read and is
    /// returned.
    pub fn next_page(&mut self) -> Result<Vec<Hit>> {
        if self.finished {
            return Ok(Vec::new());
        }

        let fetched = if !self.started {
            self.started = true;
            let request = self.options.to_request(&self.index);
            debug!(target: "elastic::scroll", index = %self.index, size = self.options.size, "Opening cursor");
            self.client.search(&request)
        } else if let Some(scroll_id) = &self.scroll_id {
            self.client.scroll(scroll_id, &self.options.ttl)
        } else {
            // The engine returned no cursor, so there is nothing to continue.
            self.finish();
            return Ok(Vec::new());
        };

        match fetched {
            Ok(response) => {
                if let Some(scroll_id) = response.scroll_id.clone() {
                    self.scroll_id = Some(scroll_id);
                }
                let hits = response.into_hits();
                if hits.is_empty() {
                    debug!(target: "elastic::scroll", index = %self.index, "Cursor exhausted");
                    self.finish();
                }
                Ok(hits)
            }
            Err(e) => {
                debug!(target: "elastic::scroll", index = %self.index, error = %e, "Page fetch failed");
                self.finish();
                Err(e)
            }
        }
    }

    /// Consume the reader as a lazy sequence of hits.
    ///
    /// A fetch error is yielded once, after which the sequence ends.
    pub fn hits(self) -> Hits {
        Hits {
            scroll: self,
            page: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Run `f` on every hit in order.
    ///
    /// If `f` fails the cursor is released before its error is returned.
    pub fn for_each_hit<F>(mut self, mut f: F) -> Result<()>
    where
        F: FnMut(Hit) -> Result<()>,
    {
        loop {
            let page = self.next_page()?;
            if page.is_empty() {
                return Ok(());
            }
            for hit in page {
                if let Err(e) = f(hit) {
                    self.finish();
                    return Err(e);
                }
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(scroll_id) = &self.scroll_id {
            self.client.clear_scroll(scroll_id);
        }
    }
}

impl Drop for Scroll {
    fn drop(&mut self) {
        if self.started {
            self.release();
        }
    }
}

/// Lazy sequence of hits produced by [`Scroll::hits`]
#[derive(Debug)]
pub struct Hits {
    scroll: Scroll,
    page: vec::IntoIter<Hit>,
    done: bool,
}

impl Hits {
    /// The underlying reader
    pub fn scroll(&self) -> &Scroll {
        &self.scroll
    }
}

impl Iterator for Hits {
    type Item = Result<Hit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(hit) = self.page.next() {
                return Some(Ok(hit));
            }
            if self.done {
                return None;
            }
            match self.scroll.next_page() {
                Ok(page) if page.is_empty() => {
                    self.done = true;
                    return None;
                }
                Ok(page) => self.page = page.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
