pub mod http;
pub mod text;

#[cfg(test)]
pub mod fixture;

use std::fmt;
use std::time::Duration;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("request for {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no page loaded")]
    NotLoaded,
    #[error("invalid locator `{css}`: {reason}")]
    InvalidLocator { css: String, reason: String },
    #[error("nothing matches {0}")]
    NoMatch(Locator),
    #[error("element has no `{0}` attribute")]
    MissingAttribute(String),
    #[error("element belongs to a page that is no longer loaded")]
    Stale,
}

/// CSS selector, optionally narrowed to elements whose rendered text contains a needle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,
    #[serde(default)]
    pub contains: Option<String>,
}

impl Locator {
    pub fn css(css: &str) -> Self {
        Locator {
            css: css.to_string(),
            contains: None,
        }
    }

    pub fn containing(mut self, text: &str) -> Self {
        self.contains = Some(text.to_string());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.contains {
            Some(needle) => write!(f, "`{}` containing {:?}", self.css, needle),
            None => write!(f, "`{}`", self.css),
        }
    }
}

/// Where a snapshot came from: the load it belongs to and its position in
/// that document's node order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NodeHandle {
    load: u64,
    ordinal: usize,
}

/// Snapshot of a matched element. Scoped lookups go back through the session
/// that produced it, against the same loaded page.
#[derive(Debug, Clone)]
pub struct Element {
    text: String,
    attributes: Vec<(String, String)>,
    handle: NodeHandle,
}

impl Element {
    fn snapshot(el: ElementRef<'_>, handle: NodeHandle) -> Self {
        Element {
            text: text::rendered_text(el),
            attributes: el
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            handle,
        }
    }

    /// Rendered text: whitespace collapsed, one line per block-level element.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require_attr(&self, name: &str) -> Result<&str, SessionError> {
        self.attr(name)
            .ok_or_else(|| SessionError::MissingAttribute(name.to_string()))
    }
}

/// Everything the crawler needs from a browser-like page renderer.
#[allow(async_fn_in_trait)]
pub trait RenderSession {
    async fn load(&mut self, url: &str) -> Result<(), SessionError>;

    fn current_url(&self) -> Option<&Url>;

    /// All matches in document order. Fails with `NoMatch` when nothing matches.
    async fn query(&self, locator: &Locator) -> Result<Vec<Element>, SessionError>;

    /// First strict descendant of `scope` matching `locator`. `scope` must come
    /// from the page currently loaded.
    async fn find(&self, scope: &Element, locator: &Locator) -> Result<Element, SessionError>;

    async fn click(&mut self, locator: &Locator) -> Result<(), SessionError>;
}

/// Source of page markup for a `DocumentSession`.
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, SessionError>;
}

struct LoadedPage {
    url: Url,
    document: Html,
    load: u64,
}

impl LoadedPage {
    /// Matches among the nodes after `first`, up to `limit` of them, in
    /// document order. Pre-order keeps a subtree contiguous, so a scope is
    /// just its own ordinal plus its descendant count.
    fn select(
        &self,
        locator: &Locator,
        first: usize,
        limit: usize,
    ) -> Result<Vec<Element>, SessionError> {
        let selector = Selector::parse(&locator.css).map_err(|e| SessionError::InvalidLocator {
            css: locator.css.clone(),
            reason: e.to_string(),
        })?;
        let found: Vec<Element> = self
            .document
            .tree
            .root()
            .descendants()
            .enumerate()
            .skip(first)
            .take(limit)
            .filter_map(|(ordinal, node)| ElementRef::wrap(node).map(|el| (ordinal, el)))
            .filter(|(_, el)| selector.matches(el))
            .map(|(ordinal, el)| {
                let handle = NodeHandle {
                    load: self.load,
                    ordinal,
                };
                Element::snapshot(el, handle)
            })
            .filter(|el| match &locator.contains {
                Some(needle) => el.text.contains(needle.as_str()),
                None => true,
            })
            .collect();
        if found.is_empty() {
            Err(SessionError::NoMatch(locator.clone()))
        } else {
            Ok(found)
        }
    }

    fn resolve(&self, handle: NodeHandle) -> Result<ElementRef<'_>, SessionError> {
        if handle.load != self.load {
            return Err(SessionError::Stale);
        }
        self.document
            .tree
            .root()
            .descendants()
            .nth(handle.ordinal)
            .and_then(ElementRef::wrap)
            .ok_or(SessionError::Stale)
    }
}

/// Session over server-rendered markup. Scripts never run, so `click` only
/// checks that the control exists; panels it would reveal must already be in
/// the served document.
pub struct DocumentSession<F> {
    fetcher: F,
    page: Option<LoadedPage>,
    loads: u64,
}

impl<F: PageFetcher> DocumentSession<F> {
    pub fn new(fetcher: F) -> Self {
        DocumentSession {
            fetcher,
            page: None,
            loads: 0,
        }
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }
}

impl<F: PageFetcher> RenderSession for DocumentSession<F> {
    async fn load(&mut self, url: &str) -> Result<(), SessionError> {
        // A failed load leaves nothing queryable.
        self.page = None;
        let url = Url::parse(url).map_err(|e| SessionError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let body = self.fetcher.fetch(&url).await?;
        self.loads += 1;
        self.page = Some(LoadedPage {
            document: Html::parse_document(&body),
            url,
            load: self.loads,
        });
        Ok(())
    }

    fn current_url(&self) -> Option<&Url> {
        self.page.as_ref().map(|p| &p.url)
    }

    async fn query(&self, locator: &Locator) -> Result<Vec<Element>, SessionError> {
        let page = self.page.as_ref().ok_or(SessionError::NotLoaded)?;
        page.select(locator, 0, usize::MAX)
    }

    async fn find(&self, scope: &Element, locator: &Locator) -> Result<Element, SessionError> {
        let page = self.page.as_ref().ok_or(SessionError::NotLoaded)?;
        let root = page.resolve(scope.handle)?;
        let subtree = root.descendants().count();
        let mut found = page.select(locator, scope.handle.ordinal + 1, subtree - 1)?;
        Ok(found.swap_remove(0))
    }

    async fn click(&mut self, locator: &Locator) -> Result<(), SessionError> {
        self.query(locator).await.map(|_| ())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub poll: Duration,
}

/// Poll `query` until the locator matches or the timeout runs out.
/// Only `NoMatch` is retried; any other failure returns immediately.
pub async fn wait_for<S: RenderSession>(
    session: &S,
    locator: &Locator,
    wait: WaitPolicy,
) -> Result<Vec<Element>, SessionError> {
    let deadline = Instant::now() + wait.timeout;
    loop {
        match session.query(locator).await {
            Ok(found) => return Ok(found),
            Err(SessionError::NoMatch(_)) if Instant::now() < deadline => {
                tokio::time::sleep(wait.poll).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Tests ──
