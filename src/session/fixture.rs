use std::cell::RefCell;
use std::collections::HashMap;

use url::Url;

use super::{PageFetcher, SessionError};

/// In-memory pages keyed by URL; anything else answers 404.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    requested: RefCell<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        let key = Url::parse(url).unwrap().to_string();
        self.pages.insert(key, html.to_string());
        self
    }

    /// Serve `tests/fixtures/<name>.html` at `url`.
    pub fn with_fixture(self, url: &str, name: &str) -> Self {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        self.with_page(url, &html)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }
}

impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, SessionError> {
        self.requested.borrow_mut().push(url.to_string());
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| SessionError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
