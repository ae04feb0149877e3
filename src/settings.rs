use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::listing::RowPolicy;
use crate::session::{Locator, WaitPolicy};

const DEFAULT_CONFIG: &str = "talk_scraper.toml";
const ENV_PREFIX: &str = "TALKS";

const LISTING_URL: &str = "https://www.ted.com/talks?language=en&page={page}&sort=popular\
&topics%5B%5D=Global+issues&topics%5B%5D=Technology";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listing URL with a `{page}` placeholder.
    pub listing_url: String,
    pub start_page: u32,
    pub output: PathBuf,
    pub row_policy: RowPolicy,
    pub timing: Timing,
    pub selectors: Selectors,
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            listing_url: LISTING_URL.to_string(),
            start_page: 1,
            output: PathBuf::from("global_tech.csv"),
            row_policy: RowPolicy::default(),
            timing: Timing::default(),
            selectors: Selectors::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Settings {
    /// Defaults, then the TOML file (`path`, or `talk_scraper.toml` if present),
    /// then `TALKS_*` environment variables (`__` between nested keys).
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG).required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn listing_url(&self, page: u32) -> String {
        self.listing_url.replace("{page}", &page.to_string())
    }
}

/// Bounded waits replacing fixed settling delays.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub listing_wait_ms: u64,
    pub detail_wait_ms: u64,
    pub transcript_wait_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            listing_wait_ms: 1000,
            detail_wait_ms: 500,
            transcript_wait_ms: 1000,
            poll_interval_ms: 100,
        }
    }
}

impl Timing {
    /// No waiting at all; every wait is a single query.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Timing {
            listing_wait_ms: 0,
            detail_wait_ms: 0,
            transcript_wait_ms: 0,
            poll_interval_ms: 1,
        }
    }

    fn policy(&self, timeout_ms: u64) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_millis(timeout_ms),
            poll: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn listing(&self) -> WaitPolicy {
        self.policy(self.listing_wait_ms)
    }

    pub fn detail(&self) -> WaitPolicy {
        self.policy(self.detail_wait_ms)
    }

    pub fn transcript(&self) -> WaitPolicy {
        self.policy(self.transcript_wait_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        HttpSettings {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub listing: ListingSelectors,
    pub detail: DetailSelectors,
}

/// Row locator is page-wide; the others are scoped to one row.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    pub row: Locator,
    pub title: Locator,
    pub speaker: Locator,
    pub link: Locator,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        ListingSelectors {
            row: Locator::css("div.media.media--sm-v"),
            title: Locator::css("div.media__message a.ga-link"),
            speaker: Locator::css("div.media__message h4.talk-link__speaker"),
            link: Locator::css("div.media__image a.ga-link"),
        }
    }
}

// Positional paths mirror the talk page layout.
const TALK_META: &str = "#content > div > div:nth-of-type(4) > div:nth-of-type(2) > section \
> div > div:nth-of-type(2) > div";
const TALK_ACTIONS: &str = "#content > div > div:nth-of-type(4) > div:nth-of-type(1) > div";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailSelectors {
    /// Present once the talk page has rendered.
    pub ready: Locator,
    pub views: Locator,
    pub summary: Locator,
    pub date: Locator,
    pub tags_button: Locator,
    pub tags_panel: Locator,
    pub translations: Locator,
    pub transcript_button: Locator,
    pub transcript_lines: Locator,
    pub comments: Locator,
}

impl Default for DetailSelectors {
    fn default() -> Self {
        DetailSelectors {
            ready: Locator::css("#content"),
            views: Locator::css(&format!("{TALK_META} > div:nth-of-type(1) > span")),
            summary: Locator::css(r#"p[class~="l-h:n"][class~="m-b:1"]"#),
            date: Locator::css(
                r#"div[class~="f:.9"][class~="t-a:l"] > div:nth-of-type(2) > div > span:nth-of-type(2)"#,
            ),
            tags_button: Locator::css(&format!(
                "{TALK_META} > div:nth-of-type(3) > ul > li:nth-of-type(4) > button"
            )),
            tags_panel: Locator::css(&format!("{TALK_META} > div:nth-of-type(3)")),
            translations: Locator::css(&format!(
                "{TALK_ACTIONS} > a:nth-of-type(2) > span:nth-of-type(2)"
            )),
            transcript_button: Locator::css("span").containing("Transcript"),
            transcript_lines: Locator::css(r#"a[class*="t-d:n"]"#),
            comments: Locator::css("span").containing("Comments"),
        }
    }
}
