use anyhow::Result;
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::detail::DetailExtractor;
use crate::listing::ListingParser;
use crate::record::{Candidate, Record};
use crate::session::{self, RenderSession};
use crate::settings::Settings;
use crate::sink::RecordSink;

/// Crawl stats returned after the listing runs out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CrawlStats {
    /// Listing pages requested, including the one whose load ended the crawl.
    pub pages_attempted: u32,
    pub pages_parsed: u32,
    pub records: usize,
    pub skipped: usize,
}

pub struct Crawler<S, K> {
    session: S,
    sink: K,
    listing: ListingParser,
    detail: DetailExtractor,
    settings: Settings,
    progress: ProgressBar,
}

impl<S: RenderSession, K: RecordSink> Crawler<S, K> {
    pub fn new(session: S, sink: K, settings: &Settings) -> Self {
        Crawler {
            session,
            sink,
            listing: ListingParser::new(settings.selectors.listing.clone(), settings.row_policy),
            detail: DetailExtractor::new(
                settings.selectors.detail.clone(),
                settings.timing.transcript(),
            ),
            settings: settings.clone(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[cfg(test)]
    pub fn into_parts(self) -> (S, K) {
        (self.session, self.sink)
    }

    /// Walk listing pages until one fails to load. Only a sink failure is an error.
    pub async fn run(&mut self) -> Result<CrawlStats> {
        let mut stats = CrawlStats::default();
        let mut page = self.settings.start_page;

        loop {
            let url = self.settings.listing_url(page);
            page += 1;
            stats.pages_attempted += 1;

            if let Err(e) = self.session.load(&url).await {
                info!(%url, error = %e, "Listing page unavailable, stopping");
                break;
            }
            self.progress.set_message(format!("page {}", page - 1));

            let rows_wait = self.settings.timing.listing();
            if let Err(e) = session::wait_for(&self.session, self.listing.row_locator(), rows_wait).await
            {
                debug!(%url, error = %e, "listing rows never appeared");
            }

            let candidates = match self.listing.parse(&self.session).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(%url, error = %e, "Couldn't parse listing page");
                    continue;
                }
            };
            stats.pages_parsed += 1;
            info!(%url, talks = candidates.len(), "Parsed listing page");

            for candidate in candidates {
                if self.visit(candidate).await? {
                    stats.records += 1;
                } else {
                    stats.skipped += 1;
                }
                self.progress.inc(1);
            }
        }

        self.progress.finish_and_clear();
        info!(
            "Crawled {} pages ({} parsed): {} records, {} skipped",
            stats.pages_attempted, stats.pages_parsed, stats.records, stats.skipped
        );
        Ok(stats)
    }

    /// Returns false when the detail page could not be loaded.
    async fn visit(&mut self, candidate: Candidate) -> Result<bool> {
        let url = candidate.detail_url.clone();
        if let Err(e) = self.session.load(&url).await {
            warn!(%url, error = %e, "Couldn't load talk page");
            return Ok(false);
        }
        let ready_wait = self.settings.timing.detail();
        if let Err(e) = session::wait_for(&self.session, self.detail.ready_locator(), ready_wait).await
        {
            debug!(%url, error = %e, "talk page not ready, extracting anyway");
        }

        let fields = self.detail.extract(&mut self.session, &url).await;
        let record = Record::assemble(candidate, fields);
        debug!(%url, missing = record.missing_fields(), "Extracted talk");
        self.sink.write(&record)?;
        Ok(true)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::RowPolicy;
    use crate::session::fixture::FixtureFetcher;
    use crate::session::DocumentSession;
    use crate::settings::Timing;
    use crate::sink::CsvSink;

    const LISTING: &str = "https://talks.test/talks?page={page}";

    fn settings() -> Settings {
        Settings {
            listing_url: LISTING.to_string(),
            timing: Timing::immediate(),
            ..Settings::default()
        }
    }

    fn page(n: u32) -> String {
        LISTING.replace("{page}", &n.to_string())
    }

    fn talk(slug: &str) -> String {
        format!("https://talks.test/talks/{}", slug)
    }

    type TestCrawler = Crawler<DocumentSession<FixtureFetcher>, CsvSink<Vec<u8>>>;

    fn crawler(fetcher: FixtureFetcher, settings: &Settings) -> TestCrawler {
        let sink = CsvSink::new(Vec::new()).unwrap();
        Crawler::new(DocumentSession::new(fetcher), sink, settings)
    }

    fn finish(crawler: TestCrawler) -> (Vec<String>, Vec<String>) {
        let (session, sink) = crawler.into_parts();
        let csv = String::from_utf8(sink.into_inner()).unwrap();
        let rows = csv.lines().skip(1).map(str::to_string).collect();
        (rows, session.fetcher().requested())
    }

    #[tokio::test]
    async fn stops_when_next_listing_page_fails() {
        let fetcher = FixtureFetcher::new()
            .with_fixture(&page(1), "listing_page1")
            .with_fixture(&talk("ada_lovelace_the_analytical_engine"), "detail_full")
            .with_fixture(&talk("charles_babbage_calculating_machines"), "detail_sparse");
        let mut c = crawler(fetcher, &settings());

        let stats = c.run().await.unwrap();
        assert_eq!(
            stats,
            CrawlStats {
                pages_attempted: 2,
                pages_parsed: 1,
                records: 2,
                skipped: 0
            }
        );

        let (rows, requested) = finish(c);
        assert_eq!(
            rows,
            [
                "The analytical engine,Ada Lovelace,1234567,Ada Lovelace describes a machine that \
                 could compose music as readily as it computes.,2015-03-01,AI|Privacy,42,\
                 \"Thank you so much, Chris. It's truly a great honor. I have been blown away by \
                 this conference.\",17,https://talks.test/talks/ada_lovelace_the_analytical_engine",
                "Calculating machines,Charles Babbage,,,,,,,,\
                 https://talks.test/talks/charles_babbage_calculating_machines",
            ]
        );
        assert_eq!(requested.last().unwrap(), &page(2));
        assert_eq!(requested.len(), 4);
    }

    #[tokio::test]
    async fn rows_follow_listing_then_page_order() {
        let fetcher = FixtureFetcher::new()
            .with_fixture(&page(1), "listing_page1")
            .with_fixture(&page(2), "listing_page2")
            .with_fixture(&talk("ada_lovelace_the_analytical_engine"), "detail_full")
            .with_fixture(&talk("charles_babbage_calculating_machines"), "detail_sparse")
            .with_fixture(&talk("grace_hopper_nanoseconds"), "detail_full");
        let mut c = crawler(fetcher, &settings());

        let stats = c.run().await.unwrap();
        assert_eq!(stats.pages_attempted, 3);
        assert_eq!(stats.records, 3);
        // Turing's talk page is missing: no row, crawl goes on.
        assert_eq!(stats.skipped, 1);

        let (rows, _) = finish(c);
        let titles: Vec<&str> = rows.iter().map(|r| r.split(',').next().unwrap()).collect();
        assert_eq!(titles, ["The analytical engine", "Calculating machines", "Nanoseconds"]);
    }

    #[tokio::test]
    async fn broken_listing_page_is_skipped_not_fatal() {
        let fetcher = FixtureFetcher::new()
            .with_fixture(&page(1), "listing_broken")
            .with_fixture(&page(2), "listing_page1")
            .with_fixture(&talk("ada_lovelace_the_analytical_engine"), "detail_full")
            .with_fixture(&talk("charles_babbage_calculating_machines"), "detail_sparse");
        let mut c = crawler(fetcher, &settings());

        let stats = c.run().await.unwrap();
        assert_eq!(stats.pages_attempted, 3);
        assert_eq!(stats.pages_parsed, 1);
        assert_eq!(stats.records, 2);

        let (_, requested) = finish(c);
        assert!(!requested.iter().any(|u| u.contains("first_talk")));
    }

    #[tokio::test]
    async fn skip_row_policy_visits_the_good_rows() {
        let fetcher = FixtureFetcher::new()
            .with_fixture(&page(1), "listing_broken")
            .with_fixture(&talk("first_talk"), "detail_sparse")
            .with_fixture(&talk("third_talk"), "detail_sparse");
        let s = Settings {
            row_policy: RowPolicy::SkipRow,
            ..settings()
        };
        let mut c = crawler(fetcher, &s);

        let stats = c.run().await.unwrap();
        assert_eq!(stats.records, 2);

        let (rows, _) = finish(c);
        assert!(rows[0].starts_with("First talk,First Speaker,"));
        assert!(rows[1].starts_with("Third talk,Third Speaker,"));
    }

    #[tokio::test]
    async fn start_page_and_counter() {
        let fetcher = FixtureFetcher::new();
        let s = Settings {
            start_page: 5,
            ..settings()
        };
        let mut c = crawler(fetcher, &s);

        let stats = c.run().await.unwrap();
        assert_eq!(stats.pages_attempted, 1);
        assert_eq!(stats.records, 0);

        let (rows, requested) = finish(c);
        assert!(rows.is_empty());
        assert_eq!(requested, [page(5)]);
    }
}
