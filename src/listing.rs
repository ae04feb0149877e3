use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::record::Candidate;
use crate::session::{Element, Locator, RenderSession, SessionError};
use crate::settings::ListingSelectors;

/// What a listing row with a missing field does to the rest of its page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// The whole page yields nothing. Matches the long-standing behavior,
    /// although it throws away every good row on the page.
    #[default]
    AbortPage,
    /// Drop only the broken row.
    SkipRow,
}

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing row {index} has no {field}: {source}")]
    Row {
        index: usize,
        field: &'static str,
        #[source]
        source: SessionError,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub struct ListingParser {
    selectors: ListingSelectors,
    policy: RowPolicy,
}

impl ListingParser {
    pub fn new(selectors: ListingSelectors, policy: RowPolicy) -> Self {
        ListingParser { selectors, policy }
    }

    pub fn row_locator(&self) -> &Locator {
        &self.selectors.row
    }

    /// Candidates of the loaded listing page, in page order.
    pub async fn parse<S: RenderSession>(&self, session: &S) -> Result<Vec<Candidate>, ListingError> {
        let base = session.current_url().ok_or(SessionError::NotLoaded)?.clone();

        let rows = match session.query(&self.selectors.row).await {
            Ok(rows) => rows,
            Err(SessionError::NoMatch(_)) => {
                debug!(url = %base, "no listing rows");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut candidates = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            match self.parse_row(session, index, row, &base).await {
                Ok(candidate) => candidates.push(candidate),
                Err(e) if self.policy == RowPolicy::SkipRow => {
                    warn!(url = %base, error = %e, "skipping listing row");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(candidates)
    }

    async fn parse_row<S: RenderSession>(
        &self,
        session: &S,
        index: usize,
        row: &Element,
        base: &Url,
    ) -> Result<Candidate, ListingError> {
        let row_err = move |field: &'static str| {
            move |source: SessionError| ListingError::Row { index, field, source }
        };

        let title = session
            .find(row, &self.selectors.title)
            .await
            .map_err(row_err("title"))?;
        let speaker = session
            .find(row, &self.selectors.speaker)
            .await
            .map_err(row_err("speaker"))?;
        let link = session
            .find(row, &self.selectors.link)
            .await
            .map_err(row_err("detail_url"))?;
        let href = link.require_attr("href").map_err(row_err("detail_url"))?;
        let detail_url = base
            .join(href)
            .map_err(|e| SessionError::InvalidUrl {
                url: href.to_string(),
                reason: e.to_string(),
            })
            .map_err(row_err("detail_url"))?;

        Ok(Candidate {
            title: title.text().to_string(),
            speaker: speaker.text().to_string(),
            detail_url: detail_url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::fixture::FixtureFetcher;
    use crate::session::DocumentSession;

    const LIST_URL: &str = "https://talks.test/talks?page=1";

    async fn loaded(fixture: &str) -> DocumentSession<FixtureFetcher> {
        let mut session =
            DocumentSession::new(FixtureFetcher::new().with_fixture(LIST_URL, fixture));
        session.load(LIST_URL).await.unwrap();
        session
    }

    fn parser(policy: RowPolicy) -> ListingParser {
        ListingParser::new(ListingSelectors::default(), policy)
    }

    #[tokio::test]
    async fn rows_in_page_order() {
        let session = loaded("listing_page1").await;
        let c = parser(RowPolicy::AbortPage).parse(&session).await.unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].title, "The analytical engine");
        assert_eq!(c[0].speaker, "Ada Lovelace");
        assert_eq!(c[0].detail_url, "https://talks.test/talks/ada_lovelace_the_analytical_engine");
        assert_eq!(c[1].title, "Calculating machines");
        assert_eq!(c[1].speaker, "Charles Babbage");
        assert_eq!(c[1].detail_url, "https://talks.test/talks/charles_babbage_calculating_machines");
    }

    #[tokio::test]
    async fn broken_row_aborts_page_by_default() {
        let session = loaded("listing_broken").await;
        let err = parser(RowPolicy::AbortPage).parse(&session).await.unwrap_err();
        assert!(matches!(err, ListingError::Row { index: 1, field: "speaker", .. }), "{err}");
    }

    #[tokio::test]
    async fn skip_row_keeps_the_rest() {
        let session = loaded("listing_broken").await;
        let c = parser(RowPolicy::SkipRow).parse(&session).await.unwrap();
        let titles: Vec<&str> = c.iter().map(|x| x.title.as_str()).collect();
        assert_eq!(titles, ["First talk", "Third talk"]);
    }

    #[tokio::test]
    async fn empty_page_has_no_candidates() {
        let mut session = DocumentSession::new(
            FixtureFetcher::new().with_page(LIST_URL, "<html><body><p>No talks</p></body></html>"),
        );
        session.load(LIST_URL).await.unwrap();
        let c = parser(RowPolicy::AbortPage).parse(&session).await.unwrap();
        assert!(c.is_empty());
    }

    #[tokio::test]
    async fn table_rows() {
        let page = r#"<html><body><table id="talks">
            <tr class="talk"><td class="t">First talk</td><td class="s">Grace Hopper</td>
              <td><a href="/talks/first">watch</a></td></tr>
            <tr class="talk"><td class="t">Second talk</td><td class="s">Alan Kay</td>
              <td><a href="https://cdn.test/talks/second">watch</a></td></tr>
            </table></body></html>"#;
        let mut session = DocumentSession::new(FixtureFetcher::new().with_page(LIST_URL, page));
        session.load(LIST_URL).await.unwrap();
        let selectors = ListingSelectors {
            row: Locator::css("tr.talk"),
            title: Locator::css("td.t"),
            speaker: Locator::css("td.s"),
            link: Locator::css("td a"),
        };
        let c = ListingParser::new(selectors, RowPolicy::AbortPage)
            .parse(&session)
            .await
            .unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].title, "First talk");
        assert_eq!(c[0].speaker, "Grace Hopper");
        assert_eq!(c[0].detail_url, "https://talks.test/talks/first");
        assert_eq!(c[1].speaker, "Alan Kay");
        assert_eq!(c[1].detail_url, "https://cdn.test/talks/second");
    }

    #[tokio::test]
    async fn nothing_loaded_is_an_error() {
        let session = DocumentSession::new(FixtureFetcher::new());
        let err = parser(RowPolicy::AbortPage).parse(&session).await.unwrap_err();
        assert!(matches!(err, ListingError::Session(SessionError::NotLoaded)));
    }
}
