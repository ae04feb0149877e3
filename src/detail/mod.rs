pub mod fields;

use std::fmt::Display;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::settings::DetailSelectors;
use crate::session::{self, Locator, RenderSession, SessionError, WaitPolicy};

#[derive(Debug, Error)]
pub enum FieldError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot parse {raw:?}: {reason}")]
    Parse { raw: String, reason: String },
}

impl FieldError {
    fn parse(raw: &str, reason: impl Display) -> Self {
        FieldError::Parse {
            raw: raw.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Everything a talk page contributes beyond its listing row. Each field is
/// `None` when its own extraction failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailFields {
    pub num_views: Option<String>,
    pub summary: Option<String>,
    pub date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
    pub num_translations: Option<String>,
    pub transcript: Option<String>,
    pub num_comments: Option<String>,
}

pub struct DetailExtractor {
    selectors: DetailSelectors,
    transcript_wait: WaitPolicy,
}

impl DetailExtractor {
    pub fn new(selectors: DetailSelectors, transcript_wait: WaitPolicy) -> Self {
        DetailExtractor {
            selectors,
            transcript_wait,
        }
    }

    pub fn ready_locator(&self) -> &Locator {
        &self.selectors.ready
    }

    /// Extract every field of the loaded talk page. Never fails as a whole.
    pub async fn extract<S: RenderSession>(&self, session: &mut S, url: &str) -> DetailFields {
        let num_views = settle("num_views", url, self.num_views(&*session).await);
        let date = settle("date", url, self.date(&*session).await);
        let tags = settle("tags", url, self.tags(session).await);
        let summary = settle("summary", url, self.summary(&*session).await);
        let num_translations = settle("num_translations", url, self.translations(&*session).await);
        let transcript = settle("transcript", url, self.transcript(session).await);
        let num_comments = settle("num_comments", url, self.comments(&*session).await);

        DetailFields {
            num_views,
            summary,
            date,
            tags,
            num_translations,
            transcript,
            num_comments,
        }
    }

    async fn num_views<S: RenderSession>(&self, session: &S) -> Result<String, FieldError> {
        let raw = first_text(session, &self.selectors.views).await?;
        Ok(fields::views(&raw))
    }

    async fn date<S: RenderSession>(&self, session: &S) -> Result<NaiveDate, FieldError> {
        let raw = first_text(session, &self.selectors.date).await?;
        fields::date(&raw)
    }

    async fn tags<S: RenderSession>(&self, session: &mut S) -> Result<Vec<String>, FieldError> {
        session.click(&self.selectors.tags_button).await?;
        let panel = first_text(&*session, &self.selectors.tags_panel).await?;
        fields::tags(&panel)
    }

    async fn summary<S: RenderSession>(&self, session: &S) -> Result<String, FieldError> {
        first_text(session, &self.selectors.summary).await
    }

    async fn translations<S: RenderSession>(&self, session: &S) -> Result<String, FieldError> {
        let raw = first_text(session, &self.selectors.translations).await?;
        Ok(fields::translations(&raw))
    }

    async fn transcript<S: RenderSession>(&self, session: &mut S) -> Result<String, FieldError> {
        session.click(&self.selectors.transcript_button).await?;
        let lines =
            session::wait_for(&*session, &self.selectors.transcript_lines, self.transcript_wait)
                .await?;
        Ok(fields::transcript(&lines))
    }

    async fn comments<S: RenderSession>(&self, session: &S) -> Result<String, FieldError> {
        let raw = first_text(session, &self.selectors.comments).await?;
        fields::comments(&raw)
    }
}

async fn first_text<S: RenderSession>(session: &S, locator: &Locator) -> Result<String, FieldError> {
    let found = session.query(locator).await?;
    let first = found
        .first()
        .ok_or_else(|| SessionError::NoMatch(locator.clone()))?;
    Ok(first.text().to_string())
}

fn settle<T>(field: &'static str, url: &str, result: Result<T, FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(field, %url, error = %e, "Couldn't get field");
            None
        }
    }
}

// ── Tests ──
