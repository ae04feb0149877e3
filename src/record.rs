use chrono::NaiveDate;
use serde::Serialize;

use crate::detail::DetailFields;

/// One listing row: enough to find the talk's detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub speaker: String,
    pub detail_url: String,
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub title: String,
    pub speaker: String,
    pub num_views: Option<String>,
    pub summary: Option<String>,
    pub date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
    pub num_translations: Option<String>,
    pub transcript: Option<String>,
    pub num_comments: Option<String>,
    pub video_url: String,
}

impl Record {
    pub fn assemble(candidate: Candidate, fields: DetailFields) -> Self {
        Record {
            title: candidate.title,
            speaker: candidate.speaker,
            num_views: fields.num_views,
            summary: fields.summary,
            date: fields.date,
            tags: fields.tags,
            num_translations: fields.num_translations,
            transcript: fields.transcript,
            num_comments: fields.num_comments,
            video_url: candidate.detail_url,
        }
    }

    /// Number of nullable fields that came back empty.
    pub fn missing_fields(&self) -> usize {
        [
            self.num_views.is_none(),
            self.summary.is_none(),
            self.date.is_none(),
            self.tags.is_none(),
            self.num_translations.is_none(),
            self.transcript.is_none(),
            self.num_comments.is_none(),
        ]
        .iter()
        .filter(|&&missing| missing)
        .count()
    }
}
