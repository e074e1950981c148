use serde::Serialize;

use crate::error::AppError;
use crate::models::job::Job;
use crate::scraper::registry::SiteRegistry;
use crate::store::JobStore;

pub const LIST_LIMIT: i64 = 100;

/// Columns the free-text search may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Title,
    Department,
    Location,
    ExperienceLevel,
    JobType,
    Description,
    Requirements,
    SourceWebsite,
    Benefits,
}

impl SearchField {
    pub fn column(self) -> &'static str {
        match self {
            SearchField::Title => "title",
            SearchField::Department => "department",
            SearchField::Location => "location",
            SearchField::ExperienceLevel => "experience_level",
            SearchField::JobType => "job_type",
            SearchField::Description => "description",
            SearchField::Requirements => "requirements",
            SearchField::SourceWebsite => "source_website",
            SearchField::Benefits => "benefits",
        }
    }
}

/// Widest field set first; later tiers survive stores missing columns.
const TIERS: [&[SearchField]; 4] = [
    &[
        SearchField::Title,
        SearchField::Department,
        SearchField::Location,
        SearchField::ExperienceLevel,
        SearchField::JobType,
        SearchField::Description,
        SearchField::Requirements,
        SearchField::SourceWebsite,
        SearchField::Benefits,
    ],
    &[
        SearchField::Title,
        SearchField::Description,
        SearchField::Requirements,
        SearchField::SourceWebsite,
    ],
    &[
        SearchField::Title,
        SearchField::Description,
        SearchField::SourceWebsite,
    ],
    &[SearchField::Title],
];

/// One OR-group: any field ILIKE `%term%`, or `source_website` equal to one
/// of the alias targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterGroup {
    pub fields: Vec<SearchField>,
    pub term: String,
    pub source_tags: Vec<String>,
}

impl FilterGroup {
    pub fn pattern(&self) -> String {
        format!("%{}%", self.term)
    }
}

/// Build the fallback filter tiers for a free-text query. An empty query
/// yields no groups.
pub fn filter_groups(query: &str, registry: &SiteRegistry) -> Vec<FilterGroup> {
    let term = query.trim().replace(',', " ");
    if term.is_empty() {
        return Vec::new();
    }
    let source_tags = registry.alias_targets(&term);

    TIERS
        .iter()
        .map(|fields| FilterGroup {
            fields: fields.to_vec(),
            term: term.clone(),
            source_tags: source_tags.clone(),
        })
        .collect()
}

/// Try each tier in turn and keep the first that the store accepts. If every
/// tier errors, fall back to the unfiltered listing.
pub async fn list_with_fallback(
    store: &dyn JobStore,
    query: &str,
    registry: &SiteRegistry,
) -> Result<Vec<Job>, AppError> {
    for group in filter_groups(query, registry) {
        match store.select(Some(&group), LIST_LIMIT).await {
            Ok(jobs) => return Ok(jobs),
            Err(e) => {
                tracing::warn!(
                    "Search over {} fields failed, narrowing: {e}",
                    group.fields.len()
                );
            }
        }
    }
    store.select(None, LIST_LIMIT).await
}
