use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::job::{Job, NewJob};
use crate::scraper::search::FilterGroup;

/// Record-store capability the scraper writes to and the job listing reads
/// from. Agnostic to the concrete database behind it.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &NewJob) -> Result<Job, AppError>;

    async fn select(&self, filter: Option<&FilterGroup>, limit: i64)
    -> Result<Vec<Job>, AppError>;

    async fn count(&self) -> Result<i64, AppError>;

    async fn distinct_sources(&self) -> Result<i64, AppError>;
}

#[async_trait]
impl JobStore for PgPool {
    async fn insert(&self, job: &NewJob) -> Result<Job, AppError> {
        Job::insert(self, job).await
    }

    async fn select(
        &self,
        filter: Option<&FilterGroup>,
        limit: i64,
    ) -> Result<Vec<Job>, AppError> {
        Job::list(self, filter, limit).await
    }

    async fn count(&self) -> Result<i64, AppError> {
        Job::count(self).await
    }

    async fn distinct_sources(&self) -> Result<i64, AppError> {
        Job::distinct_sources(self).await
    }
}

#[cfg(test)]
pub mod memory {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::scraper::search::SearchField;

    /// In-process store for tests. Columns can be "dropped" to exercise the
    /// schema-drift fallbacks, and titles can be marked to fail on insert.
    #[derive(Default)]
    pub struct MemoryStore {
        rows: Mutex<Vec<Job>>,
        missing_columns: HashSet<&'static str>,
        reject_titles: HashSet<String>,
        selects: Mutex<Vec<Option<usize>>>,
    }

    impl MemoryStore {
        pub fn without_columns(mut self, columns: &[&'static str]) -> Self {
            self.missing_columns.extend(columns.iter().copied());
            self
        }

        pub fn rejecting(mut self, title: &str) -> Self {
            self.reject_titles.insert(title.to_string());
            self
        }

        pub fn seed(&self, title: &str, source: &str) {
            let now = Utc::now();
            self.insert_row(&NewJob {
                title: title.into(),
                company_name: None,
                department: None,
                location: None,
                job_type: None,
                experience_level: None,
                salary_min: None,
                salary_max: None,
                description: None,
                requirements: None,
                skills: None,
                original_url: None,
                source_website: source.into(),
                external_job_id: None,
                scraped_at: now,
                created_at: now,
                updated_at: now,
            });
        }

        pub fn rows(&self) -> Vec<Job> {
            self.rows.lock().unwrap().clone()
        }

        /// Field count of every select issued, `None` for unfiltered.
        pub fn select_log(&self) -> Vec<Option<usize>> {
            self.selects.lock().unwrap().clone()
        }

        fn insert_row(&self, job: &NewJob) -> Job {
            let mut rows = self.rows.lock().unwrap();
            let row = Job {
                id: rows.len() as i32 + 1,
                title: job.title.clone(),
                company_name: job.company_name.clone(),
                department: job.department.clone(),
                location: job.location.clone(),
                job_type: job.job_type.clone(),
                experience_level: job.experience_level.clone(),
                salary_min: job.salary_min,
                salary_max: job.salary_max,
                description: job.description.clone(),
                requirements: job.requirements.clone(),
                benefits: None,
                skills: job.skills.clone(),
                original_url: job.original_url.clone(),
                source_website: job.source_website.clone(),
                external_job_id: job.external_job_id.clone(),
                scraped_at: Some(job.scraped_at),
                created_at: job.created_at,
                updated_at: job.updated_at,
            };
            rows.push(row.clone());
            row
        }
    }

    fn field_value(job: &Job, field: SearchField) -> Option<&str> {
        match field {
            SearchField::Title => Some(&job.title),
            SearchField::Department => job.department.as_deref(),
            SearchField::Location => job.location.as_deref(),
            SearchField::ExperienceLevel => job.experience_level.as_deref(),
            SearchField::JobType => job.job_type.as_deref(),
            SearchField::Description => job.description.as_deref(),
            SearchField::Requirements => job.requirements.as_deref(),
            SearchField::SourceWebsite => Some(&job.source_website),
            SearchField::Benefits => job.benefits.as_deref(),
        }
    }

    #[async_trait]
    impl JobStore for MemoryStore {
        async fn insert(&self, job: &NewJob) -> Result<Job, AppError> {
            if self.reject_titles.contains(&job.title) {
                return Err(AppError::BadRequest(format!("rejected '{}'", job.title)));
            }
            Ok(self.insert_row(job))
        }

        async fn select(
            &self,
            filter: Option<&FilterGroup>,
            limit: i64,
        ) -> Result<Vec<Job>, AppError> {
            self.selects
                .lock()
                .unwrap()
                .push(filter.map(|g| g.fields.len()));

            let Some(group) = filter else {
                return Ok(self.rows().into_iter().rev().take(limit as usize).collect());
            };
            if let Some(missing) = group
                .fields
                .iter()
                .find(|f| self.missing_columns.contains(f.column()))
            {
                return Err(AppError::BadRequest(format!(
                    "column {} does not exist",
                    missing.column()
                )));
            }

            let term = group.term.to_lowercase();
            Ok(self
                .rows()
                .into_iter()
                .rev()
                .filter(|job| {
                    group.fields.iter().any(|&f| {
                        field_value(job, f).is_some_and(|v| v.to_lowercase().contains(&term))
                    }) || group.source_tags.contains(&job.source_website)
                })
                .take(limit as usize)
                .collect())
        }

        async fn count(&self) -> Result<i64, AppError> {
            Ok(self.rows.lock().unwrap().len() as i64)
        }

        async fn distinct_sources(&self) -> Result<i64, AppError> {
            let rows = self.rows.lock().unwrap();
            let sources: HashSet<&str> = rows
                .iter()
                .map(|j| j.source_website.as_str())
                .filter(|s| !s.is_empty())
                .collect();
            Ok(sources.len() as i64)
        }
    }
}
