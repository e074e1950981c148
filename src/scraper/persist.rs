use chrono::Utc;
use serde::Serialize;

use crate::loghub::LogSink;
use crate::models::job::{Job, NewJob};
use crate::scraper::engine::preview;
use crate::scraper::mapper::NormalizedJob;
use crate::scraper::registry::SiteDefinition;
use crate::store::JobStore;

const SAMPLE_PREVIEW: usize = 400;

#[derive(Debug, Default, Serialize)]
pub struct PersistOutcome {
    pub saved: Vec<Job>,
    pub failed: usize,
}

/// Stamp source and timestamps onto a mapped job and fill in the detail URL
/// from the site's pattern when the record did not carry one. The source tag
/// takes the place of any mapped company name.
pub fn normalize(job: NormalizedJob, source_website: &str, site: Option<&SiteDefinition>) -> NewJob {
    let now = Utc::now();
    let original_url = job.original_url.filter(|u| !u.is_empty()).or_else(|| {
        let id = job.external_job_id.as_deref().filter(|id| !id.is_empty())?;
        site?.detail_url_for(id)
    });

    NewJob {
        title: job.title,
        company_name: None,
        department: job.department,
        location: job.location,
        job_type: job.job_type,
        experience_level: job.experience_level,
        salary_min: job.salary_min,
        salary_max: job.salary_max,
        description: job.description,
        requirements: job.requirements,
        skills: job.skills,
        original_url,
        source_website: source_website.to_string(),
        external_job_id: job.external_job_id,
        scraped_at: now,
        created_at: now,
        updated_at: now,
    }
}

/// Insert jobs one at a time so a bad record only costs itself. Failures are
/// logged and counted, never retried.
pub async fn persist(
    store: &dyn JobStore,
    jobs: Vec<NormalizedJob>,
    source_website: &str,
    site: Option<&SiteDefinition>,
    log: &LogSink,
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();

    for (i, job) in jobs.into_iter().enumerate() {
        let record = normalize(job, source_website, site);
        if i == 0 {
            let sample = serde_json::to_string(&record).unwrap_or_default();
            log.line(format!("[sample] {}", preview(&sample, SAMPLE_PREVIEW)));
        }

        match store.insert(&record).await {
            Ok(saved) => {
                log.line(format!("[insert] ok id={}", saved.id));
                outcome.saved.push(saved);
            }
            Err(e) => {
                tracing::warn!("Failed to insert job '{}': {e}", record.title);
                log.line(format!("[insert] error {e}"));
                outcome.failed += 1;
            }
        }
    }

    outcome
}
