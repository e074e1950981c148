use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::scraper::search::FilterGroup;

/// Table layout expected in a target store. Created on demand.
pub const JOBS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id SERIAL PRIMARY KEY,
    title TEXT NOT NULL,
    company_name TEXT,
    department TEXT,
    location TEXT,
    job_type TEXT,
    experience_level TEXT,
    salary_min DOUBLE PRECISION,
    salary_max DOUBLE PRECISION,
    description TEXT,
    requirements TEXT,
    benefits TEXT,
    skills TEXT[],
    original_url TEXT,
    source_website TEXT NOT NULL,
    external_job_id TEXT,
    scraped_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS jobs_created_at_idx ON jobs (created_at DESC);
CREATE INDEX IF NOT EXISTS jobs_source_website_idx ON jobs (source_website);
"#;

/// Target stores are user-owned and may lack optional columns; those decode
/// as absent instead of failing the row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Job {
    pub id: i32,
    pub title: String,
    #[sqlx(default)]
    pub company_name: Option<String>,
    #[sqlx(default)]
    pub department: Option<String>,
    #[sqlx(default)]
    pub location: Option<String>,
    #[sqlx(default)]
    pub job_type: Option<String>,
    #[sqlx(default)]
    pub experience_level: Option<String>,
    #[sqlx(default)]
    pub salary_min: Option<f64>,
    #[sqlx(default)]
    pub salary_max: Option<f64>,
    #[sqlx(default)]
    pub description: Option<String>,
    #[sqlx(default)]
    pub requirements: Option<String>,
    #[sqlx(default)]
    pub benefits: Option<String>,
    #[sqlx(default)]
    pub skills: Option<Vec<String>>,
    #[sqlx(default)]
    pub original_url: Option<String>,
    pub source_website: String,
    #[sqlx(default)]
    pub external_job_id: Option<String>,
    #[sqlx(default)]
    pub scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NewJob {
    pub title: String,
    pub company_name: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub experience_level: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub description: Option<String>,
    pub requirements: Option<String>,
    pub skills: Option<Vec<String>>,
    pub original_url: Option<String>,
    pub source_website: String,
    pub external_job_id: Option<String>,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub async fn ensure_schema(pool: &PgPool) -> Result<(), AppError> {
        sqlx::raw_sql(JOBS_SCHEMA).execute(pool).await?;
        Ok(())
    }

    /// Only columns with a value are written, so a store missing an optional
    /// column still accepts records that leave it empty.
    pub async fn insert(pool: &PgPool, input: &NewJob) -> Result<Job, AppError> {
        let text: Vec<(&str, &String)> = [
            ("company_name", &input.company_name),
            ("department", &input.department),
            ("location", &input.location),
            ("job_type", &input.job_type),
            ("experience_level", &input.experience_level),
            ("description", &input.description),
            ("requirements", &input.requirements),
            ("original_url", &input.original_url),
            ("external_job_id", &input.external_job_id),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_ref().map(|v| (column, v)))
        .collect();
        let numbers: Vec<(&str, f64)> = [
            ("salary_min", input.salary_min),
            ("salary_max", input.salary_max),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.map(|v| (column, v)))
        .collect();

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO jobs (title, source_website, scraped_at, created_at, updated_at",
        );
        for column in text.iter().map(|(c, _)| *c).chain(numbers.iter().map(|(c, _)| *c)) {
            qb.push(", ").push(column);
        }
        if input.skills.is_some() {
            qb.push(", skills");
        }

        qb.push(") VALUES (");
        let mut values = qb.separated(", ");
        values.push_bind(input.title.clone());
        values.push_bind(input.source_website.clone());
        values.push_bind(input.scraped_at);
        values.push_bind(input.created_at);
        values.push_bind(input.updated_at);
        for (_, value) in &text {
            values.push_bind((*value).clone());
        }
        for (_, value) in &numbers {
            values.push_bind(*value);
        }
        if let Some(skills) = &input.skills {
            values.push_bind(skills.clone());
        }
        qb.push(") RETURNING *");

        let job = qb.build_query_as::<Job>().fetch_one(pool).await?;
        Ok(job)
    }

    /// Newest jobs first, optionally restricted by one OR-group.
    pub async fn list(
        pool: &PgPool,
        filter: Option<&FilterGroup>,
        limit: i64,
    ) -> Result<Vec<Job>, AppError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM jobs");
        if let Some(group) = filter {
            qb.push(" WHERE (");
            let mut clauses = qb.separated(" OR ");
            for field in &group.fields {
                clauses.push(format!("{} ILIKE ", field.column()));
                clauses.push_bind_unseparated(group.pattern());
            }
            for tag in &group.source_tags {
                clauses.push("source_website = ");
                clauses.push_bind_unseparated(tag.clone());
            }
            qb.push(")");
        }
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(limit);

        let jobs = qb.build_query_as::<Job>().fetch_all(pool).await?;
        Ok(jobs)
    }

    pub async fn count(pool: &PgPool) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM jobs")
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    pub async fn distinct_sources(pool: &PgPool) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT source_website) FROM jobs WHERE source_website <> ''",
        )
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }
}
