use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::business::service::get_business;
use crate::errors::AppError;
use crate::jobs::models::{JobFields, JobStatus};
use crate::models::job::JobRow;
use crate::pagination::{like_pattern, Page, PageParams};
use crate::patch::apply_patch;
use crate::profile::models::EmploymentType;
use crate::team::roles::TeamRole;
use crate::team::service::{find_role, require_role};
use crate::validation::from_json;

#[derive(Debug, Default, Deserialize)]
pub struct JobFilter {
    pub q: Option<String>,
    pub employment_type: Option<EmploymentType>,
    pub remote: Option<bool>,
    pub business_id: Option<Uuid>,
}

async fn find_job(pool: &PgPool, job_id: Uuid) -> Result<JobRow, AppError> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM job_postings WHERE id = $1 AND deleted_at IS NULL")
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job posting {job_id} not found")))
}

/// Open postings are public; drafts and closed postings exist only for the team.
pub async fn get_job(pool: &PgPool, job_id: Uuid, viewer: Option<Uuid>) -> Result<JobRow, AppError> {
    let job = find_job(pool, job_id).await?;
    if job.status == JobStatus::Open.as_str() {
        return Ok(job);
    }
    let is_team = match viewer {
        Some(user_id) => find_role(pool, job.business_id, user_id).await?.is_some(),
        None => false,
    };
    if is_team {
        Ok(job)
    } else {
        Err(AppError::NotFound(format!("Job posting {job_id} not found")))
    }
}

/// Loads a posting the caller may manage.
pub async fn get_managed_job(pool: &PgPool, job_id: Uuid, user_id: Uuid) -> Result<JobRow, AppError> {
    let job = find_job(pool, job_id).await?;
    require_role(pool, job.business_id, user_id, TeamRole::Admin).await?;
    Ok(job)
}

pub async fn list_open_jobs(
    pool: &PgPool,
    filter: &JobFilter,
    params: &PageParams,
) -> Result<Page<JobRow>, AppError> {
    let pattern = filter
        .q
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(like_pattern);
    let employment_type = filter.employment_type.map(|e| e.as_str());

    const WHERE: &str = r#"
        FROM job_postings j
        JOIN businesses b ON b.id = j.business_id
        WHERE j.status = 'open' AND j.deleted_at IS NULL AND b.deleted_at IS NULL
          AND (j.closes_at IS NULL OR j.closes_at > now())
          AND ($1::text IS NULL OR j.title ILIKE $1 OR j.description ILIKE $1)
          AND ($2::text IS NULL OR j.employment_type = $2)
          AND ($3::bool IS NULL OR j.remote = $3)
          AND ($4::uuid IS NULL OR j.business_id = $4)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {WHERE}"))
        .bind(pattern.as_deref())
        .bind(employment_type)
        .bind(filter.remote)
        .bind(filter.business_id)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT j.* {WHERE} ORDER BY j.created_at DESC LIMIT $5 OFFSET $6"
    ))
    .bind(pattern.as_deref())
    .bind(employment_type)
    .bind(filter.remote)
    .bind(filter.business_id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, params, total))
}

pub async fn create_job(
    pool: &PgPool,
    business_id: Uuid,
    user_id: Uuid,
    fields: Map<String, Value>,
) -> Result<JobRow, AppError> {
    get_business(pool, business_id).await?;
    require_role(pool, business_id, user_id, TeamRole::Admin).await?;

    let job: JobFields = from_json("job posting", Value::Object(fields))?;
    job.validate(None, Utc::now())?;

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO job_postings
            (id, business_id, posted_by, title, description, employment_type, location,
             remote, salary_min, salary_max, currency, skills, status, closes_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(business_id)
    .bind(user_id)
    .bind(job.title.trim())
    .bind(job.description.trim())
    .bind(job.employment_type.as_str())
    .bind(&job.location)
    .bind(job.remote)
    .bind(job.salary_min)
    .bind(job.salary_max)
    .bind(&job.currency)
    .bind(trimmed(&job.skills))
    .bind(job.status.as_str())
    .bind(job.closes_at)
    .fetch_one(pool)
    .await?;

    info!("Business {business_id} posted job {} ({})", row.id, row.status);
    Ok(row)
}

pub async fn update_job(
    pool: &PgPool,
    job_id: Uuid,
    user_id: Uuid,
    fields: Map<String, Value>,
) -> Result<JobRow, AppError> {
    let existing = get_managed_job(pool, job_id, user_id).await?;
    let previous = JobFields::from_row(&existing)?;
    let job = apply_patch("job posting", &previous, fields)?;
    job.validate(Some(&previous), Utc::now())?;

    let row = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE job_postings SET
            title = $2, description = $3, employment_type = $4, location = $5, remote = $6,
            salary_min = $7, salary_max = $8, currency = $9, skills = $10, status = $11,
            closes_at = $12, updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING *
        "#,
    )
    .bind(job_id)
    .bind(job.title.trim())
    .bind(job.description.trim())
    .bind(job.employment_type.as_str())
    .bind(&job.location)
    .bind(job.remote)
    .bind(job.salary_min)
    .bind(job.salary_max)
    .bind(&job.currency)
    .bind(trimmed(&job.skills))
    .bind(job.status.as_str())
    .bind(job.closes_at)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Job posting {job_id} not found")))?;

    if previous.status != job.status {
        info!(
            "Job {job_id} moved from {} to {}",
            previous.status.as_str(),
            job.status.as_str()
        );
    }
    Ok(row)
}

pub async fn delete_job(pool: &PgPool, job_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    get_managed_job(pool, job_id, user_id).await?;
    sqlx::query(
        "UPDATE job_postings SET deleted_at = now(), status = 'closed', updated_at = now() WHERE id = $1",
    )
    .bind(job_id)
    .execute(pool)
    .await?;
    info!("Deleted job posting {job_id}");
    Ok(())
}

fn trimmed(skills: &[String]) -> Vec<String> {
    skills.iter().map(|s| s.trim().to_string()).collect()
}
