use chrono::Utc;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::applications::models::{
    check_review_transition, check_withdrawable, ApplicationStatus, ApplyFields,
};
use crate::errors::AppError;
use crate::jobs::models::accepts_applications;
use crate::jobs::service::get_managed_job;
use crate::models::job::{ApplicationRow, JobRow};
use crate::pagination::{Page, PageParams};
use crate::profile::service::find_profile;
use crate::storage::{delete_quietly, store_upload, FileKind, ObjectStore};
use crate::team::roles::TeamRole;
use crate::team::service::require_role;
use crate::upload::UploadedFile;

pub const STORAGE_SCOPE: &str = "applications";

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
}

async fn get_application(pool: &PgPool, application_id: Uuid) -> Result<ApplicationRow, AppError> {
    sqlx::query_as::<_, ApplicationRow>("SELECT * FROM job_applications WHERE id = $1")
        .bind(application_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {application_id} not found")))
}

fn status_of(row: &ApplicationRow) -> Result<ApplicationStatus, AppError> {
    ApplicationStatus::parse(&row.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "Application {} has unknown status {}",
            row.id,
            row.status
        ))
    })
}

pub async fn apply(
    pool: &PgPool,
    store: &dyn ObjectStore,
    job_id: Uuid,
    applicant_id: Uuid,
    fields: ApplyFields,
    resume: Option<UploadedFile>,
) -> Result<ApplicationRow, AppError> {
    fields.validate()?;

    let job = sqlx::query_as::<_, JobRow>(
        "SELECT * FROM job_postings WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?
    .filter(|j| j.status != "draft")
    .ok_or_else(|| AppError::NotFound(format!("Job posting {job_id} not found")))?;
    if !accepts_applications(&job, Utc::now()) {
        return Err(AppError::Validation(
            "This job posting is not accepting applications".to_string(),
        ));
    }

    if find_profile(pool, applicant_id).await?.is_none() {
        return Err(AppError::Validation(
            "Create your profile before applying".to_string(),
        ));
    }

    let already: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM job_applications WHERE job_id = $1 AND applicant_id = $2)",
    )
    .bind(job_id)
    .bind(applicant_id)
    .fetch_one(pool)
    .await?;
    if already {
        return Err(AppError::Conflict(
            "You have already applied to this job".to_string(),
        ));
    }

    let stored = match &resume {
        Some(file) => {
            Some(store_upload(store, STORAGE_SCOPE, applicant_id, FileKind::Resume, file).await?)
        }
        None => None,
    };

    let inserted = sqlx::query_as::<_, ApplicationRow>(
        r#"
        INSERT INTO job_applications (id, job_id, applicant_id, cover_letter, resume, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(job_id)
    .bind(applicant_id)
    .bind(fields.cover_letter.as_deref().map(str::trim))
    .bind(stored.as_ref().map(Json))
    .bind(ApplicationStatus::Submitted.as_str())
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(row) => {
            info!("User {applicant_id} applied to job {job_id}");
            Ok(row)
        }
        Err(e) => {
            delete_quietly(store, stored.map(|f| f.key)).await;
            Err(e.into())
        }
    }
}

pub async fn list_for_job(
    pool: &PgPool,
    job_id: Uuid,
    user_id: Uuid,
    filter: &ApplicationFilter,
    params: &PageParams,
) -> Result<Page<ApplicationRow>, AppError> {
    get_managed_job(pool, job_id, user_id).await?;
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM job_applications WHERE job_id = $1 AND ($2::text IS NULL OR status = $2)",
    )
    .bind(job_id)
    .bind(status)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, ApplicationRow>(
        r#"
        SELECT * FROM job_applications
        WHERE job_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at ASC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(job_id)
    .bind(status)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, params, total))
}

pub async fn list_mine(
    pool: &PgPool,
    applicant_id: Uuid,
    params: &PageParams,
) -> Result<Page<ApplicationRow>, AppError> {
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM job_applications WHERE applicant_id = $1")
            .bind(applicant_id)
            .fetch_one(pool)
            .await?;
    let items = sqlx::query_as::<_, ApplicationRow>(
        r#"
        SELECT * FROM job_applications WHERE applicant_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(applicant_id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;
    Ok(Page::new(items, params, total))
}

async fn set_status(
    pool: &PgPool,
    application_id: Uuid,
    expected: ApplicationStatus,
    next: ApplicationStatus,
) -> Result<ApplicationRow, AppError> {
    // Only applies if the row still holds the status the transition was checked against.
    sqlx::query_as::<_, ApplicationRow>(
        r#"
        UPDATE job_applications SET status = $3, updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(application_id)
    .bind(expected.as_str())
    .bind(next.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("The application changed concurrently".to_string()))
}

pub async fn review(
    pool: &PgPool,
    application_id: Uuid,
    reviewer_id: Uuid,
    next: ApplicationStatus,
) -> Result<ApplicationRow, AppError> {
    let application = get_application(pool, application_id).await?;
    let business_id: Uuid =
        sqlx::query_scalar("SELECT business_id FROM job_postings WHERE id = $1")
            .bind(application.job_id)
            .fetch_one(pool)
            .await?;
    require_role(pool, business_id, reviewer_id, TeamRole::Admin).await?;

    let current = status_of(&application)?;
    check_review_transition(current, next)?;
    let row = set_status(pool, application_id, current, next).await?;
    info!(
        "Application {application_id} moved from {} to {}",
        current.as_str(),
        next.as_str()
    );
    Ok(row)
}

pub async fn withdraw(
    pool: &PgPool,
    application_id: Uuid,
    applicant_id: Uuid,
) -> Result<ApplicationRow, AppError> {
    let application = get_application(pool, application_id).await?;
    if application.applicant_id != applicant_id {
        return Err(AppError::NotFound(format!(
            "Application {application_id} not found"
        )));
    }
    let current = status_of(&application)?;
    check_withdrawable(current)?;
    let row = set_status(pool, application_id, current, ApplicationStatus::Withdrawn).await?;
    info!("Application {application_id} withdrawn");
    Ok(row)
}
