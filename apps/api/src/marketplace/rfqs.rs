use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::business::service::get_business;
use crate::errors::AppError;
use crate::marketplace::models::{check_quotable, NewQuote, NewRfq, QuoteStatus, RfqStatus};
use crate::models::marketplace::{QuoteRow, RfqRow};
use crate::pagination::{like_pattern, Page, PageParams};
use crate::team::roles::TeamRole;
use crate::team::service::require_role;

#[derive(Debug, Default, Deserialize)]
pub struct RfqFilter {
    pub q: Option<String>,
    pub category: Option<String>,
}

pub async fn get_rfq(pool: &PgPool, rfq_id: Uuid) -> Result<RfqRow, AppError> {
    sqlx::query_as::<_, RfqRow>("SELECT * FROM rfqs WHERE id = $1")
        .bind(rfq_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("RFQ {rfq_id} not found")))
}

pub async fn create_rfq(pool: &PgPool, buyer_id: Uuid, rfq: NewRfq) -> Result<RfqRow, AppError> {
    rfq.validate(Utc::now())?;
    let row = sqlx::query_as::<_, RfqRow>(
        r#"
        INSERT INTO rfqs
            (id, buyer_id, title, description, category, quantity, target_price_cents,
             currency, deadline, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(buyer_id)
    .bind(rfq.title.trim())
    .bind(rfq.description.trim())
    .bind(rfq.category.trim())
    .bind(rfq.quantity)
    .bind(rfq.target_price_cents)
    .bind(&rfq.currency)
    .bind(rfq.deadline)
    .bind(RfqStatus::Open.as_str())
    .fetch_one(pool)
    .await?;
    info!("User {buyer_id} opened RFQ {}", row.id);
    Ok(row)
}

pub async fn list_open_rfqs(
    pool: &PgPool,
    filter: &RfqFilter,
    params: &PageParams,
) -> Result<Page<RfqRow>, AppError> {
    let pattern = filter
        .q
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(like_pattern);
    let category = filter.category.as_deref().filter(|s| !s.trim().is_empty());

    const WHERE: &str = r#"
        FROM rfqs
        WHERE status = 'open' AND deadline > now()
          AND ($1::text IS NULL OR title ILIKE $1 OR description ILIKE $1)
          AND ($2::text IS NULL OR category = $2)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {WHERE}"))
        .bind(pattern.as_deref())
        .bind(category)
        .fetch_one(pool)
        .await?;
    let items = sqlx::query_as::<_, RfqRow>(&format!(
        "SELECT * {WHERE} ORDER BY deadline ASC LIMIT $3 OFFSET $4"
    ))
    .bind(pattern.as_deref())
    .bind(category)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, params, total))
}

pub async fn list_my_rfqs(pool: &PgPool, buyer_id: Uuid) -> Result<Vec<RfqRow>, AppError> {
    Ok(
        sqlx::query_as::<_, RfqRow>("SELECT * FROM rfqs WHERE buyer_id = $1 ORDER BY created_at DESC")
            .bind(buyer_id)
            .fetch_all(pool)
            .await?,
    )
}

pub async fn submit_quote(
    pool: &PgPool,
    rfq_id: Uuid,
    user_id: Uuid,
    quote: NewQuote,
) -> Result<QuoteRow, AppError> {
    quote.validate()?;
    let rfq = get_rfq(pool, rfq_id).await?;
    if rfq.buyer_id == user_id {
        return Err(AppError::Validation(
            "You cannot quote on your own RFQ".to_string(),
        ));
    }
    check_quotable(&rfq.status, rfq.deadline, Utc::now())?;
    get_business(pool, quote.business_id).await?;
    require_role(pool, quote.business_id, user_id, TeamRole::Admin).await?;

    let already: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM rfq_quotes WHERE rfq_id = $1 AND business_id = $2)",
    )
    .bind(rfq_id)
    .bind(quote.business_id)
    .fetch_one(pool)
    .await?;
    if already {
        return Err(AppError::Conflict(
            "This business has already quoted on the RFQ".to_string(),
        ));
    }

    let row = sqlx::query_as::<_, QuoteRow>(
        r#"
        INSERT INTO rfq_quotes
            (id, rfq_id, business_id, submitted_by, unit_price_cents, lead_time_days, notes, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(rfq_id)
    .bind(quote.business_id)
    .bind(user_id)
    .bind(quote.unit_price_cents)
    .bind(quote.lead_time_days)
    .bind(quote.notes.as_deref().map(str::trim))
    .bind(QuoteStatus::Pending.as_str())
    .fetch_one(pool)
    .await?;
    info!("Business {} quoted on RFQ {rfq_id}", quote.business_id);
    Ok(row)
}

/// The buyer sees every quote; sellers only see their own businesses' quotes.
pub async fn list_quotes(pool: &PgPool, rfq_id: Uuid, user_id: Uuid) -> Result<Vec<QuoteRow>, AppError> {
    let rfq = get_rfq(pool, rfq_id).await?;
    let quotes = if rfq.buyer_id == user_id {
        sqlx::query_as::<_, QuoteRow>(
            "SELECT * FROM rfq_quotes WHERE rfq_id = $1 ORDER BY unit_price_cents ASC",
        )
        .bind(rfq_id)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as::<_, QuoteRow>(
            r#"
            SELECT q.* FROM rfq_quotes q
            JOIN business_members m ON m.business_id = q.business_id
            WHERE q.rfq_id = $1 AND m.user_id = $2
            ORDER BY q.created_at ASC
            "#,
        )
        .bind(rfq_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?
    };
    Ok(quotes)
}

async fn lock_own_open_rfq(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    rfq_id: Uuid,
    buyer_id: Uuid,
) -> Result<RfqRow, AppError> {
    let rfq = sqlx::query_as::<_, RfqRow>("SELECT * FROM rfqs WHERE id = $1 FOR UPDATE")
        .bind(rfq_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("RFQ {rfq_id} not found")))?;
    if rfq.buyer_id != buyer_id {
        return Err(AppError::Forbidden(
            "Only the buyer can decide on this RFQ".to_string(),
        ));
    }
    if rfq.status != RfqStatus::Open.as_str() {
        return Err(AppError::Validation(format!("RFQ is {}", rfq.status)));
    }
    Ok(rfq)
}

/// Awards one quote and rejects the rest.
pub async fn award_quote(
    pool: &PgPool,
    rfq_id: Uuid,
    quote_id: Uuid,
    buyer_id: Uuid,
) -> Result<RfqRow, AppError> {
    let mut tx = pool.begin().await?;
    lock_own_open_rfq(&mut tx, rfq_id, buyer_id).await?;

    let awarded = sqlx::query("UPDATE rfq_quotes SET status = $3 WHERE id = $1 AND rfq_id = $2")
        .bind(quote_id)
        .bind(rfq_id)
        .bind(QuoteStatus::Awarded.as_str())
        .execute(&mut *tx)
        .await?;
    if awarded.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Quote {quote_id} not found on RFQ {rfq_id}"
        )));
    }
    sqlx::query("UPDATE rfq_quotes SET status = $3 WHERE rfq_id = $1 AND id <> $2")
        .bind(rfq_id)
        .bind(quote_id)
        .bind(QuoteStatus::Rejected.as_str())
        .execute(&mut *tx)
        .await?;
    let rfq = sqlx::query_as::<_, RfqRow>(
        r#"
        UPDATE rfqs SET status = $2, awarded_quote_id = $3, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(rfq_id)
    .bind(RfqStatus::Awarded.as_str())
    .bind(quote_id)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!("RFQ {rfq_id} awarded to quote {quote_id}");
    Ok(rfq)
}

pub async fn close_rfq(pool: &PgPool, rfq_id: Uuid, buyer_id: Uuid) -> Result<RfqRow, AppError> {
    let mut tx = pool.begin().await?;
    lock_own_open_rfq(&mut tx, rfq_id, buyer_id).await?;

    sqlx::query("UPDATE rfq_quotes SET status = $2 WHERE rfq_id = $1 AND status = 'pending'")
        .bind(rfq_id)
        .bind(QuoteStatus::Rejected.as_str())
        .execute(&mut *tx)
        .await?;
    let rfq = sqlx::query_as::<_, RfqRow>(
        "UPDATE rfqs SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(rfq_id)
    .bind(RfqStatus::Closed.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!("RFQ {rfq_id} closed without award");
    Ok(rfq)
}
