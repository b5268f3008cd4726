use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::business::models::BusinessFields;
use crate::errors::AppError;
use crate::models::business::BusinessRow;
use crate::pagination::{like_pattern, Page, PageParams};
use crate::patch::{apply_patch, take_flag};
use crate::storage::{delete_quietly, store_upload, FileKind, ObjectStore, StoredFile};
use crate::team::roles::TeamRole;
use crate::team::service::{add_member, require_role};
use crate::upload::UploadedFile;
use crate::validation::from_json;

pub const STORAGE_SCOPE: &str = "businesses";
const REMOVE_LOGO: &str = "remove_logo";

#[derive(Debug, Default, serde::Deserialize)]
pub struct BusinessFilter {
    pub industry: Option<String>,
    pub q: Option<String>,
}

pub async fn get_business(pool: &PgPool, business_id: Uuid) -> Result<BusinessRow, AppError> {
    sqlx::query_as::<_, BusinessRow>(
        "SELECT * FROM businesses WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(business_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Business {business_id} not found")))
}

pub async fn list_businesses(
    pool: &PgPool,
    filter: &BusinessFilter,
    params: &PageParams,
) -> Result<Page<BusinessRow>, AppError> {
    let industry = filter.industry.as_deref().filter(|s| !s.trim().is_empty());
    let pattern = filter
        .q
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(like_pattern);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM businesses
        WHERE deleted_at IS NULL
          AND ($1::text IS NULL OR industry = $1)
          AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2)
        "#,
    )
    .bind(industry)
    .bind(pattern.as_deref())
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, BusinessRow>(
        r#"
        SELECT * FROM businesses
        WHERE deleted_at IS NULL
          AND ($1::text IS NULL OR industry = $1)
          AND ($2::text IS NULL OR name ILIKE $2 OR description ILIKE $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(industry)
    .bind(pattern.as_deref())
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, params, total))
}

pub async fn list_my_businesses(pool: &PgPool, user_id: Uuid) -> Result<Vec<BusinessRow>, AppError> {
    Ok(sqlx::query_as::<_, BusinessRow>(
        r#"
        SELECT b.* FROM businesses b
        JOIN business_members m ON m.business_id = b.id
        WHERE m.user_id = $1 AND b.deleted_at IS NULL
        ORDER BY b.name ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn create_business(
    pool: &PgPool,
    store: &dyn ObjectStore,
    owner_id: Uuid,
    mut fields: Map<String, Value>,
    logo: Option<UploadedFile>,
) -> Result<BusinessRow, AppError> {
    take_flag(&mut fields, REMOVE_LOGO)?;
    fields.remove("logo");
    let business: BusinessFields = from_json("business", Value::Object(fields))?;
    business.validate()?;

    let business_id = Uuid::new_v4();
    let stored = match &logo {
        Some(file) => Some(store_upload(store, STORAGE_SCOPE, business_id, FileKind::Logo, file).await?),
        None => None,
    };

    match insert_business(pool, business_id, owner_id, &business, stored.as_ref()).await {
        Ok(row) => {
            info!("Created business {business_id} owned by {owner_id}");
            Ok(row)
        }
        Err(e) => {
            delete_quietly(store, stored.map(|f| f.key)).await;
            Err(e)
        }
    }
}

async fn insert_business(
    pool: &PgPool,
    business_id: Uuid,
    owner_id: Uuid,
    business: &BusinessFields,
    logo: Option<&StoredFile>,
) -> Result<BusinessRow, AppError> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query_as::<_, BusinessRow>(
        r#"
        INSERT INTO businesses
            (id, owner_id, name, industry, description, website, location,
             company_size, founded_year, logo)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(business_id)
    .bind(owner_id)
    .bind(business.name.trim())
    .bind(business.industry.trim())
    .bind(&business.description)
    .bind(&business.website)
    .bind(&business.location)
    .bind(business.company_size.map(|c| c.as_str()))
    .bind(business.founded_year)
    .bind(logo.map(Json))
    .fetch_one(&mut *tx)
    .await?;
    add_member(&mut tx, business_id, owner_id, TeamRole::Owner).await?;
    tx.commit().await?;
    Ok(row)
}

pub async fn update_business(
    pool: &PgPool,
    store: &dyn ObjectStore,
    business_id: Uuid,
    actor_id: Uuid,
    mut fields: Map<String, Value>,
    logo: Option<UploadedFile>,
) -> Result<BusinessRow, AppError> {
    require_role(pool, business_id, actor_id, TeamRole::Admin).await?;
    let existing = get_business(pool, business_id).await?;

    let remove_logo = take_flag(&mut fields, REMOVE_LOGO)?;
    fields.remove("logo");
    let updated = apply_patch("business", &BusinessFields::from_row(&existing), fields)?;
    updated.validate()?;

    let old_logo = existing.logo.as_ref().map(|l| l.0.clone());
    let new_logo = match &logo {
        Some(file) => Some(store_upload(store, STORAGE_SCOPE, business_id, FileKind::Logo, file).await?),
        None if remove_logo => None,
        None => old_logo.clone(),
    };

    let written = sqlx::query_as::<_, BusinessRow>(
        r#"
        UPDATE businesses SET
            name = $2, industry = $3, description = $4, website = $5, location = $6,
            company_size = $7, founded_year = $8, logo = $9,
            version = version + 1, updated_at = now()
        WHERE id = $1 AND deleted_at IS NULL AND version = $10
        RETURNING *
        "#,
    )
    .bind(business_id)
    .bind(updated.name.trim())
    .bind(updated.industry.trim())
    .bind(&updated.description)
    .bind(&updated.website)
    .bind(&updated.location)
    .bind(updated.company_size.map(|c| c.as_str()))
    .bind(updated.founded_year)
    .bind(new_logo.as_ref().map(Json))
    .bind(existing.version)
    .fetch_optional(pool)
    .await;

    let new_key = new_logo.as_ref().map(|f| f.key.clone());
    let old_key = old_logo.map(|f| f.key);
    match written {
        Ok(Some(row)) => {
            if old_key.is_some() && old_key != new_key {
                delete_quietly(store, old_key).await;
            }
            info!("Updated business {business_id}");
            Ok(row)
        }
        failed => {
            if logo.is_some() {
                delete_quietly(store, new_key).await;
            }
            match failed {
                Err(e) => Err(e.into()),
                _ => match get_business(pool, business_id).await {
                    Ok(_) => Err(AppError::Conflict(
                        "Business was changed by another request; reload and try again".to_string(),
                    )),
                    Err(e) => Err(e),
                },
            }
        }
    }
}

/// Soft-deletes the business, closes its open jobs and drops its logo.
pub async fn delete_business(
    pool: &PgPool,
    store: &dyn ObjectStore,
    business_id: Uuid,
    actor_id: Uuid,
) -> Result<(), AppError> {
    require_role(pool, business_id, actor_id, TeamRole::Owner).await?;

    let mut tx = pool.begin().await?;
    let existing = sqlx::query_as::<_, BusinessRow>(
        "SELECT * FROM businesses WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(business_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Business {business_id} not found")))?;
    sqlx::query(
        r#"
        UPDATE businesses SET
            deleted_at = now(), logo = NULL, version = version + 1, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(business_id)
    .execute(&mut *tx)
    .await?;
    let closed = sqlx::query(
        r#"
        UPDATE job_postings SET status = 'closed', updated_at = now()
        WHERE business_id = $1 AND status <> 'closed' AND deleted_at IS NULL
        "#,
    )
    .bind(business_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE products SET status = 'archived', updated_at = now() WHERE business_id = $1")
        .bind(business_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if let Some(logo) = existing.logo {
        delete_quietly(store, [logo.0.key]).await;
    }
    info!(
        "Deleted business {business_id}; closed {} job postings",
        closed.rows_affected()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::fixtures;
    use crate::storage::memory::MemoryObjectStore;
    use bytes::Bytes;
    use serde_json::json;

    fn logo() -> UploadedFile {
        UploadedFile {
            field_name: "logo".to_string(),
            file_name: "logo.png".to_string(),
            content_type: "image/png".to_string(),
            bytes: Bytes::from_static(b"png"),
        }
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    #[ignore] // requires postgres
    async fn test_concurrent_updates_keep_logo_object() {
        let pool = test_pool().await;
        let store = MemoryObjectStore::new();
        for _ in 0..10 {
            let owner = fixtures::user(&pool).await;
            let biz = create_business(
                &pool,
                &store,
                owner,
                fields(json!({"name": "Acme Supply", "industry": "logistics"})),
                Some(logo()),
            )
            .await
            .unwrap();

            let (replaced, renamed) = tokio::join!(
                update_business(&pool, &store, biz.id, owner, Map::new(), Some(logo())),
                update_business(&pool, &store, biz.id, owner, fields(json!({"name": "Acme Ltd"})), None)
            );
            for r in [&replaced, &renamed] {
                if let Err(e) = r {
                    assert!(matches!(e, AppError::Conflict(_)), "unexpected {e:?}");
                }
            }

            let stored = get_business(&pool, biz.id).await.unwrap();
            let key = stored.logo.expect("logo kept").0.key;
            assert!(store.contains(&key), "business references deleted logo {key}");
        }
    }

    #[tokio::test]
    #[ignore] // requires postgres
    async fn test_delete_removes_logo_and_hides_business() {
        let pool = test_pool().await;
        let store = MemoryObjectStore::new();
        let owner = fixtures::user(&pool).await;
        let biz = create_business(
            &pool,
            &store,
            owner,
            fields(json!({"name": "Acme Supply", "industry": "logistics"})),
            Some(logo()),
        )
        .await
        .unwrap();
        assert_eq!(store.len(), 1);

        delete_business(&pool, &store, biz.id, owner).await.unwrap();
        assert_eq!(store.len(), 0);
        assert!(matches!(
            get_business(&pool, biz.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
