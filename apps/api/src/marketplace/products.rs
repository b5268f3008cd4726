use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::business::service::get_business;
use crate::errors::{is_foreign_key_violation, AppError};
use crate::marketplace::models::{ProductFields, ProductStatus};
use crate::models::marketplace::ProductRow;
use crate::pagination::{like_pattern, Page, PageParams};
use crate::patch::apply_patch;
use crate::team::roles::TeamRole;
use crate::team::service::{find_role, require_role};
use crate::validation::from_json;

#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub q: Option<String>,
    pub category: Option<String>,
    pub business_id: Option<Uuid>,
}

/// A product whose business has not been deleted.
pub async fn get_product(pool: &PgPool, product_id: Uuid) -> Result<ProductRow, AppError> {
    sqlx::query_as::<_, ProductRow>(
        r#"
        SELECT p.* FROM products p
        JOIN businesses b ON b.id = p.business_id
        WHERE p.id = $1 AND b.deleted_at IS NULL
        "#,
    )
        .bind(product_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {product_id} not found")))
}

/// Archived products stay visible to their own team.
pub async fn get_visible_product(
    pool: &PgPool,
    product_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<ProductRow, AppError> {
    let product = get_product(pool, product_id).await?;
    if product.status == ProductStatus::Active.as_str() {
        return Ok(product);
    }
    let is_team = match viewer {
        Some(user_id) => find_role(pool, product.business_id, user_id).await?.is_some(),
        None => false,
    };
    if is_team {
        Ok(product)
    } else {
        Err(AppError::NotFound(format!("Product {product_id} not found")))
    }
}

pub async fn list_active_products(
    pool: &PgPool,
    filter: &ProductFilter,
    params: &PageParams,
) -> Result<Page<ProductRow>, AppError> {
    let pattern = filter
        .q
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(like_pattern);
    let category = filter.category.as_deref().filter(|s| !s.trim().is_empty());

    const WHERE: &str = r#"
        FROM products p
        JOIN businesses b ON b.id = p.business_id
        WHERE p.status = 'active' AND b.deleted_at IS NULL
          AND ($1::text IS NULL OR p.name ILIKE $1 OR p.description ILIKE $1)
          AND ($2::text IS NULL OR p.category = $2)
          AND ($3::uuid IS NULL OR p.business_id = $3)
    "#;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {WHERE}"))
        .bind(pattern.as_deref())
        .bind(category)
        .bind(filter.business_id)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT p.* {WHERE} ORDER BY p.created_at DESC LIMIT $4 OFFSET $5"
    ))
    .bind(pattern.as_deref())
    .bind(category)
    .bind(filter.business_id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, params, total))
}

/// The full catalog of one business, archived entries included, for its team.
pub async fn list_business_products(
    pool: &PgPool,
    business_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<ProductRow>, AppError> {
    require_role(pool, business_id, user_id, TeamRole::Member).await?;
    Ok(sqlx::query_as::<_, ProductRow>(
        "SELECT * FROM products WHERE business_id = $1 ORDER BY created_at DESC",
    )
    .bind(business_id)
    .fetch_all(pool)
    .await?)
}

pub async fn create_product(
    pool: &PgPool,
    business_id: Uuid,
    user_id: Uuid,
    fields: Map<String, Value>,
) -> Result<ProductRow, AppError> {
    get_business(pool, business_id).await?;
    require_role(pool, business_id, user_id, TeamRole::Admin).await?;
    let product: ProductFields = from_json("product", Value::Object(fields))?;
    product.validate()?;

    let row = sqlx::query_as::<_, ProductRow>(
        r#"
        INSERT INTO products
            (id, business_id, name, description, category, unit_price_cents, currency,
             min_order_quantity, stock, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(business_id)
    .bind(product.name.trim())
    .bind(&product.description)
    .bind(product.category.trim())
    .bind(product.unit_price_cents)
    .bind(&product.currency)
    .bind(product.min_order_quantity)
    .bind(product.stock)
    .bind(product.status.as_str())
    .fetch_one(pool)
    .await?;
    info!("Business {business_id} listed product {}", row.id);
    Ok(row)
}

/// Locks a product of a live business for the rest of `tx`. Orders lock the
/// same rows before touching stock.
async fn lock_managed_product(
    pool: &PgPool,
    tx: &mut Transaction<'_, Postgres>,
    business_id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
) -> Result<ProductRow, AppError> {
    require_role(pool, business_id, user_id, TeamRole::Admin).await?;
    sqlx::query_as::<_, ProductRow>(
        r#"
        SELECT p.* FROM products p
        JOIN businesses b ON b.id = p.business_id
        WHERE p.id = $1 AND p.business_id = $2 AND b.deleted_at IS NULL
        FOR UPDATE OF p
        "#,
    )
    .bind(product_id)
    .bind(business_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {product_id} not found")))
}

pub async fn update_product(
    pool: &PgPool,
    business_id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    fields: Map<String, Value>,
) -> Result<ProductRow, AppError> {
    let mut tx = pool.begin().await?;
    let existing = lock_managed_product(pool, &mut tx, business_id, product_id, user_id).await?;
    let product = apply_patch("product", &ProductFields::from_row(&existing)?, fields)?;
    product.validate()?;

    let row = sqlx::query_as::<_, ProductRow>(
        r#"
        UPDATE products SET
            name = $2, description = $3, category = $4, unit_price_cents = $5, currency = $6,
            min_order_quantity = $7, stock = $8, status = $9, updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(product_id)
    .bind(product.name.trim())
    .bind(&product.description)
    .bind(product.category.trim())
    .bind(product.unit_price_cents)
    .bind(&product.currency)
    .bind(product.min_order_quantity)
    .bind(product.stock)
    .bind(product.status.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(row)
}

/// Products referenced by orders are archived rather than removed.
pub async fn delete_product(
    pool: &PgPool,
    business_id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    lock_managed_product(pool, &mut tx, business_id, product_id, user_id).await?;
    let ordered: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)")
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;
    if ordered {
        archive_product(&mut *tx, product_id).await?;
        tx.commit().await?;
        return Ok(());
    }

    let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await;
    match deleted {
        Ok(_) => {
            tx.commit().await?;
            info!("Deleted product {product_id}");
        }
        Err(e) if is_foreign_key_violation(&e) => {
            tx.rollback().await?;
            archive_product(pool, product_id).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn archive_product<'e, E>(executor: E, product_id: Uuid) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE products SET status = 'archived', updated_at = now() WHERE id = $1")
        .bind(product_id)
        .execute(executor)
        .await?;
    info!("Archived ordered product {product_id}");
    Ok(())
}
