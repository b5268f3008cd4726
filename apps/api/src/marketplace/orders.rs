use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::business::service::get_business;
use crate::errors::AppError;
use crate::marketplace::models::{
    check_order_transition, price_order, NewOrder, OrderParty, OrderStatus,
};
use crate::models::marketplace::{OrderDetail, OrderItemRow, OrderRow, ProductRow};
use crate::team::roles::TeamRole;
use crate::team::service::{find_role, require_role};

async fn load_items(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderItemRow>, AppError> {
    Ok(sqlx::query_as::<_, OrderItemRow>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY product_id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?)
}

/// Places an order, pricing it and reserving stock in one transaction.
pub async fn place_order(
    pool: &PgPool,
    buyer_id: Uuid,
    order: NewOrder,
) -> Result<OrderDetail, AppError> {
    order.validate()?;
    get_business(pool, order.business_id).await?;
    if find_role(pool, order.business_id, buyer_id).await?.is_some() {
        return Err(AppError::Validation(
            "You cannot order from your own business".to_string(),
        ));
    }

    let product_ids: Vec<Uuid> = order.items.iter().map(|l| l.product_id).collect();
    let mut tx = pool.begin().await?;
    let products = sqlx::query_as::<_, ProductRow>(
        "SELECT * FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&product_ids)
    .fetch_all(&mut *tx)
    .await?;
    let priced = price_order(&order, &products)?;

    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        INSERT INTO orders (id, buyer_id, business_id, status, total_cents, currency)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(buyer_id)
    .bind(order.business_id)
    .bind(OrderStatus::Pending.as_str())
    .bind(priced.total_cents)
    .bind(&priced.currency)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(priced.lines.len());
    for line in &priced.lines {
        let item = sqlx::query_as::<_, OrderItemRow>(
            r#"
            INSERT INTO order_items (order_id, product_id, quantity, unit_price_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = now() WHERE id = $1")
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        items.push(item);
    }
    tx.commit().await?;

    info!(
        "User {buyer_id} placed order {} with business {} ({} {})",
        row.id, row.business_id, row.total_cents, row.currency
    );
    Ok(OrderDetail { order: row, items })
}

async fn party_of(pool: &PgPool, order: &OrderRow, user_id: Uuid) -> Result<Option<OrderParty>, AppError> {
    if order.buyer_id == user_id {
        return Ok(Some(OrderParty::Buyer));
    }
    Ok(find_role(pool, order.business_id, user_id)
        .await?
        .map(|_| OrderParty::Seller))
}

pub async fn get_order(pool: &PgPool, order_id: Uuid, user_id: Uuid) -> Result<OrderDetail, AppError> {
    let order = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;
    if party_of(pool, &order, user_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Order {order_id} not found")));
    }
    let items = load_items(pool, order_id).await?;
    Ok(OrderDetail { order, items })
}

pub async fn list_my_orders(pool: &PgPool, buyer_id: Uuid) -> Result<Vec<OrderRow>, AppError> {
    Ok(
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC")
            .bind(buyer_id)
            .fetch_all(pool)
            .await?,
    )
}

pub async fn list_business_orders(
    pool: &PgPool,
    business_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<OrderRow>, AppError> {
    require_role(pool, business_id, user_id, TeamRole::Member).await?;
    Ok(sqlx::query_as::<_, OrderRow>(
        "SELECT * FROM orders WHERE business_id = $1 ORDER BY created_at DESC",
    )
    .bind(business_id)
    .fetch_all(pool)
    .await?)
}

async fn restore_stock(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE products p SET stock = p.stock + i.quantity, updated_at = now()
        FROM order_items i
        WHERE i.order_id = $1 AND i.product_id = p.id
        "#,
    )
    .bind(order_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn update_order_status(
    pool: &PgPool,
    order_id: Uuid,
    user_id: Uuid,
    next: OrderStatus,
) -> Result<OrderDetail, AppError> {
    let mut tx = pool.begin().await?;
    let order = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;

    let party = match party_of(pool, &order, user_id).await? {
        Some(OrderParty::Seller) => {
            require_role(pool, order.business_id, user_id, TeamRole::Admin).await?;
            OrderParty::Seller
        }
        Some(party) => party,
        None => return Err(AppError::NotFound(format!("Order {order_id} not found"))),
    };

    let current = OrderStatus::parse(&order.status).ok_or_else(|| {
        anyhow::anyhow!("Order {order_id} has unknown status {}", order.status)
    })?;
    check_order_transition(party, current, next)?;

    if next == OrderStatus::Cancelled {
        restore_stock(&mut tx, order_id).await?;
    }
    let order = sqlx::query_as::<_, OrderRow>(
        "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(order_id)
    .bind(next.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        "Order {order_id} moved from {} to {}",
        current.as_str(),
        next.as_str()
    );
    let items = load_items(pool, order_id).await?;
    Ok(OrderDetail { order, items })
}
