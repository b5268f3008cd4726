//! Row builders for database-backed tests.

use sqlx::PgPool;
use uuid::Uuid;

use crate::team::roles::TeamRole;

pub async fn user(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, password_hash, full_name) VALUES ($1, $2, 'x', 'Test User')")
        .bind(id)
        .bind(format!("{id}@example.test"))
        .execute(pool)
        .await
        .unwrap();
    id
}

pub async fn business(pool: &PgPool, owner: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO businesses (id, owner_id, name, industry) VALUES ($1, $2, 'Acme Supply', 'logistics')")
        .bind(id)
        .bind(owner)
        .execute(pool)
        .await
        .unwrap();
    member(pool, id, owner, TeamRole::Owner).await;
    id
}

pub async fn member(pool: &PgPool, business_id: Uuid, user_id: Uuid, role: TeamRole) {
    sqlx::query("INSERT INTO business_members (business_id, user_id, role) VALUES ($1, $2, $3)")
        .bind(business_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(pool)
        .await
        .unwrap();
}

pub async fn product(pool: &PgPool, business_id: Uuid, stock: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO products
            (id, business_id, name, category, unit_price_cents, currency,
             min_order_quantity, stock, status)
        VALUES ($1, $2, 'Pallet wrap', 'packaging', 1250, 'USD', 1, $3, 'active')
        "#,
    )
    .bind(id)
    .bind(business_id)
    .bind(stock)
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn soft_delete_business(pool: &PgPool, business_id: Uuid) {
    sqlx::query("UPDATE businesses SET deleted_at = now() WHERE id = $1")
        .bind(business_id)
        .execute(pool)
        .await
        .unwrap();
}
