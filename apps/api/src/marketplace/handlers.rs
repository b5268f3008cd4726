use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::errors::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::marketplace::models::{NewOrder, NewQuote, NewRfq, OrderStatus};
use crate::marketplace::products::ProductFilter;
use crate::marketplace::rfqs::RfqFilter;
use crate::marketplace::{orders, products, rfqs};
use crate::models::marketplace::{OrderDetail, OrderRow, ProductRow, QuoteRow, RfqRow};
use crate::pagination::{Page, PageParams};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

// Products

/// POST /api/v1/businesses/:id/products
pub async fn handle_create_product(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
    AppJson(fields): AppJson<Map<String, Value>>,
) -> Result<(StatusCode, Json<ProductRow>), AppError> {
    let row = products::create_product(&state.db, business_id, auth.user_id, fields).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/businesses/:id/products
pub async fn handle_list_business_products(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
) -> Result<Json<Vec<ProductRow>>, AppError> {
    Ok(Json(
        products::list_business_products(&state.db, business_id, auth.user_id).await?,
    ))
}

/// PUT /api/v1/businesses/:id/products/:product_id
pub async fn handle_update_product(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((business_id, product_id)): AppPath<(Uuid, Uuid)>,
    AppJson(fields): AppJson<Map<String, Value>>,
) -> Result<Json<ProductRow>, AppError> {
    if fields.is_empty() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }
    Ok(Json(
        products::update_product(&state.db, business_id, product_id, auth.user_id, fields).await?,
    ))
}

/// DELETE /api/v1/businesses/:id/products/:product_id
pub async fn handle_delete_product(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((business_id, product_id)): AppPath<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    products::delete_product(&state.db, business_id, product_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/products
pub async fn handle_list_products(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PageParams>,
    AppQuery(filter): AppQuery<ProductFilter>,
) -> Result<Json<Page<ProductRow>>, AppError> {
    Ok(Json(
        products::list_active_products(&state.db, &filter, &params).await?,
    ))
}

/// GET /api/v1/products/:id
pub async fn handle_get_product(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    AppPath(product_id): AppPath<Uuid>,
) -> Result<Json<ProductRow>, AppError> {
    let viewer = viewer.map(|v| v.user_id);
    Ok(Json(
        products::get_visible_product(&state.db, product_id, viewer).await?,
    ))
}

// RFQs

/// POST /api/v1/rfqs
pub async fn handle_create_rfq(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(rfq): AppJson<NewRfq>,
) -> Result<(StatusCode, Json<RfqRow>), AppError> {
    let row = rfqs::create_rfq(&state.db, auth.user_id, rfq).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/rfqs
pub async fn handle_list_rfqs(
    State(state): State<AppState>,
    AppQuery(params): AppQuery<PageParams>,
    AppQuery(filter): AppQuery<RfqFilter>,
) -> Result<Json<Page<RfqRow>>, AppError> {
    Ok(Json(rfqs::list_open_rfqs(&state.db, &filter, &params).await?))
}

/// GET /api/v1/me/rfqs
pub async fn handle_my_rfqs(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<RfqRow>>, AppError> {
    Ok(Json(rfqs::list_my_rfqs(&state.db, auth.user_id).await?))
}

/// GET /api/v1/rfqs/:id
pub async fn handle_get_rfq(
    State(state): State<AppState>,
    AppPath(rfq_id): AppPath<Uuid>,
) -> Result<Json<RfqRow>, AppError> {
    Ok(Json(rfqs::get_rfq(&state.db, rfq_id).await?))
}

/// POST /api/v1/rfqs/:id/quotes
pub async fn handle_submit_quote(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(rfq_id): AppPath<Uuid>,
    AppJson(quote): AppJson<NewQuote>,
) -> Result<(StatusCode, Json<QuoteRow>), AppError> {
    let row = rfqs::submit_quote(&state.db, rfq_id, auth.user_id, quote).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/v1/rfqs/:id/quotes
pub async fn handle_list_quotes(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(rfq_id): AppPath<Uuid>,
) -> Result<Json<Vec<QuoteRow>>, AppError> {
    Ok(Json(rfqs::list_quotes(&state.db, rfq_id, auth.user_id).await?))
}

/// POST /api/v1/rfqs/:id/quotes/:quote_id/award
pub async fn handle_award_quote(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath((rfq_id, quote_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Json<RfqRow>, AppError> {
    Ok(Json(
        rfqs::award_quote(&state.db, rfq_id, quote_id, auth.user_id).await?,
    ))
}

/// POST /api/v1/rfqs/:id/close
pub async fn handle_close_rfq(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(rfq_id): AppPath<Uuid>,
) -> Result<Json<RfqRow>, AppError> {
    Ok(Json(rfqs::close_rfq(&state.db, rfq_id, auth.user_id).await?))
}

// Orders

/// POST /api/v1/orders
pub async fn handle_place_order(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(order): AppJson<NewOrder>,
) -> Result<(StatusCode, Json<OrderDetail>), AppError> {
    let detail = orders::place_order(&state.db, auth.user_id, order).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// GET /api/v1/orders/:id
pub async fn handle_get_order(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(orders::get_order(&state.db, order_id, auth.user_id).await?))
}

/// GET /api/v1/me/orders
pub async fn handle_my_orders(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<OrderRow>>, AppError> {
    Ok(Json(orders::list_my_orders(&state.db, auth.user_id).await?))
}

/// GET /api/v1/businesses/:id/orders
pub async fn handle_business_orders(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(business_id): AppPath<Uuid>,
) -> Result<Json<Vec<OrderRow>>, AppError> {
    Ok(Json(
        orders::list_business_orders(&state.db, business_id, auth.user_id).await?,
    ))
}

/// PATCH /api/v1/orders/:id/status
pub async fn handle_update_order_status(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(order_id): AppPath<Uuid>,
    AppJson(req): AppJson<OrderStatusRequest>,
) -> Result<Json<OrderDetail>, AppError> {
    Ok(Json(
        orders::update_order_status(&state.db, order_id, auth.user_id, req.status).await?,
    ))
}
