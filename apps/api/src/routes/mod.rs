pub mod health;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::applications::handlers as applications;
use crate::auth::handlers as auth;
use crate::business::handlers as business;
use crate::config::Config;
use crate::connections::handlers as connections;
use crate::jobs::handlers as jobs;
use crate::marketplace::handlers as marketplace;
use crate::onboarding::handlers as onboarding;
use crate::profile::handlers as profile;
use crate::state::AppState;
use crate::team::handlers as team;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/v1/auth/register", post(auth::handle_register))
        .route("/api/v1/auth/login", post(auth::handle_login))
        .route("/api/v1/auth/me", get(auth::handle_me))
        // Profiles
        .route("/api/v1/profile", delete(profile::handle_delete_profile))
        .route("/api/v1/profile/create", post(profile::handle_create_profile))
        .route("/api/v1/profile/edit", put(profile::handle_edit_profile))
        .route(
            "/api/v1/profile/me/completeness",
            get(profile::handle_profile_completeness),
        )
        .route(
            "/api/v1/profile/certifications/:id/certificate",
            put(profile::handle_upload_certificate).delete(profile::handle_delete_certificate),
        )
        .route("/api/v1/profile/:id", get(profile::handle_get_profile))
        // Businesses and teams
        .route(
            "/api/v1/businesses",
            get(business::handle_list_businesses).post(business::handle_create_business),
        )
        .route(
            "/api/v1/businesses/:id",
            get(business::handle_get_business)
                .put(business::handle_update_business)
                .delete(business::handle_delete_business),
        )
        .route("/api/v1/me/businesses", get(business::handle_my_businesses))
        .route("/api/v1/businesses/:id/members", get(team::handle_list_members))
        .route(
            "/api/v1/businesses/:id/members/:user_id",
            patch(team::handle_change_role).delete(team::handle_remove_member),
        )
        .route(
            "/api/v1/businesses/:id/invitations",
            get(team::handle_list_invitations).post(team::handle_invite),
        )
        .route(
            "/api/v1/businesses/:id/invitations/:invitation_id",
            delete(team::handle_revoke_invitation),
        )
        .route("/api/v1/invitations/accept", post(team::handle_accept_invitation))
        // Jobs and applications
        .route("/api/v1/businesses/:id/jobs", post(jobs::handle_create_job))
        .route("/api/v1/jobs", get(jobs::handle_list_jobs))
        .route(
            "/api/v1/jobs/:id",
            get(jobs::handle_get_job)
                .put(jobs::handle_update_job)
                .delete(jobs::handle_delete_job),
        )
        .route(
            "/api/v1/jobs/:id/applications",
            get(applications::handle_list_job_applications).post(applications::handle_apply),
        )
        .route("/api/v1/me/applications", get(applications::handle_my_applications))
        .route(
            "/api/v1/applications/:id/status",
            patch(applications::handle_review_application),
        )
        .route(
            "/api/v1/applications/:id/withdraw",
            post(applications::handle_withdraw_application),
        )
        // Connections
        .route(
            "/api/v1/connections",
            get(connections::handle_list_connections).post(connections::handle_request_connection),
        )
        .route(
            "/api/v1/connections/:id",
            delete(connections::handle_delete_connection),
        )
        .route("/api/v1/connections/:id/accept", post(connections::handle_accept_connection))
        .route("/api/v1/connections/:id/reject", post(connections::handle_reject_connection))
        // Onboarding tours
        .route(
            "/api/v1/onboarding/:tour",
            get(onboarding::handle_get_tour).post(onboarding::handle_tour_action),
        )
        // Marketplace
        .route(
            "/api/v1/businesses/:id/products",
            get(marketplace::handle_list_business_products).post(marketplace::handle_create_product),
        )
        .route(
            "/api/v1/businesses/:id/products/:product_id",
            put(marketplace::handle_update_product).delete(marketplace::handle_delete_product),
        )
        .route("/api/v1/businesses/:id/orders", get(marketplace::handle_business_orders))
        .route("/api/v1/products", get(marketplace::handle_list_products))
        .route("/api/v1/products/:id", get(marketplace::handle_get_product))
        .route(
            "/api/v1/rfqs",
            get(marketplace::handle_list_rfqs).post(marketplace::handle_create_rfq),
        )
        .route("/api/v1/me/rfqs", get(marketplace::handle_my_rfqs))
        .route("/api/v1/rfqs/:id", get(marketplace::handle_get_rfq))
        .route(
            "/api/v1/rfqs/:id/quotes",
            get(marketplace::handle_list_quotes).post(marketplace::handle_submit_quote),
        )
        .route(
            "/api/v1/rfqs/:id/quotes/:quote_id/award",
            post(marketplace::handle_award_quote),
        )
        .route("/api/v1/rfqs/:id/close", post(marketplace::handle_close_rfq))
        .route("/api/v1/orders", post(marketplace::handle_place_order))
        .route("/api/v1/orders/:id", get(marketplace::handle_get_order))
        .route(
            "/api/v1/orders/:id/status",
            patch(marketplace::handle_update_order_status),
        )
        .route("/api/v1/me/orders", get(marketplace::handle_my_orders))
        .layer(body_limit)
        .with_state(state)
}

/// CORS for browser clients: the configured origins, or any origin when none
/// are configured.
pub fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    if config.cors_allowed_origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = config
        .cors_allowed_origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin '{o}'"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::jwt::JwtManager;
    use crate::cache::ProfileCache;
    use crate::config::Config;
    use crate::storage::memory::MemoryObjectStore;

    /// A state whose database and redis are never reached: every request
    /// below is answered before the handlers touch them.
    fn test_state() -> AppState {
        let config = Config::for_tests();
        AppState {
            db: PgPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap(),
            storage: Arc::new(MemoryObjectStore::new()),
            cache: ProfileCache::new(
                redis::Client::open(config.redis_url.clone()).unwrap(),
                config.profile_cache_ttl_seconds,
            ),
            jwt: Arc::new(JwtManager::new(&config.jwt_secret, config.jwt_ttl_seconds)),
            config,
        }
    }

    fn bearer(state: &AppState, user_id: Uuid) -> String {
        let token = state
            .jwt
            .generate_token(user_id, "ada@example.com")
            .unwrap();
        format!("Bearer {token}")
    }

    async fn send(state: AppState, req: Request<Body>) -> (StatusCode, Value) {
        let res = build_router(state).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, auth: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_configured_cors_origin_is_echoed() {
        let mut config = Config::for_tests();
        config.cors_allowed_origins = vec!["https://app.tradelink.io".to_string()];
        let app = build_router(test_state()).layer(cors_layer(&config).unwrap());

        let allowed = Request::get("/health")
            .header(header::ORIGIN, "https://app.tradelink.io")
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(allowed).await.unwrap();
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.tradelink.io"
        );

        let other = Request::get("/health")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(other).await.unwrap();
        assert!(res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[test]
    fn test_invalid_cors_origin_rejected() {
        let mut config = Config::for_tests();
        config.cors_allowed_origins = vec!["https://bad\norigin".to_string()];
        assert!(cors_layer(&config).is_err());
    }

    #[tokio::test]
    async fn test_health() {
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_profile_edit_requires_auth() {
        let req = json_request("PUT", "/api/v1/profile/edit", None, json!({"skills": []}));
        let (status, body) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let req = json_request(
            "POST",
            "/api/v1/profile/create",
            Some("Bearer not.a.jwt"),
            json!({}),
        );
        let (status, _) = send(test_state(), req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_profile_without_personal_information_is_400() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let req = json_request(
            "POST",
            "/api/v1/profile/create",
            Some(&auth),
            json!({"skills": [{"name": "Rust", "level": "expert"}]}),
        );
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "personal_information is required");
    }

    #[tokio::test]
    async fn test_empty_edit_is_400() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let req = json_request("PUT", "/api/v1/profile/edit", Some(&auth), json!({}));
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_connecting_with_yourself_is_400() {
        let state = test_state();
        let me = Uuid::new_v4();
        let auth = bearer(&state, me);
        let req = json_request(
            "POST",
            "/api/v1/connections",
            Some(&auth),
            json!({"addressee_id": me}),
        );
        let (status, _) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_tour_is_400() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let req = Request::get("/api/v1/onboarding/space_walk")
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let padding = "x".repeat(state.config.max_upload_bytes + 1);
        let req = json_request(
            "POST",
            "/api/v1/profile/create",
            Some(&auth),
            json!({"personal_information": {"first_name": padding, "last_name": "L"}}),
        );
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    async fn assert_validation_error(state: AppState, req: Request<Body>) {
        let (status, body) = send(state, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn test_register_missing_password_is_json_400() {
        let req = json_request("POST", "/api/v1/auth/register", None, json!({"email": "a@b.io"}));
        assert_validation_error(test_state(), req).await;
    }

    #[tokio::test]
    async fn test_malformed_json_body_is_json_400() {
        let req = Request::post("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"email\": "))
            .unwrap();
        assert_validation_error(test_state(), req).await;
    }

    #[tokio::test]
    async fn test_bad_uuid_in_body_and_path_is_json_400() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let req = json_request(
            "POST",
            "/api/v1/connections",
            Some(&auth),
            json!({"addressee_id": "not-a-uuid"}),
        );
        assert_validation_error(state.clone(), req).await;

        let req = Request::delete("/api/v1/connections/not-a-uuid")
            .header(header::AUTHORIZATION, auth)
            .body(Body::empty())
            .unwrap();
        assert_validation_error(state, req).await;
    }

    #[tokio::test]
    async fn test_unknown_tour_action_is_json_400() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let req = json_request(
            "POST",
            "/api/v1/onboarding/profile_setup",
            Some(&auth),
            json!({"action": "fly"}),
        );
        assert_validation_error(state, req).await;
    }

    #[tokio::test]
    async fn test_non_numeric_order_quantity_is_json_400() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let req = json_request(
            "POST",
            "/api/v1/orders",
            Some(&auth),
            json!({
                "business_id": Uuid::new_v4(),
                "items": [{"product_id": Uuid::new_v4(), "quantity": "many"}]
            }),
        );
        assert_validation_error(state, req).await;
    }

    #[tokio::test]
    async fn test_bad_query_parameter_is_json_400() {
        let req = Request::get("/api/v1/jobs?remote=maybe")
            .body(Body::empty())
            .unwrap();
        assert_validation_error(test_state(), req).await;
    }

    #[tokio::test]
    async fn test_certificate_upload_without_multipart_is_json_400() {
        let state = test_state();
        let auth = bearer(&state, Uuid::new_v4());
        let uri = format!("/api/v1/profile/certifications/{}/certificate", Uuid::new_v4());
        let req = json_request("PUT", &uri, Some(&auth), json!({}));
        assert_validation_error(state, req).await;
    }
}
