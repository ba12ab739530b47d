//! Router assembly.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers, middleware, state::AppState};

pub fn build_router(state: AppState) -> Router {
    // Routes behind API key authentication
    let authenticated_routes = Router::new()
        .route("/api/v1/me", get(handlers::wallet::me))
        .route("/api/v1/ledger", get(handlers::wallet::ledger))
        .route(
            "/api/v1/funding-requests",
            post(handlers::funding::submit_funding_request)
                .get(handlers::funding::list_funding_requests),
        )
        .route(
            "/api/v1/payments/verify",
            post(handlers::funding::verify_payment),
        )
        .route(
            "/api/v1/orders",
            post(handlers::orders::place_order).get(handlers::orders::list_orders),
        )
        .route(
            "/api/v1/orders/status",
            get(handlers::orders::order_status_query).post(handlers::orders::order_status_body),
        )
        .route("/api/v1/orders/{id}", get(handlers::orders::get_order))
        // Admin routes
        .route(
            "/api/v1/admin/funding-requests",
            get(handlers::admin::list_funding_requests),
        )
        .route(
            "/api/v1/admin/funding-requests/{id}/approve",
            post(handlers::admin::approve_funding_request),
        )
        .route(
            "/api/v1/admin/funding-requests/{id}/reject",
            post(handlers::admin::reject_funding_request),
        )
        .route("/api/v1/admin/orders", get(handlers::admin::list_orders))
        .route(
            "/api/v1/admin/orders/{id}/approve",
            post(handlers::admin::approve_order),
        )
        .route(
            "/api/v1/admin/orders/{id}/reject",
            post(handlers::admin::reject_order),
        )
        .route(
            "/api/v1/admin/compensations",
            get(handlers::admin::list_compensations),
        )
        .route(
            "/api/v1/admin/compensations/{id}/replay",
            post(handlers::admin::replay_compensation),
        )
        .route("/api/v1/admin/users", post(handlers::admin::create_user))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        // Public routes (no API key; the webhook checks its own secret)
        .route("/health", get(handlers::health::health_check))
        .route("/api/v1/webhooks/sms", post(handlers::webhooks::receive_sms))
        .merge(authenticated_routes)
        // The storefront calls the API from the browser
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
