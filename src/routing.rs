//! Application router configuration.
//!
//! All API routes sit behind the auth middleware. The summary route is
//! registered alongside the single-expense route, the static segment
//! `stats/summary` takes precedence over the `{expense_id}` parameter.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    routing::{get, put},
};
use crate::{
    AppState, Error,
    auth::auth_guard,
    category::{
        create_category_endpoint, delete_category_endpoint, list_categories_endpoint,
        update_category_endpoint,
    },
    endpoints,
    summary::get_summary_endpoint,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transaction_endpoint,
        list_transactions_endpoint, update_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::CATEGORIES,
            get(list_categories_endpoint).post(create_category_endpoint),
        )
        .route(
            endpoints::CATEGORY,
            put(update_category_endpoint).delete(delete_category_endpoint),
        )
        .route(
            endpoints::EXPENSES,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::EXPENSE,
            get(get_transaction_endpoint)
                .put(update_transaction_endpoint)
                .delete(delete_transaction_endpoint),
        )
        .route(endpoints::EXPENSE_SUMMARY, get(get_summary_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard))
        .fallback(get_json_not_found)
        .with_state(state)
}

/// The fallback for unknown routes, kept as JSON like every other response.
async fn get_json_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "message": Error::NotFound.to_string()
        })),
    )
}

#[cfg(test)]
mod fallback_route_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use super::get_json_not_found;

    #[tokio::test]
    async fn unknown_route_returns_json_404() {
        let response = get_json_not_found().await.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
