//! Authentication middleware that resolves API keys to user identities.
//!
//! Every API route is guarded by [auth_guard]: the middleware reads the
//! `Authorization: Bearer <api key>` header, hashes the key and looks the
//! hash up in the user table. On success the [crate::user::UserID] is placed
//! into the request extensions so that route handlers receive the identity
//! explicitly and can pass it into every database query.

use axum::{
    extract::{FromRef, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState, Error,
    user::{get_user_by_api_key_hash, hash_api_key},
};

/// The state needed for the auth middleware.
#[derive(Clone)]
pub struct AuthState {
    /// The database connection holding the user table.
    pub db_connection: std::sync::Arc<std::sync::Mutex<rusqlite::Connection>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Middleware function that checks for a valid API key.
///
/// The user ID is placed into the request and the request executed normally
/// if the key is valid, otherwise a 401 response is returned.
///
/// **Note**: Route handlers can use the function argument
/// `Extension(user_id): Extension<UserID>` to receive the user ID.
pub async fn auth_guard(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let api_key = match get_bearer_token(&request) {
        Some(api_key) => api_key,
        None => return Error::InvalidApiKey.into_response(),
    };

    let user_id = {
        let connection = match state.db_connection.lock() {
            Ok(connection) => connection,
            Err(error) => {
                tracing::error!("could not acquire database lock: {error}");
                return Error::DatabaseLockError.into_response();
            }
        };

        match get_user_by_api_key_hash(&hash_api_key(api_key), &connection) {
            Ok(user) => user.id,
            Err(Error::NotFound) => return Error::InvalidApiKey.into_response(),
            Err(error) => {
                tracing::error!("could not look up API key: {error}");
                return error.into_response();
            }
        }
    };

    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(user_id);
    let request = Request::from_parts(parts, body);

    next.run(request).await
}

fn get_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod auth_guard_tests {
    use axum::{
        Extension, Router,
        middleware,
        routing::get,
    };
    use axum_test::TestServer;
    use rusqlite::Connection;

    use crate::{
        db::initialize,
        user::{UserID, create_user, hash_api_key},
    };

    use super::{AuthState, auth_guard};

    const TEST_PROTECTED_ROUTE: &str = "/protected";
    const TEST_API_KEY: &str = "a-very-secret-key";

    async fn test_handler(Extension(user_id): Extension<UserID>) -> String {
        format!("user {user_id}")
    }

    fn get_test_server() -> TestServer {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        create_user("alice", &hash_api_key(TEST_API_KEY), &connection)
            .expect("Could not create test user");

        let state = AuthState {
            db_connection: std::sync::Arc::new(std::sync::Mutex::new(connection)),
        };

        let app = Router::new()
            .route(TEST_PROTECTED_ROUTE, get(test_handler))
            .route_layer(middleware::from_fn_with_state(state.clone(), auth_guard));

        TestServer::new(app)
    }

    #[tokio::test]
    async fn get_protected_route_with_valid_key() {
        let server = get_test_server();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .add_header("Authorization", format!("Bearer {TEST_API_KEY}"))
            .await;

        response.assert_status_ok();
        response.assert_text("user 1");
    }

    #[tokio::test]
    async fn get_protected_route_with_no_header_returns_401() {
        let server = get_test_server();

        let response = server.get(TEST_PROTECTED_ROUTE).await;

        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn get_protected_route_with_wrong_key_returns_401() {
        let server = get_test_server();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .add_header("Authorization", "Bearer not-the-key")
            .await;

        response.assert_status_unauthorized();
    }

    #[tokio::test]
    async fn get_protected_route_with_malformed_header_returns_401() {
        let server = get_test_server();

        let response = server
            .get(TEST_PROTECTED_ROUTE)
            .add_header("Authorization", TEST_API_KEY)
            .await;

        response.assert_status_unauthorized();
    }
}
