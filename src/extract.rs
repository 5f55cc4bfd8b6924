//! Extractors that replace axum's built-in rejections with the crate's
//! [Error] type.
//!
//! The plain `Json`, `Query` and `Path` extractors reject malformed input
//! with plain-text responses and their own status codes. Wrapping them keeps
//! every error response in the `{"message": ...}` JSON shape with a 400
//! status.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::Error;

/// A JSON request body. Rejections become [Error::MalformedRequest].
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(Error::MalformedRequest(rejection.body_text())),
        }
    }
}

/// Deserialized query parameters. Rejections become
/// [Error::MalformedRequest].
pub struct AppQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(Error::MalformedRequest(rejection.body_text())),
        }
    }
}

/// A deserialized path parameter. Rejections become
/// [Error::MalformedRequest].
pub struct AppPath<T>(pub T);

impl<S, T> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(Error::MalformedRequest(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod extractor_rejection_tests {
    use axum::{Router, routing::post};
    use axum_test::TestServer;
    use serde::Deserialize;
    use serde_json::Value;

    use super::{AppJson, AppPath, AppQuery};

    #[derive(Deserialize)]
    struct TestBody {
        name: String,
    }

    #[derive(Deserialize)]
    struct TestParams {
        count: Option<u8>,
    }

    async fn test_handler(
        AppPath(id): AppPath<i64>,
        AppQuery(params): AppQuery<TestParams>,
        AppJson(body): AppJson<TestBody>,
    ) -> String {
        format!("{id} {:?} {}", params.count, body.name)
    }

    fn get_test_server() -> TestServer {
        TestServer::new(Router::new().route("/things/{id}", post(test_handler)))
    }

    #[tokio::test]
    async fn malformed_json_body_returns_json_400() {
        let server = get_test_server();

        let response = server
            .post("/things/1")
            .json(&serde_json::json!({"wrong_field": 1}))
            .await;

        response.assert_status_bad_request();
        assert!(response.json::<Value>()["message"].is_string());
    }

    #[tokio::test]
    async fn malformed_query_string_returns_json_400() {
        let server = get_test_server();

        let response = server
            .post("/things/1")
            .add_query_param("count", "lots")
            .json(&serde_json::json!({"name": "thing"}))
            .await;

        response.assert_status_bad_request();
        assert!(response.json::<Value>()["message"].is_string());
    }

    #[tokio::test]
    async fn malformed_path_parameter_returns_json_400() {
        let server = get_test_server();

        let response = server
            .post("/things/not-a-number")
            .json(&serde_json::json!({"name": "thing"}))
            .await;

        response.assert_status_bad_request();
        assert!(response.json::<Value>()["message"].is_string());
    }

    #[tokio::test]
    async fn well_formed_request_passes_through() {
        let server = get_test_server();

        let response = server
            .post("/things/1")
            .add_query_param("count", 3)
            .json(&serde_json::json!({"name": "thing"}))
            .await;

        response.assert_status_ok();
        response.assert_text("1 Some(3) thing");
    }
}
