//! Spendtrack is a small web service for tracking personal income and
//! expenses.
//!
//! This library provides a JSON REST API over a SQLite database: users record
//! transactions under free-text category labels, manage their category
//! records, and read summary statistics over a month/year window. Every
//! record is scoped to the user that created it.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde::Serialize;
use tokio::signal;

mod app_state;
mod auth;
mod category;
mod db;
pub mod endpoints;
mod extract;
mod routing;
mod summary;
mod transaction;
mod user;

pub use app_state::AppState;
pub use db::initialize as initialize_db;
pub use routing::build_router;
pub use user::{User, UserID, create_user, generate_api_key, hash_api_key};

/// An async task that waits for either the ctrl+c or terminate signal,
/// whichever comes first, and then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An empty string was used to create a category name.
    #[error("Category name cannot be empty")]
    EmptyCategoryName,

    /// The category name is already taken by another category owned by the
    /// same user.
    #[error("Category name already exists")]
    DuplicateCategoryName,

    /// An empty string was used for an expense title.
    #[error("Expense title cannot be empty")]
    EmptyTitle,

    /// An empty string was used for an expense's category label.
    #[error("Expense category cannot be empty")]
    EmptyCategoryLabel,

    /// A negative amount was used to create or update an expense.
    ///
    /// Amounts record magnitudes, the direction of the money flow is carried
    /// by the transaction type.
    #[error("{0} is a negative amount, which is not allowed")]
    NegativeAmount(f64),

    /// A month outside 1-12 was used in a query filter.
    #[error("{0} is not a valid month, expected a number from 1 to 12")]
    InvalidMonth(u8),

    /// A date could not be constructed or parsed.
    ///
    /// Callers should pass in the original error as a string.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// The request body, query string or path could not be deserialized.
    ///
    /// Produced by the extractors in `extract.rs` so that malformed requests
    /// get the same JSON error body as every other failure.
    #[error("{0}")]
    MalformedRequest(String),

    /// The specified user name already exists in the database.
    #[error("the user \"{0}\" already exists in the database")]
    DuplicateUserName(String),

    /// The request did not carry a valid API key.
    #[error("invalid or missing API key")]
    InvalidApiKey,

    /// The requested resource was not found.
    ///
    /// Also returned when the resource exists but is owned by another user,
    /// so that callers cannot probe for other users' records.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("category.") =>
            {
                Error::DuplicateCategoryName
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

/// The JSON body used for all error responses.
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::EmptyCategoryName
            | Error::DuplicateCategoryName
            | Error::EmptyTitle
            | Error::EmptyCategoryLabel
            | Error::NegativeAmount(_)
            | Error::InvalidMonth(_)
            | Error::InvalidDate(_)
            | Error::MalformedRequest(_)
            | Error::DuplicateUserName(_) => StatusCode::BAD_REQUEST,
            Error::InvalidApiKey => StatusCode::UNAUTHORIZED,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::DatabaseLockError | Error::SqlError(_) => {
                tracing::error!("An unexpected error occurred: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
