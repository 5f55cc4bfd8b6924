//! This file defines the `Transaction` type, the types needed to create and
//! filter transactions, and the API routes for the transaction type.
//!
//! A transaction is a single expense or income record. The route paths use
//! "expenses" for both kinds for compatibility with the original API, the
//! direction of the money flow is carried by [TransactionType].

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::{Connection, Row, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};

use crate::{
    AppState, Error,
    db::{decode_datetime, encode_datetime},
    extract::{AppJson, AppPath, AppQuery},
    user::UserID,
};

/// Whether a transaction records money spent or money earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money spent.
    Expense,
    /// Money earned.
    Income,
}

impl TransactionType {
    /// The string stored in the database and used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "expense" => Ok(TransactionType::Expense),
            "income" => Ok(TransactionType::Income),
            _ => Err(format!("{s} is not a valid transaction type")),
        }
    }
}

/// The ID of a transaction.
pub type TransactionId = i64;

/// An expense or income, i.e. an event where money was either spent or
/// earned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,

    /// The ID of the user that owns the transaction.
    pub user_id: UserID,

    /// A short title for the transaction, e.g. "Lunch".
    pub title: String,

    /// The amount of money spent or earned. Always non-negative.
    pub amount: f64,

    /// The category label of the transaction.
    ///
    /// A free-text label, not a reference to a [crate::category::Category]:
    /// deleting a category leaves this label in place.
    pub category: String,

    /// When the transaction happened.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,

    /// A text description of what the transaction was for.
    pub description: String,

    /// Whether the transaction is an expense or an income.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,

    /// When the transaction was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the transaction was last modified.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A validated set of transaction fields, ready to be written to the
/// database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// The title, trimmed and non-empty.
    pub title: String,
    /// The amount, non-negative.
    pub amount: f64,
    /// The category label, trimmed and non-empty.
    pub category: String,
    /// When the transaction happened.
    pub date: OffsetDateTime,
    /// The description, trimmed. May be empty.
    pub description: String,
    /// Whether the transaction is an expense or an income.
    pub transaction_type: TransactionType,
}

impl NewTransaction {
    /// Validate a set of transaction fields.
    ///
    /// `date` defaults to the current time when omitted.
    ///
    /// # Errors
    /// This function will return an:
    /// - [Error::EmptyTitle] if `title` is empty or only whitespace,
    /// - or [Error::NegativeAmount] if `amount` is less than zero,
    /// - or [Error::EmptyCategoryLabel] if `category` is empty or only
    ///   whitespace.
    pub fn new(
        title: &str,
        amount: f64,
        category: &str,
        date: Option<OffsetDateTime>,
        description: &str,
        transaction_type: TransactionType,
    ) -> Result<Self, Error> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::EmptyTitle);
        }

        if amount < 0.0 {
            return Err(Error::NegativeAmount(amount));
        }

        let category = category.trim();
        if category.is_empty() {
            return Err(Error::EmptyCategoryLabel);
        }

        Ok(Self {
            title: title.to_string(),
            amount,
            category: category.to_string(),
            date: date.unwrap_or_else(OffsetDateTime::now_utc),
            description: description.trim().to_string(),
            transaction_type,
        })
    }
}

/// Defines which of a user's transactions [query_transactions] should fetch.
///
/// Built once per request from the validated query parameters, never shared
/// or mutated across requests.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransactionFilter {
    /// Restrict to this month (1-12). Only applied together with `year`.
    pub month: Option<u8>,
    /// Restrict to this year. Only applied together with `month`.
    pub year: Option<i32>,
    /// Restrict to transactions with exactly this category label.
    pub category: Option<String>,
    /// Restrict to transactions of this type.
    pub transaction_type: Option<TransactionType>,
}

/// The inclusive date range covering the whole of `month` in `year`:
/// `[first day 00:00:00, last day 23:59:59]` in UTC.
///
/// # Errors
/// This function will return an [Error::InvalidMonth] if `month` is outside
/// 1-12, or an [Error::InvalidDate] if the year is out of range.
pub fn month_window(month: u8, year: i32) -> Result<(OffsetDateTime, OffsetDateTime), Error> {
    let calendar_month = Month::try_from(month).map_err(|_| Error::InvalidMonth(month))?;

    let first_day = Date::from_calendar_date(year, calendar_month, 1)
        .map_err(|error| Error::InvalidDate(error.to_string()))?;
    let last_day = Date::from_calendar_date(year, calendar_month, calendar_month.length(year))
        .map_err(|error| Error::InvalidDate(error.to_string()))?;

    let start = first_day.midnight().assume_utc();
    let end = last_day
        .with_hms(23, 59, 59)
        .map_err(|error| Error::InvalidDate(error.to_string()))?
        .assume_utc();

    Ok((start, end))
}

/// The state needed for the transaction endpoints.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The database connection holding the transaction table.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The data for creating a transaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionData {
    /// A short title for the transaction.
    pub title: String,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// The category label.
    pub category: String,
    /// When the transaction happened. Defaults to the current time.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
    /// A text description. Defaults to the empty string.
    pub description: Option<String>,
    /// Whether the transaction is an expense or an income. Defaults to
    /// expense.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

/// The data for partially updating a transaction.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateTransactionData {
    /// The new title, if it should change.
    pub title: Option<String>,
    /// The new amount, if it should change.
    pub amount: Option<f64>,
    /// The new category label, if it should change.
    pub category: Option<String>,
    /// The new date, if it should change.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub date: Option<OffsetDateTime>,
    /// The new description, if it should change.
    pub description: Option<String>,
    /// The new type, if it should change.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

/// The query parameters accepted by the transaction list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsParams {
    /// Restrict to this month (1-12). Only applied together with `year`.
    pub month: Option<u8>,
    /// Restrict to this year. Only applied together with `month`.
    pub year: Option<i32>,
    /// Restrict to transactions with exactly this category label.
    pub category: Option<String>,
    /// Restrict to transactions of this type.
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
}

/// A route handler for listing the caller's transactions, newest first.
pub async fn list_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    AppQuery(params): AppQuery<ListTransactionsParams>,
) -> Result<Json<Vec<Transaction>>, Error> {
    let filter = TransactionFilter {
        month: params.month,
        year: params.year,
        category: params.category,
        transaction_type: params.transaction_type,
    };

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    query_transactions(&filter, user_id, &connection).map(Json)
}

/// A route handler for getting a single transaction owned by the caller.
pub async fn get_transaction_endpoint(
    AppPath(transaction_id): AppPath<TransactionId>,
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_transaction(transaction_id, user_id, &connection).map(Json)
}

/// A route handler for creating a new transaction owned by the caller.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    AppJson(data): AppJson<TransactionData>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let new_transaction = NewTransaction::new(
        &data.title,
        data.amount,
        &data.category,
        data.date,
        data.description.as_deref().unwrap_or_default(),
        data.transaction_type.unwrap_or(TransactionType::Expense),
    )?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = create_transaction(new_transaction, user_id, &connection)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for partially updating a transaction owned by the caller.
pub async fn update_transaction_endpoint(
    AppPath(transaction_id): AppPath<TransactionId>,
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
    AppJson(data): AppJson<UpdateTransactionData>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let existing = get_transaction(transaction_id, user_id, &connection)?;

    let new_transaction = NewTransaction::new(
        data.title.as_deref().unwrap_or(&existing.title),
        data.amount.unwrap_or(existing.amount),
        data.category.as_deref().unwrap_or(&existing.category),
        Some(data.date.unwrap_or(existing.date)),
        data.description.as_deref().unwrap_or(&existing.description),
        data.transaction_type.unwrap_or(existing.transaction_type),
    )?;

    update_transaction(transaction_id, user_id, new_transaction, &connection).map(Json)
}

/// A route handler for deleting a transaction owned by the caller.
pub async fn delete_transaction_endpoint(
    AppPath(transaction_id): AppPath<TransactionId>,
    State(state): State<TransactionState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<serde_json::Value>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_transaction(transaction_id, user_id, &connection)?;

    Ok(Json(serde_json::json!({
        "message": "Expense deleted successfully"
    })))
}

/// Create a new transaction in the database.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn create_transaction(
    new_transaction: NewTransaction,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = encode_datetime(OffsetDateTime::now_utc())?;
    let date = encode_datetime(new_transaction.date)?;

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\"
                (user_id, title, amount, category, date, description, type, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id, user_id, title, amount, category, date, description, type,
                created_at, updated_at",
        )?
        .query_row(
            (
                user_id.as_i64(),
                &new_transaction.title,
                new_transaction.amount,
                &new_transaction.category,
                &date,
                &new_transaction.description,
                new_transaction.transaction_type.as_str(),
                &now,
                &now,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve the transaction with `transaction_id` if it is owned by
/// `user_id`.
///
/// # Errors
/// This function will return an [Error::NotFound] if the transaction does
/// not exist or belongs to another user, or an [Error::SqlError] if there is
/// some other SQL error.
pub fn get_transaction(
    transaction_id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "SELECT id, user_id, title, amount, category, date, description, type,
                created_at, updated_at
             FROM \"transaction\" WHERE id = :id AND user_id = :user_id",
        )?
        .query_row(
            &[(":id", &transaction_id), (":user_id", &user_id.as_i64())],
            map_transaction_row,
        )
        .map_err(|error| error.into())
}

/// Query for a user's transactions in the database, newest first.
///
/// The month/year window is only applied when both parts are present, and
/// covers `[first day 00:00:00, last day 23:59:59]` inclusive. Category and
/// type filters are exact matches.
///
/// # Errors
/// This function will return an [Error::InvalidMonth] or
/// [Error::InvalidDate] if the filter's month/year pair does not describe a
/// real month, or an [Error::SqlError] if there is a SQL error.
pub fn query_transactions(
    filter: &TransactionFilter,
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let mut where_clause_parts = vec!["user_id = ?1".to_string()];
    let mut query_parameters = vec![Value::Integer(user_id.as_i64())];

    if let (Some(month), Some(year)) = (filter.month, filter.year) {
        let (start, end) = month_window(month, year)?;

        where_clause_parts.push(format!(
            "date BETWEEN ?{} AND ?{}",
            query_parameters.len() + 1,
            query_parameters.len() + 2,
        ));
        query_parameters.push(Value::Text(encode_datetime(start)?));
        query_parameters.push(Value::Text(encode_datetime(end)?));
    }

    if let Some(category) = &filter.category {
        where_clause_parts.push(format!("category = ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(category.clone()));
    }

    if let Some(transaction_type) = filter.transaction_type {
        where_clause_parts.push(format!("type = ?{}", query_parameters.len() + 1));
        query_parameters.push(Value::Text(transaction_type.as_str().to_string()));
    }

    let query_string = format!(
        "SELECT id, user_id, title, amount, category, date, description, type,
            created_at, updated_at
         FROM \"transaction\" WHERE {} ORDER BY date DESC",
        where_clause_parts.join(" AND ")
    );

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters.iter()), map_transaction_row)?
        .map(|transaction_result| transaction_result.map_err(Error::SqlError))
        .collect()
}

/// Overwrite a transaction's fields in the database.
///
/// # Errors
/// This function will return an [Error::NotFound] if the transaction does
/// not exist or belongs to another user, or an [Error::SqlError] if there is
/// some other SQL error.
pub fn update_transaction(
    transaction_id: TransactionId,
    user_id: UserID,
    new_transaction: NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = encode_datetime(OffsetDateTime::now_utc())?;
    let date = encode_datetime(new_transaction.date)?;

    let rows_affected = connection.execute(
        "UPDATE \"transaction\"
         SET title = ?1, amount = ?2, category = ?3, date = ?4, description = ?5,
             type = ?6, updated_at = ?7
         WHERE id = ?8 AND user_id = ?9",
        (
            &new_transaction.title,
            new_transaction.amount,
            &new_transaction.category,
            &date,
            &new_transaction.description,
            new_transaction.transaction_type.as_str(),
            &now,
            transaction_id,
            user_id.as_i64(),
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    get_transaction(transaction_id, user_id, connection)
}

/// Delete a transaction from the database. Deletion is permanent.
///
/// # Errors
/// This function will return an [Error::NotFound] if the transaction does
/// not exist or belongs to another user, or an [Error::SqlError] if there is
/// some other SQL error.
pub fn delete_transaction(
    transaction_id: TransactionId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        (transaction_id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

pub(crate) fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                date TEXT NOT NULL,
                description TEXT NOT NULL,
                type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY(user_id) REFERENCES user(id)
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    // Composite index used by the list and summary queries.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let raw_type: String = row.get(7)?;
    let transaction_type = TransactionType::from_str(&raw_type).map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("invalid transaction type {raw_type:?}").into(),
        )
    })?;

    let date: String = row.get(5)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        title: row.get(2)?,
        amount: row.get(3)?,
        category: row.get(4)?,
        date: decode_datetime(5, &date)?,
        description: row.get(6)?,
        transaction_type,
        created_at: decode_datetime(8, &created_at)?,
        updated_at: decode_datetime(9, &updated_at)?,
    })
}



#[cfg(test)]
mod month_window_tests {
    use time::macros::datetime;

    use crate::Error;

    use super::month_window;

    #[test]
    fn covers_whole_month() {
        let (start, end) = month_window(3, 2024).unwrap();

        assert_eq!(start, datetime!(2024-03-01 00:00:00 UTC));
        assert_eq!(end, datetime!(2024-03-31 23:59:59 UTC));
    }

    #[test]
    fn february_in_leap_year_ends_on_the_29th() {
        let (_, end) = month_window(2, 2024).unwrap();

        assert_eq!(end, datetime!(2024-02-29 23:59:59 UTC));
    }

    #[test]
    fn february_in_common_year_ends_on_the_28th() {
        let (_, end) = month_window(2, 2023).unwrap();

        assert_eq!(end, datetime!(2023-02-28 23:59:59 UTC));
    }

    #[test]
    fn rejects_month_zero() {
        assert_eq!(month_window(0, 2024), Err(Error::InvalidMonth(0)));
    }

    #[test]
    fn rejects_month_thirteen() {
        assert_eq!(month_window(13, 2024), Err(Error::InvalidMonth(13)));
    }
}
