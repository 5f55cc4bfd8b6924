//! This file defines the `Category` type, the types needed to create a
//! category and the API routes for the category type.
//!
//! A category is a user-owned label definition (name, display color, icon).
//! Transactions reference categories by name only, so deleting a category
//! never touches the transactions that still carry its label.

use std::fmt::Display;
use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, State},
    http::StatusCode,
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    db::{decode_datetime, encode_datetime},
    extract::{AppJson, AppPath},
    user::UserID,
};

/// The display color assigned to categories created without one.
pub const DEFAULT_COLOR: &str = "#6366f1";

/// The icon assigned to categories created without one.
pub const DEFAULT_ICON: &str = "💰";

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// Leading and trailing whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// This function will return an [Error::EmptyCategoryName] if `name` is
    /// empty or only whitespace.
    pub fn new(name: &str) -> Result<Self, Error> {
        let name = name.trim();

        if name.is_empty() {
            Err(Error::EmptyCategoryName)
        } else {
            Ok(Self(name.to_string()))
        }
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure that the string is not empty.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the non-empty invariant is violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ID of a category.
pub type CategoryId = i64;

/// A user-owned category for expenses and income, e.g., 'Groceries', 'Rent'.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// The ID of the category.
    pub id: CategoryId,

    /// The ID of the user that owns the category.
    pub user_id: UserID,

    /// The name of the category. Unique per user.
    pub name: CategoryName,

    /// The display color as a hex string, e.g. "#6366f1".
    pub color: String,

    /// The display icon, e.g. an emoji glyph.
    pub icon: String,

    /// When the category was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the category was last modified.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The state needed for the category endpoints.
#[derive(Debug, Clone)]
pub struct CategoryState {
    /// The database connection holding the category table.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The data for creating a category.
#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryData {
    /// The name of the category.
    pub name: String,
    /// The display color. Defaults to [DEFAULT_COLOR].
    pub color: Option<String>,
    /// The display icon. Defaults to [DEFAULT_ICON].
    pub icon: Option<String>,
}

/// The data for partially updating a category.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateCategoryData {
    /// The new name, if it should change.
    pub name: Option<String>,
    /// The new display color, if it should change.
    pub color: Option<String>,
    /// The new display icon, if it should change.
    pub icon: Option<String>,
}

/// A route handler for listing the caller's categories, sorted by name.
pub async fn list_categories_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<Vec<Category>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    get_all_categories(user_id, &connection).map(Json)
}

/// A route handler for creating a new category owned by the caller.
pub async fn create_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    AppJson(data): AppJson<CategoryData>,
) -> Result<(StatusCode, Json<Category>), Error> {
    let name = CategoryName::new(&data.name)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = create_category(
        name,
        data.color.as_deref().unwrap_or(DEFAULT_COLOR),
        data.icon.as_deref().unwrap_or(DEFAULT_ICON),
        user_id,
        &connection,
    )?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// A route handler for partially updating a category owned by the caller.
pub async fn update_category_endpoint(
    AppPath(category_id): AppPath<CategoryId>,
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
    AppJson(data): AppJson<UpdateCategoryData>,
) -> Result<Json<Category>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let existing = get_category(category_id, user_id, &connection)?;

    let name = match data.name {
        Some(raw_name) => CategoryName::new(&raw_name)?,
        None => existing.name,
    };
    let color = data.color.unwrap_or(existing.color);
    let icon = data.icon.unwrap_or(existing.icon);

    update_category(category_id, user_id, name, &color, &icon, &connection).map(Json)
}

/// A route handler for deleting a category owned by the caller.
pub async fn delete_category_endpoint(
    AppPath(category_id): AppPath<CategoryId>,
    State(state): State<CategoryState>,
    Extension(user_id): Extension<UserID>,
) -> Result<Json<serde_json::Value>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_category(category_id, user_id, &connection)?;

    Ok(Json(serde_json::json!({
        "message": "Category deleted successfully"
    })))
}

/// Create a category in the database.
///
/// # Errors
/// This function will return an [Error::DuplicateCategoryName] if the user
/// already owns a category called `name`, or an [Error::SqlError] if there
/// is some other SQL error.
pub fn create_category(
    name: CategoryName,
    color: &str,
    icon: &str,
    user_id: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    let now = encode_datetime(OffsetDateTime::now_utc())?;

    let category = connection
        .prepare(
            "INSERT INTO category (user_id, name, color, icon, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, user_id, name, color, icon, created_at, updated_at",
        )?
        .query_row(
            (user_id.as_i64(), name.as_ref(), color, icon, &now, &now),
            map_row,
        )?;

    Ok(category)
}

/// Retrieve the category with `category_id` if it is owned by `user_id`.
///
/// # Errors
/// This function will return an [Error::NotFound] if the category does not
/// exist or belongs to another user, or an [Error::SqlError] if there is
/// some other SQL error.
pub fn get_category(
    category_id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare(
            "SELECT id, user_id, name, color, icon, created_at, updated_at
             FROM category WHERE id = :id AND user_id = :user_id;",
        )?
        .query_row(
            &[(":id", &category_id), (":user_id", &user_id.as_i64())],
            map_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve the categories owned by `user_id`, ordered by name ascending.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_categories(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, name, color, icon, created_at, updated_at
             FROM category WHERE user_id = :user_id ORDER BY name ASC;",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Update a category's name, color and icon in the database.
///
/// # Errors
/// This function will return an:
/// - [Error::NotFound] if the category does not exist or belongs to another
///   user,
/// - or [Error::DuplicateCategoryName] if the new name collides with another
///   category owned by the same user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_category(
    category_id: CategoryId,
    user_id: UserID,
    name: CategoryName,
    color: &str,
    icon: &str,
    connection: &Connection,
) -> Result<Category, Error> {
    let now = encode_datetime(OffsetDateTime::now_utc())?;

    let rows_affected = connection.execute(
        "UPDATE category SET name = ?1, color = ?2, icon = ?3, updated_at = ?4
         WHERE id = ?5 AND user_id = ?6",
        (name.as_ref(), color, icon, &now, category_id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    get_category(category_id, user_id, connection)
}

/// Delete a category from the database.
///
/// Transactions that carry the category's name as their label are left
/// untouched.
///
/// # Errors
/// This function will return an [Error::NotFound] if the category does not
/// exist or belongs to another user, or an [Error::SqlError] if there is
/// some other SQL error.
pub fn delete_category(
    category_id: CategoryId,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM category WHERE id = ?1 AND user_id = ?2",
        (category_id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

pub(crate) fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL,
            icon TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id),
            UNIQUE(user_id, name)
        );",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Category, rusqlite::Error> {
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Category {
        id: row.get(0)?,
        user_id: UserID::new(row.get(1)?),
        name: CategoryName::new_unchecked(&row.get::<_, String>(2)?),
        color: row.get(3)?,
        icon: row.get(4)?,
        created_at: decode_datetime(5, &created_at)?,
        updated_at: decode_datetime(6, &updated_at)?,
    })
}
