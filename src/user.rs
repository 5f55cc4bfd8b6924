//! This file defines the `User` type and its database queries.
//!
//! A user is the owner of categories and transactions. The REST API never
//! creates users, they are provisioned with the `add_user` binary which
//! hands out an API key. Only the SHA-256 hash of the key is stored.

use std::fmt::Display;

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Error;

/// The ID of a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The ID as an integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered user that owns categories and transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// The ID of the user.
    pub id: UserID,

    /// The display name of the user.
    pub name: String,

    /// The SHA-256 hex digest of the user's API key.
    pub api_key_hash: String,
}

/// Hash an API key for storage or look-up.
pub fn hash_api_key(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());

    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Create a user in the database.
///
/// # Errors
/// This function will return an [Error::DuplicateUserName] if a user with
/// `name` already exists, or an [Error::SqlError] if there is some other SQL
/// error.
pub fn create_user(name: &str, api_key_hash: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .execute(
            "INSERT INTO user (name, api_key) VALUES (?1, ?2);",
            (name, api_key_hash),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                Some(ref desc),
            ) if desc.contains("user.name") => Error::DuplicateUserName(name.to_owned()),
            error => error.into(),
        })?;

    let id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        id,
        name: name.to_owned(),
        api_key_hash: api_key_hash.to_owned(),
    })
}

/// Retrieve a user by the hash of their API key.
///
/// # Errors
/// This function will return an [Error::NotFound] if no user has the given
/// API key hash, or an [Error::SqlError] if there is some other SQL error.
pub fn get_user_by_api_key_hash(api_key_hash: &str, connection: &Connection) -> Result<User, Error> {
    connection
        .prepare("SELECT id, name, api_key FROM user WHERE api_key = :api_key;")?
        .query_row(&[(":api_key", api_key_hash)], map_row)
        .map_err(|error| error.into())
}

/// Generate a fresh API key as 64 hex characters.
///
/// Uses SQLite's `randomblob` so no extra dependency is needed for
/// cryptographic randomness.
///
/// # Errors
/// This function will return an [Error::SqlError] if there is an SQL error.
pub fn generate_api_key(connection: &Connection) -> Result<String, Error> {
    connection
        .query_row("SELECT lower(hex(randomblob(32)));", [], |row| row.get(0))
        .map_err(|error| error.into())
}

pub(crate) fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS user (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            api_key TEXT NOT NULL UNIQUE
        );

        CREATE INDEX IF NOT EXISTS idx_user_api_key ON user(api_key);",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<User, rusqlite::Error> {
    Ok(User {
        id: UserID::new(row.get(0)?),
        name: row.get(1)?,
        api_key_hash: row.get(2)?,
    })
}

#[cfg(test)]
mod user_query_tests {
    use rusqlite::Connection;

    use crate::{Error, db::initialize};

    use super::{create_user, generate_api_key, get_user_by_api_key_hash, hash_api_key};

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");
        connection
    }

    #[test]
    fn create_user_succeeds() {
        let connection = get_test_db_connection();

        let user = create_user("alice", &hash_api_key("opensesame"), &connection)
            .expect("Could not create user");

        assert!(user.id.as_i64() > 0);
        assert_eq!(user.name, "alice");
    }

    #[test]
    fn create_user_fails_on_duplicate_name() {
        let connection = get_test_db_connection();
        create_user("alice", &hash_api_key("one"), &connection).expect("Could not create user");

        let result = create_user("alice", &hash_api_key("two"), &connection);

        assert_eq!(result, Err(Error::DuplicateUserName("alice".to_owned())));
    }

    #[test]
    fn create_user_with_duplicate_api_key_is_not_a_duplicate_name() {
        let connection = get_test_db_connection();
        let api_key_hash = hash_api_key("shared");
        create_user("alice", &api_key_hash, &connection).expect("Could not create user");

        let result = create_user("bob", &api_key_hash, &connection);

        assert!(matches!(result, Err(Error::SqlError(_))));
    }

    #[test]
    fn get_user_by_api_key_hash_round_trips() {
        let connection = get_test_db_connection();
        let api_key_hash = hash_api_key("opensesame");
        let inserted_user =
            create_user("alice", &api_key_hash, &connection).expect("Could not create user");

        let selected_user = get_user_by_api_key_hash(&api_key_hash, &connection);

        assert_eq!(Ok(inserted_user), selected_user);
    }

    #[test]
    fn get_user_with_unknown_hash_returns_not_found() {
        let connection = get_test_db_connection();
        create_user("alice", &hash_api_key("opensesame"), &connection)
            .expect("Could not create user");

        let selected_user = get_user_by_api_key_hash(&hash_api_key("wrong"), &connection);

        assert_eq!(selected_user, Err(Error::NotFound));
    }

    #[test]
    fn generated_api_keys_are_unique_hex() {
        let connection = get_test_db_connection();

        let first = generate_api_key(&connection).expect("Could not generate key");
        let second = generate_api_key(&connection).expect("Could not generate key");

        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }

    #[test]
    fn hash_api_key_is_deterministic() {
        assert_eq!(hash_api_key("foo"), hash_api_key("foo"));
        assert_ne!(hash_api_key("foo"), hash_api_key("bar"));
    }
}
