//! Database initialization and the date-time encoding shared by the
//! application's domain models.

use rusqlite::Connection;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

use crate::{
    Error, category::create_category_table, transaction::create_transaction_table,
    user::create_user_table,
};

/// Create the tables for all domain models.
///
/// Tables are only created if they do not already exist, so it is safe to
/// call this on every start-up.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    create_user_table(connection)?;
    create_category_table(connection)?;
    create_transaction_table(connection)?;

    Ok(())
}

/// Encode a date-time for storage as a TEXT column.
///
/// Values are normalized to UTC and truncated to whole seconds so that the
/// stored RFC 3339 strings are uniform in length and compare
/// lexicographically in date order. Range queries and `ORDER BY date` rely
/// on this.
///
/// # Errors
/// This function will return an [Error::InvalidDate] if the value cannot be
/// represented, e.g. a year outside the RFC 3339 range.
pub(crate) fn encode_datetime(value: OffsetDateTime) -> Result<String, Error> {
    value
        .to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .map_err(|error| Error::InvalidDate(error.to_string()))?
        .format(&Rfc3339)
        .map_err(|error| Error::InvalidDate(error.to_string()))
}

/// Decode a date-time stored by [encode_datetime].
///
/// Intended for use in `map_row` functions, so the error is a
/// `rusqlite::Error` that can be propagated from a row mapper.
pub(crate) fn decode_datetime(
    column_index: usize,
    text: &str,
) -> Result<OffsetDateTime, rusqlite::Error> {
    OffsetDateTime::parse(text, &Rfc3339).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            column_index,
            rusqlite::types::Type::Text,
            Box::new(error),
        )
    })
}
