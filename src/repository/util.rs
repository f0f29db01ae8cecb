//! Repository utilities.

use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Wrap a message as a diesel query error.
pub fn query_error(message: impl Into<String>) -> DieselError {
    DieselError::DatabaseError(DatabaseErrorKind::Unknown, Box::new(message.into()))
}

/// Quote a MySQL identifier with backticks, doubling any embedded backtick.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
