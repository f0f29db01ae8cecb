//! Row store for the full-text work queue.
//!
//! [`FulltextStore`] is the seam between the worker and MySQL. Table and
//! column names come from project profiles and are spliced into SQL as
//! quoted identifiers; all values travel as bind parameters.

mod memory;
mod mysql;
mod util;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProjectProfile;

pub use memory::{MemoryRow, MemoryStore};
pub use mysql::{MysqlConn, MysqlStore};
pub use util::{query_error, quote_ident};

/// Prefix shared by every status placeholder written into the full-text column.
pub const PLACEHOLDER_PREFIX: &str = "[file_";

/// Errors from the row store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to connect to {host}: {message}")]
    Connect { host: String, message: String },

    #[error("Database error: {0}")]
    Query(#[from] diesel::result::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One configured table inside one concrete database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableTarget {
    pub database: String,
    pub project: String,
    pub table: String,
    pub id_col: String,
    pub file_path_col: String,
    pub full_text_col: String,
}

impl TableTarget {
    pub fn new(database: &str, profile: &ProjectProfile) -> Self {
        Self {
            database: database.to_string(),
            project: profile.project_name.clone(),
            table: profile.table_name.clone(),
            id_col: profile.id_col.clone(),
            file_path_col: profile.file_path_col.clone(),
            full_text_col: profile.full_text_col.clone(),
        }
    }

    /// `` `db`.`table` `` for use in SQL text.
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", quote_ident(&self.database), quote_ident(&self.table))
    }
}

impl std::fmt::Display for TableTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// A row whose full-text column was empty when it was picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Row id rendered as text; written back as a bind parameter.
    pub id: String,
    pub file_path: Option<String>,
    pub full_text: Option<String>,
}

/// Storage operations the worker needs.
#[async_trait]
pub trait FulltextStore: Send + Sync {
    /// Every database name visible to the connection.
    async fn list_databases(&self) -> StoreResult<Vec<String>>;

    /// Whether `table` exists in `database`.
    async fn table_exists(&self, database: &str, table: &str) -> StoreResult<bool>;

    /// A random row whose full-text column is empty or NULL.
    async fn pick_eligible(&self, target: &TableTarget) -> StoreResult<Option<WorkItem>>;

    /// Write `marker` into the row only if its full-text column is still empty.
    ///
    /// Returns `false` when another worker claimed the row first.
    async fn claim(&self, target: &TableTarget, id: &str, marker: &str) -> StoreResult<bool>;

    /// Overwrite the full-text column of one row.
    async fn write_fulltext(&self, target: &TableTarget, id: &str, value: &str)
        -> StoreResult<()>;

    /// Clear every status placeholder in the table. Returns the number of rows reset.
    async fn reset_placeholders(&self, target: &TableTarget) -> StoreResult<u64>;
}

/// Whether a stored full-text value is a status placeholder.
pub fn is_placeholder(value: &str) -> bool {
    value.starts_with(PLACEHOLDER_PREFIX)
}

/// Whether a stored full-text value still needs extraction.
pub fn is_eligible(value: Option<&str>) -> bool {
    value.map_or(true, str::is_empty)
}
