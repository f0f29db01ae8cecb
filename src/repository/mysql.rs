//! MySQL-backed store using diesel-async with a deadpool connection pool.
//!
//! The connection URL carries no default schema; every statement names
//! its database explicitly so one pool serves all matched databases.

use async_trait::async_trait;
use diesel::sql_types::{BigInt, Nullable, Text};
use diesel_async::pooled_connection::deadpool::Pool as DeadPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncMysqlConnection, RunQueryDsl};

use super::util::{query_error, quote_ident};
use super::{FulltextStore, StoreError, StoreResult, TableTarget, WorkItem};

/// Pooled MySQL connection.
pub type MysqlConn = deadpool::managed::Object<AsyncDieselConnectionManager<AsyncMysqlConnection>>;

/// A single worker only ever holds one connection at a time.
const DEFAULT_POOL_SIZE: usize = 2;

#[derive(diesel::QueryableByName)]
struct SchemaName {
    #[diesel(sql_type = Text)]
    name: String,
}

#[derive(diesel::QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

#[derive(diesel::QueryableByName)]
struct PickedRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Nullable<Text>)]
    file_path: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    full_text: Option<String>,
}

/// Store backed by a MySQL server.
#[derive(Clone)]
pub struct MysqlStore {
    pool: DeadPool<AsyncMysqlConnection>,
    host: String,
}

impl MysqlStore {
    /// Build the pool without touching the server.
    pub fn new(database_url: &str, host: &str, max_size: usize) -> StoreResult<Self> {
        let config = AsyncDieselConnectionManager::<AsyncMysqlConnection>::new(database_url);
        let pool = DeadPool::builder(config)
            .max_size(max_size)
            .build()
            .map_err(|e| StoreError::Connect {
                host: host.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            pool,
            host: host.to_string(),
        })
    }

    /// Build the pool and verify the server answers.
    pub async fn connect(database_url: &str, host: &str) -> StoreResult<Self> {
        let store = Self::new(database_url, host, DEFAULT_POOL_SIZE)?;
        store.ping().await?;
        tracing::info!("Connected to MySQL server {}", host);
        Ok(store)
    }

    /// Run `SELECT 1` on a pooled connection.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.get().await?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(|e| StoreError::Connect {
                host: self.host.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    /// Get a connection.
    pub async fn get(&self) -> StoreResult<MysqlConn> {
        self.pool.get().await.map_err(|e| StoreError::Connect {
            host: self.host.clone(),
            message: e.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl FulltextStore for MysqlStore {
    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.get().await?;
        let rows: Vec<SchemaName> = diesel::sql_query(
            "SELECT SCHEMA_NAME AS name FROM information_schema.SCHEMATA ORDER BY SCHEMA_NAME",
        )
        .load(&mut conn)
        .await?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn table_exists(&self, database: &str, table: &str) -> StoreResult<bool> {
        let mut conn = self.get().await?;
        let rows: Vec<Count> = diesel::sql_query(
            "SELECT COUNT(*) AS count FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
        )
        .bind::<Text, _>(database)
        .bind::<Text, _>(table)
        .load(&mut conn)
        .await?;
        Ok(rows.iter().next().is_some_and(|r| r.count > 0))
    }

    async fn pick_eligible(&self, target: &TableTarget) -> StoreResult<Option<WorkItem>> {
        let full_text = quote_ident(&target.full_text_col);
        let query = format!(
            "SELECT CAST({id} AS CHAR) AS id, \
                    CAST({path} AS CHAR) AS file_path, \
                    CAST({ft} AS CHAR) AS full_text \
             FROM {table} \
             WHERE {ft} = '' OR {ft} IS NULL \
             ORDER BY RAND() LIMIT 1",
            id = quote_ident(&target.id_col),
            path = quote_ident(&target.file_path_col),
            ft = full_text,
            table = target.qualified_table(),
        );

        let mut conn = self.get().await?;
        let rows: Vec<PickedRow> = diesel::sql_query(query).load(&mut conn).await?;
        Ok(rows.into_iter().next().map(|r| WorkItem {
            id: r.id,
            file_path: r.file_path,
            full_text: r.full_text,
        }))
    }

    async fn claim(&self, target: &TableTarget, id: &str, marker: &str) -> StoreResult<bool> {
        let full_text = quote_ident(&target.full_text_col);
        let query = format!(
            "UPDATE {table} SET {ft} = ? WHERE {id} = ? AND ({ft} = '' OR {ft} IS NULL)",
            table = target.qualified_table(),
            ft = full_text,
            id = quote_ident(&target.id_col),
        );

        let mut conn = self.get().await?;
        let affected = diesel::sql_query(query)
            .bind::<Text, _>(marker)
            .bind::<Text, _>(id)
            .execute(&mut conn)
            .await?;
        Ok(affected > 0)
    }

    async fn write_fulltext(
        &self,
        target: &TableTarget,
        id: &str,
        value: &str,
    ) -> StoreResult<()> {
        let query = format!(
            "UPDATE {table} SET {ft} = ? WHERE {id} = ?",
            table = target.qualified_table(),
            ft = quote_ident(&target.full_text_col),
            id = quote_ident(&target.id_col),
        );

        let mut conn = self.get().await?;
        let affected = diesel::sql_query(query)
            .bind::<Text, _>(value)
            .bind::<Text, _>(id)
            .execute(&mut conn)
            .await?;
        if affected == 0 {
            tracing::debug!("Write to {} id={} changed no rows", target, id);
        }
        Ok(())
    }

    async fn reset_placeholders(&self, target: &TableTarget) -> StoreResult<u64> {
        let query = format!(
            "UPDATE {table} SET {ft} = '' WHERE {ft} LIKE ?",
            table = target.qualified_table(),
            ft = quote_ident(&target.full_text_col),
        );

        let mut conn = self.get().await?;
        // `\_` keeps the underscore literal under the default LIKE escape.
        let affected = diesel::sql_query(query)
            .bind::<Text, _>("[file\\_%")
            .execute(&mut conn)
            .await
            .map_err(|e| StoreError::Query(query_error(format!("{}: {}", target, e))))?;
        Ok(affected as u64)
    }
}
