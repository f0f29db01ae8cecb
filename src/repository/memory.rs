//! In-memory store for tests and dry runs.
//!
//! Column names in [`TableTarget`] are ignored: every table is a list of
//! rows with an id, a file path, and a full-text value. `pick_eligible`
//! returns the first eligible row in insertion order instead of a random one.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::util::query_error;
use super::{
    is_eligible, is_placeholder, FulltextStore, StoreError, StoreResult, TableTarget, WorkItem,
};

/// One row of an in-memory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRow {
    pub id: String,
    pub file_path: Option<String>,
    pub full_text: Option<String>,
}

impl MemoryRow {
    pub fn new(id: &str, file_path: Option<&str>, full_text: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            file_path: file_path.map(str::to_string),
            full_text: full_text.map(str::to_string),
        }
    }
}

#[derive(Default)]
struct State {
    /// database -> table -> rows
    databases: BTreeMap<String, BTreeMap<String, Vec<MemoryRow>>>,
    /// `db.table` for every `pick_eligible` call, in call order.
    picks: Vec<String>,
    fail_list: bool,
    fail_claims: bool,
    fail_writes: bool,
    /// Number of upcoming `pick_eligible` calls that fail.
    failing_picks: usize,
    /// Ids whose claims never match a row.
    unmatched: Vec<String>,
    /// Ids whose next claim loses to a simulated concurrent worker.
    stolen: Vec<String>,
}

/// In-memory [`FulltextStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database with no tables.
    pub async fn add_database(&self, database: &str) {
        let mut state = self.state.write().await;
        state.databases.entry(database.to_string()).or_default();
    }

    /// Register an empty table, creating the database if needed.
    pub async fn add_table(&self, database: &str, table: &str) {
        let mut state = self.state.write().await;
        state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(table.to_string())
            .or_default();
    }

    /// Append a row, creating the database and table if needed.
    pub async fn insert_row(&self, database: &str, table: &str, row: MemoryRow) {
        let mut state = self.state.write().await;
        state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    /// Current full-text value of a row, or `None` if the row does not exist.
    pub async fn full_text(
        &self,
        database: &str,
        table: &str,
        id: &str,
    ) -> Option<Option<String>> {
        let state = self.state.read().await;
        state
            .databases
            .get(database)?
            .get(table)?
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.full_text.clone())
    }

    /// All rows of a table.
    pub async fn rows(&self, database: &str, table: &str) -> Vec<MemoryRow> {
        let state = self.state.read().await;
        state
            .databases
            .get(database)
            .and_then(|tables| tables.get(table))
            .cloned()
            .unwrap_or_default()
    }

    /// `db.table` of every pick so far, in call order.
    pub async fn picks(&self) -> Vec<String> {
        self.state.read().await.picks.clone()
    }

    /// Make `list_databases` fail.
    pub async fn fail_list(&self, fail: bool) {
        self.state.write().await.fail_list = fail;
    }

    /// Make `claim` fail.
    pub async fn fail_claims(&self, fail: bool) {
        self.state.write().await.fail_claims = fail;
    }

    /// Make `write_fulltext` fail.
    pub async fn fail_writes(&self, fail: bool) {
        self.state.write().await.fail_writes = fail;
    }

    /// Make the next `count` picks fail.
    pub async fn fail_picks(&self, count: usize) {
        self.state.write().await.failing_picks = count;
    }

    /// Make every claim of `id` update no row, as when the id does not
    /// round-trip through the selected text form.
    pub async fn unmatch_claims(&self, id: &str) {
        self.state.write().await.unmatched.push(id.to_string());
    }

    /// Let another worker win the next claim of `id`.
    pub async fn steal_next_claim(&self, id: &str) {
        self.state.write().await.stolen.push(id.to_string());
    }
}

fn table_mut<'a>(
    state: &'a mut State,
    target: &TableTarget,
) -> StoreResult<&'a mut Vec<MemoryRow>> {
    state
        .databases
        .get_mut(&target.database)
        .and_then(|tables| tables.get_mut(&target.table))
        .ok_or_else(|| {
            StoreError::Query(query_error(format!("table {} doesn't exist", target)))
        })
}

#[async_trait]
impl FulltextStore for MemoryStore {
    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        if state.fail_list {
            return Err(StoreError::Query(query_error("Lost connection to MySQL server")));
        }
        Ok(state.databases.keys().cloned().collect())
    }

    async fn table_exists(&self, database: &str, table: &str) -> StoreResult<bool> {
        let state = self.state.read().await;
        Ok(state
            .databases
            .get(database)
            .is_some_and(|tables| tables.contains_key(table)))
    }

    async fn pick_eligible(&self, target: &TableTarget) -> StoreResult<Option<WorkItem>> {
        let mut state = self.state.write().await;
        state.picks.push(target.to_string());
        if state.failing_picks > 0 {
            state.failing_picks -= 1;
            return Err(StoreError::Query(query_error("Lost connection to MySQL server")));
        }
        let rows = table_mut(&mut state, target)?;
        Ok(rows
            .iter()
            .find(|r| is_eligible(r.full_text.as_deref()))
            .map(|r| WorkItem {
                id: r.id.clone(),
                file_path: r.file_path.clone(),
                full_text: r.full_text.clone(),
            }))
    }

    async fn claim(&self, target: &TableTarget, id: &str, marker: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.fail_claims {
            return Err(StoreError::Query(query_error("Lock wait timeout exceeded")));
        }
        if state.unmatched.iter().any(|u| u == id) {
            return Ok(false);
        }
        let stolen = state.stolen.iter().position(|s| s == id).map(|i| state.stolen.remove(i));
        let rows = table_mut(&mut state, target)?;
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if stolen.is_some() && is_eligible(row.full_text.as_deref()) {
            row.full_text = Some("[file_processing] claimed elsewhere".to_string());
        }
        if !is_eligible(row.full_text.as_deref()) {
            return Ok(false);
        }
        row.full_text = Some(marker.to_string());
        Ok(true)
    }

    async fn write_fulltext(
        &self,
        target: &TableTarget,
        id: &str,
        value: &str,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.fail_writes {
            return Err(StoreError::Query(query_error("Lock wait timeout exceeded")));
        }
        let rows = table_mut(&mut state, target)?;
        for row in rows.iter_mut().filter(|r| r.id == id) {
            row.full_text = Some(value.to_string());
        }
        Ok(())
    }

    async fn reset_placeholders(&self, target: &TableTarget) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let rows = table_mut(&mut state, target)?;
        let mut reset = 0;
        for row in rows.iter_mut() {
            if row.full_text.as_deref().is_some_and(is_placeholder) {
                row.full_text = Some(String::new());
                reset += 1;
            }
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectProfile;

    fn target(database: &str) -> TableTarget {
        let profile = ProjectProfile {
            project_name: "cityA".to_string(),
            table_name: "documents".to_string(),
            full_text_col: "full_text".to_string(),
            file_path_col: "file_path".to_string(),
            id_col: "id".to_string(),
        };
        TableTarget::new(database, &profile)
    }

    #[tokio::test]
    async fn test_pick_skips_filled_rows() {
        let store = MemoryStore::new();
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", Some("a.pdf"), Some("done")))
            .await;
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("2", Some("b.pdf"), None))
            .await;

        let item = store.pick_eligible(&target("cityA_2023")).await.unwrap().unwrap();
        assert_eq!(item.id, "2");
        assert_eq!(store.picks().await, vec!["cityA_2023.documents"]);
    }

    #[tokio::test]
    async fn test_claim_is_conditional() {
        let store = MemoryStore::new();
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("7", Some("a.pdf"), Some("")))
            .await;
        let t = target("cityA_2023");

        assert!(store.claim(&t, "7", "[file_processing] a").await.unwrap());
        assert!(!store.claim(&t, "7", "[file_processing] b").await.unwrap());
        assert_eq!(
            store.full_text("cityA_2023", "documents", "7").await,
            Some(Some("[file_processing] a".to_string()))
        );
    }

    #[tokio::test]
    async fn test_stolen_claim() {
        let store = MemoryStore::new();
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("7", None, None))
            .await;
        store.steal_next_claim("7").await;

        assert!(!store.claim(&target("cityA_2023"), "7", "[file_processing] a").await.unwrap());
    }

    #[tokio::test]
    async fn test_failing_picks_recover() {
        let store = MemoryStore::new();
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", None, None))
            .await;
        store.fail_picks(1).await;

        let t = target("cityA_2023");
        assert!(store.pick_eligible(&t).await.is_err());
        assert!(store.pick_eligible(&t).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unmatched_claim_leaves_row_eligible() {
        let store = MemoryStore::new();
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", None, None))
            .await;
        store.unmatch_claims("1").await;

        assert!(!store.claim(&target("cityA_2023"), "1", "[file_processing] a").await.unwrap());
        assert_eq!(store.full_text("cityA_2023", "documents", "1").await, Some(None));
    }

    #[tokio::test]
    async fn test_reset_placeholders() {
        let store = MemoryStore::new();
        for (id, value) in [
            ("1", "[file_processing] 2024-05-01 10:00:00 | IP:10.0.0.5"),
            ("2", "[file_not_found] 2024-05-01 10:00:00 | IP:10.0.0.5"),
            ("3", "real text"),
        ] {
            store
                .insert_row("cityA_2023", "documents", MemoryRow::new(id, None, Some(value)))
                .await;
        }

        let reset = store.reset_placeholders(&target("cityA_2023")).await.unwrap();
        assert_eq!(reset, 2);
        assert_eq!(
            store.full_text("cityA_2023", "documents", "3").await,
            Some(Some("real text".to_string()))
        );
        assert_eq!(
            store.full_text("cityA_2023", "documents", "1").await,
            Some(Some(String::new()))
        );
    }

    #[tokio::test]
    async fn test_missing_table() {
        let store = MemoryStore::new();
        store.add_database("cityA_2023").await;
        assert!(!store.table_exists("cityA_2023", "documents").await.unwrap());
        assert!(store.pick_eligible(&target("cityA_2023")).await.is_err());
    }
}
