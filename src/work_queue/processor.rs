//! Claim, download, extract and write back one row.

use std::path::PathBuf;

use tempfile::TempDir;

use super::{FulltextWorker, ItemOutcome, WorkQueueError};
use crate::repository::{TableTarget, WorkItem};
use crate::services::StatusPlaceholder;

impl FulltextWorker {
    /// Claim `item` and drive it to a final value.
    ///
    /// Only a failed claim write is returned as an error; every later failure
    /// is folded into the value written back.
    pub async fn process_item(
        &self,
        target: &TableTarget,
        item: WorkItem,
    ) -> Result<ItemOutcome, WorkQueueError> {
        let marker = self.identity.placeholder(StatusPlaceholder::Processing);
        let claimed = self
            .store
            .claim(target, &item.id, &marker)
            .await
            .map_err(|source| WorkQueueError::Claim {
                target: target.to_string(),
                id: item.id.clone(),
                source,
            })?;
        if !claimed {
            tracing::info!("[{}.{}={}] claimed by another worker", target, target.id_col, item.id);
            return Ok(ItemOutcome::ClaimLost);
        }
        tracing::debug!("[{}.{}={}] claimed", target, target.id_col, item.id);

        let (value, outcome) = self.produce(target, &item).await;

        match self.store.write_fulltext(target, &item.id, &value).await {
            Ok(()) => match outcome {
                ItemOutcome::Text => {
                    tracing::info!("[{}.{}={}] full text updated", target, target.id_col, item.id)
                }
                _ => tracing::info!("[{}.{}={}] recorded {}", target, target.id_col, item.id, value),
            },
            Err(e) => tracing::error!(
                "[{}.{}={}] failed to write result, row stays processing: {}",
                target,
                target.id_col,
                item.id,
                e
            ),
        }

        Ok(outcome)
    }

    async fn produce(&self, target: &TableTarget, item: &WorkItem) -> (String, ItemOutcome) {
        let not_found = || {
            (
                self.identity.placeholder(StatusPlaceholder::NotFound),
                ItemOutcome::NotFound,
            )
        };

        let Some(file_path) = item.file_path.as_deref().filter(|p| !p.trim().is_empty()) else {
            tracing::warn!("[{}.{}={}] no file path", target, target.id_col, item.id);
            return not_found();
        };

        let scratch = match self.item_scratch_dir() {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(
                    "Could not create scratch directory in {}: {}",
                    self.download_dir.display(),
                    e
                );
                return not_found();
            }
        };

        let result = match self
            .downloader
            .download(&target.project, file_path, scratch.path())
            .await
        {
            Ok(local) => self.extract(target, item, local).await,
            Err(e) => {
                tracing::warn!("[{}.{}={}] download failed: {}", target, target.id_col, item.id, e);
                not_found()
            }
        };

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!("Failed to remove scratch dir {}: {}", scratch_path.display(), e);
        }

        result
    }

    async fn extract(
        &self,
        target: &TableTarget,
        item: &WorkItem,
        local: PathBuf,
    ) -> (String, ItemOutcome) {
        let engine = self.engine.clone();
        let joined = tokio::task::spawn_blocking(move || engine.extract(&local)).await;

        match joined {
            Ok(Ok(text)) if !text.is_empty() => (text, ItemOutcome::Text),
            Ok(Ok(_)) => {
                tracing::warn!("[{}.{}={}] extracted text is empty", target, target.id_col, item.id);
                (
                    self.identity.placeholder(StatusPlaceholder::ExtractEmpty),
                    ItemOutcome::Empty,
                )
            }
            Ok(Err(e)) => {
                tracing::warn!("[{}.{}={}] extraction failed: {}", target, target.id_col, item.id, e);
                (
                    self.identity.placeholder(StatusPlaceholder::ExtractEmpty),
                    ItemOutcome::ExtractFailed,
                )
            }
            Err(e) => {
                tracing::error!("[{}.{}={}] extraction task failed: {}", target, target.id_col, item.id, e);
                (
                    self.identity.placeholder(StatusPlaceholder::NotFound),
                    ItemOutcome::NotFound,
                )
            }
        }
    }

    fn item_scratch_dir(&self) -> std::io::Result<TempDir> {
        std::fs::create_dir_all(&self.download_dir)?;
        tempfile::Builder::new()
            .prefix("item-")
            .tempdir_in(&self.download_dir)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::ProjectProfile;
    use crate::extract::ExtractionEngine;
    use crate::ocr::{OcrBackend, OcrError};
    use crate::repository::{FulltextStore, MemoryRow, MemoryStore};
    use crate::services::{Downloader, WorkerIdentity};

    struct NoOcr;

    impl OcrBackend for NoOcr {
        fn name(&self) -> &'static str {
            "none"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn availability_hint(&self) -> String {
            String::new()
        }
        fn ocr_image(&self, _path: &std::path::Path) -> Result<String, OcrError> {
            Ok(String::new())
        }
    }

    fn profile() -> ProjectProfile {
        ProjectProfile {
            project_name: "cityA".to_string(),
            table_name: "documents".to_string(),
            full_text_col: "full_text".to_string(),
            file_path_col: "file_path".to_string(),
            id_col: "id".to_string(),
        }
    }

    fn worker(store: Arc<MemoryStore>, download_dir: PathBuf) -> FulltextWorker {
        // Port 9 (discard) refuses connections on test hosts.
        let downloader = Downloader::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        FulltextWorker::new(
            store,
            vec![profile()],
            downloader,
            Arc::new(ExtractionEngine::new(Arc::new(NoOcr))),
            WorkerIdentity::with_ip("10.0.0.5"),
            download_dir,
        )
    }

    fn target() -> TableTarget {
        TableTarget::new("cityA_2023", &profile())
    }

    #[tokio::test]
    async fn test_missing_file_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", None, None))
            .await;
        let worker = worker(store.clone(), dir.path().join("downloads"));

        let item = store.pick_eligible(&target()).await.unwrap().unwrap();
        let outcome = worker.process_item(&target(), item).await.unwrap();

        assert_eq!(outcome, ItemOutcome::NotFound);
        let value = store.full_text("cityA_2023", "documents", "1").await.unwrap().unwrap();
        assert!(value.starts_with("[file_not_found] "), "{}", value);
        assert!(value.ends_with(" | IP:10.0.0.5"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_found_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        let store = Arc::new(MemoryStore::new());
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", Some("./a/b.txt"), Some("")))
            .await;
        let worker = worker(store.clone(), downloads.clone());

        let item = store.pick_eligible(&target()).await.unwrap().unwrap();
        assert_eq!(
            worker.process_item(&target(), item).await.unwrap(),
            ItemOutcome::NotFound
        );
        assert_eq!(std::fs::read_dir(&downloads).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_lost_claim_leaves_row_alone() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", Some("a.txt"), None))
            .await;
        store.steal_next_claim("1").await;
        let worker = worker(store.clone(), dir.path().join("downloads"));

        let item = store.pick_eligible(&target()).await.unwrap().unwrap();
        assert_eq!(
            worker.process_item(&target(), item).await.unwrap(),
            ItemOutcome::ClaimLost
        );
        assert_eq!(
            store.full_text("cityA_2023", "documents", "1").await,
            Some(Some("[file_processing] claimed elsewhere".to_string()))
        );
    }

    #[tokio::test]
    async fn test_claim_write_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", Some("a.txt"), None))
            .await;
        store.fail_claims(true).await;
        let worker = worker(store.clone(), dir.path().join("downloads"));

        let item = store.pick_eligible(&target()).await.unwrap().unwrap();
        assert!(matches!(
            worker.process_item(&target(), item).await,
            Err(WorkQueueError::Claim { .. })
        ));
    }

    #[tokio::test]
    async fn test_result_write_error_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_row("cityA_2023", "documents", MemoryRow::new("1", None, None))
            .await;
        store.fail_writes(true).await;
        let worker = worker(store.clone(), dir.path().join("downloads"));

        let item = store.pick_eligible(&target()).await.unwrap().unwrap();
        assert_eq!(
            worker.process_item(&target(), item).await.unwrap(),
            ItemOutcome::NotFound
        );
        let value = store.full_text("cityA_2023", "documents", "1").await.unwrap().unwrap();
        assert!(value.starts_with("[file_processing] "));
    }
}
