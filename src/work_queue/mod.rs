//! Sweep-based work queue over the configured project tables.
//!
//! A sweep walks project profiles in order, resolves their databases by
//! name prefix, and processes the first eligible row it finds. The run
//! repeats sweeps until one finds nothing. A sweep that found nothing but
//! could not read some table is retried a bounded number of times.

mod error;
mod processor;

pub use error::WorkQueueError;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ProjectProfile};
use crate::extract::ExtractionEngine;
use crate::repository::{FulltextStore, TableTarget};
use crate::services::{Downloader, WorkerIdentity};

/// What happened to one claimed (or contested) row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Extracted text was written.
    Text,
    /// Extraction succeeded with no text; `extract_empty` was written.
    Empty,
    /// Extraction failed; `extract_empty` was written.
    ExtractFailed,
    /// The file could not be fetched; `not_found` was written.
    NotFound,
    /// Another worker claimed the row first.
    ClaimLost,
}

/// Result of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// No eligible row in any candidate table.
    Idle,
    /// No eligible row found, but at least one table could not be checked or read.
    Degraded,
    Processed(ItemOutcome),
}

/// Consecutive lost claims on one row before the run gives up.
pub const MAX_CLAIM_LOSSES: usize = 3;
/// Consecutive degraded sweeps before the run stops.
pub const MAX_DEGRADED_SWEEPS: usize = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Counters for a whole run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sweeps: usize,
    pub processed: usize,
    pub text: usize,
    pub empty: usize,
    pub extract_failed: usize,
    pub not_found: usize,
    pub claim_lost: usize,
    pub degraded: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::ClaimLost => {
                self.claim_lost += 1;
                return;
            }
            ItemOutcome::Text => self.text += 1,
            ItemOutcome::Empty => self.empty += 1,
            ItemOutcome::ExtractFailed => self.extract_failed += 1,
            ItemOutcome::NotFound => self.not_found += 1,
        }
        self.processed += 1;
    }
}

/// Counters for a placeholder reset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResetSummary {
    pub tables: usize,
    pub rows: u64,
}

/// Single-process worker over a [`FulltextStore`].
pub struct FulltextWorker {
    store: Arc<dyn FulltextStore>,
    projects: Vec<ProjectProfile>,
    downloader: Downloader,
    engine: Arc<ExtractionEngine>,
    identity: WorkerIdentity,
    download_dir: PathBuf,
    retry_delay: Duration,
}

impl FulltextWorker {
    pub fn new(
        store: Arc<dyn FulltextStore>,
        projects: Vec<ProjectProfile>,
        downloader: Downloader,
        engine: Arc<ExtractionEngine>,
        identity: WorkerIdentity,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            projects,
            downloader,
            engine,
            identity,
            download_dir,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Pause between a degraded sweep and its retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Wire a worker from configuration.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn FulltextStore>,
    ) -> Result<Self, WorkQueueError> {
        let downloader = Downloader::new(&config.file_url, config.request_timeout())?;
        let engine = Arc::new(ExtractionEngine::from_config(config));
        let identity = WorkerIdentity::resolve(config.host_ip.as_deref());
        tracing::debug!("Worker identity IP:{}", identity.ip());

        Ok(Self::new(
            store,
            config.projects.clone(),
            downloader,
            engine,
            identity,
            config.download_dir(),
        ))
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn download_dir(&self) -> &std::path::Path {
        &self.download_dir
    }

    /// Databases matched by profile prefix, in profile order.
    ///
    /// A database matched by several profiles appears once, bound to the
    /// first profile that matches it.
    pub async fn candidate_targets(&self) -> Result<Vec<TableTarget>, WorkQueueError> {
        let databases = self.store.list_databases().await?;
        Ok(match_targets(&self.projects, &databases))
    }

    /// Process at most one row.
    pub async fn sweep(&self) -> Result<SweepOutcome, WorkQueueError> {
        Ok(self.sweep_row().await?.0)
    }

    /// Like [`sweep`](Self::sweep), also naming the processed row as `db.table#id`.
    async fn sweep_row(&self) -> Result<(SweepOutcome, Option<String>), WorkQueueError> {
        let mut degraded = false;
        for target in self.candidate_targets().await? {
            match self.store.table_exists(&target.database, &target.table).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("Table {} not found, skipping", target);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Could not check table {}: {}", target, e);
                    degraded = true;
                    continue;
                }
            }

            let item = match self.store.pick_eligible(&target).await {
                Ok(Some(item)) => item,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Could not select from {}: {}", target, e);
                    degraded = true;
                    continue;
                }
            };

            let row = format!("{}#{}", target, item.id);
            let outcome = self.process_item(&target, item).await?;
            return Ok((SweepOutcome::Processed(outcome), Some(row)));
        }

        let outcome = if degraded {
            SweepOutcome::Degraded
        } else {
            SweepOutcome::Idle
        };
        Ok((outcome, None))
    }

    /// Sweep until a sweep finds nothing.
    ///
    /// Fails with [`WorkQueueError::ClaimStuck`] when the same row loses its
    /// claim [`MAX_CLAIM_LOSSES`] times in a row.
    pub async fn run(&self) -> Result<RunSummary, WorkQueueError> {
        let mut summary = RunSummary::default();
        let mut lost: Option<(String, usize)> = None;
        let mut degraded_streak = 0;

        loop {
            summary.sweeps += 1;
            let (outcome, row) = self.sweep_row().await?;
            match outcome {
                SweepOutcome::Idle => break,
                SweepOutcome::Degraded => {
                    summary.degraded += 1;
                    degraded_streak += 1;
                    if degraded_streak >= MAX_DEGRADED_SWEEPS {
                        tracing::warn!(
                            "Stopping after {} sweeps with unreadable tables",
                            degraded_streak
                        );
                        break;
                    }
                    tokio::time::sleep(self.retry_delay).await;
                }
                SweepOutcome::Processed(item) => {
                    degraded_streak = 0;
                    summary.record(item);
                    if item != ItemOutcome::ClaimLost {
                        lost = None;
                        continue;
                    }

                    let row = row.unwrap_or_default();
                    let attempts = match lost.take() {
                        Some((last, count)) if last == row => count + 1,
                        _ => 1,
                    };
                    lost = Some((row.clone(), attempts));
                    if attempts >= MAX_CLAIM_LOSSES {
                        return Err(WorkQueueError::ClaimStuck { row, attempts });
                    }
                }
            }
        }

        tracing::info!(
            "No more rows to process: {} sweeps, {} processed ({} text, {} empty, {} failed, {} not found), {} claims lost",
            summary.sweeps,
            summary.processed,
            summary.text,
            summary.empty,
            summary.extract_failed,
            summary.not_found,
            summary.claim_lost
        );
        Ok(summary)
    }

    /// Clear every placeholder in every candidate table and remove the download directory.
    pub async fn reset(&self) -> Result<ResetSummary, WorkQueueError> {
        let mut summary = ResetSummary::default();
        for target in self.candidate_targets().await? {
            match self.store.table_exists(&target.database, &target.table).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!("Could not check table {}: {}", target, e);
                    continue;
                }
            }

            match self.store.reset_placeholders(&target).await {
                Ok(rows) => {
                    tracing::info!("Cleared {} placeholders in {}", rows, target);
                    summary.tables += 1;
                    summary.rows += rows;
                }
                Err(e) => tracing::warn!("Failed to reset {}: {}", target, e),
            }
        }

        match tokio::fs::remove_dir_all(&self.download_dir).await {
            Ok(()) => tracing::info!("Removed {}", self.download_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.download_dir.display(), e),
        }

        Ok(summary)
    }
}

fn match_targets(projects: &[ProjectProfile], databases: &[String]) -> Vec<TableTarget> {
    let mut targets: Vec<TableTarget> = Vec::new();
    for profile in projects {
        for database in databases {
            if !database.starts_with(&profile.project_name) {
                continue;
            }
            if targets.iter().any(|t| &t.database == database) {
                continue;
            }
            targets.push(TableTarget::new(database, profile));
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, table: &str) -> ProjectProfile {
        ProjectProfile {
            project_name: name.to_string(),
            table_name: table.to_string(),
            full_text_col: "full_text".to_string(),
            file_path_col: "file_path".to_string(),
            id_col: "id".to_string(),
        }
    }

    fn names(targets: &[TableTarget]) -> Vec<(String, String)> {
        targets
            .iter()
            .map(|t| (t.database.clone(), t.table.clone()))
            .collect()
    }

    #[test]
    fn test_match_targets_in_profile_order() {
        let projects = vec![profile("cityB", "files"), profile("cityA", "documents")];
        let databases = vec![
            "cityA_2023".to_string(),
            "cityB".to_string(),
            "information_schema".to_string(),
            "cityA_2024".to_string(),
        ];

        assert_eq!(
            names(&match_targets(&projects, &databases)),
            vec![
                ("cityB".to_string(), "files".to_string()),
                ("cityA_2023".to_string(), "documents".to_string()),
                ("cityA_2024".to_string(), "documents".to_string()),
            ]
        );
    }

    #[test]
    fn test_overlapping_prefixes_use_first_profile() {
        let projects = vec![profile("city", "generic"), profile("cityA", "documents")];
        let databases = vec!["cityA_2023".to_string()];

        assert_eq!(
            names(&match_targets(&projects, &databases)),
            vec![("cityA_2023".to_string(), "generic".to_string())]
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.record(ItemOutcome::Text);
        summary.record(ItemOutcome::NotFound);
        summary.record(ItemOutcome::ClaimLost);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.text, 1);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.claim_lost, 1);
    }
}
