use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{
    ObservationArchive, image_entry_name, observation_entry_name, snapshot_entry_name,
};
use crate::catalog::{
    CatalogClient, fetch_details_batched_until, image_ids, list_observation_ids,
};
use crate::config::ResolvedConfig;
use crate::domain::{ObservationId, RunMode};
use crate::error::BackupError;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub user: String,
    pub archive: String,
    pub started_at: String,
    pub finished_at: String,
    pub listed: usize,
    pub archived: Vec<ObservationId>,
    pub already_present: usize,
    pub failed: Vec<ObservationId>,
    pub images_written: usize,
    pub images_skipped: usize,
    pub snapshot_entry: Option<String>,
    pub snapshot_records: Option<usize>,
    /// Set when a stop request ended the run before every id was handled.
    pub interrupted: bool,
}

impl RunSummary {
    fn new(mode: RunMode, config: &ResolvedConfig, archive: &ObservationArchive) -> Self {
        Self {
            mode,
            user: config.user.to_string(),
            archive: archive.path().to_string(),
            started_at: Utc::now().to_rfc3339(),
            finished_at: String::new(),
            listed: 0,
            archived: Vec::new(),
            already_present: 0,
            failed: Vec::new(),
            images_written: 0,
            images_skipped: 0,
            snapshot_entry: None,
            snapshot_records: None,
            interrupted: false,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now().to_rfc3339();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Archived {
        images_written: usize,
        images_skipped: usize,
    },
    DetailUnavailable,
}

pub struct Reconciler<C: CatalogClient> {
    config: ResolvedConfig,
    catalog: C,
    stop: Arc<AtomicBool>,
}

impl<C: CatalogClient> Reconciler<C> {
    pub fn new(config: ResolvedConfig, catalog: C) -> Self {
        Self {
            config,
            catalog,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Flag that ends a run at the next record (or batch) boundary once set.
    /// The run then returns normally so the caller can finish the archive.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn run(
        &self,
        mode: RunMode,
        archive: &mut ObservationArchive,
    ) -> Result<RunSummary, BackupError> {
        match mode {
            RunMode::Sync => self.run_incremental(archive),
            RunMode::Snapshot => self.run_snapshot(archive),
        }
    }

    /// Archives every listed observation that has no entries yet.
    pub fn run_incremental(
        &self,
        archive: &mut ObservationArchive,
    ) -> Result<RunSummary, BackupError> {
        let mut summary = RunSummary::new(RunMode::Sync, &self.config, archive);
        let ids = list_observation_ids(&self.catalog, &self.config.user)?;
        summary.listed = ids.len();
        info!(user = %self.config.user, observations = ids.len(), "listed observations");

        for id in ids {
            if self.stop_requested() {
                warn!(%id, "stop requested; leaving remaining observations for the next run");
                summary.interrupted = true;
                break;
            }
            if archive.is_archived(id) {
                debug!(%id, "observation already in archive");
                summary.already_present += 1;
                continue;
            }
            match self.archive_observation(archive, id)? {
                RecordOutcome::Archived {
                    images_written,
                    images_skipped,
                } => {
                    summary.archived.push(id);
                    summary.images_written += images_written;
                    summary.images_skipped += images_skipped;
                }
                RecordOutcome::DetailUnavailable => summary.failed.push(id),
            }
        }

        Ok(summary.finish())
    }

    /// Writes `<id>/<id>.json` and then each photo as `<id>/<image>.jpg`.
    /// Nothing is written when the detail fetch fails; a photo that fails is
    /// skipped. Only archive write errors are returned.
    pub fn archive_observation(
        &self,
        archive: &mut ObservationArchive,
        id: ObservationId,
    ) -> Result<RecordOutcome, BackupError> {
        let detail = match self.catalog.fetch_details(&[id]) {
            Ok(detail) => detail,
            Err(err) => {
                warn!(%id, error = %err, "could not back up observation");
                return Ok(RecordOutcome::DetailUnavailable);
            }
        };
        let images = match image_ids(&detail) {
            Ok(images) => images,
            Err(err) => {
                warn!(%id, error = %err, "could not back up observation");
                return Ok(RecordOutcome::DetailUnavailable);
            }
        };

        info!(%id, images = images.len(), "archiving observation");
        archive.write_json(&observation_entry_name(id), &detail)?;

        let mut images_written = 0;
        let mut images_skipped = 0;
        for image_id in images {
            let download = match self.catalog.fetch_image(image_id, self.config.image_size) {
                Ok(download) => download,
                Err(err) => {
                    warn!(%id, image = %image_id, error = %err, "image could not be retrieved");
                    images_skipped += 1;
                    continue;
                }
            };
            let name = image_entry_name(id, &download.filename);
            if archive.contains(&name) {
                debug!(%id, entry = %name, "image listed twice");
                continue;
            }
            archive.write_entry(&name, &download.bytes)?;
            debug!(%id, entry = %name, bytes = download.bytes.len(), "archived image");
            images_written += 1;
        }

        Ok(RecordOutcome::Archived {
            images_written,
            images_skipped,
        })
    }

    /// Bulk mode: one `<user>.json` entry holding every observation's detail.
    /// Membership and photos are not looked at.
    pub fn run_snapshot(
        &self,
        archive: &mut ObservationArchive,
    ) -> Result<RunSummary, BackupError> {
        let mut summary = RunSummary::new(RunMode::Snapshot, &self.config, archive);
        let entry = snapshot_entry_name(&self.config.user);
        if archive.contains(&entry) {
            return Err(BackupError::SnapshotExists(entry));
        }

        let ids = list_observation_ids(&self.catalog, &self.config.user)?;
        summary.listed = ids.len();
        info!(
            user = %self.config.user,
            observations = ids.len(),
            batch_size = self.config.page_size,
            "fetching snapshot"
        );

        let details =
            fetch_details_batched_until(&self.catalog, &ids, self.config.page_size, &self.stop);
        if self.stop_requested() {
            warn!(entry = %entry, "stop requested; snapshot not written");
            summary.interrupted = true;
            return Ok(summary.finish());
        }
        archive.write_json(&entry, &details)?;
        info!(entry = %entry, records = details.len(), "wrote snapshot");

        summary.snapshot_entry = Some(entry);
        summary.snapshot_records = Some(details.len());
        Ok(summary.finish())
    }
}
