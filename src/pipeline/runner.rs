//! Runs one job end to end.
//!
//! Stages are connected by bounded channels:
//!
//! ```text
//! tile reader (blocking) -> inference workers -> dispatcher (blocking)
//! ```
//!
//! The report footprint is written before the first tile is read. With an
//! area of interest, tiles whose footprint misses it are never decoded and
//! detections outside it are dropped.

use super::{CancelToken, Job, JobSummary, PipelineSettings};
use crate::constants::channels;
use crate::dispatch::{DispatchReport, Dispatcher, NotificationSink};
use crate::error::{Error, Result};
use crate::geometry::{Area, Polygon, Reprojector};
use crate::inference::{InferenceAdapter, ModelCache, RawDetection, filter_by_confidence};
use crate::output::progress;
use crate::raster::{GeoTransform, RasterOpener, Tile, TileIter, Window, tiles};
use crate::reconstruct::{image_footprint, reconstruct};
use crate::store::{DetectionStore, NewDetection, ReportId, ReportStatus};
use indicatif::{MultiProgress, ProgressBar};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every job.
pub struct JobContext {
    /// Detection store.
    pub store: Arc<dyn DetectionStore>,
    /// Loaded-model cache.
    pub models: Arc<ModelCache>,
    /// Raster opener.
    pub opener: Arc<dyn RasterOpener>,
    /// Notification transport.
    pub sink: Arc<dyn NotificationSink>,
    /// Tiling and dispatch settings.
    pub settings: PipelineSettings,
    /// Where tile progress bars are drawn, if anywhere.
    pub progress: Option<MultiProgress>,
}

impl JobContext {
    /// Context without progress output.
    #[must_use]
    pub fn new(
        store: Arc<dyn DetectionStore>,
        models: Arc<ModelCache>,
        opener: Arc<dyn RasterOpener>,
        sink: Arc<dyn NotificationSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            models,
            opener,
            sink,
            settings,
            progress: None,
        }
    }

    /// Draw per-job tile progress bars on `multi`.
    #[must_use]
    pub fn with_progress(mut self, multi: MultiProgress) -> Self {
        self.progress = Some(multi);
        self
    }
}

struct Prepared {
    adapter: Arc<dyn InferenceAdapter>,
    tiles: TileIter,
    reprojector: Reprojector,
    footprint: Polygon,
    area: Option<Area>,
    dispatcher: Dispatcher,
}

/// Everything done before the first tile: any failure here fails the job.
fn prepare(ctx: &JobContext, job: &Job) -> Result<Prepared> {
    let adapter = ctx.models.get_or_load(&job.model_ref)?;
    ctx.store
        .set_report_status(job.report_id, ReportStatus::Processing)?;

    let source = ctx.opener.open(&job.image_ref)?;
    let reprojector = Reprojector::new(source.crs(), ctx.settings.target_crs)?;
    let native = image_footprint(source.width(), source.height(), &source.transform())?;
    let footprint = reprojector.polygon(&native)?;
    ctx.store
        .set_report_footprint(job.report_id, footprint.clone())?;
    debug!(
        report = %job.report_id,
        width = source.width(),
        height = source.height(),
        crs = %source.crs(),
        "report footprint written"
    );
    if let Some(area) = &job.area_of_interest {
        ctx.store
            .set_report_area_of_interest(job.report_id, area.clone())?;
        if !area.intersects(&footprint) {
            warn!(report = %job.report_id, "area of interest does not overlap the image");
        }
    }

    let tile_iter = tiles(source, ctx.settings.tile_size, ctx.settings.overlap)?;
    let dispatcher = Dispatcher::new(
        Arc::clone(&ctx.store),
        Arc::clone(&ctx.sink),
        job.report_id,
        &job.region_ids,
        ctx.settings.dispatch,
    )?;

    Ok(Prepared {
        adapter,
        tiles: tile_iter,
        reprojector,
        footprint,
        area: job.area_of_interest.clone(),
        dispatcher,
    })
}

/// Whether the tile at `window` certainly misses `area`.
///
/// A tile whose footprint cannot be reprojected is kept; its detections
/// are checked one by one instead.
fn tile_outside_area(
    area: &Area,
    window: Window,
    transform: &GeoTransform,
    reprojector: &Reprojector,
) -> bool {
    image_footprint(window.width, window.height, transform)
        .and_then(|native| reprojector.polygon(&native))
        .is_ok_and(|footprint| !area.intersects(&footprint))
}

#[derive(Debug, Default, Clone, Copy)]
struct TileCounts {
    processed: usize,
    skipped: usize,
    dropped_reprojection: usize,
    out_of_extent: usize,
    outside_area: usize,
}

impl std::ops::AddAssign for TileCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.skipped += rhs.skipped;
        self.dropped_reprojection += rhs.dropped_reprojection;
        self.out_of_extent += rhs.out_of_extent;
        self.outside_area += rhs.outside_area;
    }
}

/// Per-job state shared by the inference workers.
struct TileStage {
    report_id: ReportId,
    adapter: Arc<dyn InferenceAdapter>,
    reprojector: Reprojector,
    footprint: Polygon,
    area: Option<Area>,
    min_confidence: f32,
    timeout: Duration,
    /// Bounds concurrent `infer` calls for adapters that serialise them.
    permits: Option<Arc<Semaphore>>,
    progress: Option<ProgressBar>,
}

impl TileStage {
    async fn work(
        self: Arc<Self>,
        tiles: Arc<Mutex<mpsc::Receiver<Result<Tile>>>>,
        detections: mpsc::Sender<NewDetection>,
        cancel: CancelToken,
    ) -> TileCounts {
        let mut counts = TileCounts::default();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = tiles.lock().await.recv().await;
            let Some(tile) = next else {
                break;
            };

            let tile = match tile {
                Ok(tile) => tile,
                Err(e) => {
                    warn!(report = %self.report_id, "skipping tile: {e}");
                    counts.skipped += 1;
                    progress::inc_progress(self.progress.as_ref());
                    continue;
                }
            };

            let index = tile.index;
            let window = tile.window;
            let transform = tile.transform;
            match self.infer(tile).await {
                Ok(raw) => {
                    counts.processed += 1;
                    debug!(report = %self.report_id, tile = index, detections = raw.len(), "tile inferred");
                    for detection in raw {
                        let Some(located) = self.locate(window, &transform, detection, &mut counts)
                        else {
                            continue;
                        };
                        if detections.send(located).await.is_err() {
                            error!(report = %self.report_id, "dispatcher stopped, abandoning tile");
                            return counts;
                        }
                    }
                }
                Err(e) => {
                    warn!(report = %self.report_id, tile = index, "skipping tile: {e}");
                    counts.skipped += 1;
                }
            }
            progress::inc_progress(self.progress.as_ref());
        }
        counts
    }

    async fn infer(&self, tile: Tile) -> Result<Vec<RawDetection>> {
        // the deadline starts once the model is free for this tile
        let permit = match &self.permits {
            Some(permits) => Some(Arc::clone(permits).acquire_owned().await.map_err(|e| {
                Error::Internal {
                    message: format!("inference permits closed: {e}"),
                }
            })?),
            None => None,
        };

        let adapter = Arc::clone(&self.adapter);
        let threshold = self.min_confidence;
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            adapter.infer(&tile.buffer, threshold)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => Err(Error::InferenceTimeout {
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(join)) => Err(Error::Inference {
                reason: join.to_string(),
            }),
            Ok(Ok(raw)) => raw.map(|raw| filter_by_confidence(raw, threshold)),
        }
    }

    fn locate(
        &self,
        window: Window,
        transform: &GeoTransform,
        raw: RawDetection,
        counts: &mut TileCounts,
    ) -> Option<NewDetection> {
        let (pixel_geometry, footprint) =
            match reconstruct(window, &raw.geometry, transform, &self.reprojector) {
                Ok(located) => located,
                Err(e) => {
                    warn!(report = %self.report_id, "dropping detection: {e}");
                    counts.dropped_reprojection += 1;
                    return None;
                }
            };

        if !footprint.intersects(&self.footprint) {
            error!(
                report = %self.report_id,
                class = %raw.class_label,
                "detection footprint outside image footprint, dropping"
            );
            counts.out_of_extent += 1;
            return None;
        }

        if let Some(area) = &self.area
            && !area.intersects(&footprint)
        {
            debug!(report = %self.report_id, class = %raw.class_label, "detection outside area of interest");
            counts.outside_area += 1;
            return None;
        }

        Some(NewDetection {
            report_id: self.report_id,
            class_label: raw.class_label,
            confidence: raw.confidence,
            pixel_geometry,
            footprint,
        })
    }
}

/// Run `job` to a terminal state and return its summary.
///
/// Never fails: job-level errors are reflected in the summary status and
/// in the report's status in the store.
pub async fn run_job(ctx: Arc<JobContext>, job: Job, cancel: CancelToken) -> JobSummary {
    let start = Instant::now();
    let mut summary = JobSummary::new(job.report_id);
    info!(report = %job.report_id, image = %job.image_ref, model = %job.model_ref, "starting job");

    if cancel.is_cancelled() {
        summary.status = ReportStatus::Cancelled;
        record_status(ctx.store.as_ref(), job.report_id, &summary.status);
        return summary;
    }

    let prepared = {
        let ctx = Arc::clone(&ctx);
        let job = job.clone();
        tokio::task::spawn_blocking(move || prepare(&ctx, &job))
            .await
            .unwrap_or_else(|e| {
                Err(Error::Internal {
                    message: format!("job preparation panicked: {e}"),
                })
            })
    };
    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            error!(report = %job.report_id, "job failed: {e}");
            summary.status = ReportStatus::Failed {
                reason: e.reason_code().to_string(),
            };
            record_status(ctx.store.as_ref(), job.report_id, &summary.status);
            summary.duration = start.elapsed();
            return summary;
        }
    };

    summary.tiles_total = prepared.tiles.total();
    let bar = progress::create_tile_progress(
        summary.tiles_total,
        &job.image_ref,
        ctx.progress.as_ref(),
    );

    let (counts, outside_tiles, report) =
        run_stages(&ctx, &job, prepared, &cancel, bar.clone()).await;
    progress::finish_progress(bar, "done");

    summary.tiles_processed = counts.processed;
    summary.tiles_skipped = counts.skipped;
    summary.tiles_outside_area = outside_tiles;
    summary.dropped_reprojection = counts.dropped_reprojection;
    summary.out_of_extent = counts.out_of_extent;
    summary.outside_area = counts.outside_area;
    summary.detections_persisted = report.stats.persisted;
    summary.insert_failures = report.stats.insert_failures;
    summary.matches = report.stats.matches;
    summary.notifications_emitted = report.stats.notifications_emitted;
    summary.deferred = report.deferred;
    summary.undelivered = report.undelivered;

    let unfinished = summary.tiles_processed + summary.tiles_skipped + summary.tiles_outside_area
        < summary.tiles_total;
    summary.status = if cancel.is_cancelled() && unfinished {
        ReportStatus::Cancelled
    } else {
        ReportStatus::Completed
    };
    record_status(ctx.store.as_ref(), job.report_id, &summary.status);
    summary.duration = start.elapsed();

    info!(
        report = %job.report_id,
        status = %summary.status,
        tiles = summary.tiles_total,
        skipped = summary.tiles_skipped,
        outside_area = summary.tiles_outside_area,
        detections = summary.detections_persisted,
        notifications = summary.notifications_emitted,
        "job finished in {:.2}s",
        summary.duration.as_secs_f64()
    );
    if !summary.undelivered.is_empty() {
        warn!(
            report = %job.report_id,
            "{} notification(s) undelivered",
            summary.undelivered.len()
        );
    }
    summary
}

async fn run_stages(
    ctx: &JobContext,
    job: &Job,
    prepared: Prepared,
    cancel: &CancelToken,
    bar: Option<ProgressBar>,
) -> (TileCounts, usize, DispatchReport) {
    let Prepared {
        adapter,
        mut tiles,
        reprojector,
        footprint,
        area,
        dispatcher,
    } = prepared;
    let workers = ctx.settings.workers.max(1);

    let (tile_tx, tile_rx) = mpsc::channel(workers * channels::TILES_PER_WORKER);
    let (det_tx, mut det_rx) = mpsc::channel(channels::DETECTIONS);

    let reader_cancel = cancel.clone();
    let reader_area = area.clone();
    let reader_reprojector = reprojector.clone();
    let reader_bar = bar.clone();
    let reader = tokio::task::spawn_blocking(move || {
        let mut outside = 0;
        loop {
            if reader_cancel.is_cancelled() {
                debug!("cancellation requested, no further tiles read");
                break;
            }
            if let Some(area) = &reader_area
                && let Some((window, transform)) = tiles.peek_window()
                && tile_outside_area(area, window, &transform, &reader_reprojector)
            {
                tiles.skip_tile();
                outside += 1;
                progress::inc_progress(reader_bar.as_ref());
                continue;
            }
            let Some(tile) = tiles.next() else {
                break;
            };
            if tile_tx.blocking_send(tile).is_err() {
                break;
            }
        }
        outside
    });

    let dispatch = tokio::task::spawn_blocking(move || {
        let mut dispatcher = dispatcher;
        while let Some(detection) = det_rx.blocking_recv() {
            dispatcher.handle(detection);
        }
        dispatcher.finish()
    });

    let permits = adapter
        .max_concurrency()
        .map(|n| Arc::new(Semaphore::new(n.max(1))));
    let stage = Arc::new(TileStage {
        report_id: job.report_id,
        adapter,
        reprojector,
        footprint,
        area,
        min_confidence: job.min_confidence,
        timeout: ctx.settings.tile_timeout,
        permits,
        progress: bar,
    });
    let tile_rx = Arc::new(Mutex::new(tile_rx));
    let mut set = JoinSet::new();
    for _ in 0..workers {
        set.spawn(Arc::clone(&stage).work(
            Arc::clone(&tile_rx),
            det_tx.clone(),
            cancel.clone(),
        ));
    }
    drop(det_tx);
    drop(tile_rx);

    let mut counts = TileCounts::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(worker) => counts += worker,
            Err(e) => error!(report = %job.report_id, "tile worker failed: {e}"),
        }
    }
    let outside_tiles = reader.await.unwrap_or_else(|e| {
        error!(report = %job.report_id, "tile reader failed: {e}");
        0
    });
    let report = dispatch.await.unwrap_or_else(|e| {
        error!(report = %job.report_id, "dispatcher failed: {e}");
        DispatchReport::default()
    });

    (counts, outside_tiles, report)
}

fn record_status(store: &dyn DetectionStore, id: ReportId, status: &ReportStatus) {
    if let Err(e) = store.set_report_status(id, status.clone()) {
        error!(report = %id, "failed to record status {status}: {e}");
    }
}
