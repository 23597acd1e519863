//! Oro - tiled object detection and rule-region alerting for georeferenced imagery.
//!
//! Large rasters are cut into tiles, each tile runs through a detection
//! model, detections are mapped back into geographic coordinates and
//! persisted, and every new detection is checked against user-defined
//! rule regions to emit notifications.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod output;
pub mod pipeline;
pub mod raster;
pub mod reconstruct;
pub mod regions;
pub mod store;

use clap::Parser;
use cli::{Cli, Command, DetectArgs};
use config::{
    Config, ModelConfig, ModelType, config_file_path, load_default_config, save_default_config,
};
use dispatch::{JsonLinesSink, LogSink, MultiSink, NotificationSink, ReportRouter};
use geometry::Area;
use inference::{ConfigModelResolver, ModelCache};
use output::{GeoJsonWriter, progress};
use pipeline::{
    Job, JobContext, JobQueue, JobSummary, OutputKind, PipelineSettings, collect_input_files,
    output_dir_for, output_path_for,
};
use raster::GeoTiffOpener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::{DetectionStore, MemoryStore, RegionId, ReportStatus};
use tracing::{error, info, warn};

pub use error::{Error, Result};

/// Main entry point for the oro CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.detect.verbose, cli.detect.quiet);

    let config = load_default_config()?;

    if let Some(command) = cli.command {
        return handle_command(command, &config);
    }

    if cli.inputs.is_empty() {
        cli::help::print_smart_help(&config);
        return Ok(());
    }

    detect_images(&cli.inputs, &cli.detect, &config)
}

/// Settings for one CLI run after applying flag overrides to the config.
struct RunOptions {
    model: String,
    min_confidence: f32,
    concurrent_jobs: usize,
    settings: PipelineSettings,
}

fn resolve_options(args: &DetectArgs, config: &Config) -> Result<RunOptions> {
    let model = args
        .model
        .clone()
        .or_else(|| config.defaults.model.clone())
        .ok_or_else(|| Error::ConfigValidation {
            message: "no model selected; pass -m <name> or set defaults.model".to_string(),
        })?;
    config::get_model(config, &model)?;

    let mut settings = PipelineSettings::from_config(config);
    if let Some(tile_size) = args.tile_size {
        settings.tile_size = tile_size;
    }
    if let Some(overlap) = args.overlap {
        settings.overlap = overlap;
    }
    if let Some(workers) = args.workers {
        settings.workers = workers.max(1);
    }
    if let Some(secs) = args.tile_timeout {
        settings.tile_timeout = std::time::Duration::from_secs(secs.max(1));
    }
    if let Some(crs) = args.target_crs {
        settings.target_crs = crs;
    }
    config::validate_tiling(settings.tile_size, settings.overlap)?;

    Ok(RunOptions {
        model,
        min_confidence: args.min_confidence.unwrap_or(config.defaults.min_confidence),
        concurrent_jobs: args.jobs.unwrap_or(config.queue.concurrent_jobs).max(1),
        settings,
    })
}

/// Load rule regions into the store and pick the ones jobs evaluate.
fn load_rule_regions(args: &DetectArgs, store: &MemoryStore) -> Result<Vec<RegionId>> {
    let loaded = match &args.regions {
        Some(path) => {
            let regions = regions::load_regions(path)?;
            let mut ids = Vec::with_capacity(regions.len());
            for region in regions {
                ids.push(region.id);
                store.upsert_rule_region(region)?;
            }
            info!("Loaded {} rule region(s) from {}", ids.len(), path.display());
            Some(ids)
        }
        None => None,
    };
    select_region_ids(loaded, args.region_ids.clone())
}

/// Regions a job evaluates: the requested subset, or every loaded region.
fn select_region_ids(
    loaded: Option<Vec<RegionId>>,
    requested: Option<Vec<RegionId>>,
) -> Result<Vec<RegionId>> {
    match (loaded, requested) {
        (None, Some(_)) => Err(Error::ConfigValidation {
            message: "--region-ids selects from --regions, which was not given".to_string(),
        }),
        (None, None) => Ok(Vec::new()),
        (Some(_), Some(requested)) => Ok(requested),
        (Some(loaded), None) => Ok(loaded),
    }
}

/// Area of interest shared by every job of this run.
fn load_area_of_interest(args: &DetectArgs) -> Result<Option<Area>> {
    let Some(path) = &args.area_of_interest else {
        return Ok(None);
    };
    let area = regions::load_area(path)?;
    info!(
        "Restricting detections to a {}-part area of interest from {}",
        area.parts().len(),
        path.display()
    );
    Ok(Some(area))
}

/// Process images with the given options.
fn detect_images(inputs: &[PathBuf], args: &DetectArgs, config: &Config) -> Result<()> {
    config::validate_config(config)?;
    let options = resolve_options(args, config)?;

    let files = collect_input_files(inputs)?;
    if files.is_empty() {
        warn!("No GeoTIFF files found in inputs");
        return Ok(());
    }

    let store = Arc::new(MemoryStore::new());
    let region_ids = load_rule_regions(args, &store)?;
    let area_of_interest = load_area_of_interest(args)?;

    let resolver = Arc::new(ConfigModelResolver::new(config.models.clone()));
    let models = Arc::new(ModelCache::new(resolver, config.cache.models));
    let router = Arc::new(ReportRouter::new(Arc::new(LogSink)));

    let progress_enabled = !args.quiet && !args.no_progress;
    let multi = progress_enabled.then(indicatif::MultiProgress::new);

    let mut ctx = JobContext::new(
        Arc::clone(&store) as Arc<dyn DetectionStore>,
        models,
        Arc::new(GeoTiffOpener),
        Arc::clone(&router) as Arc<dyn NotificationSink>,
        options.settings,
    );
    if let Some(multi) = &multi {
        ctx = ctx.with_progress(multi.clone());
    }
    let ctx = Arc::new(ctx);

    // Reports and notification files are prepared before any job starts.
    let mut planned = Vec::with_capacity(files.len());
    for file in &files {
        let output_dir = output_dir_for(file, args.output_dir.as_deref());
        std::fs::create_dir_all(&output_dir)?;

        let name = file
            .file_stem()
            .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
        let report_id = store.create_report(&name, &file.to_string_lossy())?;

        let notifications = output_path_for(file, &output_dir, OutputKind::Notifications);
        let sink: Arc<dyn NotificationSink> = Arc::new(MultiSink::new(vec![
            Arc::new(JsonLinesSink::create(&notifications)?),
            Arc::new(LogSink),
        ]));
        router.route(report_id, sink)?;

        planned.push((
            file.clone(),
            output_dir,
            Job {
                image_ref: file.to_string_lossy().into_owned(),
                report_id,
                model_ref: options.model.clone(),
                min_confidence: options.min_confidence,
                region_ids: region_ids.clone(),
                area_of_interest: area_of_interest.clone(),
            },
        ));
    }

    info!(
        "Processing {} image(s) with model '{}' (min confidence {:.2})",
        planned.len(),
        options.model,
        options.min_confidence
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal {
            message: format!("Failed to create async runtime: {e}"),
        })?;

    let total = planned.len();
    let image_progress = multi
        .as_ref()
        .and_then(|m| progress::create_image_progress(total, true).map(|pb| m.add(pb)));

    let failed = runtime.block_on(async {
        let queue = JobQueue::start(Arc::clone(&ctx), options.concurrent_jobs);

        let token = queue.cancel_token();
        if let Err(e) = ctrlc::set_handler(move || token.cancel()) {
            warn!("Failed to install Ctrl+C handler: {e}");
        }

        let mut handles = Vec::with_capacity(planned.len());
        for (file, output_dir, job) in planned {
            handles.push((file, output_dir, queue.submit(job)?));
        }

        let mut failed = 0;
        for (file, output_dir, handle) in handles {
            let summary = handle.wait().await?;
            if !finish_image(&file, &output_dir, &summary, store.as_ref()) {
                failed += 1;
            }
            progress::inc_progress(image_progress.as_ref());
        }

        queue.shutdown().await;
        Ok::<usize, Error>(failed)
    })?;
    progress::finish_progress(image_progress, "Processing complete");

    if failed > 0 {
        return Err(Error::JobsFailed { failed, total });
    }
    Ok(())
}

/// Write the detections file and log the outcome. Returns whether the job
/// produced usable results.
fn finish_image(file: &Path, output_dir: &Path, summary: &JobSummary, store: &MemoryStore) -> bool {
    if let ReportStatus::Failed { reason } = &summary.status {
        error!("{}: failed ({reason})", file.display());
        return false;
    }

    let path = output_path_for(file, output_dir, OutputKind::Detections);
    let written = store
        .detections_for_report(summary.report_id)
        .and_then(|detections| {
            let mut writer = GeoJsonWriter::new(&path)?;
            output::write_all(&mut writer, &detections)?;
            Ok(writer.written())
        });
    match written {
        Ok(count) => info!(
            "{}: {} ({} tiles, {} skipped, {} detections, {} notifications) -> {}",
            file.display(),
            summary.status,
            summary.tiles_total,
            summary.tiles_skipped,
            count,
            summary.notifications_emitted,
            path.display()
        ),
        Err(e) => {
            error!("{}: failed to write detections: {e}", file.display());
            return false;
        }
    }

    for event in &summary.undelivered {
        warn!(
            "{}: undelivered notification for detection {} in region {}",
            file.display(),
            event.detection_id,
            event.rule_region_id
        );
    }
    if !summary.deferred.is_empty() {
        warn!(
            "{}: rule evaluation deferred for {} detection(s)",
            file.display(),
            summary.deferred.len()
        );
    }
    true
}

/// Initialize tracing/logging.
fn init_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    // ORT logging is suppressed by default; -v and above let it through.
    let filter_str = if quiet {
        "warn,ort=off".to_string()
    } else {
        match verbose {
            0 => "info,ort=off".to_string(),
            1 => "debug,ort=warn".to_string(),
            2 => "trace,ort=info".to_string(),
            _ => "trace".to_string(),
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Handle subcommands.
fn handle_command(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Config { action } => handle_config_command(action),
        Command::Models { action } => handle_models_command(action, config),
    }
}

#[allow(clippy::print_stdout)]
fn handle_config_command(action: cli::ConfigAction) -> Result<()> {
    use cli::ConfigAction;

    match action {
        ConfigAction::Init => {
            let path = config_file_path()?;
            if path.exists() {
                println!("Configuration file already exists: {}", path.display());
                println!("Use 'oro models add' to add models.");
            } else {
                let config = Config::default();
                let saved_path = save_default_config(&config)?;
                println!("Created configuration file: {}", saved_path.display());
                println!("\nNext steps:");
                println!(
                    "  oro models add <name> --path <model.onnx> --labels <labels.txt> --type <yolo|yolo-obb> --default"
                );
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_default_config()?;
            let rendered =
                toml::to_string_pretty(&config).map_err(|e| Error::ConfigSerialize { source: e })?;
            println!("{rendered}");
            Ok(())
        }
        ConfigAction::Path => {
            let path = config_file_path()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

#[allow(clippy::print_stdout)]
fn handle_models_command(action: cli::ModelsAction, config: &Config) -> Result<()> {
    use cli::ModelsAction;

    match action {
        ModelsAction::List => {
            if config.models.is_empty() {
                println!("No models configured.");
            } else {
                println!("Configured models:");
                let mut names: Vec<_> = config.models.keys().collect();
                names.sort();
                for name in names {
                    let model = &config.models[name];
                    let default_marker = config.defaults.model.as_ref().is_some_and(|d| d == name);
                    println!(
                        "  {} ({}){}",
                        name,
                        model.model_type,
                        if default_marker { " [default]" } else { "" }
                    );
                }
            }
            Ok(())
        }
        ModelsAction::Add {
            name,
            path,
            labels,
            r#type,
            input_size,
            default,
        } => handle_models_add(name, path, labels, r#type, input_size, default),
        ModelsAction::Check => {
            let mut names: Vec<_> = config.models.keys().collect();
            names.sort();
            for name in names {
                let model = &config.models[name];
                config::validate_model_config(name, model)?;
                let detector = inference::OnnxDetector::load(name, model)?;
                println!(
                    "  {name}: OK ({} classes)",
                    inference::InferenceAdapter::labels(&detector).len()
                );
            }
            Ok(())
        }
    }
}

#[allow(clippy::print_stdout)]
fn handle_models_add(
    name: String,
    path: PathBuf,
    labels: PathBuf,
    model_type: ModelType,
    input_size: Option<u32>,
    set_default: bool,
) -> Result<()> {
    if !path.exists() {
        return Err(Error::ModelFileNotFound { path });
    }
    if !labels.exists() {
        return Err(Error::LabelsFileNotFound { path: labels });
    }

    let mut config = load_default_config()?;

    if config.models.contains_key(&name) {
        return Err(Error::ModelAlreadyExists { name });
    }

    config.models.insert(
        name.clone(),
        ModelConfig {
            path: path.clone(),
            labels: labels.clone(),
            model_type,
            input_size,
            iou_threshold: None,
        },
    );

    if set_default {
        config.defaults.model = Some(name.clone());
    }

    let config_path = save_default_config(&config)?;

    println!("Added model '{name}' ({model_type})");
    println!("  Model: {}", path.display());
    println!("  Labels: {}", labels.display());
    println!("  Default: {}", if set_default { "yes" } else { "no" });
    println!("\nConfiguration saved to: {}", config_path.display());

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_region_ids_default_to_every_loaded_region() {
        let ids = select_region_ids(Some(vec![RegionId(1), RegionId(2)]), None).unwrap();
        assert_eq!(ids, vec![RegionId(1), RegionId(2)]);
        let ids = select_region_ids(Some(vec![RegionId(1), RegionId(2)]), Some(vec![RegionId(2)]))
            .unwrap();
        assert_eq!(ids, vec![RegionId(2)]);
        assert!(select_region_ids(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_region_ids_without_regions_file_are_rejected() {
        let err = select_region_ids(None, Some(vec![RegionId(3)])).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
        assert!(err.to_string().contains("--regions"));
    }
}
