//! CLI argument definitions.

use super::validators::{parse_confidence, parse_region_id, parse_tile_size};
use crate::config::ModelType;
use crate::geometry::Crs;
use crate::store::RegionId;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tiled object detection and rule-region alerting for GeoTIFF imagery.
#[derive(Debug, Parser)]
#[command(name = "oro")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// GeoTIFF files or directories to process.
    pub inputs: Vec<PathBuf>,

    /// Common options for detection.
    #[command(flatten)]
    pub detect: DetectArgs,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage configuration.
    Config {
        /// Configuration action to perform.
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage models.
    Models {
        /// Models action to perform.
        #[command(subcommand)]
        action: ModelsAction,
    },
}

/// Config subcommand actions.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Create default configuration file.
    Init,
    /// Display current configuration.
    Show,
    /// Print configuration file path.
    Path,
}

/// Models subcommand actions.
#[derive(Debug, Subcommand)]
pub enum ModelsAction {
    /// List configured models.
    List,
    /// Add a new model to configuration.
    Add {
        /// Name for this model (e.g., "vessels").
        name: String,
        /// Path to the ONNX model file.
        #[arg(long)]
        path: PathBuf,
        /// Path to the labels file.
        #[arg(long)]
        labels: PathBuf,
        /// Detection head layout.
        #[arg(long, value_enum, default_value_t = ModelType::Yolo)]
        r#type: ModelType,
        /// Square input size the model expects.
        #[arg(long)]
        input_size: Option<u32>,
        /// Set as the default model.
        #[arg(long)]
        default: bool,
    },
    /// Verify model files exist and load.
    Check,
}

/// Arguments for processing images.
#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Model name from configuration.
    #[arg(short, long, env = "ORO_MODEL")]
    pub model: Option<String>,

    /// Minimum confidence threshold (0.0-1.0, inclusive).
    #[arg(short = 'c', long, value_parser = parse_confidence, env = "ORO_MIN_CONFIDENCE")]
    pub min_confidence: Option<f32>,

    /// Tile edge length in pixels.
    #[arg(long, value_parser = parse_tile_size, env = "ORO_TILE_SIZE")]
    pub tile_size: Option<u32>,

    /// Overlap between neighbouring tiles in pixels.
    #[arg(long, env = "ORO_OVERLAP")]
    pub overlap: Option<u32>,

    /// Tiles inferred concurrently per image.
    #[arg(short, long, env = "ORO_WORKERS")]
    pub workers: Option<usize>,

    /// Images processed concurrently.
    #[arg(short, long, env = "ORO_JOBS")]
    pub jobs: Option<usize>,

    /// Per-tile inference deadline in seconds.
    #[arg(long, env = "ORO_TILE_TIMEOUT")]
    pub tile_timeout: Option<u64>,

    /// GeoJSON file of rule regions (in the target CRS).
    #[arg(short, long, env = "ORO_REGIONS")]
    pub regions: Option<PathBuf>,

    /// Only evaluate these region ids (comma-separated; default: all).
    #[arg(long, value_delimiter = ',', value_parser = parse_region_id, requires = "regions")]
    pub region_ids: Option<Vec<RegionId>>,

    /// GeoJSON polygon(s) limiting where detections are kept (in the target CRS).
    #[arg(long, env = "ORO_AREA_OF_INTEREST")]
    pub area_of_interest: Option<PathBuf>,

    /// CRS detection footprints are stored in (e.g. EPSG:4326).
    #[arg(long, env = "ORO_TARGET_CRS")]
    pub target_crs: Option<Crs>,

    /// Output directory (default: next to each image).
    #[arg(short, long, env = "ORO_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Suppress progress output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable progress bars only.
    #[arg(long)]
    pub no_progress: bool,

    /// Increase verbosity (-v: debug, -vv: trace+ORT info, -vvv: trace+ORT debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_simple() {
        let cli = Cli::try_parse_from(["oro", "scene.tif"]).unwrap();
        assert_eq!(cli.inputs.len(), 1);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_with_options() {
        let cli = Cli::try_parse_from([
            "oro",
            "scene.tif",
            "-m",
            "vessels",
            "-c",
            "0.4",
            "--tile-size",
            "1024",
            "--overlap",
            "64",
            "--target-crs",
            "EPSG:3857",
            "-q",
        ])
        .unwrap();
        assert_eq!(cli.detect.model.as_deref(), Some("vessels"));
        assert_eq!(cli.detect.min_confidence, Some(0.4));
        assert_eq!(cli.detect.tile_size, Some(1024));
        assert_eq!(cli.detect.overlap, Some(64));
        assert_eq!(cli.detect.target_crs, Some(Crs::Epsg(3857)));
        assert!(cli.detect.quiet);
    }

    #[test]
    fn test_cli_region_ids_need_regions() {
        assert!(Cli::try_parse_from(["oro", "scene.tif", "--region-ids", "1,2"]).is_err());

        let cli = Cli::try_parse_from([
            "oro",
            "scene.tif",
            "--regions",
            "zones.geojson",
            "--region-ids",
            "1,2",
        ])
        .unwrap();
        assert_eq!(cli.detect.region_ids, Some(vec![RegionId(1), RegionId(2)]));
    }

    #[test]
    fn test_cli_area_of_interest() {
        let cli =
            Cli::try_parse_from(["oro", "scene.tif", "--area-of-interest", "aoi.geojson"]).unwrap();
        assert_eq!(cli.detect.area_of_interest, Some(PathBuf::from("aoi.geojson")));
    }

    #[test]
    fn test_cli_rejects_bad_confidence() {
        assert!(Cli::try_parse_from(["oro", "scene.tif", "-c", "1.5"]).is_err());
    }

    #[test]
    fn test_cli_parse_config_subcommand() {
        let cli = Cli::try_parse_from(["oro", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Config {
                action: ConfigAction::Show
            })
        ));
    }

    #[test]
    fn test_cli_parse_models_add() {
        let cli = Cli::try_parse_from([
            "oro",
            "models",
            "add",
            "vessels",
            "--path",
            "vessels.onnx",
            "--labels",
            "vessels.txt",
            "--type",
            "yolo-obb",
            "--default",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Models {
                action: ModelsAction::Add { name, r#type, default, .. },
            }) => {
                assert_eq!(name, "vessels");
                assert_eq!(r#type, ModelType::YoloObb);
                assert!(default);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
