//! Configuration validation.

use crate::config::{Config, ModelConfig};
use crate::constants::{MAX_TILE_SIZE, confidence};
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_defaults(config)?;
    validate_dispatch(config)?;

    if config.cache.models == 0 {
        return Err(Error::ConfigValidation {
            message: "cache.models must be at least 1".to_string(),
        });
    }
    if config.queue.concurrent_jobs == 0 {
        return Err(Error::ConfigValidation {
            message: "queue.concurrent_jobs must be at least 1".to_string(),
        });
    }

    for (name, model) in &config.models {
        if let Some(iou) = model.iou_threshold
            && !(0.0..=1.0).contains(&iou)
        {
            return Err(Error::ConfigValidation {
                message: format!("models.{name}.iou_threshold must be between 0 and 1, got {iou}"),
            });
        }
        if model.input_size == Some(0) {
            return Err(Error::ConfigValidation {
                message: format!("models.{name}.input_size must be greater than 0"),
            });
        }
    }

    Ok(())
}

/// Validate default settings.
fn validate_defaults(config: &Config) -> Result<()> {
    let defaults = &config.defaults;

    if !(confidence::MIN..=confidence::MAX).contains(&defaults.min_confidence) {
        return Err(Error::ConfigValidation {
            message: format!(
                "min_confidence must be between {} and {}, got {}",
                confidence::MIN,
                confidence::MAX,
                defaults.min_confidence
            ),
        });
    }

    validate_tiling(defaults.tile_size, defaults.overlap)?;

    if defaults.workers == 0 {
        return Err(Error::ConfigValidation {
            message: "workers must be at least 1".to_string(),
        });
    }

    if defaults.tile_timeout_secs == 0 {
        return Err(Error::ConfigValidation {
            message: "tile_timeout_secs must be at least 1".to_string(),
        });
    }

    if defaults.target_crs.proj_string().is_none() {
        return Err(Error::ConfigValidation {
            message: format!("target_crs {} has no known definition", defaults.target_crs),
        });
    }

    if let Some(ref model_name) = defaults.model
        && !config.models.contains_key(model_name)
    {
        return Err(Error::ModelNotFound {
            name: model_name.clone(),
        });
    }

    Ok(())
}

fn validate_dispatch(config: &Config) -> Result<()> {
    let dispatch = &config.dispatch;
    for (name, attempts) in [
        ("query_attempts", dispatch.query_attempts),
        ("insert_attempts", dispatch.insert_attempts),
        ("delivery_attempts", dispatch.delivery_attempts),
    ] {
        if attempts == 0 {
            return Err(Error::ConfigValidation {
                message: format!("dispatch.{name} must be at least 1"),
            });
        }
    }
    Ok(())
}

/// Validate a tile size / overlap pair.
pub fn validate_tiling(tile_size: u32, overlap: u32) -> Result<()> {
    if tile_size == 0 || tile_size > MAX_TILE_SIZE {
        return Err(Error::ConfigValidation {
            message: format!("tile_size must be between 1 and {MAX_TILE_SIZE}, got {tile_size}"),
        });
    }
    if overlap >= tile_size {
        return Err(Error::ConfigValidation {
            message: format!("overlap ({overlap}) must be smaller than tile_size ({tile_size})"),
        });
    }
    Ok(())
}

/// Validate a model configuration and check files exist.
pub fn validate_model_config(_name: &str, model: &ModelConfig) -> Result<()> {
    if !model.path.exists() {
        return Err(Error::ModelFileNotFound {
            path: model.path.clone(),
        });
    }

    if !model.labels.exists() {
        return Err(Error::LabelsFileNotFound {
            path: model.labels.clone(),
        });
    }

    Ok(())
}

/// Get a model by name from the config.
pub fn get_model<'a>(config: &'a Config, name: &str) -> Result<&'a ModelConfig> {
    config.models.get(name).ok_or_else(|| Error::ModelNotFound {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelType;
    use std::path::PathBuf;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_invalid_confidence() {
        let mut config = Config::default();
        config.defaults.min_confidence = 1.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_overlap_not_smaller_than_tile() {
        let mut config = Config::default();
        config.defaults.tile_size = 256;
        config.defaults.overlap = 256;
        assert!(validate_config(&config).is_err());

        config.defaults.overlap = 255;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_oversized_tile() {
        assert!(validate_tiling(MAX_TILE_SIZE + 1, 0).is_err());
        assert!(validate_tiling(MAX_TILE_SIZE, 0).is_ok());
    }

    #[test]
    fn test_validate_unknown_target_crs() {
        let mut config = Config::default();
        config.defaults.target_crs = crate::geometry::Crs::Epsg(9);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.defaults.workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_retry_attempts() {
        let mut config = Config::default();
        config.dispatch.delivery_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_missing_default_model() {
        let mut config = Config::default();
        config.defaults.model = Some("nonexistent".to_string());
        let result = validate_config(&config);
        assert!(matches!(result, Err(Error::ModelNotFound { .. })));
    }

    #[test]
    fn test_validate_model_iou_range() {
        let mut config = Config::default();
        config.models.insert(
            "vehicles".to_string(),
            ModelConfig {
                path: PathBuf::from("vehicles.onnx"),
                labels: PathBuf::from("vehicles.txt"),
                model_type: ModelType::Yolo,
                input_size: None,
                iou_threshold: Some(1.2),
            },
        );
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_model_config_missing_file() {
        let model = ModelConfig {
            path: PathBuf::from("/nonexistent/vehicles.onnx"),
            labels: PathBuf::from("/nonexistent/vehicles.txt"),
            model_type: ModelType::Yolo,
            input_size: None,
            iou_threshold: None,
        };
        assert!(matches!(
            validate_model_config("vehicles", &model),
            Err(Error::ModelFileNotFound { .. })
        ));
    }
}
