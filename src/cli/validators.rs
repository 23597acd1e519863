//! CLI argument validators.
//!
//! Shared validation functions for CLI argument parsing.

use crate::store::RegionId;

/// Parse and validate confidence value (0.0-1.0).
pub fn parse_confidence(s: &str) -> Result<f32, String> {
    let value: f32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if !(0.0..=1.0).contains(&value) {
        return Err(format!(
            "confidence must be between 0.0 and 1.0, got {value}"
        ));
    }

    Ok(value)
}

/// Parse a tile edge length, rejecting zero and oversized tiles.
pub fn parse_tile_size(s: &str) -> Result<u32, String> {
    let value: u32 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid tile size"))?;

    if value == 0 || value > crate::constants::MAX_TILE_SIZE {
        return Err(format!(
            "tile size must be between 1 and {}, got {value}",
            crate::constants::MAX_TILE_SIZE
        ));
    }

    Ok(value)
}

/// Parse a rule region id.
pub fn parse_region_id(s: &str) -> Result<RegionId, String> {
    s.trim()
        .parse::<u64>()
        .map(RegionId)
        .map_err(|_| format!("'{s}' is not a valid region id"))
}
