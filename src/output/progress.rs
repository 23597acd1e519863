//! Progress bar utilities for image processing.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a progress bar for processing multiple images.
pub fn create_image_progress(total_images: usize, enabled: bool) -> Option<ProgressBar> {
    if !enabled || total_images == 0 {
        return None;
    }

    let pb = ProgressBar::new(total_images as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} images ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    Some(pb)
}

/// Create a progress bar for the tiles of one image, attached to `multi`.
pub fn create_tile_progress(
    total_tiles: usize,
    image_name: &str,
    multi: Option<&MultiProgress>,
) -> Option<ProgressBar> {
    let multi = multi?;
    if total_tiles == 0 {
        return None;
    }

    let pb = multi.add(ProgressBar::new(total_tiles as u64));
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] {{bar:40.cyan/blue}} {{pos}}/{{len}} tiles - {image_name}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░ "),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

/// Finish a progress bar with a message.
pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

/// Increment a progress bar.
pub fn inc_progress(pb: Option<&ProgressBar>) {
    if let Some(pb) = pb {
        pb.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_progress_is_none() {
        assert!(create_image_progress(3, false).is_none());
        assert!(create_image_progress(0, true).is_none());
        assert!(create_tile_progress(16, "scene.tif", None).is_none());
    }

    #[test]
    fn test_tile_progress_counts() {
        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        let pb = create_tile_progress(4, "scene.tif", Some(&multi));
        inc_progress(pb.as_ref());
        inc_progress(pb.as_ref());
        assert_eq!(pb.as_ref().map(ProgressBar::position), Some(2));
        finish_progress(pb, "done");
    }
}
