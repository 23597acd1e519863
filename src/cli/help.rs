//! Help message display for CLI.

#![allow(clippy::print_stdout)]

use crate::config::Config;

/// Print help message based on configuration state.
pub fn print_smart_help(config: &Config) {
    if config.models.is_empty() {
        print_first_time_help();
    } else {
        print_configured_help();
    }
}

/// Print detailed setup guide for first-time users.
pub fn print_first_time_help() {
    println!("No models configured. Get started with oro:");
    println!();
    println!("1. Initialize configuration:");
    println!("   oro config init");
    println!();
    println!("2. Export a YOLO detect or OBB model to ONNX, and write its class");
    println!("   names to a labels file, one per line.");
    println!();
    println!("3. Add the model to configuration:");
    println!("   oro models add vessels --path ./vessels.onnx --labels ./vessels.txt --type yolo-obb --default");
    println!();
    println!("4. Point ORT_DYLIB_PATH at your ONNX Runtime library and process imagery:");
    println!("   oro scene.tif --regions zones.geojson");
    println!();
    println!("Run 'oro -h' for all options.");
}

/// Print brief usage reminder for configured users.
pub fn print_configured_help() {
    println!("Usage: oro [IMAGES]... [OPTIONS]");
    println!();
    println!("Example: oro scene.tif -m vessels -c 0.4 --regions zones.geojson");
    println!();
    println!("Run 'oro -h' for all options or 'oro models list' to see configured models.");
}
