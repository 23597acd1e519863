//! Object detection inference.

mod adapter;
mod cache;
pub mod detector;
pub mod nms;
mod resolver;
mod types;

pub use adapter::InferenceAdapter;
pub use cache::ModelCache;
pub use detector::OnnxDetector;
pub use resolver::{ConfigModelResolver, ModelResolver, StaticModelResolver};
pub use types::{BoxGeometry, RawDetection, filter_by_confidence};
