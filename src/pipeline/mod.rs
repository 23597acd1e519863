//! Job execution: tiling, inference, reconstruction and dispatch.

mod cancel;
mod inputs;
mod job;
mod queue;
mod runner;

pub use cancel::CancelToken;
pub use inputs::{OutputKind, collect_input_files, output_dir_for, output_path_for};
pub use job::{Job, JobSummary, PipelineSettings};
pub use queue::{JobHandle, JobQueue};
pub use runner::{JobContext, run_job};
