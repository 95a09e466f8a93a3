//! The tagging engine: asset discovery, the per-asset pipeline, failure
//! bookkeeping and cycle orchestration.

mod cycle;
mod discovery;
mod failure_tracker;
mod processor;
mod state_file;
mod tag_cache;

#[cfg(test)]
pub(crate) mod testing;

pub use cycle::{
    AccountRuntime, CycleEngine, CycleReport, EngineSettings, ProgressState, SharedProgress,
    SharedReachability,
};
pub use discovery::AssetDiscovery;
pub use failure_tracker::{FailureRecord, FailureSummary, FailureTracker, PERMANENT_SAMPLE_SIZE};
pub use processor::{AssetOutcome, AssetStatus, BatchProcessor, BatchReport, ProcessorSettings};
pub use state_file::StateFile;
pub use tag_cache::{is_valid_tag_name, normalize_tag_name, TagCache};
