//! Tagsmith Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod engine;
pub mod gallery;
pub mod health;
pub mod scheduler;
pub mod tagmodel;

// Re-export commonly used types for convenience
pub use config::{AppConfig, CliConfig, FileConfig};
pub use engine::{CycleEngine, CycleReport, FailureTracker};
pub use gallery::{GalleryApi, GalleryClient};
pub use tagmodel::{RemoteTagModel, TagModel};
