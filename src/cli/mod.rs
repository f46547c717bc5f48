//! CLI-specific functionality for tasklife
//!
//! This module contains all CLI-related code including argument parsing,
//! snapshot file handling, and configuration discovery.

pub mod args;
pub mod config;
pub mod snapshots;

pub use args::{Args, ExecutionMode, InspectConfig, ReincarnateConfig};
pub use config::{ConfigDiscovery, FactoryConfig};
pub use snapshots::{ReincarnationReport, SnapshotFileError, SnapshotLoader, render_tree};
