//! review-harvest command-line front end.
//!
//! Wires the `review-harvest` core to Chromium (render surface), reqwest
//! (image downloads), the filesystem (run directories) and the console.

pub mod browser;
pub mod config;
pub mod display;
pub mod doctor;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod storage;

pub use config::{ConfigLoader, ConfigOverrides, HarvestConfig};
pub use pipeline::{RunReport, RunSummary};
pub use storage::{RunMetadata, RunStorage};
