//! Listening-history enrichment: grouping, identifier resolution, attribute merge.

pub mod aggregate;
pub mod attributes;
pub mod pacer;
pub mod pipeline;

pub use pacer::{pacer_for_interval_ms, RequestPacer};
pub use pipeline::{EnrichmentPipeline, RunSummary};
