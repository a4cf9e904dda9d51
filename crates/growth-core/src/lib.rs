pub mod completeness;
pub mod config;
pub mod dedup;
pub mod derive;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod pipeline;
pub mod ranges;
pub mod report;
pub mod schema;
pub mod upload;
