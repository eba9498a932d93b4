pub mod api;
pub mod app;
pub mod capability;
pub mod clustering;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model_cache;
pub mod orchestrator;
pub mod preprocess;
pub mod sentiment;
pub mod types;
