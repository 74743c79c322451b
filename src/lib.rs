pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod portal;
pub mod scheduler;
pub mod server;
pub mod types;
