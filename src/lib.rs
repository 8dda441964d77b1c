pub mod analytics;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod journal;
pub mod lifecycle;
pub mod log;
pub mod reconciler;
pub mod store;
pub mod workflow;
