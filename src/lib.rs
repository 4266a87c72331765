// Library surface for the CLI and integration tests.
pub mod analysis;
pub mod app_dirs;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod export;
pub mod gateway;
pub mod policy;
pub mod results;
pub mod runtime;
pub mod scoring;
pub mod session;
pub mod store;
pub mod words;
