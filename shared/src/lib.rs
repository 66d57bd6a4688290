//! Shared building blocks for the htmc-ws server and downloader.
pub mod config;
pub mod errors;
pub mod layout;
pub mod prompt;
