#![forbid(unsafe_code)]

pub mod browser;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod ingest;
pub mod logging;
pub mod schema;
pub mod store;
pub mod summary;
