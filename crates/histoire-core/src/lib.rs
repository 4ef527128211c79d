//! histoire-core library.
//!
//! Status updates are stored as one text shard per user per era. This crate
//! plans which shards a query needs, fetches them concurrently, parses and
//! merges the records, and keeps a cached directory of known users.
//!
//! # Conventions
//!
//! - **Errors**: `thiserror` enums per component, each mapping to an
//!   [`error::ErrorCode`]. Configuration loading returns `anyhow::Result`.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod aggregate;
pub mod config;
pub mod directory;
pub mod display;
pub mod era;
pub mod error;
pub mod feed;
#[cfg(test)]
mod http_fixture;
pub mod lock;
pub mod parser;
pub mod record;
pub mod store;
pub mod timing;
