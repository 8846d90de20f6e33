//! Aggregation pipeline and WTO API client for merchandise-import statistics.
//!
//! The crate splits into two layers:
//!
//! - [`domain`]: pure, deterministic transformations over tables of
//!   [`domain::ImportRecord`] rows (latest-year resolution, per-country
//!   totals and rankings, share evolution, growth rates, cross-tabulation).
//! - [`infra`]: the asynchronous [`infra::WtoClient`] with its in-memory
//!   TTL cache and optional on-disk snapshot store.
//!
//! Every transformation leaves its input untouched and returns owned
//! results in a deterministic order, so the same table always produces
//! the same output regardless of environment.

pub mod domain;
pub mod infra;

pub use domain::ImportRecord;
pub use infra::{WtoClient, WtoClientError};
