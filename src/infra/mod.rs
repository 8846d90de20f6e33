//! External-facing plumbing: the WTO API client and the disk snapshot store.

pub mod cache;
pub mod wto;

pub use cache::{DatasetSnapshot, SnapshotStore, SNAPSHOT_TTL};
pub use wto::{
    default_year_span, reporter_code, CacheStatus, CachedPayload, Reporter, WtoClient,
    WtoClientError, API_KEY_ENV, KNOWN_REPORTERS, MERCHANDISE_IMPORTS_INDICATOR,
};
