//! Thin asynchronous client for the WTO timeseries API.
//!
//! - Fetches annual merchandise-import records for a set of reporters.
//! - Maintains a request-keyed 60-minute in-memory cache with stale
//!   fallbacks and an optional on-disk snapshot store.
//!
//! A failed fetch is always surfaced as `WtoClientError` (or served from
//! an existing cache entry marked `Stale`); an empty dataset is a
//! successful result with zero records. The two are never conflated.

use std::{
    collections::HashMap,
    ops::RangeInclusive,
    sync::Arc,
    time::{Duration, SystemTime},
};

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::ImportRecord;
use crate::infra::cache::{DatasetSnapshot, SnapshotStore};

const DEFAULT_BASE_URL: &str = "https://api.wto.org/timeseries/v1/";
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const USER_AGENT: &str = "import-analytics/0.1.0";
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// WTO indicator for annual merchandise imports in million USD.
pub const MERCHANDISE_IMPORTS_INDICATOR: &str = "ITS_MTV_AM";

/// Environment variable consulted by [`WtoClient::from_env`].
pub const API_KEY_ENV: &str = "WTO_API_KEY";

const EARLIEST_YEAR: i32 = 2020;

#[derive(Debug, Error)]
pub enum WtoClientError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error: {0}")]
    Api(String),
    #[error("{API_KEY_ENV} is not set")]
    MissingApiKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fetched from the API on this call.
    Fresh,
    /// Served from a cache layer within its TTL.
    Cached,
    /// Served from an expired cache entry after a failed refresh.
    Stale,
}

#[derive(Clone, Debug)]
pub struct CachedPayload<T> {
    pub data: T,
    pub fetched_at: SystemTime,
    pub status: CacheStatus,
}

impl<T> CachedPayload<T> {
    fn new(data: T, fetched_at: SystemTime, status: CacheStatus) -> Self {
        Self {
            data,
            fetched_at,
            status,
        }
    }
}

#[derive(Default)]
struct WtoCache {
    datasets: HashMap<String, Cached<Vec<ImportRecord>>>,
}

impl WtoCache {
    fn clear(&mut self) {
        self.datasets.clear();
    }
}

/// A reporting economy with its numeric WTO code (the `r` parameter).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reporter {
    pub name: &'static str,
    pub code: &'static str,
}

/// The reporters the original dashboards shipped with.
pub const KNOWN_REPORTERS: &[Reporter] = &[
    Reporter {
        name: "China",
        code: "156",
    },
    Reporter {
        name: "Germany",
        code: "276",
    },
    Reporter {
        name: "United States",
        code: "840",
    },
];

/// Numeric WTO code for a known reporter name.
pub fn reporter_code(name: &str) -> Option<&'static str> {
    KNOWN_REPORTERS
        .iter()
        .find(|reporter| reporter.name == name)
        .map(|reporter| reporter.code)
}

/// Default request span: 2020 through the current UTC year.
pub fn default_year_span() -> RangeInclusive<i32> {
    EARLIEST_YEAR..=OffsetDateTime::now_utc().year()
}

#[derive(Clone)]
pub struct WtoClient {
    http: Client,
    base_url: Url,
    api_key: String,
    cache: Arc<Mutex<WtoCache>>,
    snapshots: Option<SnapshotStore>,
    ttl: Duration,
}

impl WtoClient {
    pub fn new(api_key: &str) -> Result<Self, WtoClientError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Builds a client with the subscription key from `WTO_API_KEY`.
    pub fn from_env() -> Result<Self, WtoClientError> {
        let api_key = std::env::var(API_KEY_ENV).map_err(|_| WtoClientError::MissingApiKey)?;
        Self::new(&api_key)
    }

    pub fn with_base_url(api_key: &str, base: &str) -> Result<Self, WtoClientError> {
        let base_url = Url::parse(base)?;
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            base_url,
            api_key: api_key.to_string(),
            cache: Arc::new(Mutex::new(WtoCache::default())),
            snapshots: None,
            ttl: DEFAULT_TTL,
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Attach an on-disk snapshot store consulted before the network and
    /// written back after every successful fetch.
    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Fetch merchandise-import records for the given reporter codes over
    /// an inclusive year range.
    ///
    /// Resolution order: fresh in-memory entry, unexpired disk snapshot,
    /// network. On a network failure an expired in-memory entry is served
    /// with `CacheStatus::Stale`; without one the error propagates.
    pub async fn fetch_import_records(
        &self,
        reporters: &[&str],
        years: RangeInclusive<i32>,
    ) -> Result<CachedPayload<Vec<ImportRecord>>, WtoClientError> {
        let key = query_key(reporters, &years);

        if let Some(payload) = self.cached_dataset(&key).await {
            return Ok(payload);
        }

        if let Some(records) = self.load_snapshot(&key) {
            return Ok(self.store_dataset(&key, records, CacheStatus::Cached).await);
        }

        let url = self.data_url(reporters, &years)?;
        debug!("requesting WTO dataset from {url}");

        match self.fetch_dataset(url).await {
            Ok(records) => {
                if records.is_empty() {
                    debug!("WTO returned an empty dataset for {key}");
                }
                self.save_snapshot(&key, &records);
                Ok(self.store_dataset(&key, records, CacheStatus::Fresh).await)
            }
            Err(error) => {
                if let Some(stale) = self.cached_dataset_stale(&key).await {
                    warn!("WTO fetch failed ({error}); serving stale dataset for {key}");
                    return Ok(stale);
                }
                Err(error)
            }
        }
    }

    /// Drop every in-memory entry; the next fetch goes back to the source.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    async fn cached_dataset(&self, key: &str) -> Option<CachedPayload<Vec<ImportRecord>>> {
        let cache = self.cache.lock().await;
        let payload = cache
            .datasets
            .get(key)
            .and_then(|entry| entry.if_fresh(self.ttl));
        if payload.is_some() {
            debug!("serving cached WTO dataset for {key}");
        }
        payload
    }

    async fn cached_dataset_stale(&self, key: &str) -> Option<CachedPayload<Vec<ImportRecord>>> {
        let cache = self.cache.lock().await;
        cache.datasets.get(key).map(Cached::stale)
    }

    async fn store_dataset(
        &self,
        key: &str,
        records: Vec<ImportRecord>,
        status: CacheStatus,
    ) -> CachedPayload<Vec<ImportRecord>> {
        let fetched_at = SystemTime::now();
        let payload = CachedPayload::new(records.clone(), fetched_at, status);
        let mut cache = self.cache.lock().await;
        cache
            .datasets
            .insert(key.to_string(), Cached::new(records, fetched_at));
        payload
    }

    fn load_snapshot(&self, key: &str) -> Option<Vec<ImportRecord>> {
        let store = self.snapshots.as_ref()?;
        let snapshot = store.load(key)?;
        if snapshot.is_expired() {
            debug!(
                "disk snapshot for {key} expired (age: {})",
                snapshot.age_string()
            );
            return None;
        }
        debug!(
            "serving disk snapshot for {key} (age: {})",
            snapshot.age_string()
        );
        Some(snapshot.records)
    }

    fn save_snapshot(&self, key: &str, records: &[ImportRecord]) {
        let Some(store) = self.snapshots.as_ref() else {
            return;
        };
        let snapshot = DatasetSnapshot::new(key.to_string(), records.to_vec());
        if let Err(error) = store.save(&snapshot) {
            warn!("failed to save dataset snapshot: {error}");
        }
    }

    async fn fetch_dataset(&self, url: Url) -> Result<Vec<ImportRecord>, WtoClientError> {
        let response = self
            .http
            .get(url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        let envelope: DatasetEnvelope = response.json().await?;
        records_from_envelope(envelope)
    }

    fn data_url(
        &self,
        reporters: &[&str],
        years: &RangeInclusive<i32>,
    ) -> Result<Url, WtoClientError> {
        let mut url = self.url("data")?;
        url.query_pairs_mut()
            .append_pair("i", MERCHANDISE_IMPORTS_INDICATOR)
            .append_pair("r", &reporters.join(","))
            .append_pair("p", "all")
            .append_pair("ps", &format!("{}-{}", years.start(), years.end()))
            .append_pair("fmt", "json")
            .append_pair("lang", "1")
            .append_pair("head", "H")
            .append_pair("max", "20000");
        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path)
    }
}

/// Canonical cache key for a request: sorted reporter codes plus the span.
fn query_key(reporters: &[&str], years: &RangeInclusive<i32>) -> String {
    let mut codes: Vec<&str> = reporters.to_vec();
    codes.sort_unstable();
    format!("{}:{}-{}", codes.join(","), years.start(), years.end())
}

struct Cached<T> {
    value: T,
    fetched_at: SystemTime,
}

impl<T: Clone> Cached<T> {
    fn new(value: T, fetched_at: SystemTime) -> Self {
        Self { value, fetched_at }
    }

    fn if_fresh(&self, ttl: Duration) -> Option<CachedPayload<T>> {
        if self
            .fetched_at
            .elapsed()
            .map(|elapsed| elapsed <= ttl)
            .unwrap_or(false)
        {
            Some(CachedPayload::new(
                self.value.clone(),
                self.fetched_at,
                CacheStatus::Cached,
            ))
        } else {
            None
        }
    }

    fn stale(&self) -> CachedPayload<T> {
        CachedPayload::new(self.value.clone(), self.fetched_at, CacheStatus::Stale)
    }
}

#[derive(Debug, Deserialize)]
struct DatasetEnvelope {
    #[serde(rename = "Dataset")]
    dataset: Option<Vec<DatasetRowDto>>,
}

/// One `Dataset` row. `Year` and `Value` arrive as JSON numbers or as
/// strings depending on the endpoint's mood, so both are coerced.
#[derive(Debug, Deserialize)]
struct DatasetRowDto {
    #[serde(rename = "ReportingEconomy", default)]
    reporting_economy: Option<String>,
    #[serde(rename = "ProductOrSector", default)]
    product_or_sector: Option<String>,
    #[serde(rename = "Year", default, deserialize_with = "year_from_json")]
    year: Option<i32>,
    #[serde(rename = "Value", default, deserialize_with = "value_from_json")]
    value: Option<f64>,
}

impl DatasetRowDto {
    fn into_record(self) -> Option<ImportRecord> {
        Some(ImportRecord {
            country: self.reporting_economy?,
            product: self.product_or_sector?,
            year: self.year?,
            value: self.value?,
        })
    }
}

fn records_from_envelope(envelope: DatasetEnvelope) -> Result<Vec<ImportRecord>, WtoClientError> {
    let rows = envelope
        .dataset
        .ok_or_else(|| WtoClientError::Api("response missing Dataset".into()))?;

    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0_usize;
    for row in rows {
        match row.into_record() {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("skipped {skipped} WTO rows with missing fields");
    }
    debug!("parsed {} import records", records.len());
    Ok(records)
}

fn year_from_json<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct YearVisitor;

    impl<'de> serde::de::Visitor<'de> for YearVisitor {
        type Value = Option<i32>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a year as number or string")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(i32::try_from(value).ok())
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(i32::try_from(value).ok())
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value.is_finite() {
                Ok(Some(value as i32))
            } else {
                Ok(None)
            }
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.trim().parse::<i32>().ok())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(YearVisitor)
}

fn value_from_json<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct ValueVisitor;

    impl<'de> serde::de::Visitor<'de> for ValueVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a value as number or string")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Some(value))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value.trim().parse::<f64>().ok())
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }
    }

    deserializer.deserialize_any(ValueVisitor)
}
