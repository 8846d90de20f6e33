//! End-to-end flow over a hand-built import table: the full pipeline from
//! latest-year resolution down to the dense cross-tab, plus the cache
//! layers cooperating without ever reaching the real API.

use std::time::Duration;

use import_analytics::domain::{
    cross_tab, filter_by_year, filter_records, global_top_products, growth_rates,
    latest_valid_year, share_evolution, sum_by_country, sum_by_product, sum_by_year_country,
    summarize_selection, top_growth_per_country, top_product_per_country,
    top_products_per_country, totals_by_country, FilterSelection, ImportRecord,
    TOTAL_MERCHANDISE,
};
use import_analytics::infra::{
    CacheStatus, DatasetSnapshot, SnapshotStore, WtoClient, WtoClientError, API_KEY_ENV,
};

fn rec(country: &str, product: &str, year: i32, value: f64) -> ImportRecord {
    ImportRecord::new(country, product, year, value)
}

/// Three reporters over 2020..=2022 with totals and partial breakdowns,
/// plus a trailing 2023 that has published its total only.
fn import_table() -> Vec<ImportRecord> {
    vec![
        rec("China", TOTAL_MERCHANDISE, 2020, 1000.0),
        rec("China", "Machinery", 2020, 500.0),
        rec("China", "Textiles", 2020, 300.0),
        rec("China", "Chemicals", 2020, 100.0),
        rec("China", TOTAL_MERCHANDISE, 2021, 1200.0),
        rec("China", "Machinery", 2021, 600.0),
        rec("China", "Textiles", 2021, 360.0),
        rec("China", "Chemicals", 2021, 120.0),
        rec("China", TOTAL_MERCHANDISE, 2022, 1500.0),
        rec("China", "Machinery", 2022, 750.0),
        rec("China", "Textiles", 2022, 450.0),
        rec("China", "Chemicals", 2022, 150.0),
        rec("Germany", TOTAL_MERCHANDISE, 2020, 800.0),
        rec("Germany", "Machinery", 2020, 320.0),
        rec("Germany", "Chemicals", 2020, 240.0),
        rec("Germany", TOTAL_MERCHANDISE, 2021, 900.0),
        rec("Germany", "Machinery", 2021, 450.0),
        rec("Germany", "Chemicals", 2021, 180.0),
        rec("Germany", TOTAL_MERCHANDISE, 2022, 1000.0),
        rec("Germany", "Machinery", 2022, 500.0),
        rec("Germany", "Chemicals", 2022, 300.0),
        rec("United States", TOTAL_MERCHANDISE, 2020, 2000.0),
        rec("United States", "Machinery", 2020, 700.0),
        rec("United States", "Textiles", 2020, 600.0),
        rec("United States", TOTAL_MERCHANDISE, 2021, 2200.0),
        rec("United States", "Machinery", 2021, 880.0),
        rec("United States", "Textiles", 2021, 550.0),
        rec("United States", TOTAL_MERCHANDISE, 2022, 2500.0),
        rec("United States", "Machinery", 2022, 1000.0),
        rec("United States", "Textiles", 2022, 750.0),
        rec("China", TOTAL_MERCHANDISE, 2023, 1600.0),
    ]
}

// ============================================================================
// Aggregation pipeline
// ============================================================================

#[test]
fn latest_year_skips_the_totals_only_tail() {
    let records = import_table();
    // 2023 exists but carries no product breakdown yet.
    assert_eq!(latest_valid_year(&records), Some(2022));

    let latest = filter_by_year(&records, 2022);
    assert_eq!(latest.len(), 10);
    assert!(latest.iter().all(|r| r.year == 2022));
}

#[test]
fn totals_and_rankings_agree_for_the_latest_year() {
    let records = import_table();

    let totals = totals_by_country(&records, 2022);
    assert_eq!(totals.len(), 3);
    assert_eq!(totals["China"], 1500.0);
    assert_eq!(totals["Germany"], 1000.0);
    assert_eq!(totals["United States"], 2500.0);

    let ranked = top_products_per_country(&records, 2022, 2);
    assert_eq!(ranked["China"].len(), 2);
    assert_eq!(ranked["China"][0].product, "Machinery");
    assert_eq!(ranked["China"][0].value, 750.0);
    assert_eq!(ranked["China"][1].product, "Textiles");
    assert_eq!(ranked["Germany"][1].product, "Chemicals");

    // The single-winner view is the head of the ranked view.
    let winners = top_product_per_country(&records, 2022);
    for (country, entries) in &ranked {
        assert_eq!(&winners[country], &entries[0]);
    }
}

#[test]
fn global_ranking_sums_across_countries() {
    let records = import_table();
    let top = global_top_products(&records, 2022, 2);
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].product, "Machinery");
    assert_eq!(top[0].value, 750.0 + 500.0 + 1000.0);
    assert_eq!(top[1].product, "Textiles");
    assert_eq!(top[1].value, 450.0 + 750.0);
}

#[test]
fn machinery_share_tracks_each_country_total() {
    let records = import_table();
    let points = share_evolution(&records, &["Machinery".to_string()]);

    // Three countries, three years each; 2023 has no machinery row.
    assert_eq!(points.len(), 9);
    assert_eq!(points[0].country, "China");
    assert_eq!(points[0].year, 2020);
    assert_eq!(points[0].share_percent, 50.0);

    let us_2021 = points
        .iter()
        .find(|p| p.country == "United States" && p.year == 2021)
        .unwrap();
    assert_eq!(us_2021.share_percent, 40.0);

    let germany_2020 = points
        .iter()
        .find(|p| p.country == "Germany" && p.year == 2020)
        .unwrap();
    assert_eq!(germany_2020.share_percent, 40.0);
}

#[test]
fn growth_between_the_last_two_full_years() {
    let records = import_table();
    let rates = growth_rates(&records, 2021, 2022);
    assert_eq!(rates.len(), 7);

    assert_eq!(
        rates[&("China".to_string(), "Machinery".to_string())],
        25.0
    );
    assert_eq!(
        rates[&("Germany".to_string(), "Chemicals".to_string())],
        100.0 * (300.0 - 180.0) / 180.0
    );
    assert_eq!(
        rates[&("United States".to_string(), "Textiles".to_string())],
        100.0 * (750.0 - 550.0) / 550.0
    );

    let top = top_growth_per_country(&records, 2021, 2022, 2);
    assert_eq!(top["Germany"][0].product, "Chemicals");
    assert_eq!(top["Germany"][1].product, "Machinery");
    assert_eq!(top["United States"][0].product, "Textiles");

    // China grew every product by exactly 25 %.
    assert_eq!(top["China"].len(), 2);
    assert!(top["China"].iter().all(|g| g.growth_percent == 25.0));
}

#[test]
fn cross_tab_feeds_a_dense_heatmap() {
    let records = import_table();
    let products = vec![
        "Machinery".to_string(),
        "Textiles".to_string(),
        "Chemicals".to_string(),
    ];
    let tab = cross_tab(&records, 2022, &products);

    assert_eq!(tab.products, products);
    assert_eq!(tab.countries, vec!["China", "Germany", "United States"]);
    assert_eq!(
        tab.values,
        vec![
            vec![750.0, 500.0, 1000.0],
            vec![450.0, 0.0, 750.0],
            vec![150.0, 300.0, 0.0],
        ]
    );
    // Unreported combinations are zero cells, not holes.
    assert_eq!(tab.value("Textiles", "Germany"), Some(0.0));
    assert_eq!(tab.value("Chemicals", "United States"), Some(0.0));
}

// ============================================================================
// Selection and chart feeds
// ============================================================================

#[test]
fn default_selection_covers_the_table_and_drives_the_kpis() {
    let records = import_table();
    let selection = FilterSelection::for_table(&records).unwrap();

    assert_eq!(selection.min_year, 2020);
    assert_eq!(selection.max_year, 2023);
    assert_eq!(selection.countries, vec!["China", "Germany", "United States"]);
    assert_eq!(selection.products, vec!["Machinery", "Textiles", "Chemicals"]);

    let filtered = filter_records(&records, &selection);
    // Every product row survives; totals are not listed as products.
    assert_eq!(filtered.len(), 21);
    assert!(filtered.iter().all(|r| r.product != TOTAL_MERCHANDISE));

    let summary = summarize_selection(&filtered, &selection);
    assert_eq!(summary.total_value, 9800.0);
    assert_eq!(summary.country_count, 3);
    assert_eq!(summary.product_count, 3);
}

#[test]
fn grouped_sums_feed_the_charts() {
    let records = import_table();
    let selection = FilterSelection::for_table(&records).unwrap();
    let filtered = filter_records(&records, &selection);

    let by_year_country = sum_by_year_country(&filtered);
    assert_eq!(by_year_country[&(2022, "China".to_string())], 1350.0);
    assert_eq!(by_year_country[&(2020, "Germany".to_string())], 560.0);

    let by_country = sum_by_country(&filtered);
    assert_eq!(by_country["China"], 3330.0);
    assert_eq!(by_country["Germany"], 1990.0);
    assert_eq!(by_country["United States"], 4480.0);

    let by_product = sum_by_product(&filtered);
    assert_eq!(by_product["Machinery"], 5700.0);
}

#[test]
fn narrowed_selection_changes_counts_and_sums() {
    let records = import_table();
    let selection = FilterSelection {
        min_year: 2022,
        max_year: 2022,
        countries: vec!["Germany".to_string()],
        products: vec!["Machinery".to_string()],
    };
    let filtered = filter_records(&records, &selection);
    assert_eq!(filtered.len(), 1);

    let summary = summarize_selection(&filtered, &selection);
    assert_eq!(summary.total_value, 500.0);
    assert_eq!(summary.country_count, 1);
    assert_eq!(summary.product_count, 1);
}

// ============================================================================
// Cache layers (no network)
// ============================================================================

const DEAD_BASE_URL: &str = "http://127.0.0.1:9/timeseries/v1/";

#[tokio::test]
async fn disk_snapshot_answers_before_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    let records = import_table();
    store
        .save(&DatasetSnapshot::new(
            "156,276,840:2020-2022".to_string(),
            records.clone(),
        ))
        .unwrap();

    // Base URL points at a closed port: any real request would fail.
    let client = WtoClient::with_base_url("test-key", DEAD_BASE_URL)
        .unwrap()
        .with_snapshot_store(store);

    let payload = client
        .fetch_import_records(&["156", "276", "840"], 2020..=2022)
        .await
        .unwrap();
    assert_eq!(payload.status, CacheStatus::Cached);
    assert_eq!(payload.data, records);

    // Reporter order does not matter: the request key is canonical.
    let reordered = client
        .fetch_import_records(&["840", "156", "276"], 2020..=2022)
        .await
        .unwrap();
    assert_eq!(reordered.data, records);
}

#[tokio::test]
async fn expired_memory_entry_is_served_stale_after_a_failed_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    let records = import_table();
    store
        .save(&DatasetSnapshot::new(
            "156:2020-2022".to_string(),
            records.clone(),
        ))
        .unwrap();

    // Zero TTL: every in-memory entry is expired the moment it lands.
    let client = WtoClient::with_base_url("test-key", DEAD_BASE_URL)
        .unwrap()
        .with_ttl(Duration::ZERO)
        .with_snapshot_store(store.clone());

    let first = client
        .fetch_import_records(&["156"], 2020..=2022)
        .await
        .unwrap();
    assert_eq!(first.status, CacheStatus::Cached);

    // Snapshot gone, refresh fails, the expired entry still answers.
    store.clear().unwrap();
    let second = client
        .fetch_import_records(&["156"], 2020..=2022)
        .await
        .unwrap();
    assert_eq!(second.status, CacheStatus::Stale);
    assert_eq!(second.data, records);
}

#[tokio::test]
async fn fetch_fails_hard_without_any_cache_layer() {
    let client = WtoClient::with_base_url("test-key", DEAD_BASE_URL).unwrap();
    let error = client
        .fetch_import_records(&["156"], 2020..=2022)
        .await
        .unwrap_err();
    assert!(matches!(error, WtoClientError::Http(_)));
}

#[tokio::test]
async fn clearing_the_memory_cache_forces_a_refetch() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path());
    store
        .save(&DatasetSnapshot::new(
            "156:2020-2021".to_string(),
            import_table(),
        ))
        .unwrap();

    let client = WtoClient::with_base_url("test-key", DEAD_BASE_URL)
        .unwrap()
        .with_snapshot_store(store.clone());

    client
        .fetch_import_records(&["156"], 2020..=2021)
        .await
        .unwrap();

    // With both layers emptied the client has to go back out, and fails.
    client.clear_cache().await;
    store.clear().unwrap();
    let error = client
        .fetch_import_records(&["156"], 2020..=2021)
        .await
        .unwrap_err();
    assert!(matches!(error, WtoClientError::Http(_)));
}

#[test]
fn missing_api_key_is_reported() {
    std::env::remove_var(API_KEY_ENV);
    // The client is not Debug, so assert on the Result directly.
    assert!(matches!(
        WtoClient::from_env(),
        Err(WtoClientError::MissingApiKey)
    ));

    std::env::set_var(API_KEY_ENV, "integration-test-key");
    assert!(WtoClient::from_env().is_ok());
    std::env::remove_var(API_KEY_ENV);
}
