//! The aggregation pipeline: pure derived views over an import table.
//!
//! Every function here is a plain scan over `&[ImportRecord]` with no
//! internal state; identical inputs always produce identical outputs.
//! Returned mappings are `BTreeMap`s and ranked lists are built with
//! stable sorts, so iteration order never depends on hash order.
//!
//! Duplicate policy: the natural key (country, product, year) is expected
//! unique. Where duplicates occur anyway, the *last* record wins while the
//! first occurrence keeps its position for ordering purposes. The grouped
//! chart feeds in `domain::selection` are the documented exception and sum
//! every row they are given.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::record::{distinct_countries, distinct_years, ImportRecord};

/// One product with its (possibly summed) import value, in million USD.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedProduct {
    pub product: String,
    pub value: f64,
}

/// A product's share of its country-year total, in percent.
#[derive(Clone, Debug, PartialEq)]
pub struct SharePoint {
    pub country: String,
    pub year: i32,
    pub product: String,
    pub share_percent: f64,
}

/// Percentage change of a product's value between two years.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductGrowth {
    pub product: String,
    pub growth_percent: f64,
}

/// Most recent year whose product breakdown is actually populated.
///
/// Scans years descending and returns the first one whose non-total rows
/// sum to a positive value. The latest year of a trade dataset is often
/// published totals-first, so picking the raw maximum would present an
/// analysis over an empty breakdown.
pub fn latest_valid_year(records: &[ImportRecord]) -> Option<i32> {
    let mut years = distinct_years(records);
    years.reverse();

    for year in years {
        let breakdown_sum: f64 = records
            .iter()
            .filter(|record| record.year == year && !record.is_total())
            .map(|record| record.value)
            .sum();
        if breakdown_sum > 0.0 {
            return Some(year);
        }
    }
    None
}

/// Records of exactly the given year, relative order preserved.
pub fn filter_by_year(records: &[ImportRecord], year: i32) -> Vec<ImportRecord> {
    records
        .iter()
        .filter(|record| record.year == year)
        .cloned()
        .collect()
}

/// "Total merchandise" value per country for the given year.
///
/// Duplicate total rows for the same country resolve last-wins.
pub fn totals_by_country(records: &[ImportRecord], year: i32) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for record in records {
        if record.year == year && record.is_total() {
            totals.insert(record.country.clone(), record.value);
        }
    }
    totals
}

/// Top `n` products per country for the given year, ranked by value
/// descending. The sort is stable, so equal values keep the order in which
/// their products first appeared in the input.
pub fn top_products_per_country(
    records: &[ImportRecord],
    year: i32,
    n: usize,
) -> BTreeMap<String, Vec<RankedProduct>> {
    let mut ranked: BTreeMap<String, Vec<RankedProduct>> = BTreeMap::new();
    for (country, product, value) in product_rows_for_year(records, year) {
        ranked
            .entry(country)
            .or_default()
            .push(RankedProduct { product, value });
    }

    for entries in ranked.values_mut() {
        entries.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
        entries.truncate(n);
    }
    ranked
}

/// Single best product per country; ties resolve to the first occurrence
/// in the stable descending order.
pub fn top_product_per_country(
    records: &[ImportRecord],
    year: i32,
) -> BTreeMap<String, RankedProduct> {
    top_products_per_country(records, year, 1)
        .into_iter()
        .filter_map(|(country, entries)| entries.into_iter().next().map(|top| (country, top)))
        .collect()
}

/// Top `n` products for the given year with values summed across all
/// countries. Product order before the sort is first appearance in the
/// input, which is also the tie-break.
pub fn global_top_products(records: &[ImportRecord], year: i32, n: usize) -> Vec<RankedProduct> {
    let mut totals: Vec<RankedProduct> = Vec::new();
    for (_, product, value) in product_rows_for_year(records, year) {
        match totals.iter_mut().find(|entry| entry.product == product) {
            Some(entry) => entry.value += value,
            None => totals.push(RankedProduct { product, value }),
        }
    }

    totals.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    totals.truncate(n);
    totals
}

/// Share of the country-year total for every record whose product is in
/// `products`, in the input table's row order.
///
/// Tuples without a "Total merchandise" row for their (country, year), or
/// whose total is exactly zero, are excluded rather than reported as
/// infinite. Total rows themselves never appear as numerators.
pub fn share_evolution(records: &[ImportRecord], products: &[String]) -> Vec<SharePoint> {
    let totals = totals_map(records);

    let mut rows: Vec<(String, i32, String, f64)> = Vec::new();
    for record in records {
        if record.is_total() || !products.iter().any(|p| p == &record.product) {
            continue;
        }
        match rows.iter_mut().find(|(country, year, product, _)| {
            country == &record.country && *year == record.year && product == &record.product
        }) {
            Some(entry) => entry.3 = record.value,
            None => rows.push((
                record.country.clone(),
                record.year,
                record.product.clone(),
                record.value,
            )),
        }
    }

    let mut points = Vec::new();
    for (country, year, product, value) in rows {
        let Some(total) = totals.get(&(country.clone(), year)).copied() else {
            continue;
        };
        if total == 0.0 {
            continue;
        }
        points.push(SharePoint {
            country,
            year,
            product,
            share_percent: 100.0 * value / total,
        });
    }
    points
}

/// Year-over-year growth per (country, product), in percent.
///
/// Only pairs present in both years are reported; a zero baseline makes
/// the growth undefined and the pair is excluded, never returned as
/// infinite. No interpolation, no zero-fill.
pub fn growth_rates(
    records: &[ImportRecord],
    baseline_year: i32,
    target_year: i32,
) -> BTreeMap<(String, String), f64> {
    let baseline = product_rows_for_year(records, baseline_year);
    let target = product_rows_for_year(records, target_year);

    let mut rates = BTreeMap::new();
    for (country, product, target_value) in target {
        let Some(baseline_value) = baseline
            .iter()
            .find(|(c, p, _)| c == &country && p == &product)
            .map(|(_, _, value)| *value)
        else {
            continue;
        };
        if baseline_value == 0.0 {
            continue;
        }
        rates.insert(
            (country, product),
            100.0 * (target_value - baseline_value) / baseline_value,
        );
    }
    rates
}

/// Top `k` growth products per country between two years, descending.
///
/// Built on `growth_rates`, so the same exclusions apply. Equal growth
/// values keep the alphabetical product order the underlying map yields.
pub fn top_growth_per_country(
    records: &[ImportRecord],
    baseline_year: i32,
    target_year: i32,
    k: usize,
) -> BTreeMap<String, Vec<ProductGrowth>> {
    let mut grouped: BTreeMap<String, Vec<ProductGrowth>> = BTreeMap::new();
    for ((country, product), growth_percent) in growth_rates(records, baseline_year, target_year) {
        grouped.entry(country).or_default().push(ProductGrowth {
            product,
            growth_percent,
        });
    }

    for entries in grouped.values_mut() {
        entries.sort_by(|a, b| {
            b.growth_percent
                .partial_cmp(&a.growth_percent)
                .unwrap_or(Ordering::Equal)
        });
        entries.truncate(k);
    }
    grouped
}

/// Dense product × country grid for one year.
///
/// Row order follows the `products` argument (duplicates dropped, first
/// kept); columns are every country appearing in that year's rows, in
/// first-appearance order. Heatmap consumers need the full rectangle, so
/// missing cells hold `0.0` instead of being omitted.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossTab {
    pub products: Vec<String>,
    pub countries: Vec<String>,
    /// `values[i][j]` is the value of `products[i]` in `countries[j]`.
    pub values: Vec<Vec<f64>>,
}

impl CrossTab {
    pub fn value(&self, product: &str, country: &str) -> Option<f64> {
        let row = self.products.iter().position(|p| p == product)?;
        let col = self.countries.iter().position(|c| c == country)?;
        Some(self.values[row][col])
    }

    /// True when the grid has no cells (no requested products, or no
    /// records in the requested year).
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() || self.countries.is_empty()
    }
}

/// Pivot the given year into a dense grid, restricted to `products`.
///
/// Cell values resolve last-wins on duplicate (product, country) rows.
pub fn cross_tab(records: &[ImportRecord], year: i32, products: &[String]) -> CrossTab {
    let mut row_keys: Vec<String> = Vec::new();
    for product in products {
        if !row_keys.iter().any(|p| p == product) {
            row_keys.push(product.clone());
        }
    }

    let year_rows = filter_by_year(records, year);
    let countries = distinct_countries(&year_rows);

    let mut values = vec![vec![0.0; countries.len()]; row_keys.len()];
    for record in &year_rows {
        let Some(row) = row_keys.iter().position(|p| p == &record.product) else {
            continue;
        };
        let Some(col) = countries.iter().position(|c| c == &record.country) else {
            continue;
        };
        values[row][col] = record.value;
    }

    CrossTab {
        products: row_keys,
        countries,
        values,
    }
}

/// Rows of the given year excluding totals, deduplicated last-wins per
/// (country, product) with the first occurrence keeping its position.
fn product_rows_for_year(records: &[ImportRecord], year: i32) -> Vec<(String, String, f64)> {
    let mut rows: Vec<(String, String, f64)> = Vec::new();
    for record in records {
        if record.year != year || record.is_total() {
            continue;
        }
        match rows
            .iter_mut()
            .find(|(country, product, _)| country == &record.country && product == &record.product)
        {
            Some(entry) => entry.2 = record.value,
            None => rows.push((
                record.country.clone(),
                record.product.clone(),
                record.value,
            )),
        }
    }
    rows
}

/// Last-wins "Total merchandise" value per (country, year).
fn totals_map(records: &[ImportRecord]) -> BTreeMap<(String, i32), f64> {
    let mut totals = BTreeMap::new();
    for record in records {
        if record.is_total() {
            totals.insert((record.country.clone(), record.year), record.value);
        }
    }
    totals
}
