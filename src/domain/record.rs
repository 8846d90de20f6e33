use serde::{Deserialize, Serialize};

/// Product-or-sector label of the all-products aggregate row.
///
/// Rows carrying this label are the ground-truth denominator for share
/// computations and are excluded from every product ranking.
pub const TOTAL_MERCHANDISE: &str = "Total merchandise";

/// One merchandise-import observation from the WTO timeseries API.
///
/// The natural key is (country, product, year); well-formed datasets carry
/// at most one record per key. Where duplicates slip through, the pipeline
/// resolves them last-record-wins (see `domain::aggregate`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Reporting economy display name (e.g. "China").
    pub country: String,
    /// Product-or-sector category; `TOTAL_MERCHANDISE` marks the aggregate row.
    pub product: String,
    pub year: i32,
    /// Import value in million USD.
    pub value: f64,
}

impl ImportRecord {
    pub fn new(country: &str, product: &str, year: i32, value: f64) -> Self {
        Self {
            country: country.to_string(),
            product: product.to_string(),
            year,
            value,
        }
    }

    /// Returns true if this row is the all-products aggregate.
    pub fn is_total(&self) -> bool {
        self.product == TOTAL_MERCHANDISE
    }
}

/// Unique years present in the table, ascending.
pub fn distinct_years(records: &[ImportRecord]) -> Vec<i32> {
    let mut years: Vec<i32> = Vec::new();
    for record in records {
        if !years.contains(&record.year) {
            years.push(record.year);
        }
    }
    years.sort_unstable();
    years
}

/// Unique reporting economies, in first-appearance order.
pub fn distinct_countries(records: &[ImportRecord]) -> Vec<String> {
    let mut countries: Vec<String> = Vec::new();
    for record in records {
        if !countries.iter().any(|c| c == &record.country) {
            countries.push(record.country.clone());
        }
    }
    countries
}

/// Unique non-total products, in first-appearance order.
pub fn distinct_products(records: &[ImportRecord]) -> Vec<String> {
    let mut products: Vec<String> = Vec::new();
    for record in records {
        if record.is_total() {
            continue;
        }
        if !products.iter().any(|p| p == &record.product) {
            products.push(record.product.clone());
        }
    }
    products
}
