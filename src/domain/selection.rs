//! Sidebar-style selection over an import table, plus the grouped sums
//! that feed the trend and comparison charts.

use std::collections::BTreeMap;

use super::record::{distinct_countries, distinct_products, distinct_years, ImportRecord};

/// Which slice of the table is being looked at: an inclusive year range
/// plus country and product allow-lists.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterSelection {
    pub min_year: i32,
    pub max_year: i32,
    pub countries: Vec<String>,
    pub products: Vec<String>,
}

impl FilterSelection {
    /// Default view over a freshly fetched table: the full year span,
    /// every country, and the first five products.
    ///
    /// Returns `None` for an empty table, which has no year span to offer.
    pub fn for_table(records: &[ImportRecord]) -> Option<Self> {
        let years = distinct_years(records);
        let min_year = *years.first()?;
        let max_year = *years.last()?;

        let mut products = distinct_products(records);
        products.truncate(5);

        Some(Self {
            min_year,
            max_year,
            countries: distinct_countries(records),
            products,
        })
    }

    pub fn matches(&self, record: &ImportRecord) -> bool {
        if record.year < self.min_year || record.year > self.max_year {
            return false;
        }
        if !self.countries.iter().any(|c| c == &record.country) {
            return false;
        }
        if !self.products.iter().any(|p| p == &record.product) {
            return false;
        }
        true
    }

    /// A selection with no countries or no products matches nothing.
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty() || self.products.is_empty()
    }
}

/// Rows matching the selection, relative order preserved.
pub fn filter_records(records: &[ImportRecord], selection: &FilterSelection) -> Vec<ImportRecord> {
    records
        .iter()
        .filter(|record| selection.matches(record))
        .cloned()
        .collect()
}

/// The three KPI cards: value summed over the filtered rows, and the
/// selection's own country/product counts.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionSummary {
    pub total_value: f64,
    pub country_count: usize,
    pub product_count: usize,
}

pub fn summarize_selection(
    filtered: &[ImportRecord],
    selection: &FilterSelection,
) -> SelectionSummary {
    SelectionSummary {
        total_value: filtered.iter().map(|record| record.value).sum(),
        country_count: selection.countries.len(),
        product_count: selection.products.len(),
    }
}

/// Value summed per (year, country), feeding the trend lines.
///
/// Unlike the keyed lookups in `domain::aggregate`, the grouped sums here
/// add up every row they are given (including duplicates); they exist to
/// chart an already-filtered table, not to resolve keys.
pub fn sum_by_year_country(records: &[ImportRecord]) -> BTreeMap<(i32, String), f64> {
    let mut sums = BTreeMap::new();
    for record in records {
        *sums
            .entry((record.year, record.country.clone()))
            .or_insert(0.0) += record.value;
    }
    sums
}

/// Value summed per country, feeding the country comparison bar.
pub fn sum_by_country(records: &[ImportRecord]) -> BTreeMap<String, f64> {
    let mut sums = BTreeMap::new();
    for record in records {
        *sums.entry(record.country.clone()).or_insert(0.0) += record.value;
    }
    sums
}

/// Value summed per product, feeding the product comparison bar.
pub fn sum_by_product(records: &[ImportRecord]) -> BTreeMap<String, f64> {
    let mut sums = BTreeMap::new();
    for record in records {
        *sums.entry(record.product.clone()).or_insert(0.0) += record.value;
    }
    sums
}
