//! Domain logic for import analytics lives here.

pub mod aggregate;
pub mod record;
pub mod selection;

pub use aggregate::{
    cross_tab, filter_by_year, global_top_products, growth_rates, latest_valid_year,
    share_evolution, top_growth_per_country, top_product_per_country, top_products_per_country,
    totals_by_country, CrossTab, ProductGrowth, RankedProduct, SharePoint,
};
pub use record::{
    distinct_countries, distinct_products, distinct_years, ImportRecord, TOTAL_MERCHANDISE,
};
pub use selection::{
    filter_records, sum_by_country, sum_by_product, sum_by_year_country, summarize_selection,
    FilterSelection, SelectionSummary,
};
