// Revenue Ledger - Core Library
// Exposes all modules for use in the CLI, the API server and tests

pub mod aggregator; // Chart series + analytics, recomputed per call
pub mod config;
pub mod db;
pub mod log;
pub mod schema; // Validation before every write

#[cfg(feature = "server")]
pub mod auth;
#[cfg(feature = "server")]
pub mod error;
#[cfg(feature = "server")]
pub mod routes;

// Re-export commonly used types
pub use aggregator::{
    analytics, analytics_for_year, chart_data, chart_for_year, monthly_totals, resolve_year,
    Analytics, ChartData, ChartReport, Dataset, MonthlyTotal,
};
pub use config::{ApiToken, AppConfig, Role};
pub use db::{
    count_records, delete_record, get_record, insert_record, insert_records, list_records,
    load_csv, records_for_year, setup_database, update_record, year_totals, ListQuery,
    RecordPage, RevenueRecord, SortField, SortSpec, Store, YearTotal,
};
pub use schema::{
    validate_new, validate_patch, Month, NewRecord, RecordInput, RecordPatch, RevenueSource,
    ValidationError,
};

#[cfg(feature = "server")]
pub use routes::{build_router, AppState};
