// 📐 Shape Layer - Record Validation
// Every write goes through validate_new / validate_patch before touching SQLite

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Inclusive bounds for `year`
pub const MIN_YEAR: i32 = 2020;
pub const MAX_YEAR: i32 = 2030;

/// Upper bound for a single `revenue` amount. Keeps every monthly and
/// yearly sum finite so chart totals always serialize as numbers.
pub const MAX_REVENUE: f64 = 1_000_000_000_000.0;

/// Maximum description length (characters, after trimming)
pub const MAX_DESCRIPTION_LEN: usize = 500;

// ============================================================================
// MONTH
// ============================================================================

/// Calendar month. Variant order is calendar order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    /// Zero-based calendar position
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(index: usize) -> Option<Month> {
        Month::ALL.get(index).copied()
    }

    /// Parse a full month name, ignoring case and surrounding whitespace
    pub fn from_name(name: &str) -> Option<Month> {
        let wanted = name.trim();
        Month::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SOURCE
// ============================================================================

/// Where a revenue entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenueSource {
    #[default]
    Manual,
    Payment,
    Project,
}

impl RevenueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueSource::Manual => "manual",
            RevenueSource::Payment => "payment",
            RevenueSource::Project => "project",
        }
    }

    pub fn parse(tag: &str) -> Option<RevenueSource> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(RevenueSource::Manual),
            "payment" => Some(RevenueSource::Payment),
            "project" => Some(RevenueSource::Project),
            _ => None,
        }
    }
}

// ============================================================================
// VALIDATION ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

// ============================================================================
// INPUT / VALIDATED SHAPES
// ============================================================================

/// Raw request body. Every field is optional so that missing fields can be
/// reported by name instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordInput {
    #[serde(default)]
    pub month: Option<Value>,
    #[serde(default)]
    pub year: Option<Value>,
    #[serde(default)]
    pub revenue: Option<Value>,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
}

/// A record that passed validation and is ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub month: Month,
    pub year: i32,
    pub revenue: f64,
    pub source: RevenueSource,
    pub description: Option<String>,
}

/// Partial update: `None` means "leave as is"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub month: Option<Month>,
    pub year: Option<i32>,
    pub revenue: Option<f64>,
    pub source: Option<RevenueSource>,
    /// Some(None) clears the description
    pub description: Option<Option<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.month.is_none()
            && self.year.is_none()
            && self.revenue.is_none()
            && self.source.is_none()
            && self.description.is_none()
    }
}

// ============================================================================
// VALIDATORS
// ============================================================================

/// Validate a create request. month, year and revenue are required.
pub fn validate_new(input: &RecordInput) -> ValidationResult<NewRecord> {
    let mut errors = Vec::new();

    let month =
        required(&input.month, "month", &mut errors).and_then(|v| check_month(v, &mut errors));
    let year =
        required(&input.year, "year", &mut errors).and_then(|v| check_year(v, &mut errors));
    let revenue = required(&input.revenue, "revenue", &mut errors)
        .and_then(|v| check_revenue(v, &mut errors));
    let source = present(&input.source)
        .map(|v| check_source(v, &mut errors))
        .unwrap_or(Some(RevenueSource::default()));
    let description = present(&input.description)
        .map(|v| check_description(v, &mut errors))
        .unwrap_or(Some(None));

    match (month, year, revenue, source, description) {
        (Some(month), Some(year), Some(revenue), Some(source), Some(description))
            if errors.is_empty() =>
        {
            Ok(NewRecord {
                month,
                year,
                revenue,
                source,
                description,
            })
        }
        _ => Err(errors),
    }
}

/// Validate a partial update. Only supplied fields are checked.
pub fn validate_patch(input: &RecordInput) -> ValidationResult<RecordPatch> {
    let mut errors = Vec::new();

    let patch = RecordPatch {
        month: present(&input.month).and_then(|v| check_month(v, &mut errors)),
        year: present(&input.year).and_then(|v| check_year(v, &mut errors)),
        revenue: present(&input.revenue).and_then(|v| check_revenue(v, &mut errors)),
        source: present(&input.source).and_then(|v| check_source(v, &mut errors)),
        description: present(&input.description).and_then(|v| check_description(v, &mut errors)),
    };

    if errors.is_empty() {
        Ok(patch)
    } else {
        Err(errors)
    }
}

/// Present and not JSON null
fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| !v.is_null())
}

fn required<'a>(
    value: &'a Option<Value>,
    field: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<&'a Value> {
    let found = present(value).filter(|v| !matches!(v, Value::String(s) if s.trim().is_empty()));
    if found.is_none() {
        errors.push(ValidationError::new(field, "Required field is missing"));
    }
    found
}

/// Numbers, or strings holding a number
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn check_month(value: &Value, errors: &mut Vec<ValidationError>) -> Option<Month> {
    let month = value.as_str().and_then(Month::from_name);
    if month.is_none() {
        errors.push(ValidationError::new(
            "month",
            format!("Must be a calendar month name (January-December), got {}", value),
        ));
    }
    month
}

fn check_year(value: &Value, errors: &mut Vec<ValidationError>) -> Option<i32> {
    match coerce_number(value) {
        Some(y) if y.fract() == 0.0 && (MIN_YEAR as f64..=MAX_YEAR as f64).contains(&y) => {
            Some(y as i32)
        }
        Some(y) => {
            errors.push(ValidationError::new(
                "year",
                format!("Must be a whole year between {} and {}, got {}", MIN_YEAR, MAX_YEAR, y),
            ));
            None
        }
        None => {
            errors.push(ValidationError::new("year", "Must be a number"));
            None
        }
    }
}

fn check_revenue(value: &Value, errors: &mut Vec<ValidationError>) -> Option<f64> {
    match coerce_number(value) {
        Some(r) if r.is_finite() && (0.0..=MAX_REVENUE).contains(&r) => Some(r),
        Some(r) => {
            errors.push(ValidationError::new(
                "revenue",
                format!("Must be an amount between 0 and {}, got {}", MAX_REVENUE, r),
            ));
            None
        }
        None => {
            errors.push(ValidationError::new("revenue", "Must be a number"));
            None
        }
    }
}

fn check_source(value: &Value, errors: &mut Vec<ValidationError>) -> Option<RevenueSource> {
    let source = value.as_str().and_then(RevenueSource::parse);
    if source.is_none() {
        errors.push(ValidationError::new(
            "source",
            format!("Must be one of manual, payment, project; got {}", value),
        ));
    }
    source
}

/// Some(None) = valid but blank
fn check_description(value: &Value, errors: &mut Vec<ValidationError>) -> Option<Option<String>> {
    let Some(text) = value.as_str() else {
        errors.push(ValidationError::new("description", "Must be a string"));
        return None;
    };

    let trimmed = text.trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        errors.push(ValidationError::new(
            "description",
            format!("Must be at most {} characters", MAX_DESCRIPTION_LEN),
        ));
        return None;
    }

    if trimmed.is_empty() {
        Some(None)
    } else {
        Some(Some(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(body: Value) -> RecordInput {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_month_calendar_order() {
        assert_eq!(Month::January.index(), 0);
        assert_eq!(Month::December.index(), 11);
        assert_eq!(Month::from_index(1), Some(Month::February));
        assert_eq!(Month::from_index(12), None);
        assert!(Month::March < Month::April);
    }

    #[test]
    fn test_month_from_name() {
        assert_eq!(Month::from_name("January"), Some(Month::January));
        assert_eq!(Month::from_name("  september "), Some(Month::September));
        assert_eq!(Month::from_name("DECEMBER"), Some(Month::December));
        assert_eq!(Month::from_name("Jan"), None);
        assert_eq!(Month::from_name("Smarch"), None);
    }

    #[test]
    fn test_validate_new_ok_with_defaults() {
        let record = validate_new(&input(json!({
            "month": "January",
            "year": 2025,
            "revenue": 100.5
        })))
        .unwrap();

        assert_eq!(record.month, Month::January);
        assert_eq!(record.year, 2025);
        assert_eq!(record.revenue, 100.5);
        assert_eq!(record.source, RevenueSource::Manual);
        assert_eq!(record.description, None);
    }

    #[test]
    fn test_validate_new_coerces_numeric_strings() {
        let record = validate_new(&input(json!({
            "month": "february",
            "year": "2024",
            "revenue": "250",
            "source": "Payment",
            "description": "  Invoice #12  "
        })))
        .unwrap();

        assert_eq!(record.month, Month::February);
        assert_eq!(record.year, 2024);
        assert_eq!(record.revenue, 250.0);
        assert_eq!(record.source, RevenueSource::Payment);
        assert_eq!(record.description.as_deref(), Some("Invoice #12"));
    }

    #[test]
    fn test_validate_new_reports_every_missing_field() {
        let errors = validate_new(&input(json!({}))).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["month", "year", "revenue"]);
    }

    #[test]
    fn test_validate_new_rejects_negative_revenue() {
        let errors = validate_new(&input(json!({
            "month": "March",
            "year": 2025,
            "revenue": -1
        })))
        .unwrap_err();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "revenue");
    }

    #[test]
    fn test_validate_new_rejects_revenue_above_bound() {
        let errors = validate_new(&input(json!({
            "month": "May",
            "year": 2025,
            "revenue": 1e308
        })))
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "revenue");

        let record = validate_new(&input(json!({
            "month": "May",
            "year": 2025,
            "revenue": MAX_REVENUE
        })))
        .unwrap();
        assert_eq!(record.revenue, MAX_REVENUE);

        let errors = validate_patch(&input(json!({ "revenue": "1e300" }))).unwrap_err();
        assert_eq!(errors[0].field, "revenue");
    }

    #[test]
    fn test_validate_new_rejects_out_of_range_year() {
        for year in [2019, 2031] {
            let errors = validate_new(&input(json!({
                "month": "March",
                "year": year,
                "revenue": 10
            })))
            .unwrap_err();
            assert_eq!(errors[0].field, "year");
        }

        let errors = validate_new(&input(json!({
            "month": "March",
            "year": 2025.5,
            "revenue": 10
        })))
        .unwrap_err();
        assert_eq!(errors[0].field, "year");
    }

    #[test]
    fn test_validate_new_rejects_bad_month_and_source() {
        let errors = validate_new(&input(json!({
            "month": "Smarch",
            "year": 2025,
            "revenue": 10,
            "source": "lottery"
        })))
        .unwrap_err();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["month", "source"]);
    }

    #[test]
    fn test_validate_new_rejects_blank_required_string() {
        let errors = validate_new(&input(json!({
            "month": "   ",
            "year": 2025,
            "revenue": 10
        })))
        .unwrap_err();
        assert_eq!(errors[0].field, "month");
        assert_eq!(errors[0].message, "Required field is missing");
    }

    #[test]
    fn test_validate_patch_only_supplied_fields() {
        let patch = validate_patch(&input(json!({ "revenue": 500 }))).unwrap();
        assert_eq!(
            patch,
            RecordPatch {
                revenue: Some(500.0),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_validate_patch_rechecks_revenue() {
        let errors = validate_patch(&input(json!({ "revenue": -0.01 }))).unwrap_err();
        assert_eq!(errors[0].field, "revenue");
    }

    #[test]
    fn test_validate_patch_null_means_absent() {
        let patch = validate_patch(&input(json!({ "month": null, "year": null }))).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_validate_patch_blank_description_clears() {
        let patch = validate_patch(&input(json!({ "description": "  " }))).unwrap();
        assert_eq!(patch.description, Some(None));
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_description_too_long() {
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        let errors = validate_patch(&input(json!({ "description": long }))).unwrap_err();
        assert_eq!(errors[0].field, "description");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("revenue", "Must be a number");
        assert_eq!(err.to_string(), "revenue: Must be a number");
    }
}
