// 📊 Revenue Aggregator - chart series + summary analytics
//
// Nothing here is cached or stored: every call recomputes from the records,
// so concurrent writers to the same (year, month) never race on a counter.

use anyhow::Result;
use chrono::{Datelike, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::{records_for_year, year_totals, RevenueRecord, YearTotal};
use crate::schema::Month;

/// How many years `yearlyComparison` reports
pub const YEARS_COMPARED: usize = 3;

// ============================================================================
// OUTPUT SHAPES
// ============================================================================

/// Chart.js-style bar chart payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<&'static str>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: &'static str,
    pub border_color: &'static str,
    pub border_width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartReport {
    pub data: ChartData,
    pub total_revenue: f64,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotal {
    pub month: Month,
    pub total: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub current_year: i32,
    pub total_revenue: f64,
    pub monthly_breakdown: Vec<MonthlyTotal>,
    pub yearly_comparison: Vec<YearTotal>,
    pub avg_monthly_revenue: f64,
}

// ============================================================================
// PURE AGGREGATION
// ============================================================================

/// Sum per calendar month, January first
pub fn monthly_totals(records: &[RevenueRecord]) -> [f64; 12] {
    let mut totals = [0.0; 12];
    for record in records {
        totals[record.month.index()] += record.revenue;
    }
    totals
}

/// Twelve month buckets for `year`. Records from other years are ignored.
pub fn chart_data(year: i32, records: &[RevenueRecord]) -> ChartReport {
    let in_year: Vec<RevenueRecord> = records.iter().filter(|r| r.year == year).cloned().collect();
    let totals = monthly_totals(&in_year);
    let total_revenue = totals.iter().sum();

    ChartReport {
        data: ChartData {
            labels: Month::ALL.iter().map(|m| m.name()).collect(),
            datasets: vec![Dataset {
                label: format!("Revenue {}", year),
                data: totals.to_vec(),
                background_color: "rgba(54, 162, 235, 0.5)",
                border_color: "rgba(54, 162, 235, 1)",
                border_width: 1,
            }],
        },
        total_revenue,
        year,
    }
}

/// Summary figures for `year`.
///
/// - `monthly_breakdown` only lists months that have records, highest total
///   first (ties stay in calendar order)
/// - `yearly_comparison` takes the most recent years that have records and
///   ranks them by total, highest first
/// - `avg_monthly_revenue` divides by the number of months with records, not 12
pub fn analytics(year: i32, records: &[RevenueRecord], all_years: &[YearTotal]) -> Analytics {
    let mut buckets: [(f64, usize); 12] = [(0.0, 0); 12];
    for record in records.iter().filter(|r| r.year == year) {
        let bucket = &mut buckets[record.month.index()];
        bucket.0 += record.revenue;
        bucket.1 += 1;
    }

    let mut monthly_breakdown: Vec<MonthlyTotal> = Month::ALL
        .iter()
        .zip(buckets.iter())
        .filter(|(_, (_, count))| *count > 0)
        .map(|(month, (total, count))| MonthlyTotal {
            month: *month,
            total: *total,
            count: *count,
        })
        .collect();
    monthly_breakdown.sort_by(|a, b| b.total.total_cmp(&a.total));

    let total_revenue: f64 = monthly_breakdown.iter().map(|m| m.total).sum();
    let avg_monthly_revenue = if monthly_breakdown.is_empty() {
        0.0
    } else {
        total_revenue / monthly_breakdown.len() as f64
    };

    Analytics {
        current_year: year,
        total_revenue,
        monthly_breakdown,
        yearly_comparison: yearly_comparison(all_years),
        avg_monthly_revenue,
    }
}

fn yearly_comparison(all_years: &[YearTotal]) -> Vec<YearTotal> {
    let mut recent: Vec<YearTotal> = all_years.iter().filter(|y| y.count > 0).cloned().collect();
    recent.sort_by(|a, b| b.year.cmp(&a.year));
    recent.truncate(YEARS_COMPARED);
    // stable: equal totals keep the more recent year first
    recent.sort_by(|a, b| b.total.total_cmp(&a.total));
    recent
}

// ============================================================================
// STORE-BACKED ENTRY POINTS
// ============================================================================

pub fn chart_for_year(conn: &Connection, year: i32) -> Result<ChartReport> {
    let records = records_for_year(conn, year)?;
    Ok(chart_data(year, &records))
}

pub fn analytics_for_year(conn: &Connection, year: i32) -> Result<Analytics> {
    let records = records_for_year(conn, year)?;
    let years = year_totals(conn)?;
    Ok(analytics(year, &records, &years))
}

/// Year from a query string. Missing or non-numeric input means "this year".
pub fn resolve_year(raw: Option<&str>) -> i32 {
    raw.and_then(|s| s.trim().parse::<i32>().ok())
        .unwrap_or_else(|| Utc::now().year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RevenueSource;

    fn record(month: Month, year: i32, revenue: f64) -> RevenueRecord {
        let now = Utc::now();
        RevenueRecord {
            id: uuid::Uuid::new_v4().to_string(),
            month,
            year,
            revenue,
            source: RevenueSource::Manual,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn year_total(year: i32, total: f64, count: i64) -> YearTotal {
        YearTotal { year, total, count }
    }

    fn month_total(month: Month, total: f64, count: usize) -> MonthlyTotal {
        MonthlyTotal {
            month,
            total,
            count,
        }
    }

    fn example_records() -> Vec<RevenueRecord> {
        vec![
            record(Month::January, 2025, 100.0),
            record(Month::January, 2025, 50.0),
            record(Month::February, 2025, 200.0),
        ]
    }

    #[test]
    fn test_chart_data_example() {
        let report = chart_data(2025, &example_records());

        let mut expected = vec![0.0; 12];
        expected[0] = 150.0;
        expected[1] = 200.0;

        assert_eq!(report.data.datasets[0].data, expected);
        assert_eq!(report.total_revenue, 350.0);
        assert_eq!(report.year, 2025);
        assert_eq!(report.data.labels.len(), 12);
        assert_eq!(report.data.labels[0], "January");
        assert_eq!(report.data.labels[11], "December");
    }

    #[test]
    fn test_chart_data_empty_year_is_all_zero() {
        let report = chart_data(2022, &example_records());
        assert_eq!(report.data.datasets[0].data, vec![0.0; 12]);
        assert_eq!(report.total_revenue, 0.0);
    }

    #[test]
    fn test_chart_data_ignores_insertion_order() {
        let mut records = vec![
            record(Month::December, 2025, 12.0),
            record(Month::March, 2025, 3.0),
            record(Month::July, 2025, 7.0),
            record(Month::March, 2025, 3.0),
        ];
        let forward = chart_data(2025, &records);
        records.reverse();
        let backward = chart_data(2025, &records);

        assert_eq!(forward, backward);
        let data = &forward.data.datasets[0].data;
        assert_eq!(data[2], 6.0);
        assert_eq!(data[6], 7.0);
        assert_eq!(data[11], 12.0);
    }

    #[test]
    fn test_chart_series_sums_to_total() {
        let records: Vec<RevenueRecord> = (0..40)
            .map(|i| record(Month::ALL[i % 12], 2024, (i * 37 % 101) as f64 + 0.25))
            .collect();
        let report = chart_data(2024, &records);
        let sum: f64 = report.data.datasets[0].data.iter().sum();
        assert_eq!(sum, report.total_revenue);
    }

    #[test]
    fn test_analytics_example() {
        let years = vec![year_total(2025, 350.0, 3)];
        let result = analytics(2025, &example_records(), &years);

        assert_eq!(result.current_year, 2025);
        assert_eq!(result.total_revenue, 350.0);
        assert_eq!(result.avg_monthly_revenue, 175.0);
        assert_eq!(
            result.monthly_breakdown,
            vec![
                month_total(Month::February, 200.0, 1),
                month_total(Month::January, 150.0, 2),
            ]
        );
    }

    #[test]
    fn test_analytics_empty_year() {
        let result = analytics(2021, &[], &[]);
        assert_eq!(result.total_revenue, 0.0);
        assert_eq!(result.avg_monthly_revenue, 0.0);
        assert!(result.monthly_breakdown.is_empty());
        assert!(result.yearly_comparison.is_empty());
    }

    #[test]
    fn test_breakdown_ties_keep_calendar_order() {
        let records = vec![
            record(Month::May, 2025, 10.0),
            record(Month::March, 2025, 10.0),
        ];
        let result = analytics(2025, &records, &[]);
        let months: Vec<Month> = result.monthly_breakdown.iter().map(|m| m.month).collect();
        assert_eq!(months, vec![Month::March, Month::May]);
    }

    #[test]
    fn test_yearly_comparison_recent_three_by_total() {
        let years = vec![
            year_total(2021, 9000.0, 4),
            year_total(2022, 100.0, 1),
            year_total(2023, 300.0, 2),
            year_total(2024, 200.0, 2),
        ];
        let result = analytics(2024, &[], &years);
        let picked: Vec<i32> = result.yearly_comparison.iter().map(|y| y.year).collect();
        // 2021 is the biggest year but not one of the three most recent
        assert_eq!(picked, vec![2023, 2024, 2022]);
    }

    #[test]
    fn test_resolve_year() {
        let this_year = Utc::now().year();
        assert_eq!(resolve_year(Some("2024")), 2024);
        assert_eq!(resolve_year(Some(" 2026 ")), 2026);
        assert_eq!(resolve_year(Some("twenty")), this_year);
        assert_eq!(resolve_year(Some("")), this_year);
        assert_eq!(resolve_year(None), this_year);
    }

    #[test]
    fn test_store_backed_chart_and_analytics() {
        use crate::db::{insert_record, setup_database};
        use crate::schema::NewRecord;

        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        for (month, year, revenue) in [
            (Month::January, 2025, 100.0),
            (Month::January, 2025, 50.0),
            (Month::February, 2025, 200.0),
            (Month::June, 2024, 80.0),
        ] {
            insert_record(
                &conn,
                &NewRecord {
                    month,
                    year,
                    revenue,
                    source: RevenueSource::Manual,
                    description: None,
                },
            )
            .unwrap();
        }

        let chart = chart_for_year(&conn, 2025).unwrap();
        assert_eq!(chart.total_revenue, 350.0);
        assert_eq!(chart.data.datasets[0].data[1], 200.0);

        let stats = analytics_for_year(&conn, 2025).unwrap();
        assert_eq!(stats.avg_monthly_revenue, 175.0);
        let years: Vec<i32> = stats.yearly_comparison.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2025, 2024]);
    }
}
