use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{
    params, params_from_iter, types::Value as SqlValue, Connection, OptionalExtension, Row,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::schema::{validate_new, Month, NewRecord, RecordInput, RecordPatch, RevenueSource};

/// Default and maximum page sizes for `list_records`
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// One persisted revenue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueRecord {
    pub id: String,
    pub month: Month,
    pub year: i32,
    pub revenue: f64,
    pub source: RevenueSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sum and count of every record in one year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTotal {
    pub year: i32,
    pub total: f64,
    pub count: i64,
}

// ============================================================================
// STORE HANDLE
// ============================================================================

/// Process-wide persistence handle. Built once at startup and passed to
/// whoever needs it; there is no global connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        setup_database(&conn)?;
        info!(path = %path.display(), "Database ready");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Store {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Lock the connection. A poisoned lock is reported as an error rather
    /// than a panic so callers can surface it as a storage fault.
    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection lock poisoned"))
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for file databases; in-memory connections silently keep "memory"
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS revenue_records (
            id TEXT PRIMARY KEY NOT NULL,
            month_index INTEGER NOT NULL CHECK (month_index BETWEEN 0 AND 11),
            year INTEGER NOT NULL,
            revenue REAL NOT NULL CHECK (revenue >= 0),
            source TEXT NOT NULL DEFAULT 'manual',
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_revenue_year_month ON revenue_records(year, month_index)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_revenue_created_at ON revenue_records(created_at)",
        [],
    )?;

    Ok(())
}

// Stored precision is microseconds; truncate up front so a record read back
// compares equal to the one that was written
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed-width timestamps so TEXT ordering matches time ordering
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const RECORD_COLUMNS: &str =
    "id, month_index, year, revenue, source, description, created_at, updated_at";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<RevenueRecord> {
    let month_index: i64 = row.get(1)?;
    let source: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    let month = usize::try_from(month_index)
        .ok()
        .and_then(Month::from_index)
        .ok_or_else(|| conversion_error(1, format!("invalid month index {}", month_index)))?;
    let source = RevenueSource::parse(&source)
        .ok_or_else(|| conversion_error(4, format!("invalid source {}", source)))?;

    Ok(RevenueRecord {
        id: row.get(0)?,
        month,
        year: row.get(2)?,
        revenue: row.get(3)?,
        source,
        description: row.get(5)?,
        created_at: parse_timestamp(6, &created_at)?,
        updated_at: parse_timestamp(7, &updated_at)?,
    })
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e.to_string()))
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

// ============================================================================
// CRUD
// ============================================================================

pub fn insert_record(conn: &Connection, record: &NewRecord) -> Result<RevenueRecord> {
    let created = now();
    let stored = RevenueRecord {
        id: uuid::Uuid::new_v4().to_string(),
        month: record.month,
        year: record.year,
        revenue: record.revenue,
        source: record.source,
        description: record.description.clone(),
        created_at: created,
        updated_at: created,
    };

    conn.execute(
        "INSERT INTO revenue_records (
            id, month_index, year, revenue, source, description, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            stored.id,
            stored.month.index() as i64,
            stored.year,
            stored.revenue,
            stored.source.as_str(),
            stored.description,
            format_timestamp(stored.created_at),
            format_timestamp(stored.updated_at),
        ],
    )
    .context("Failed to insert revenue record")?;

    debug!(id = %stored.id, month = %stored.month, year = stored.year, "Inserted revenue record");
    Ok(stored)
}

/// Bulk insert inside one SQLite transaction: either every record lands or none
pub fn insert_records(conn: &mut Connection, records: &[NewRecord]) -> Result<usize> {
    let tx = conn.transaction()?;
    for record in records {
        insert_record(&tx, record)?;
    }
    tx.commit().context("Failed to commit bulk insert")?;

    info!(count = records.len(), "Bulk inserted revenue records");
    Ok(records.len())
}

pub fn get_record(conn: &Connection, id: &str) -> Result<Option<RevenueRecord>> {
    let sql = format!("SELECT {} FROM revenue_records WHERE id = ?1", RECORD_COLUMNS);
    let record = conn
        .query_row(&sql, [id], record_from_row)
        .optional()
        .context("Failed to load revenue record")?;
    Ok(record)
}

/// Overwrite only the fields present in `patch`. Returns None when `id` is unknown.
pub fn update_record(
    conn: &Connection,
    id: &str,
    patch: &RecordPatch,
) -> Result<Option<RevenueRecord>> {
    let Some(mut record) = get_record(conn, id)? else {
        return Ok(None);
    };

    if let Some(month) = patch.month {
        record.month = month;
    }
    if let Some(year) = patch.year {
        record.year = year;
    }
    if let Some(revenue) = patch.revenue {
        record.revenue = revenue;
    }
    if let Some(source) = patch.source {
        record.source = source;
    }
    if let Some(description) = &patch.description {
        record.description = description.clone();
    }
    record.updated_at = now();

    conn.execute(
        "UPDATE revenue_records
         SET month_index = ?1, year = ?2, revenue = ?3,
             source = ?4, description = ?5, updated_at = ?6
         WHERE id = ?7",
        params![
            record.month.index() as i64,
            record.year,
            record.revenue,
            record.source.as_str(),
            record.description,
            format_timestamp(record.updated_at),
            record.id,
        ],
    )
    .context("Failed to update revenue record")?;

    debug!(id = %record.id, touch_only = patch.is_empty(), "Updated revenue record");
    Ok(Some(record))
}

/// Returns false when nothing matched `id`
pub fn delete_record(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM revenue_records WHERE id = ?1", [id])
        .context("Failed to delete revenue record")?;
    Ok(deleted > 0)
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM revenue_records", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// LISTING
// ============================================================================

/// Sortable record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Year,
    Month,
    Revenue,
}

impl SortField {
    fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Year => "year",
            SortField::Month => "month_index",
            SortField::Revenue => "revenue",
        }
    }

    fn parse(name: &str) -> Option<SortField> {
        match name {
            "createdAt" | "created_at" => Some(SortField::CreatedAt),
            "updatedAt" | "updated_at" => Some(SortField::UpdatedAt),
            "year" => Some(SortField::Year),
            "month" => Some(SortField::Month),
            "revenue" => Some(SortField::Revenue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub descending: bool,
}

impl Default for SortSpec {
    /// Most recent first
    fn default() -> Self {
        SortSpec {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl SortSpec {
    /// `"-revenue"` sorts by revenue descending, `"year"` ascending.
    /// Unknown fields fall back to the default order.
    pub fn parse(raw: &str) -> SortSpec {
        let raw = raw.trim();
        let (descending, name) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.strip_prefix('+').unwrap_or(raw)),
        };

        match SortField::parse(name) {
            Some(field) => SortSpec { field, descending },
            None => SortSpec::default(),
        }
    }

    fn order_by(&self) -> String {
        let dir = if self.descending { "DESC" } else { "ASC" };
        // rowid follows insertion order and breaks ties deterministically
        format!("{} {}, rowid {}", self.field.column(), dir, dir)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub year: Option<i32>,
    pub month: Option<Month>,
    pub sort: SortSpec,
    pub page: u32,
    pub limit: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            year: None,
            month: None,
            sort: SortSpec::default(),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ListQuery {
    /// Clamp page to >= 1 and limit to 1..=max_limit
    pub fn normalized(mut self, max_limit: u32) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, max_limit.max(1));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub records: Vec<RevenueRecord>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

impl RecordPage {
    /// ceil(total / limit)
    pub fn pages(&self) -> i64 {
        let limit = i64::from(self.limit.max(1));
        (self.total + limit - 1) / limit
    }
}

/// Callers own the upper clamp on `limit` (see `ListQuery::normalized`);
/// only zero page and limit values are bumped to 1 here.
pub fn list_records(conn: &Connection, query: &ListQuery) -> Result<RecordPage> {
    let page = query.page.max(1);
    let limit = query.limit.max(1);

    let mut clauses = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(year) = query.year {
        values.push(SqlValue::Integer(i64::from(year)));
        clauses.push(format!("year = ?{}", values.len()));
    }
    if let Some(month) = query.month {
        values.push(SqlValue::Integer(month.index() as i64));
        clauses.push(format!("month_index = ?{}", values.len()));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM revenue_records{}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )
        .context("Failed to count revenue records")?;

    let offset = i64::from(page - 1) * i64::from(limit);
    let sql = format!(
        "SELECT {} FROM revenue_records{} ORDER BY {} LIMIT {} OFFSET {}",
        RECORD_COLUMNS,
        where_sql,
        query.sort.order_by(),
        limit,
        offset
    );

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map(params_from_iter(values.iter()), record_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to list revenue records")?;

    Ok(RecordPage {
        records,
        total,
        page,
        limit,
    })
}

/// Every record for one year, in calendar order
pub fn records_for_year(conn: &Connection, year: i32) -> Result<Vec<RevenueRecord>> {
    let sql = format!(
        "SELECT {} FROM revenue_records WHERE year = ?1 ORDER BY month_index ASC, rowid ASC",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([year], record_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to load revenue records for {}", year))?;
    Ok(records)
}

/// Totals grouped by year, most recent year first
pub fn year_totals(conn: &Connection) -> Result<Vec<YearTotal>> {
    let mut stmt = conn.prepare(
        "SELECT year, SUM(revenue) AS total, COUNT(*) AS count
         FROM revenue_records
         GROUP BY year
         ORDER BY year DESC",
    )?;

    let totals = stmt
        .query_map([], |row| {
            Ok(YearTotal {
                year: row.get(0)?,
                total: row.get(1)?,
                count: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to compute yearly totals")?;

    Ok(totals)
}

// ============================================================================
// CSV SEED
// ============================================================================

/// Load seed rows (`month,year,revenue,source,description`). Every row goes
/// through the same validation as the create endpoint; the first bad row
/// aborts the load.
pub fn load_csv(csv_path: &Path) -> Result<Vec<NewRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut records = Vec::new();

    for (index, result) in rdr.deserialize::<SeedRow>().enumerate() {
        // Header is line 1
        let line = index + 2;
        let row = result.with_context(|| format!("Failed to read CSV line {}", line))?;

        let record = validate_new(&row.into_input()).map_err(|errors| {
            let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            anyhow!("Invalid record on CSV line {}: {}", line, details.join("; "))
        })?;

        records.push(record);
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    month: String,
    year: String,
    revenue: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl SeedRow {
    fn into_input(self) -> RecordInput {
        let text = |s: String| serde_json::Value::String(s);
        RecordInput {
            month: Some(text(self.month)),
            year: Some(text(self.year)),
            revenue: Some(text(self.revenue)),
            source: self.source.filter(|s| !s.is_empty()).map(text),
            description: self.description.filter(|s| !s.is_empty()).map(text),
        }
    }
}
