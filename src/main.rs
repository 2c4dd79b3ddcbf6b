use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

use revenue_ledger::log::init_logging;
use revenue_ledger::{
    analytics_for_year, chart_for_year, count_records, insert_records, list_records, load_csv,
    resolve_year, AppConfig, ListQuery, Month, SortSpec, Store,
};

#[derive(Parser)]
#[command(version, about = "Revenue ledger: seed records and print monthly reports")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Bulk insert records from a CSV file (month,year,revenue,source,description)
    Seed { csv: PathBuf },
    /// Print the twelve monthly totals for a year
    Chart {
        #[arg(short, long)]
        year: Option<String>,
    },
    /// Print totals, monthly breakdown and yearly comparison
    Analytics {
        #[arg(short, long)]
        year: Option<String>,
    },
    /// List stored records
    List {
        #[arg(short, long)]
        year: Option<i32>,
        #[arg(short, long)]
        month: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Page size (default: pagination.default_limit)
        #[arg(long)]
        limit: Option<u32>,
        /// Sort field, prefix with '-' for descending (default: -createdAt)
        #[arg(long)]
        sort: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = AppConfig::load(cli.config.as_deref())?;
    let db_path = cli
        .db
        .unwrap_or_else(|| PathBuf::from(&config.database_path));

    let result = run(command, &db_path, &config);
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

fn run(command: Commands, db_path: &Path, config: &AppConfig) -> Result<()> {
    let store = Store::open(db_path)?;

    match command {
        Commands::Seed { csv } => run_seed(&store, &csv),
        Commands::Chart { year } => run_chart(&store, resolve_year(year.as_deref())),
        Commands::Analytics { year } => run_analytics(&store, resolve_year(year.as_deref())),
        Commands::List {
            year,
            month,
            page,
            limit,
            sort,
        } => {
            let month = match month {
                Some(name) => Some(
                    Month::from_name(&name)
                        .ok_or_else(|| anyhow::anyhow!("Unknown month: {}", name))?,
                ),
                None => None,
            };
            let query = ListQuery {
                year,
                month,
                sort: sort.as_deref().map(SortSpec::parse).unwrap_or_default(),
                page,
                limit: limit.unwrap_or(config.pagination.default_limit),
            }
            .normalized(config.pagination.max_limit);
            run_list(&store, &query)
        }
    }
}

fn run_seed(store: &Store, csv: &Path) -> Result<()> {
    println!("📂 Loading {}...", csv.display());
    let records = load_csv(csv)?;
    println!("✓ Validated {} records", records.len());

    let mut conn = store.lock()?;
    let inserted = insert_records(&mut conn, &records)?;
    let total = count_records(&conn)?;

    println!("✓ Inserted: {} records", inserted);
    println!("✓ Database now holds {} records", total);
    Ok(())
}

fn run_chart(store: &Store, year: i32) -> Result<()> {
    let conn = store.lock()?;
    let report = chart_for_year(&conn, year)?;

    println!("📊 Revenue {}", report.year);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(dataset) = report.data.datasets.first() {
        for (label, total) in report.data.labels.iter().zip(dataset.data.iter()) {
            println!("{:<10} {:>14.2}", label, total);
        }
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{:<10} {:>14.2}", "Total", report.total_revenue);
    Ok(())
}

fn run_analytics(store: &Store, year: i32) -> Result<()> {
    let conn = store.lock()?;
    let stats = analytics_for_year(&conn, year)?;

    println!("📈 Analytics {}", stats.current_year);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total revenue:       {:.2}", stats.total_revenue);
    println!("Avg monthly revenue: {:.2}", stats.avg_monthly_revenue);

    println!("\nBy month (highest first):");
    if stats.monthly_breakdown.is_empty() {
        println!("  (no records)");
    }
    for month in &stats.monthly_breakdown {
        println!(
            "  {:<10} {:>14.2}  ({} records)",
            month.month.name(),
            month.total,
            month.count
        );
    }

    println!("\nRecent years:");
    for year in &stats.yearly_comparison {
        println!("  {:<10} {:>14.2}  ({} records)", year.year, year.total, year.count);
    }
    Ok(())
}

fn run_list(store: &Store, query: &ListQuery) -> Result<()> {
    let conn = store.lock()?;
    let page = list_records(&conn, query)?;

    for record in &page.records {
        println!(
            "{}  {:<9} {}  {:>12.2}  {:<7}  {}",
            record.id,
            record.month.name(),
            record.year,
            record.revenue,
            record.source.as_str(),
            record.description.as_deref().unwrap_or("")
        );
    }
    println!(
        "\nPage {}/{} ({} records)",
        page.page,
        page.pages().max(1),
        page.total
    );
    Ok(())
}
