//! Command-line arguments. Connection settings fall back to environment
//! variables so the binary can run unchanged in a cron job or container.

use chrono::{DateTime, Utc};
use clap::Parser;

use meterbill_core::{BillingPeriod, DomainResult};
use meterbill_observability::LogFormat;

/// CLI arguments for the meterbill invoicing tool
#[derive(Parser, Debug)]
#[command(version, about = "Usage aggregation and invoice generation", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Postgres connection string of the fact store
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Maximum connections held by the pool
    #[arg(long, global = true, env = "METERBILL_MAX_CONNECTIONS", default_value = "5")]
    pub max_connections: u32,

    /// Log line format: json or pretty
    #[arg(long, global = true, env = "METERBILL_LOG_FORMAT", default_value = "json", value_parser = parse_log_format)]
    pub log_format: LogFormat,
}

#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Generate invoices for one calendar month and print them as JSON
    Invoice(InvoiceArgs),
    /// List dimension rows missing a target, price or unit
    ///
    /// Exits non-zero when anything is missing.
    Check,
    /// Run database migrations and exit
    Migrate,
}

#[derive(clap::Args, Debug, PartialEq, Eq)]
pub struct InvoiceArgs {
    /// Billing year (defaults to the previous month's year)
    #[arg(long, requires = "month")]
    pub year: Option<i32>,

    /// Billing month, 1-12 (defaults to the previous month)
    #[arg(long, requires = "year")]
    pub month: Option<u32>,
}

impl InvoiceArgs {
    /// The requested period, or the month before the one containing `now`.
    pub fn period(&self, now: DateTime<Utc>) -> DomainResult<BillingPeriod> {
        match (self.year, self.month) {
            (Some(year), Some(month)) => BillingPeriod::new(year, month),
            _ => BillingPeriod::containing(now).previous(),
        }
    }
}

impl Args {
    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow::anyhow!("no database configured; pass --database-url or set DATABASE_URL"))
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    LogFormat::parse(value).ok_or_else(|| format!("unknown log format {value:?}, expected json or pretty"))
}
