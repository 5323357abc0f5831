//! Subcommand implementations.

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use meterbill_core::BillingPeriod;
use meterbill_infra::{Missing, PostgresFactStore, db};
use meterbill_invoicing::{FactSnapshot, generate};

use crate::config::{Args, Command};

pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let pool = db::connect(args.database_url()?, args.max_connections)
        .await
        .context("failed to connect to the fact store")?;

    match &args.command {
        Command::Migrate => {
            db::run_migrations(&pool).await.context("failed to run migrations")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Invoice(invoice) => {
            let period = invoice.period(Utc::now())?;
            let store = PostgresFactStore::new(pool);
            let snapshot = store.snapshot().await.context("failed to open fact store snapshot")?;
            let written = write_invoices(&snapshot, period, std::io::stdout().lock()).await;
            snapshot.close().await.context("failed to close fact store snapshot")?;
            written?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            let store = PostgresFactStore::new(pool);
            let snapshot = store.snapshot().await.context("failed to open fact store snapshot")?;
            let missing = snapshot.missing_fields().await;
            snapshot.close().await.context("failed to close fact store snapshot")?;
            let missing = missing.context("failed to check dimension tables")?;

            if report_missing(&missing, std::io::stdout().lock())? {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

/// Generate invoices for `period` and write them as a JSON array.
pub async fn write_invoices<S>(snapshot: &S, period: BillingPeriod, mut out: impl Write) -> anyhow::Result<()>
where
    S: FactSnapshot + ?Sized,
{
    let invoices = generate(snapshot, period)
        .await
        .with_context(|| format!("failed to generate invoices for {period}"))?;
    info!(%period, invoices = invoices.len(), "writing invoices");

    serde_json::to_writer_pretty(&mut out, &invoices).context("failed to encode invoices")?;
    writeln!(out)?;
    Ok(())
}

/// Print one line per finding. Returns whether anything was missing.
pub fn report_missing(missing: &[Missing], mut out: impl Write) -> anyhow::Result<bool> {
    for finding in missing {
        writeln!(out, "{finding}")?;
    }
    if !missing.is_empty() {
        tracing::warn!(count = missing.len(), "dimension rows are incomplete");
    }
    Ok(!missing.is_empty())
}
