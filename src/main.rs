use anyhow::Result;
use clap::Parser;
use portal_reports::{config::AppConfig, fetch::ReportPeriod, pipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Log into the portal, pull the Entrada and Consumo reports and write them
/// to a two-sheet workbook.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML config file; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output workbook (overrides the config)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Month to fetch as YYYY-MM; the current month when omitted
    #[arg(long)]
    month: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    // ─── 2) config & period ──────────────────────────────────────────
    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let period = match args.month.as_deref() {
        Some(m) => ReportPeriod::parse_month(m)?,
        None => ReportPeriod::today(),
    };
    let out = args.out.unwrap_or_else(|| config.output.path.clone());
    info!(%period, out = %out.display(), "startup");

    // ─── 3) login → fetch → resolve → write ──────────────────────────
    pipeline::run_portal(&config, period, &out).await
}
