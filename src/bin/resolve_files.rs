use anyhow::{bail, Result};
use clap::Parser;
use portal_reports::{
    config::AppConfig,
    document::{RawDocument, ReportId},
    fetch::DownloadWatcher,
    pipeline,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Resolve locally saved report files into the dashboard workbook.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Saved Entrada report (usually an HTML page)
    #[arg(long)]
    entrada: PathBuf,

    /// Saved Consumo report
    #[arg(long, conflicts_with = "consumo_dir")]
    consumo: Option<PathBuf>,

    /// Wait for the Consumo download to land in this directory instead
    #[arg(long)]
    consumo_dir: Option<PathBuf>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let out = args.out.unwrap_or_else(|| config.output.path.clone());

    let consumo_path = match (args.consumo, args.consumo_dir) {
        (Some(path), _) => path,
        (None, Some(dir)) => {
            let watcher = DownloadWatcher::snapshot(dir)?;
            info!("waiting for the Consumo download");
            watcher.wait_for_new(&config.download).await?
        }
        (None, None) => bail!("pass either --consumo or --consumo-dir"),
    };

    let entrada = RawDocument::from_file(ReportId::Entrada, &args.entrada)?;
    let consumo = RawDocument::from_file(ReportId::Consumo, &consumo_path)?;
    let pair = pipeline::resolve_and_write(&config, &entrada, &consumo, &out)?;

    info!(
        out = %out.display(),
        entrada_rows = pair.entrada.row_count(),
        consumo_rows = pair.consumo.row_count(),
        "done"
    );
    Ok(())
}
