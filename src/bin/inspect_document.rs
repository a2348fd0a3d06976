use anyhow::Result;
use clap::Parser;
use portal_reports::{
    config::AppConfig,
    document::{RawDocument, ReportId},
    resolve::{sniff::sniff, Resolution, TableResolver},
};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// Show how a saved report file is read: every candidate table and the
/// resolver's decision.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    file: PathBuf,

    /// Entrada or Consumo
    #[arg(long, default_value = "Consumo")]
    report: ReportId,

    /// Extra header keyword, may be repeated
    #[arg(long = "keyword")]
    keywords: Vec<String>,

    #[arg(long)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Preview rows per candidate in text mode
    #[arg(long, default_value_t = 5)]
    preview: usize,
}

#[derive(Serialize)]
struct CandidateSummary {
    origin: String,
    rows: usize,
    width: usize,
}

#[derive(Serialize)]
struct Inspection {
    file: String,
    report: ReportId,
    detected: String,
    decoder: Option<&'static str>,
    candidates: Vec<CandidateSummary>,
    resolution: Option<Resolution>,
    error: Option<String>,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    let resolver_config = args
        .keywords
        .iter()
        .fold(config.resolver, |cfg, k| cfg.with_keyword(k.as_str()));
    let resolver = TableResolver::new(resolver_config);
    let doc = RawDocument::from_file(args.report, &args.file)?;

    let (decoder, candidates) = match resolver.candidates(&doc) {
        Ok((name, tables)) => (Some(name), tables),
        Err(_) => (None, Vec::new()),
    };
    let (resolution, error) = match resolver.resolve(&doc) {
        Ok(r) => (Some(r), None),
        Err(e) => (None, Some(e.to_string())),
    };
    let inspection = Inspection {
        file: args.file.display().to_string(),
        report: args.report,
        detected: format!("{:?}", sniff(&doc.content)),
        decoder,
        candidates: candidates
            .iter()
            .map(|c| CandidateSummary {
                origin: c.origin.to_string(),
                rows: c.row_count(),
                width: c.width(),
            })
            .collect(),
        resolution,
        error,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&inspection)?);
        return Ok(());
    }

    println!("=== {} ({}) ===", inspection.file, inspection.report);
    println!("Claimed format:  {:?}", doc.claimed_format);
    println!("Detected format: {}", inspection.detected);
    println!("Decoder:         {}", decoder.unwrap_or("<none>"));
    println!();
    println!("=== Candidates ({}) ===", candidates.len());
    for c in &candidates {
        println!("- {:<20} {} rows x {} cols", c.origin, c.row_count(), c.width());
        for r in 0..c.row_count().min(args.preview) {
            println!("    {:>3}: {}", r, c.rows[r].join(" | "));
        }
    }
    println!();
    match (&inspection.resolution, &inspection.error) {
        (Some(r), _) => {
            println!("=== Resolution ===");
            println!("Table:     {}", r.table.origin);
            println!("Selection: {:?}", r.selection);
            println!("Header:    {:?} at {:?}", r.header, r.table.header_index);
            println!("Columns:   {}", r.table.disambiguated_columns().join(" | "));
            println!("Rows:      {}", r.table.row_count());
            for w in &r.warnings {
                println!("Warning:   {}", w);
            }
        }
        (None, Some(e)) => println!("=== Failed: {} ===", e),
        (None, None) => {}
    }
    Ok(())
}
