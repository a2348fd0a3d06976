// src/document.rs
use serde::{Deserialize, Serialize};
use anyhow::bail;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Which of the two portal reports a document belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportId {
    Entrada,
    Consumo,
}

impl ReportId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportId::Entrada => "Entrada",
            ReportId::Consumo => "Consumo",
        }
    }
}

impl FromStr for ReportId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "entrada" => Ok(ReportId::Entrada),
            "consumo" => Ok(ReportId::Consumo),
            _ => bail!("unknown report {s:?}; use Entrada or Consumo"),
        }
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The format a document *says* it has. Only ever a hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimedFormat {
    Markup,
    LegacySpreadsheet,
    ModernSpreadsheet,
}

impl ClaimedFormat {
    /// Map a file extension onto a claim. Unknown extensions are treated as
    /// a modern spreadsheet, which is what the portal usually hands out.
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "html" | "htm" => ClaimedFormat::Markup,
            "xls" => ClaimedFormat::LegacySpreadsheet,
            _ => ClaimedFormat::ModernSpreadsheet,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(ClaimedFormat::ModernSpreadsheet)
    }
}

/// Payload fetched from the portal before any structural interpretation.
#[derive(Clone, Debug)]
pub struct RawDocument {
    pub report: ReportId,
    pub claimed_format: ClaimedFormat,
    pub content: Vec<u8>,
}

impl RawDocument {
    pub fn new(report: ReportId, claimed_format: ClaimedFormat, content: impl Into<Vec<u8>>) -> Self {
        Self {
            report,
            claimed_format,
            content: content.into(),
        }
    }

    /// Read a document from disk, taking the claim from the file extension.
    pub fn from_file(report: ReportId, path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read(path)
            .with_context(|| format!("reading {} document {}", report, path.display()))?;
        Ok(Self::new(report, ClaimedFormat::from_path(path), content))
    }
}
