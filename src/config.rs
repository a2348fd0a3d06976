// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::document::ReportId;

/// Top-level configuration, loadable from YAML. Every section falls back to
/// its defaults, so an empty file (or no file at all) is a valid config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub portal: PortalConfig,
    pub resolver: ResolverConfig,
    pub download: DownloadConfig,
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Decimal and thousands separators used by the portal's rendered numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberLocale {
    pub decimal: char,
    pub thousands: char,
}

impl Default for NumberLocale {
    fn default() -> Self {
        Self {
            decimal: ',',
            thousands: '.',
        }
    }
}

/// Knobs for the table resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Case-insensitive substrings that mark a report's real header row.
    pub header_keywords: Vec<String>,
    /// Rows per candidate examined when choosing between tables.
    pub selection_scan_rows: usize,
    /// Rows examined when locating the header inside the chosen table.
    pub header_scan_rows: usize,
    /// Zero-based row promoted when no keyword is found (2 = third row).
    pub fallback_header_offset: usize,
    pub locale: NumberLocale,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            header_keywords: ["PRODUTO", "DESCRI", "CUSTO"]
                .into_iter()
                .map(String::from)
                .collect(),
            selection_scan_rows: 10,
            header_scan_rows: 15,
            fallback_header_offset: 2,
            locale: NumberLocale::default(),
        }
    }
}

impl ResolverConfig {
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.header_keywords.push(keyword.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_fallback_offset(mut self, offset: usize) -> Self {
        self.fallback_header_offset = offset;
        self
    }

    /// Keywords uppercased once, empty entries dropped.
    pub fn normalized_keywords(&self) -> Vec<String> {
        self.header_keywords
            .iter()
            .map(|k| k.trim().to_uppercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// One report form: the path it posts to and the fields it sends.
/// Field values may contain `{start}` and `{end}`, replaced by the period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormSpec {
    pub path: String,
    pub fields: BTreeMap<String, String>,
}

impl FormSpec {
    fn new(path: &str, fields: &[(&str, &str)]) -> Self {
        Self {
            path: path.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub base_url: String,
    pub login_path: String,
    pub home_path: String,
    pub username: String,
    /// Environment variable holding the password. Never stored in the file.
    pub password_env: String,
    pub entrada: FormSpec,
    pub consumo: FormSpec,
    pub timeout_secs: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://portal.whbbrasil.com.br/".into(),
            login_path: "/".into(),
            home_path: "/Portalhome".into(),
            username: "luanfp".into(),
            password_env: "PORTAL_PASSWORD".into(),
            entrada: FormSpec::new(
                "/pcp347",
                &[
                    ("de_data", "{start}"),
                    ("ate_data", "{end}"),
                    ("str_fil", "WHB CTBA"),
                    ("str_planta", "USINAGEM CTBA"),
                ],
            ),
            consumo: FormSpec::new(
                "/cus027",
                &[
                    ("de_data", "{start}"),
                    ("ate_data", "{end}"),
                    ("str_emp", "WHB AUTOMOTIVE / CURITIBA"),
                    ("str_consumo", "SIM"),
                    ("ate_cod", "ZZZZZZZZZZZZZZZ"),
                    ("ate_tipo", "ZZ"),
                ],
            ),
            timeout_secs: 60,
        }
    }
}

impl PortalConfig {
    pub fn form(&self, report: ReportId) -> &FormSpec {
        match report {
            ReportId::Entrada => &self.entrada,
            ReportId::Consumo => &self.consumo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub dir: PathBuf,
    pub poll_attempts: usize,
    pub poll_interval_ms: u64,
    pub accepted_extensions: Vec<String>,
    pub partial_suffixes: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("downloads"),
            poll_attempts: 60,
            poll_interval_ms: 1000,
            accepted_extensions: vec!["xls".into(), "xlsx".into()],
            partial_suffixes: vec![
                ".crdownload".into(),
                ".part".into(),
                ".tmp".into(),
                ".download".into(),
            ],
        }
    }
}

impl DownloadConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dados_dashboard.xlsx"),
            snapshot_path: PathBuf::from("erro_debug.html"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_file_means_defaults() -> Result<()> {
        let cfg = AppConfig::load(None)?;
        assert_eq!(cfg.resolver.fallback_header_offset, 2);
        assert_eq!(cfg.resolver.locale, NumberLocale::default());
        assert_eq!(cfg.download.poll_attempts, 60);
        Ok(())
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        writeln!(
            tmp,
            "resolver:\n  header_keywords: [\"produto\", \"  \"]\n  header_scan_rows: 12\ndownload:\n  poll_attempts: 5\n"
        )?;
        let cfg = AppConfig::load(Some(tmp.path()))?;
        assert_eq!(cfg.resolver.normalized_keywords(), vec!["PRODUTO"]);
        assert_eq!(cfg.resolver.header_scan_rows, 12);
        assert_eq!(cfg.resolver.selection_scan_rows, 10);
        assert_eq!(cfg.download.poll_attempts, 5);
        assert_eq!(cfg.download.poll_interval_ms, 1000);
        assert_eq!(cfg.portal.consumo.path, "/cus027");
        Ok(())
    }

    #[test]
    fn keywords_are_extensible() {
        let cfg = ResolverConfig::default().with_keyword("Quantidade");
        assert!(cfg.normalized_keywords().contains(&"QUANTIDADE".to_string()));
    }
}
