// src/pipeline.rs
use anyhow::{Context, Result};
use std::path::Path;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::document::{RawDocument, ReportId};
use crate::error::ResolveError;
use crate::fetch::{PortalSession, ReportPeriod};
use crate::normalize::NumberParser;
use crate::output::{write_report_pair, ReportPair};
use crate::resolve::TableResolver;

/// Resolve both documents of a run. Entrada is resolved first; the first
/// fatal error stops the run.
pub fn resolve_pair(
    resolver: &TableResolver,
    entrada: &RawDocument,
    consumo: &RawDocument,
) -> Result<ReportPair, ResolveError> {
    let entrada = resolver.resolve(entrada)?;
    let consumo = resolver.resolve(consumo)?;
    Ok(ReportPair {
        entrada: entrada.table,
        consumo: consumo.table,
    })
}

/// Resolve a pair and write the workbook to `out`.
pub fn resolve_and_write(
    config: &AppConfig,
    entrada: &RawDocument,
    consumo: &RawDocument,
    out: &Path,
) -> Result<ReportPair> {
    let parser = NumberParser::new(config.resolver.locale)?;
    let resolver = TableResolver::new(config.resolver.clone());
    let pair = resolve_pair(&resolver, entrada, consumo)?;
    write_report_pair(&pair, &parser, out)?;
    Ok(pair)
}

/// Log in, fetch both reports for `period`, resolve them and write `out`.
/// On failure the last portal page is saved to the configured snapshot path.
pub async fn run_portal(config: &AppConfig, period: ReportPeriod, out: &Path) -> Result<()> {
    let started = Instant::now();
    let password = PortalSession::password_from_env(&config.portal)?;
    let mut session = PortalSession::new(&config.portal)?;

    let result = login_fetch_and_write(&mut session, &password, config, period, out).await;
    if let Err(e) = &result {
        error!(error = %e, "run failed");
        let snapshot = &config.output.snapshot_path;
        match session.save_snapshot(snapshot).await {
            Ok(()) => info!(path = %snapshot.display(), "saved page snapshot"),
            Err(se) => warn!(error = %se, "could not save page snapshot"),
        }
    }
    let pair = result?;

    info!(
        %period,
        out = %out.display(),
        entrada_rows = pair.entrada.row_count(),
        entrada_columns = pair.entrada.columns.len(),
        consumo_rows = pair.consumo.row_count(),
        consumo_columns = pair.consumo.columns.len(),
        elapsed = ?started.elapsed(),
        "run complete"
    );
    Ok(())
}

async fn login_fetch_and_write(
    session: &mut PortalSession,
    password: &str,
    config: &AppConfig,
    period: ReportPeriod,
    out: &Path,
) -> Result<ReportPair> {
    session.login(password).await?;
    let dir = &config.download.dir;
    let entrada = session
        .fetch_report(ReportId::Entrada, &period, dir)
        .await
        .context("fetching Entrada")?;
    let consumo = session
        .fetch_report(ReportId::Consumo, &period, dir)
        .await
        .context("fetching Consumo")?;
    resolve_and_write(config, &entrada, &consumo, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ClaimedFormat;
    use calamine::{open_workbook_auto, Reader};
    use rust_xlsxwriter::Workbook;
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const ENTRADA_HTML: &str = r#"<html><body>
        <table><tr><td>Portal</td></tr></table>
        <table>
          <tr><td>Relatorio de entradas</td><td></td></tr>
          <tr><td>Produto</td><td>Custo Moeda 1</td></tr>
          <tr><td>Eixo</td><td>1.234,50</td></tr>
          <tr><td>Mola</td><td>7,25</td></tr>
        </table></body></html>"#;

    fn consumo_xlsx() -> Vec<u8> {
        let mut wb = Workbook::new();
        let ws = wb.add_worksheet();
        ws.write_string(0, 0, "SD3 - Consumo").unwrap();
        ws.write_string(2, 0, "Produto").unwrap();
        ws.write_string(2, 1, "Quantidade").unwrap();
        ws.write_string(3, 0, "Eixo").unwrap();
        ws.write_number(3, 1, 3.5).unwrap();
        wb.save_to_buffer().unwrap()
    }

    #[test]
    fn pair_is_resolved_and_written() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("dados_dashboard.xlsx");
        let entrada = RawDocument::new(ReportId::Entrada, ClaimedFormat::Markup, ENTRADA_HTML);
        let consumo =
            RawDocument::new(ReportId::Consumo, ClaimedFormat::ModernSpreadsheet, consumo_xlsx());

        let pair = resolve_and_write(&AppConfig::default(), &entrada, &consumo, &out)?;
        assert_eq!(pair.entrada.columns, vec!["Produto", "Custo Moeda 1"]);
        assert_eq!(pair.entrada.row_count(), 2);
        assert_eq!(pair.consumo.columns, vec!["Produto", "Quantidade"]);

        let mut wb = open_workbook_auto(&out)?;
        assert_eq!(wb.sheet_names(), vec!["Consumo".to_string(), "Entrada".to_string()]);
        let entrada_sheet = wb.worksheet_range("Entrada")?;
        assert_eq!(entrada_sheet.get_value((1, 1)), Some(&calamine::Data::Float(1234.5)));
        Ok(())
    }

    #[test]
    fn first_fatal_error_stops_the_pair() {
        let resolver = TableResolver::default();
        let entrada = RawDocument::new(ReportId::Entrada, ClaimedFormat::Markup, ENTRADA_HTML);
        let consumo = RawDocument::new(ReportId::Consumo, ClaimedFormat::LegacySpreadsheet, b"\x00garbage".to_vec());
        let err = resolve_pair(&resolver, &entrada, &consumo).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnparsableDocument {
                report: ReportId::Consumo
            }
        );
    }

    #[test]
    fn failed_write_leaves_no_workbook() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("dados_dashboard.xlsx");
        let entrada = RawDocument::new(ReportId::Entrada, ClaimedFormat::Markup, "<html></html>");
        let consumo =
            RawDocument::new(ReportId::Consumo, ClaimedFormat::ModernSpreadsheet, consumo_xlsx());
        assert!(resolve_and_write(&AppConfig::default(), &entrada, &consumo, &out).is_err());
        assert!(!out.exists());
        Ok(())
    }

    const LOGIN_PAGE: &str =
        r#"<html><body><form><input id="login" name="login"><input name="senha" type="password"></form><p>Senha invalida</p></body></html>"#;

    /// Answers every request with the login page, as the portal does after a
    /// wrong password.
    async fn serve_login_page(listener: TcpListener) {
        while let Ok((mut sock, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = sock.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                        let len = head
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if buf.len() >= end + 4 + len {
                            break;
                        }
                    }
                }
                let resp = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    LOGIN_PAGE.len(),
                    LOGIN_PAGE
                );
                let _ = sock.write_all(resp.as_bytes()).await;
                let _ = sock.shutdown().await;
            });
        }
    }

    #[tokio::test]
    async fn rejected_login_leaves_snapshot() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(serve_login_page(listener));

        let dir = tempdir()?;
        let mut config = AppConfig::default();
        config.portal.base_url = format!("http://{addr}/");
        config.portal.password_env = "PORTAL_REPORTS_TEST_REJECTED_PASSWORD".into();
        config.portal.timeout_secs = 5;
        config.output.snapshot_path = dir.path().join("erro_debug.html");
        config.download.dir = dir.path().join("downloads");
        std::env::set_var("PORTAL_REPORTS_TEST_REJECTED_PASSWORD", "errada");

        let out = dir.path().join("dados_dashboard.xlsx");
        let period = ReportPeriod::parse_month("2024-06")?;
        let err = run_portal(&config, period, &out).await.unwrap_err();
        assert!(err.to_string().contains("login rejected"));
        assert!(!out.exists());

        let snapshot = std::fs::read_to_string(&config.output.snapshot_path)?;
        assert!(snapshot.contains("Senha invalida"));
        Ok(())
    }
}
