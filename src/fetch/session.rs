// src/fetch/session.rs
use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};
use url::Url;

use super::download::save_download;
use super::period::ReportPeriod;
use crate::config::{FormSpec, PortalConfig};
use crate::document::{ClaimedFormat, RawDocument, ReportId};

const MAX_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

static FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'')?"?([^";]+)"?"#)
        .expect("content-disposition pattern is valid")
});

static LOGIN_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("input#login").expect("CSS selector for login input should be valid"));

/// A portal session. Cookies live in the client; the last page
/// body is kept so a failed run can leave a snapshot behind.
pub struct PortalSession {
    client: Client,
    base: Url,
    config: PortalConfig,
    last_page: Option<String>,
}

impl PortalSession {
    /// Read the password from the configured environment variable.
    pub fn password_from_env(config: &PortalConfig) -> Result<String> {
        match std::env::var(&config.password_env) {
            Ok(p) if !p.is_empty() => Ok(p),
            _ => bail!(
                "portal password not set; export {} before running",
                config.password_env
            ),
        }
    }

    /// Build the cookie-carrying client. No request is made yet.
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building HTTP client")?;
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("invalid portal base url {}", config.base_url))?;
        Ok(Self {
            client,
            base,
            config: config.clone(),
            last_page: None,
        })
    }

    /// Open the login page (for the session cookie) and submit the login form.
    /// A rejected login keeps the response page for `save_snapshot`.
    pub async fn login(&mut self, password: &str) -> Result<()> {
        let login_url = self.url(&self.config.login_path)?;
        info!(url = %login_url, user = %self.config.username, "logging in");
        let page = self
            .send_with_retry(|| self.client.get(login_url.clone()))
            .await?;
        self.last_page = Some(page.text().await.context("reading login page")?);

        let form = [("login", self.config.username.as_str()), ("senha", password)];
        let resp = self
            .send_with_retry(|| self.client.post(login_url.clone()).form(&form))
            .await?;
        let landed = resp.url().clone();
        let body = resp.text().await.context("reading login response")?;
        let reached_home = landed
            .path()
            .trim_end_matches('/')
            .eq_ignore_ascii_case(self.config.home_path.trim_end_matches('/'));
        let still_on_login = Html::parse_document(&body)
            .select(&LOGIN_INPUT)
            .next()
            .is_some();
        self.last_page = Some(body);

        if !reached_home && still_on_login {
            bail!("login rejected for user {}", self.config.username);
        }
        info!(landed = %landed, "logged in");
        Ok(())
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("joining {} onto {}", path, self.base))
    }

    /// Send a request, retrying transport failures. HTTP error statuses are
    /// not retried.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().send().await {
                Ok(resp) => return resp.error_for_status().map_err(Into::into),
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(attempt, error = %e, "request failed; retrying");
                    sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Submit a report form for `period` and return what came back: the
    /// rendered page for HTML responses, or the downloaded file otherwise.
    pub async fn fetch_report(
        &mut self,
        report: ReportId,
        period: &ReportPeriod,
        download_dir: &Path,
    ) -> Result<RawDocument> {
        let form = self.config.form(report).clone();
        let url = self.url(&form.path)?;
        let fields = form_fields(&form, period);
        info!(%report, url = %url, %period, "submitting report form");

        let resp = self
            .send_with_retry(|| self.client.post(url.clone()).form(&fields))
            .await?;
        let filename = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename);
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("reading {report} response body"))?;

        match filename {
            Some(name) => {
                let path = save_download(download_dir, &name, &bytes).await?;
                info!(%report, path = %path.display(), bytes = bytes.len(), "report downloaded");
                Ok(RawDocument::new(report, ClaimedFormat::from_path(&path), bytes.to_vec()))
            }
            None => {
                let claimed = claim_from_content_type(&content_type);
                if claimed == ClaimedFormat::Markup {
                    self.last_page = Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                info!(%report, content_type = %content_type, bytes = bytes.len(), "report page received");
                Ok(RawDocument::new(report, claimed, bytes.to_vec()))
            }
        }
    }

    /// Write the last page seen, for post-mortem after a failed run.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let body = self
            .last_page
            .as_deref()
            .ok_or_else(|| anyhow!("no page captured yet"))?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("writing snapshot {}", path.display()))
    }
}

/// The form's fields with `{start}`/`{end}` filled in.
pub fn form_fields(form: &FormSpec, period: &ReportPeriod) -> Vec<(String, String)> {
    let (start, end) = period.form_dates();
    form.fields
        .iter()
        .map(|(k, v)| (k.clone(), v.replace("{start}", &start).replace("{end}", &end)))
        .collect()
}

pub fn attachment_filename(header: &str) -> Option<String> {
    FILENAME
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn claim_from_content_type(content_type: &str) -> ClaimedFormat {
    if content_type.contains("spreadsheetml") || content_type.contains("opendocument") {
        ClaimedFormat::ModernSpreadsheet
    } else if content_type.contains("ms-excel") {
        ClaimedFormat::LegacySpreadsheet
    } else {
        ClaimedFormat::Markup
    }
}
