// 🕸️ Ranking Sources
// Where scraped ranking rows come from. The reconciliation pipeline only sees
// the RankingSource trait; logging in to the portal is done outside this crate
// (the HTTP source reuses an existing session cookie).

pub mod html;
pub mod trends;

use crate::error::ScrapeError;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub use trends::parse_trends_table;

// ============================================================================
// SCRAPED DATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// One store row from the portal, exactly as scraped (name is free text)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedRanking {
    pub store_name: String,
    pub rankings: Vec<ScrapedPoint>,
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

pub trait RankingSource {
    /// Short label for logs
    fn describe(&self) -> String;

    fn fetch_external_rankings(&self) -> Result<Vec<ScrapedRanking>, ScrapeError>;
}

// ============================================================================
// SAVED PAGE
// ============================================================================

/// Trends page saved to disk (manual export or a capture from another tool)
pub struct HtmlFileSource {
    pub path: PathBuf,
    /// Date used to resolve `MM-DD` headers; defaults to the local date
    pub today: Option<NaiveDate>,
}

impl HtmlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        HtmlFileSource {
            path: path.into(),
            today: None,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }
}

impl RankingSource for HtmlFileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn fetch_external_rankings(&self) -> Result<Vec<ScrapedRanking>, ScrapeError> {
        let page = fs::read_to_string(&self.path)
            .map_err(|e| ScrapeError::Unreachable(format!("{}: {}", self.path.display(), e)))?;

        let today = self.today.unwrap_or_else(|| Local::now().date_naive());
        let rows = parse_trends_table(&page, today)?;
        info!(source = %self.describe(), stores = rows.len(), "scraped trends page");

        Ok(rows)
    }
}

// ============================================================================
// LIVE PAGE (HTTP)
// ============================================================================

#[cfg(feature = "http")]
pub use http::HttpTrendsSource;

#[cfg(feature = "http")]
mod http {
    use super::{parse_trends_table, RankingSource, ScrapedRanking};
    use crate::config::PortalConfig;
    use crate::error::ScrapeError;
    use chrono::Local;
    use reqwest::blocking::Client;
    use reqwest::header::{COOKIE, USER_AGENT};
    use std::time::Duration;
    use tracing::{info, warn};

    const BROWSER_USER_AGENT: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    /// Fetches the trends page with an already-authenticated session cookie
    pub struct HttpTrendsSource {
        config: PortalConfig,
        client: Client,
    }

    impl HttpTrendsSource {
        pub fn new(config: PortalConfig) -> Result<Self, ScrapeError> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .map_err(|e| ScrapeError::Unreachable(format!("http client: {}", e)))?;

            Ok(HttpTrendsSource { config, client })
        }
    }

    impl RankingSource for HttpTrendsSource {
        fn describe(&self) -> String {
            self.config.trends_url.clone()
        }

        fn fetch_external_rankings(&self) -> Result<Vec<ScrapedRanking>, ScrapeError> {
            let mut request = self
                .client
                .get(&self.config.trends_url)
                .header(USER_AGENT, BROWSER_USER_AGENT);

            match &self.config.session_cookie {
                Some(cookie) => request = request.header(COOKIE, cookie.as_str()),
                None => warn!("no portal session cookie configured; the trends page will likely redirect to login"),
            }

            let response = request
                .send()
                .map_err(|e| ScrapeError::Unreachable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ScrapeError::Unreachable(format!(
                    "HTTP {} from {}",
                    status, self.config.trends_url
                )));
            }

            let final_url = response.url().to_string();
            if final_url.contains("/login") {
                return Err(ScrapeError::UnrecognizedStructure(format!(
                    "redirected to login page ({}); session cookie expired?",
                    final_url
                )));
            }

            let page = response
                .text()
                .map_err(|e| ScrapeError::Unreachable(format!("reading body: {}", e)))?;

            let rows = parse_trends_table(&page, Local::now().date_naive())?;
            info!(url = %final_url, stores = rows.len(), "scraped trends page");

            Ok(rows)
        }
    }
}
