//! Bypass-strategy resolution for anti-bot protected pages.
//!
//! Strategy order: the FlareSolverr-compatible proxy first (bounded retries
//! with capped exponential backoff), then a local headless render. Session
//! cookies and the user-agent captured by the winning strategy travel with
//! the outcome so image downloads can reuse them; nothing is stored as
//! ambient state.

use crate::config::{BrowserConfig, BypassConfig};
use crate::error::{CrawlError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SolverProxy,
    HeadlessRender,
}

/// Rendered page plus the session the winning strategy established.
#[derive(Debug, Clone)]
pub struct BypassOutcome {
    pub html: String,
    pub cookies: Vec<(String, String)>,
    pub user_agent: Option<String>,
    pub strategy: Strategy,
}

impl BypassOutcome {
    /// `name=value; name2=value2` form for a Cookie request header.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[derive(Serialize)]
struct SolverRequest<'a> {
    cmd: &'a str,
    url: &'a str,
    #[serde(rename = "maxTimeout")]
    max_timeout: u64,
}

#[derive(Deserialize)]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<SolverSolution>,
}

#[derive(Deserialize)]
struct SolverSolution {
    response: String,
    #[serde(default)]
    cookies: Vec<SolverCookie>,
    #[serde(rename = "userAgent")]
    user_agent: Option<String>,
}

#[derive(Deserialize)]
struct SolverCookie {
    name: String,
    value: String,
}

pub struct BypassResolver {
    client: reqwest::Client,
    bypass: BypassConfig,
    browser: BrowserConfig,
}

impl BypassResolver {
    pub fn new(bypass: BypassConfig, browser: BrowserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(
                bypass.http_timeout_secs + bypass.solve_timeout_ms / 1000,
            ))
            .build()?;
        Ok(Self {
            client,
            bypass,
            browser,
        })
    }

    /// Resolve a protected page. Errors with [`CrawlError::BypassExhausted`]
    /// only when every strategy has failed.
    pub async fn solve(&self, url: &str) -> Result<BypassOutcome> {
        match self.solve_with_proxy(url).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => {
                log::warn!("solver proxy failed for {}: {}, falling back to browser", url, e);
            }
        }

        match self.solve_with_browser(url).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                log::error!("headless render failed for {}: {}", url, e);
                Err(CrawlError::BypassExhausted {
                    url: url.to_string(),
                })
            }
        }
    }

    async fn solve_with_proxy(&self, url: &str) -> Result<BypassOutcome> {
        let mut last_err: Option<CrawlError> = None;

        for attempt in 1..=self.bypass.max_retries {
            if attempt > 1 {
                let delay = self.retry_delay(attempt);
                log::info!(
                    "solver retry {}/{} for {} after {}ms",
                    attempt,
                    self.bypass.max_retries,
                    url,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.proxy_request(url).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    log::warn!("solver attempt {} failed for {}: {}", attempt, url, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(CrawlError::BypassExhausted {
            url: url.to_string(),
        }))
    }

    async fn proxy_request(&self, url: &str) -> Result<BypassOutcome> {
        let body = SolverRequest {
            cmd: "request.get",
            url,
            max_timeout: self.bypass.solve_timeout_ms,
        };
        let resp: SolverResponse = self
            .client
            .post(&self.bypass.solver_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if resp.status != "ok" {
            return Err(CrawlError::Browser(format!(
                "solver returned status {}: {}",
                resp.status, resp.message
            )));
        }
        let solution = resp
            .solution
            .ok_or_else(|| CrawlError::Browser("solver returned ok without a solution".into()))?;

        Ok(BypassOutcome {
            html: solution.response,
            cookies: solution
                .cookies
                .into_iter()
                .map(|c| (c.name, c.value))
                .collect(),
            user_agent: solution.user_agent,
            strategy: Strategy::SolverProxy,
        })
    }

    async fn solve_with_browser(&self, url: &str) -> Result<BypassOutcome> {
        let url = url.to_string();
        let config = self.browser.clone();
        let html = tokio::task::spawn_blocking(move || crate::browser::render_page(&url, &config))
            .await
            .map_err(|e| CrawlError::Browser(format!("render task failed: {}", e)))??;

        Ok(BypassOutcome {
            html,
            cookies: Vec::new(),
            user_agent: None,
            strategy: Strategy::HeadlessRender,
        })
    }

    /// Exponential backoff from the configured base, capped. Attempt 2 waits
    /// one base delay, attempt 3 two, and so on.
    fn retry_delay(&self, attempt: usize) -> Duration {
        let exp = (attempt as u32).saturating_sub(2);
        let ms = self
            .bypass
            .initial_retry_delay_ms
            .saturating_mul(1u64 << exp.min(8))
            .min(self.bypass.max_retry_delay_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> BypassResolver {
        BypassResolver::new(BypassConfig::default(), BrowserConfig::default()).unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let r = resolver();
        assert_eq!(r.retry_delay(2), Duration::from_millis(2000));
        assert_eq!(r.retry_delay(3), Duration::from_millis(4000));
        assert_eq!(r.retry_delay(4), Duration::from_millis(8000));
        assert_eq!(r.retry_delay(5), Duration::from_millis(10_000));
        assert_eq!(r.retry_delay(9), Duration::from_millis(10_000));
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let outcome = BypassOutcome {
            html: String::new(),
            cookies: vec![
                ("cf_clearance".to_string(), "abc".to_string()),
                ("sid".to_string(), "42".to_string()),
            ],
            user_agent: None,
            strategy: Strategy::SolverProxy,
        };
        assert_eq!(
            outcome.cookie_header().as_deref(),
            Some("cf_clearance=abc; sid=42")
        );
        let empty = BypassOutcome {
            cookies: Vec::new(),
            ..outcome
        };
        assert!(empty.cookie_header().is_none());
    }

    #[test]
    fn solver_response_wire_format() {
        let json = r#"{
            "status": "ok",
            "message": "",
            "solution": {
                "response": "<html></html>",
                "cookies": [{"name": "cf_clearance", "value": "tok", "domain": ".x"}],
                "userAgent": "Mozilla/5.0"
            }
        }"#;
        let resp: SolverResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, "ok");
        let sol = resp.solution.unwrap();
        assert_eq!(sol.cookies[0].name, "cf_clearance");
        assert_eq!(sol.user_agent.as_deref(), Some("Mozilla/5.0"));
    }
}
