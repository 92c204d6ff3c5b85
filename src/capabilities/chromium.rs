//! Browser capability backed by chromiumoxide (CDP).
//!
//! One driver per task: launches (or reuses a configured executable of)
//! Chromium, installs an anti-automation init script, and listens for
//! responses whose URL matches the review-endpoint pattern, buffering
//! their bodies for [`drain_captured`](super::BrowserDriver::drain_captured).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use regex::Regex;
use tracing::{debug, info, warn};

use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventResponseReceived, GetResponseBodyParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};

use crate::session::{SessionCookie, SessionState};
use crate::strategy::ReadinessCriterion;

use super::BrowserDriver;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Init script applied before any page script runs.
const INIT_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
"#;

/// Launch configuration for the chromium driver.
#[derive(Debug, Clone)]
pub struct ChromiumDriverConfig {
    pub headless: bool,
    /// Explicit executable; discovered from common paths when absent.
    pub executable: Option<std::path::PathBuf>,
    /// Regex matched against response URLs to capture review payloads.
    pub response_url_pattern: String,
    pub extra_args: Vec<String>,
}

impl Default for ChromiumDriverConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            response_url_pattern: crate::config::ExtractorConfig::default().response_url_pattern,
            extra_args: Vec::new(),
        }
    }
}

pub struct ChromiumDriver {
    // Browser kept alive for the driver's lifetime.
    _browser: Browser,
    page: Page,
    captured: Arc<Mutex<Vec<String>>>,
}

impl ChromiumDriver {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found; install it or set an explicit executable"
        ))
    }

    /// Launch a browser and open the working page.
    pub async fn launch(config: ChromiumDriverConfig) -> Result<Self> {
        let chrome_path = match config.executable {
            Some(path) => path,
            None => Self::find_chrome()?,
        };

        info!("Launching browser (headless={})", config.headless);
        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        if !config.headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--window-size=1920,1080");
        for arg in &config.extra_args {
            builder = builder.arg(arg);
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;
        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        page.execute(SetUserAgentOverrideParams::new(USER_AGENT.to_string()))
            .await?;

        let init = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(INIT_SCRIPT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build init script: {}", e))?;
        page.execute(init).await?;

        // Network events are needed for response interception.
        page.execute(EnableParams::default()).await?;

        let pattern = Regex::new(&config.response_url_pattern)
            .context("invalid response URL pattern")?;
        let captured = Arc::new(Mutex::new(Vec::new()));
        Self::spawn_interceptor(&page, pattern, Arc::clone(&captured)).await?;

        Ok(Self {
            _browser: browser,
            page,
            captured,
        })
    }

    /// Buffer bodies of responses whose URL matches the pattern.
    async fn spawn_interceptor(
        page: &Page,
        pattern: Regex,
        captured: Arc<Mutex<Vec<String>>>,
    ) -> Result<()> {
        let mut events = page.event_listener::<EventResponseReceived>().await?;
        let page = page.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let url = event.response.url.clone();
                if !pattern.is_match(&url) {
                    continue;
                }
                debug!("intercepted review response: {url}");
                // The body is only retrievable once loading settles.
                tokio::time::sleep(Duration::from_millis(200)).await;
                match page
                    .execute(GetResponseBodyParams::new(event.request_id.clone()))
                    .await
                {
                    Ok(body) => {
                        let text = if body.result.base64_encoded {
                            match base64::engine::general_purpose::STANDARD
                                .decode(&body.result.body)
                            {
                                Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                                Err(e) => {
                                    warn!("failed to decode intercepted body from {url}: {e}");
                                    continue;
                                }
                            }
                        } else {
                            body.result.body.clone()
                        };
                        if let Ok(mut buffer) = captured.lock() {
                            buffer.push(text);
                        }
                    }
                    Err(e) => debug!("could not fetch body for {url}: {e}"),
                }
            }
        });
        Ok(())
    }

    async fn wait_ready(&self, readiness: ReadinessCriterion, timeout: Duration) -> Result<()> {
        let target = match readiness {
            ReadinessCriterion::DomContentLoaded => "interactive",
            ReadinessCriterion::Loaded | ReadinessCriterion::NetworkIdle => "complete",
        };
        let script = format!(
            r#"
            new Promise((resolve) => {{
                const done = () => resolve(document.readyState);
                if (document.readyState === 'complete' || document.readyState === '{target}') {{
                    done();
                }} else {{
                    document.addEventListener('readystatechange', () => {{
                        if (document.readyState === 'complete' || document.readyState === '{target}') done();
                    }});
                    setTimeout(() => resolve('timeout'), {timeout_ms});
                }}
            }})
            "#,
            target = target,
            timeout_ms = timeout.as_millis()
        );

        match tokio::time::timeout(timeout, self.page.evaluate(script)).await {
            Ok(Ok(result)) => {
                let state: String = result.into_value().unwrap_or_else(|_| "unknown".to_string());
                debug!("page ready state: {state}");
            }
            Ok(Err(e)) => debug!("could not check ready state: {e}"),
            Err(_) => warn!("timeout waiting for page ready state"),
        }

        if readiness == ReadinessCriterion::NetworkIdle {
            // Approximate a quiet network window for late XHRs.
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(
        &self,
        url: &str,
        readiness: ReadinessCriterion,
        timeout: Duration,
    ) -> Result<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;
        tokio::time::timeout(timeout, self.page.execute(params))
            .await
            .map_err(|_| anyhow::anyhow!("navigation to {url} timed out"))?
            .with_context(|| format!("navigating to {url}"))?;
        self.wait_ready(readiness, timeout).await
    }

    async fn query_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        match tokio::time::timeout(timeout, self.page.find_element(selector)).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(_)) => Ok(false),
            Err(_) => Ok(false),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .find_element(selector)
            .await
            .with_context(|| format!("resolving {selector}"))?
            .scroll_into_view()
            .await
            .with_context(|| format!("scrolling {selector} into view"))?
            .click()
            .await
            .with_context(|| format!("clicking {selector}"))?;
        Ok(())
    }

    async fn scroll_by(&self, pixels: i64) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollBy(0, {pixels})"))
            .await
            .context("scrolling page")?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .context("evaluating script")?;
        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    async fn drain_captured(&self) -> Vec<String> {
        match self.captured.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        }
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        let cookies = self.page.get_cookies().await.context("reading cookies")?;
        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
            })
            .collect())
    }

    async fn apply_session(&self, state: &SessionState) -> Result<()> {
        for cookie in &state.cookies {
            if cookie.name.is_empty() || cookie.domain.is_empty() {
                continue;
            }
            let param = CookieParam::builder()
                .name(&cookie.name)
                .value(&cookie.value)
                .domain(&cookie.domain)
                .build();
            match param {
                Ok(param) => {
                    if let Err(e) = self.page.set_cookie(param).await {
                        warn!("Failed to set cookie {}: {}", cookie.name, e);
                    }
                }
                Err(e) => warn!("Failed to build cookie {}: {}", cookie.name, e),
            }
        }
        Ok(())
    }
}
