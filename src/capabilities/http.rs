//! Direct HTTP capability backed by reqwest.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::session::SessionCookie;

use super::{DirectHttp, HttpBody};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// reqwest-backed [`DirectHttp`] with gzip/brotli decoding and a browser
/// user agent. Cookies are passed per-call so the client itself stays
/// free of cross-target state.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DirectHttp for ReqwestHttp {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        cookies: &[SessionCookie],
        timeout: Duration,
    ) -> Result<HttpBody> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header("Cookie", header);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        debug!("GET {url} -> {status} ({} bytes)", body.len());

        Ok(HttpBody { status, body })
    }
}
