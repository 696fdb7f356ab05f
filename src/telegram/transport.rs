use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Request/response boundary to the Bot API. Bodies are returned as-is,
/// whatever the HTTP status, because the API reports failures in the JSON.
///
/// URLs carry the bot token, so errors are stripped of them before they
/// reach the logs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<String>;

    async fn post_form(&self, url: &str, body: String) -> Result<String>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    get_timeout: Duration,
}

impl HttpTransport {
    /// `timeout` bounds POSTs; GETs are long polls and get `get_timeout`.
    pub fn new(timeout: Duration, get_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            get_timeout,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.get_timeout)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("HTTP GET failed")?;

        debug!("GET status: {}", response.status());

        response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to read GET response body")
    }

    async fn post_form(&self, url: &str, body: String) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("HTTP POST failed")?;

        debug!("POST status: {}", response.status());

        response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .context("Failed to read POST response body")
    }
}
