//! Client for the daemon's control API.
//!
//! The API answers failed queries with a JSON body and a non-2xx status, so
//! bodies are decoded whatever the status; only a non-JSON body is an error.

use anyhow::{Context, Result};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub struct Daemon {
    base: String,
    client: reqwest::Client,
}

impl Daemon {
    pub fn new(port: u16) -> Self {
        Self {
            base: format!("http://127.0.0.1:{}/api", port),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        let url = self.url(path);
        self.send(self.client.get(&url), &url).await
    }

    pub async fn post<R: DeserializeOwned>(&self, path: &str, body: Option<&impl Serialize>) -> Result<R> {
        let url = self.url(path);
        let mut req = self.client.post(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        self.send(req, &url).await
    }

    async fn send<R: DeserializeOwned>(&self, req: RequestBuilder, url: &str) -> Result<R> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("tetherd is not reachable at {url} (is it running? see --port)"))?;
        let status = resp.status();
        let body = resp.text().await.context("failed to read response body")?;
        serde_json::from_str(&body)
            .with_context(|| format!("tetherd answered {status} with an unexpected body: {body}"))
    }
}
