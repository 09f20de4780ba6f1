use std::{sync::Mutex, time::Duration};

use anyhow::{bail, Context};
use async_trait::async_trait;
use client_core::{DisplaySurface, ImageSlot};
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::debug;
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal stand-in for image views: a slot counts as loaded once its URL
/// answers with an image.
pub struct HttpProbeSurface {
    http: Client,
    original: Mutex<Option<Url>>,
    staged: Mutex<Option<Url>>,
}

impl HttpProbeSurface {
    pub fn new() -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("failed to build probe client")?;
        Ok(Self {
            http,
            original: Mutex::new(None),
            staged: Mutex::new(None),
        })
    }

    fn slot(&self, slot: ImageSlot) -> &Mutex<Option<Url>> {
        match slot {
            ImageSlot::Original => &self.original,
            ImageSlot::Staged => &self.staged,
        }
    }

    pub fn showing(&self, slot: ImageSlot) -> Option<Url> {
        self.slot(slot).lock().ok().and_then(|shown| shown.clone())
    }

    fn set(&self, slot: ImageSlot, url: Option<Url>) {
        if let Ok(mut shown) = self.slot(slot).lock() {
            *shown = url;
        }
    }
}

#[async_trait]
impl DisplaySurface for HttpProbeSurface {
    fn clear(&self, slot: ImageSlot) {
        self.set(slot, None);
    }

    async fn load(&self, slot: ImageSlot, url: &Url) -> anyhow::Result<()> {
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request for {url} failed"))?;
        let status = res.status();
        if !status.is_success() {
            bail!("HTTP {status}");
        }
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("image/") {
            bail!("not an image ({content_type})");
        }
        debug!(%slot, %url, content_type, "slot loaded");
        self.set(slot, Some(url.clone()));
        Ok(())
    }
}
