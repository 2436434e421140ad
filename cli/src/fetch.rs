//! A minimal downloader standing in for the crawl engine.
//!
//! Drives one page through the pipeline: dispatch, let the pipeline
//! reconstitute or resubmit, repeat until a page comes out.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use rendergate_render::{RenderPipeline, ResponseOutcome};
use rendergate_types::{CrawlRequest, CrawlResponse, Headers, SlotKey};

/// A page takes at most a plain fetch plus a rendering call; anything more
/// means a rule keeps firing.
const MAX_HOPS: usize = 3;

pub(crate) struct Downloader {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl Downloader {
    pub fn new(default_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rendergate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            default_timeout,
        })
    }

    pub async fn download(&self, request: &CrawlRequest) -> Result<CrawlResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .with_context(|| format!("unsupported HTTP method {}", request.method))?;
        let timeout = request.meta.download_timeout.unwrap_or(self.default_timeout);

        let mut builder = self
            .client
            .request(method, request.url.as_str())
            .timeout(timeout);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        tracing::info!(
            url = %request.url,
            method = %request.method,
            slot = request.meta.slot_key.as_ref().map(SlotKey::as_str),
            timeout_secs = timeout.as_secs_f64(),
            "Downloading"
        );
        let reply = builder
            .send()
            .await
            .with_context(|| format!("request to {} failed", request.url))?;

        let status = reply.status().as_u16();
        let url = reply.url().clone();
        let mut headers = Headers::new();
        for (name, value) in reply.headers() {
            if let Ok(value) = value.to_str() {
                headers.append(name.as_str(), value);
            }
        }
        let body = reply
            .bytes()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;

        let mut response = CrawlResponse::new(url, status, body.to_vec());
        response.headers = headers;
        response.meta = request.meta.clone();
        Ok(response)
    }
}

/// Fetch `seed`, going through the rendering service whenever the pipeline
/// asks for it.
pub(crate) async fn fetch(
    pipeline: &RenderPipeline,
    downloader: &Downloader,
    seed: CrawlRequest,
) -> Result<CrawlResponse> {
    let mut next = seed;
    for hop in 1..=MAX_HOPS {
        let mut request = pipeline.process_request(next);
        let response = downloader.download(&request).await?;

        match pipeline.process_response(&mut request, response) {
            ResponseOutcome::Response(page) => return Ok(page),
            ResponseOutcome::Resubmit(resubmit) => {
                tracing::info!(hop, url = %resubmit.url, "Resubmitting for rendering");
                next = resubmit;
            }
        }
    }
    bail!("no page after {MAX_HOPS} hops")
}
