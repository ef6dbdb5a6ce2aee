use std::collections::HashSet;

use anyhow::Context;
use axum::http::{header, StatusCode};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::LinkError;
use crate::config::LinkApiConfig;

lazy_static! {
    static ref LINK_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9-]+$").unwrap();
    static ref RESERVED_LINK_IDS: HashSet<&'static str> = [
        // api / infra
        "docs",
        "doc",
        "openapi.json",
        "swagger",
        "redoc",
        // well-known web files
        "robots.txt",
        "favicon.ico",
        "sitemap.xml",
        // internal routes
        "api",
        "_next",
        "blog",
    ]
    .into_iter()
    .collect();
}

/// Per-platform destinations of a short link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destinos {
    pub encurtado: String,
    pub padrao: String,
    pub android: Option<String>,
    pub ios: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub destinos: Destinos,
}

/// Upstream body as received plus its validated view.
#[derive(Debug, Clone)]
pub struct ResolvedLink {
    pub body: Value,
    pub record: LinkRecord,
}

pub fn validate_link_id(link_id: &str) -> Result<(), LinkError> {
    if !LINK_ID_RE.is_match(link_id) {
        return Err(LinkError::InvalidId);
    }
    if RESERVED_LINK_IDS.contains(link_id.to_ascii_lowercase().as_str()) {
        return Err(LinkError::ReservedId);
    }
    Ok(())
}

#[derive(Clone)]
pub struct LinkClient {
    http: reqwest::Client,
    base_url: String,
}

impl LinkClient {
    pub fn new(cfg: &LinkApiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .context("build link api client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn resolve(&self, link_id: &str) -> Result<ResolvedLink, LinkError> {
        validate_link_id(link_id)?;

        let url = format!("{}/{}", self.base_url, link_id);
        let res = self
            .http
            .get(&url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = res.status();
        debug!(%link_id, %status, "link api responded");

        if status == StatusCode::NOT_FOUND {
            debug!(%link_id, "link not found upstream");
            return Err(LinkError::NotFound);
        }
        if !status.is_success() {
            warn!(%link_id, %status, "link api returned an error status");
            return Err(LinkError::Upstream { status });
        }

        let body: Value = res.json().await.map_err(|e| {
            warn!(%link_id, error = %e, "link api body is not json");
            LinkError::InvalidResponse
        })?;
        let record = serde_json::from_value::<LinkRecord>(body.clone()).map_err(|e| {
            warn!(%link_id, error = %e, "link api body has an unexpected shape");
            LinkError::InvalidResponse
        })?;
        Ok(ResolvedLink { body, record })
    }
}
