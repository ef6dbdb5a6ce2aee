use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MailConfig;

/// Payload understood by the mail relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResetMail {
    pub email: String,
    pub reset_link: String,
    pub logo_url: String,
    pub site_name: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_reset(&self, mail: &ResetMail) -> anyhow::Result<()>;
}

/// Posts reset e-mails to the HTTP mail relay.
pub struct HttpMailer {
    http: reqwest::Client,
    relay_url: String,
}

impl HttpMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .context("build mail relay client")?;
        Ok(Self {
            http,
            relay_url: cfg.relay_url.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_reset(&self, mail: &ResetMail) -> anyhow::Result<()> {
        self.http
            .post(&self.relay_url)
            .json(mail)
            .send()
            .await
            .context("mail relay request")?
            .error_for_status()
            .context("mail relay status")?;
        Ok(())
    }
}

/// Sends on a detached task. The outcome is only logged; callers never wait.
pub fn dispatch_reset_mail(mailer: Arc<dyn Mailer>, mail: ResetMail) {
    tokio::spawn(async move {
        match mailer.send_reset(&mail).await {
            Ok(()) => debug!("reset mail handed to relay"),
            Err(e) => warn!(error = %e, "reset mail dispatch failed"),
        }
    });
}
