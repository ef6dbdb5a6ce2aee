use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub cookie_name: String,
    pub secure_cookie: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub relay_url: String,
    pub timeout_secs: u64,
    pub logo_url: String,
    pub site_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthConfig {
    pub github: Option<OAuthClientConfig>,
    pub google: Option<OAuthClientConfig>,
    pub facebook: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Public base URL used to build links sent by e-mail and OAuth redirects.
    pub app_url: String,
    pub session: SessionConfig,
    pub mail: MailConfig,
    pub link_api: LinkApiConfig,
    pub oauth: OAuthConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let production = is_production(std::env::var("APP_ENV").ok().as_deref());

        let session = SessionConfig {
            secret: std::env::var("AUTH_SECRET").context("AUTH_SECRET is not set")?,
            issuer: std::env::var("SESSION_ISSUER").unwrap_or_else(|_| "jukre".into()),
            audience: std::env::var("SESSION_AUDIENCE").unwrap_or_else(|_| "jukre-web".into()),
            ttl_minutes: env_parse("SESSION_TTL_MINUTES", 60 * 24 * 30),
            cookie_name: "juk.session-token".into(),
            secure_cookie: production,
        };

        let mail = MailConfig {
            relay_url: std::env::var("MAIL_RELAY_URL")
                .unwrap_or_else(|_| "https://smtp.josuejuca.com/auth/auth_password".into()),
            timeout_secs: env_parse("MAIL_TIMEOUT_SECS", 5),
            logo_url: std::env::var("MAIL_LOGO_URL")
                .unwrap_or_else(|_| "https://juca.eu.org/img/logos/jukre_color.png".into()),
            site_name: std::env::var("MAIL_SITE_NAME").unwrap_or_else(|_| "jukre".into()),
        };

        let link_api = LinkApiConfig {
            base_url: std::env::var("LINK_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.juk.re".into()),
            timeout_secs: env_parse("LINK_API_TIMEOUT_SECS", 10),
        };

        let oauth = OAuthConfig {
            github: oauth_client("AUTH_GITHUB_ID", "AUTH_GITHUB_SECRET"),
            google: oauth_client("AUTH_GOOGLE_ID", "AUTH_GOOGLE_SECRET"),
            facebook: oauth_client("AUTH_FACEBOOK_ID", "AUTH_FACEBOOK_SECRET"),
        };

        Ok(Self {
            database_url,
            app_url: std::env::var("APP_URL")
                .unwrap_or_else(|_| "https://react-imogo.juk.re".into()),
            session,
            mail,
            link_api,
            oauth,
        })
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LinkApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `APP_ENV=production` (any case) turns on `Secure` cookies.
fn is_production(app_env: Option<&str>) -> bool {
    app_env.is_some_and(|v| v.trim().eq_ignore_ascii_case("production"))
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn oauth_client(id_key: &str, secret_key: &str) -> Option<OAuthClientConfig> {
    let client_id = std::env::var(id_key).ok().filter(|v| !v.is_empty())?;
    let client_secret = std::env::var(secret_key).ok().filter(|v| !v.is_empty())?;
    Some(OAuthClientConfig {
        client_id,
        client_secret,
    })
}
