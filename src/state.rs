use std::sync::Arc;

use anyhow::Context;

use crate::auth::oauth::OAuthService;
use crate::config::AppConfig;
use crate::links::LinkClient;
use crate::reset::mailer::{HttpMailer, Mailer};
use crate::users::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub links: LinkClient,
    pub oauth: Arc<OAuthService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let users = Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>;
        let mailer = Arc::new(HttpMailer::new(&config.mail)?) as Arc<dyn Mailer>;
        let links = LinkClient::new(&config.link_api)?;
        let oauth = Arc::new(OAuthService::new(&config.oauth, &config.app_url)?);

        Ok(Self::from_parts(config, users, mailer, links, oauth))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        links: LinkClient,
        oauth: Arc<OAuthService>,
    ) -> Self {
        Self {
            config,
            users,
            mailer,
            links,
            oauth,
        }
    }
}
