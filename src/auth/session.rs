use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::SessionConfig,
    state::AppState,
    users::{User, UserStore},
};

pub const DEFAULT_ROLE: &str = "user";

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// Minimal identity returned by the credential check. Role and API key are
/// filled in later, when the session token is minted.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub username: Option<String>,
    pub plan: Option<String>,
    pub plan_status: Option<String>,
}

impl From<&User> for Identity {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            image: u.image.clone(),
            username: u.username.clone(),
            plan: u.plan.clone(),
            plan_status: u.plan_status.clone(),
        }
    }
}

/// Session token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub plan_status: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// The signed-in user as seen by handlers, rebuilt from the token alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub username: Option<String>,
    pub plan: Option<String>,
    pub plan_status: Option<String>,
    pub role: String,
    pub api_key: Option<String>,
}

impl From<SessionClaims> for SessionUser {
    fn from(c: SessionClaims) -> Self {
        Self {
            id: c.sub,
            name: c.name,
            email: c.email,
            image: c.image,
            username: c.username,
            plan: c.plan,
            plan_status: c.plan_status,
            role: if c.role.is_empty() { default_role() } else { c.role },
            api_key: c.api_key,
        }
    }
}

/// Holds session signing keys and cookie settings.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
    pub cookie_name: String,
    pub secure_cookie: bool,
}

impl SessionKeys {
    pub fn new(cfg: &SessionConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            cookie_name: cfg.cookie_name.clone(),
            secure_cookie: cfg.secure_cookie,
        }
    }

    /// Signs a session for `user`. Fields the store did not provide fall
    /// back to the identity from the credential check.
    pub fn sign(&self, identity: &Identity, user: Option<&User>) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = SessionClaims {
            sub: identity.id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            image: identity.image.clone(),
            username: user.and_then(|u| u.username.clone()),
            plan: user.and_then(|u| u.plan.clone()),
            plan_status: user.and_then(|u| u.plan_status.clone()),
            role: user.map(|u| u.role.clone()).unwrap_or_else(default_role),
            api_key: user.and_then(|u| u.api_key.clone()),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = self.encode_claims(&claims)?;
        debug!(user_id = %identity.id, "session signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let claims: SessionClaims = self.decode_claims(token, &self.audience)?;
        debug!(user_id = %claims.sub, "session verified");
        Ok(claims)
    }

    pub fn encode_claims<T: Serialize>(&self, claims: &T) -> anyhow::Result<String> {
        Ok(encode(&Header::default(), claims, &self.encoding)?)
    }

    pub fn decode_claims<T: DeserializeOwned>(
        &self,
        token: &str,
        audience: &str,
    ) -> anyhow::Result<T> {
        let mut validation = Validation::default();
        validation.set_audience(&[audience]);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        Ok(decode::<T>(token, &self.decoding, &validation)?.claims)
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), token))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .secure(self.secure_cookie)
            .max_age(TimeDuration::seconds(self.ttl.as_secs() as i64))
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .build()
    }
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        SessionKeys::new(&state.config.session)
    }
}

/// Mints a session for a freshly authenticated identity. The user row is
/// read once here so that username, plan, role and API key travel inside
/// the token; later requests never go back to the store.
pub async fn issue_session(
    users: &dyn UserStore,
    keys: &SessionKeys,
    identity: &Identity,
) -> anyhow::Result<(String, SessionUser)> {
    let user = users.find_by_id(identity.id).await?;
    if user.is_none() {
        warn!(user_id = %identity.id, "signed-in user vanished before claims were populated");
    }
    let token = keys.sign(identity, user.as_ref())?;
    let claims = keys.verify(&token)?;
    Ok((token, SessionUser::from(claims)))
}

#[derive(Debug)]
pub struct SessionRejection;

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "ok": false, "message": "Não autenticado." })),
        )
            .into_response()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    SessionKeys: FromRef<S>,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = SessionKeys::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let token = match jar.get(&keys.cookie_name) {
            Some(c) => c.value().to_string(),
            None => parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
                .ok_or(SessionRejection)?,
        };

        match keys.verify(&token) {
            Ok(claims) => Ok(SessionUser::from(claims)),
            Err(_) => {
                warn!("invalid or expired session token");
                Err(SessionRejection)
            }
        }
    }
}
