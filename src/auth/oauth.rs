//! Social sign-in through GitHub, Google and Facebook.
//!
//! Authorization code flow with PKCE. The CSRF state and PKCE verifier
//! travel in a short-lived signed cookie scoped to the OAuth routes, so the
//! callback needs no server-side storage. Once the provider profile is
//! known the account is provisioned (or linked by e-mail) and the regular
//! session cookie is issued.

use std::{str::FromStr, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use super::{
    error::OAuthError,
    services::{provision_social_account, SocialProfile},
    session::{issue_session, SessionKeys},
};
use crate::{
    config::{OAuthClientConfig, OAuthConfig},
    state::AppState,
};

pub const OAUTH_STATE_COOKIE: &str = "juk.oauth-state";
const STATE_COOKIE_PATH: &str = "/api/auth/oauth";
const STATE_TTL_MINUTES: i64 = 10;
const AFTER_SIGN_IN: &str = "/dashboard";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "jukre";

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API: &str = "https://api.github.com";
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const FACEBOOK_AUTH_URL: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const FACEBOOK_TOKEN_URL: &str = "https://graph.facebook.com/v19.0/oauth/access_token";
const FACEBOOK_GRAPH: &str = "https://graph.facebook.com";
const FACEBOOK_PROFILE_FIELDS: &str = "id,name,email,picture";

type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    GitHub,
    Google,
    Facebook,
}

impl OAuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Google => "google",
            Self::Facebook => "facebook",
        }
    }

    fn scopes(self) -> &'static [&'static str] {
        match self {
            Self::GitHub => &["read:user", "user:email"],
            Self::Google => &["openid", "email", "profile"],
            Self::Facebook => &["email", "public_profile"],
        }
    }

    fn endpoints(self) -> (&'static str, &'static str) {
        match self {
            Self::GitHub => (GITHUB_AUTH_URL, GITHUB_TOKEN_URL),
            Self::Google => (GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL),
            Self::Facebook => (FACEBOOK_AUTH_URL, FACEBOOK_TOKEN_URL),
        }
    }
}

impl FromStr for OAuthProvider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "google" => Ok(Self::Google),
            "facebook" => Ok(Self::Facebook),
            _ => Err(OAuthError::UnknownProvider),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GoogleUser {
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookUser {
    email: Option<String>,
    name: Option<String>,
    picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

/// Where to send the browser, plus what the callback must see again.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub verifier: String,
}

pub struct OAuthService {
    github: Option<ConfiguredClient>,
    google: Option<ConfiguredClient>,
    facebook: Option<ConfiguredClient>,
    http: reqwest::Client,
    github_api: String,
    google_userinfo: String,
    facebook_graph: String,
}

impl OAuthService {
    pub fn new(config: &OAuthConfig, app_url: &str) -> anyhow::Result<Self> {
        let build = |provider: OAuthProvider, creds: &Option<OAuthClientConfig>| {
            creds
                .as_ref()
                .map(|c| create_client(provider, c, app_url))
                .transpose()
        };

        // token endpoints must not be followed through redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("build oauth http client")?;

        let service = Self {
            github: build(OAuthProvider::GitHub, &config.github)?,
            google: build(OAuthProvider::Google, &config.google)?,
            facebook: build(OAuthProvider::Facebook, &config.facebook)?,
            http,
            github_api: GITHUB_API.to_string(),
            google_userinfo: GOOGLE_USERINFO_URL.to_string(),
            facebook_graph: FACEBOOK_GRAPH.to_string(),
        };
        info!(
            github = service.github.is_some(),
            google = service.google.is_some(),
            facebook = service.facebook.is_some(),
            "oauth providers configured"
        );
        Ok(service)
    }

    pub fn is_enabled(&self, provider: OAuthProvider) -> bool {
        self.client(provider).is_ok()
    }

    fn client(&self, provider: OAuthProvider) -> Result<&ConfiguredClient, OAuthError> {
        match provider {
            OAuthProvider::GitHub => self.github.as_ref(),
            OAuthProvider::Google => self.google.as_ref(),
            OAuthProvider::Facebook => self.facebook.as_ref(),
        }
        .ok_or(OAuthError::UnknownProvider)
    }

    pub fn authorize(&self, provider: OAuthProvider) -> Result<AuthorizationRequest, OAuthError> {
        let client = self.client(provider)?;
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(provider.scopes().iter().map(|s| Scope::new(s.to_string())))
            .set_pkce_challenge(challenge)
            .url();

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state: state.secret().clone(),
            verifier: verifier.secret().clone(),
        })
    }

    /// Trades the authorization code for a token and reads the profile.
    pub async fn exchange(
        &self,
        provider: OAuthProvider,
        code: String,
        verifier: String,
    ) -> Result<SocialProfile, OAuthError> {
        let token = self
            .client(provider)?
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| OAuthError::Provider(format!("token exchange failed: {e}")))?;

        self.fetch_profile(provider, token.access_token().secret())
            .await
    }

    async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        access_token: &str,
    ) -> Result<SocialProfile, OAuthError> {
        match provider {
            OAuthProvider::GitHub => self.github_profile(access_token).await,
            OAuthProvider::Google => self.google_profile(access_token).await,
            OAuthProvider::Facebook => self.facebook_profile(access_token).await,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, OAuthError> {
        let provider_err = |e: reqwest::Error| OAuthError::Provider(e.to_string());
        self.http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(provider_err)?
            .json::<T>()
            .await
            .map_err(provider_err)
    }

    async fn github_profile(&self, access_token: &str) -> Result<SocialProfile, OAuthError> {
        let user: GitHubUser = self
            .get_json(&format!("{}/user", self.github_api), access_token)
            .await?;

        let email = match user.email.filter(|e| !e.is_empty()) {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> = self
                    .get_json(&format!("{}/user/emails", self.github_api), access_token)
                    .await?;
                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
                    .ok_or_else(|| OAuthError::Provider("no verified primary email".into()))?
            }
        };

        Ok(SocialProfile {
            provider: OAuthProvider::GitHub.as_str(),
            email,
            name: user.name.or(Some(user.login)),
            image: user.avatar_url,
        })
    }

    async fn google_profile(&self, access_token: &str) -> Result<SocialProfile, OAuthError> {
        let user: GoogleUser = self.get_json(&self.google_userinfo, access_token).await?;
        let email = user
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| OAuthError::Provider("profile without email".into()))?;

        Ok(SocialProfile {
            provider: OAuthProvider::Google.as_str(),
            email,
            name: user.name,
            image: user.picture,
        })
    }

    async fn facebook_profile(&self, access_token: &str) -> Result<SocialProfile, OAuthError> {
        let url = format!("{}/me?fields={FACEBOOK_PROFILE_FIELDS}", self.facebook_graph);
        let user: FacebookUser = self.get_json(&url, access_token).await?;
        let email = user
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| OAuthError::Provider("profile without email".into()))?;

        Ok(SocialProfile {
            provider: OAuthProvider::Facebook.as_str(),
            email,
            name: user.name,
            image: user.picture.and_then(|p| p.data.url),
        })
    }
}

fn create_client(
    provider: OAuthProvider,
    creds: &OAuthClientConfig,
    app_url: &str,
) -> anyhow::Result<ConfiguredClient> {
    let (auth_url, token_url) = provider.endpoints();
    let redirect = format!(
        "{}/api/auth/oauth/{}/callback",
        app_url.trim_end_matches('/'),
        provider.as_str()
    );

    // the Graph token endpoint reads client credentials from the form body
    let auth_type = match provider {
        OAuthProvider::Facebook => AuthType::RequestBody,
        _ => AuthType::BasicAuth,
    };

    Ok(BasicClient::new(ClientId::new(creds.client_id.clone()))
        .set_client_secret(ClientSecret::new(creds.client_secret.clone()))
        .set_auth_type(auth_type)
        .set_auth_uri(AuthUrl::new(auth_url.to_string()).context("auth url")?)
        .set_token_uri(TokenUrl::new(token_url.to_string()).context("token url")?)
        .set_redirect_uri(RedirectUrl::new(redirect).context("redirect url")?))
}

/// Payload of the state cookie.
#[derive(Debug, Serialize, Deserialize)]
struct OAuthStateClaims {
    provider: String,
    state: String,
    verifier: String,
    exp: usize,
    iss: String,
    aud: String,
}

fn state_audience(keys: &SessionKeys) -> String {
    format!("{}:oauth", keys.audience)
}

fn state_cookie(keys: &SessionKeys, value: String) -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, value))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path(STATE_COOKIE_PATH)
        .secure(keys.secure_cookie)
        .max_age(TimeDuration::minutes(STATE_TTL_MINUTES))
        .build()
}

fn state_removal_cookie() -> Cookie<'static> {
    Cookie::build((OAUTH_STATE_COOKIE, ""))
        .path(STATE_COOKIE_PATH)
        .build()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/oauth/:provider", get(oauth_start))
        .route("/api/auth/oauth/:provider/callback", get(oauth_callback))
}

#[instrument(skip(state, keys, jar))]
pub async fn oauth_start(
    State(state): State<AppState>,
    State(keys): State<SessionKeys>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), OAuthError> {
    let provider: OAuthProvider = provider.parse()?;
    let request = state.oauth.authorize(provider)?;

    let exp = OffsetDateTime::now_utc() + TimeDuration::minutes(STATE_TTL_MINUTES);
    let claims = OAuthStateClaims {
        provider: provider.as_str().to_string(),
        state: request.state,
        verifier: request.verifier,
        exp: exp.unix_timestamp() as usize,
        iss: keys.issuer.clone(),
        aud: state_audience(&keys),
    };
    let token = keys.encode_claims(&claims)?;

    Ok((
        jar.add(state_cookie(&keys, token)),
        Redirect::to(&request.url),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[instrument(skip(state, keys, jar, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    State(keys): State<SessionKeys>,
    Path(provider): Path<String>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<(CookieJar, Redirect), OAuthError> {
    let provider: OAuthProvider = provider.parse()?;
    if !state.oauth.is_enabled(provider) {
        return Err(OAuthError::UnknownProvider);
    }
    if let Some(err) = query.error {
        warn!(provider = provider.as_str(), error = %err, "provider denied sign-in");
        return Err(OAuthError::Provider(err));
    }

    let stored: OAuthStateClaims = jar
        .get(OAUTH_STATE_COOKIE)
        .and_then(|c| keys.decode_claims(c.value(), &state_audience(&keys)).ok())
        .ok_or(OAuthError::InvalidState)?;
    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        return Err(OAuthError::InvalidState);
    };
    if stored.provider != provider.as_str() || stored.state != returned_state {
        warn!(provider = provider.as_str(), "oauth state mismatch");
        return Err(OAuthError::InvalidState);
    }
    let jar = jar.remove(state_removal_cookie());

    let profile = state.oauth.exchange(provider, code, stored.verifier).await?;
    let identity = provision_social_account(state.users.as_ref(), profile)
        .await
        .map_err(|e| {
            error!(error = %e, provider = provider.as_str(), "provision social account failed");
            anyhow::Error::new(e)
        })?;
    let (token, _) = issue_session(state.users.as_ref(), &keys, &identity).await?;

    info!(user_id = %identity.id, provider = provider.as_str(), "social sign-in");
    Ok((jar.add(keys.session_cookie(token)), Redirect::to(AFTER_SIGN_IN)))
}
