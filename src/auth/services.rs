use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    dto::{AvailabilityResponse, RegisterRequest},
    error::{AuthError, RegisterError},
    password::{hash_password, is_password_too_short, verify_password},
    session::Identity,
    tokens::{dicebear_avatar_url, generate_api_key, initials_avatar_url},
};
use crate::users::{NewUser, StoreError, UniqueField, User, UserStore};

pub const MIN_USERNAME_LEN: usize = 3;
/// Attempts at drawing an API key that no other account holds.
pub const API_KEY_ATTEMPTS: usize = 3;

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Registration input after trimming and validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: Option<String>,
    pub email: String,
    pub username: Option<String>,
    pub password: String,
}

impl TryFrom<RegisterRequest> for Registration {
    type Error = RegisterError;

    /// Checks e-mail, then password, then username.
    fn try_from(req: RegisterRequest) -> Result<Self, Self::Error> {
        let email = non_empty(req.email).unwrap_or_default().to_lowercase();
        if !email.contains('@') {
            return Err(RegisterError::InvalidEmail);
        }

        let password = req.password.unwrap_or_default();
        if is_password_too_short(&password) {
            return Err(RegisterError::PasswordTooShort);
        }

        let username = non_empty(req.username);
        if username
            .as_ref()
            .is_some_and(|u| u.encode_utf16().count() < MIN_USERNAME_LEN)
        {
            return Err(RegisterError::UsernameTooShort);
        }

        Ok(Self {
            name: non_empty(req.name),
            email,
            username,
            password,
        })
    }
}

impl Registration {
    fn avatar_seed(&self) -> &str {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .or_else(|| self.email.split('@').next())
            .unwrap_or("user")
    }
}

/// Creates a password account. A fresh API key is drawn for every attempt;
/// only API-key collisions are retried.
pub async fn register_account(
    users: &dyn UserStore,
    reg: Registration,
) -> Result<Uuid, RegisterError> {
    let password_hash = hash_password(&reg.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        RegisterError::Internal
    })?;

    let base = NewUser {
        id: Uuid::new_v4(),
        name: reg.name.clone(),
        email: reg.email.clone(),
        username: reg.username.clone(),
        password_hash: Some(password_hash),
        api_key: None,
        image: Some(initials_avatar_url(reg.avatar_seed())),
    };

    for attempt in 1..=API_KEY_ATTEMPTS {
        let candidate = NewUser {
            api_key: Some(generate_api_key()),
            ..base.clone()
        };
        match users.insert(&candidate).await {
            Ok(id) => {
                info!(user_id = %id, "user registered");
                return Ok(id);
            }
            Err(StoreError::Conflict(UniqueField::ApiKey)) => {
                warn!(attempt, "api key collision, drawing a new one");
            }
            Err(StoreError::Conflict(UniqueField::Email)) => {
                warn!("email already registered");
                return Err(RegisterError::EmailTaken);
            }
            Err(StoreError::Conflict(UniqueField::Username)) => {
                warn!("username already registered");
                return Err(RegisterError::UsernameTaken);
            }
            Err(StoreError::Conflict(UniqueField::Other)) => {
                warn!("registration hit an unexpected unique constraint");
                return Err(RegisterError::Duplicate);
            }
            Err(e @ StoreError::Backend(_)) => {
                error!(error = %e, "create user failed");
                return Err(RegisterError::Internal);
            }
        }
    }

    error!("api key retries exhausted");
    Err(RegisterError::ApiKeyExhausted)
}

/// Looks up which of the given e-mail / username are still free. Values
/// that could never be registered are reported as available without a
/// lookup.
pub async fn check_availability(
    users: &dyn UserStore,
    email: Option<String>,
    username: Option<String>,
) -> Result<AvailabilityResponse, AuthError> {
    let email = non_empty(email).map(|e| e.to_lowercase());
    let username = non_empty(username);
    if email.is_none() && username.is_none() {
        return Err(AuthError::MissingQuery);
    }

    let internal = |e: StoreError| {
        error!(error = %e, "availability lookup failed");
        AuthError::Internal
    };

    let email_taken = match email.as_deref() {
        Some(e) if e.contains('@') => users.find_by_email(e).await.map_err(internal)?.is_some(),
        _ => false,
    };
    let username_taken = match username.as_deref() {
        Some(u) if u.encode_utf16().count() >= MIN_USERNAME_LEN => {
            users.find_by_username(u).await.map_err(internal)?.is_some()
        }
        _ => false,
    };

    Ok(AvailabilityResponse {
        ok: true,
        email_available: email.map(|_| !email_taken),
        username_available: username.map(|_| !username_taken),
    })
}

/// Verifies a password sign-in. Every failure collapses into
/// `InvalidCredentials` so callers cannot tell which part was wrong.
pub async fn authenticate(
    users: &dyn UserStore,
    identifier: Option<String>,
    password: Option<String>,
) -> Result<Identity, AuthError> {
    let (Some(identifier), Some(password)) = (non_empty(identifier), password) else {
        return Err(AuthError::InvalidCredentials);
    };
    if password.is_empty() {
        return Err(AuthError::InvalidCredentials);
    }

    let user = match users.find_by_login(&identifier).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("login with unknown identifier");
            return Err(AuthError::InvalidCredentials);
        }
        Err(e) => {
            error!(error = %e, "login lookup failed");
            return Err(AuthError::Internal);
        }
    };

    let Some(hash) = user.password_hash.as_deref() else {
        debug!(user_id = %user.id, "password login on social-only account");
        return Err(AuthError::InvalidCredentials);
    };

    match verify_password(&password, hash) {
        Ok(true) => {
            info!(user_id = %user.id, "user logged in");
            Ok(Identity::from(&user))
        }
        Ok(false) => {
            warn!(user_id = %user.id, "login invalid password");
            Err(AuthError::InvalidCredentials)
        }
        Err(e) => {
            error!(error = %e, user_id = %user.id, "stored password hash unreadable");
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// Profile returned by an OAuth provider.
#[derive(Debug, Clone, PartialEq)]
pub struct SocialProfile {
    pub provider: &'static str,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Finds or creates the account behind a social sign-in. Accounts are
/// matched on e-mail, so a social login reaches an existing password
/// account with the same address.
pub async fn provision_social_account(
    users: &dyn UserStore,
    profile: SocialProfile,
) -> Result<Identity, StoreError> {
    let email = profile.email.trim().to_lowercase();

    let user = match users.find_by_email(&email).await? {
        Some(user) => user,
        None => {
            let new = NewUser {
                id: Uuid::new_v4(),
                name: non_empty(profile.name.clone()),
                email: email.clone(),
                username: None,
                password_hash: None,
                api_key: None,
                image: non_empty(profile.image.clone()),
            };
            match users.insert(&new).await {
                Ok(id) => info!(user_id = %id, provider = profile.provider, "social user created"),
                // lost a race against a concurrent first sign-in
                Err(StoreError::Conflict(UniqueField::Email)) => {}
                Err(e) => return Err(e),
            }
            users
                .find_by_email(&email)
                .await?
                .ok_or(StoreError::Backend(sqlx::Error::RowNotFound))?
        }
    };

    if let Err(e) = ensure_profile_defaults(users, &user).await {
        warn!(error = %e, user_id = %user.id, "profile backfill failed");
    }
    let user = users.find_by_id(user.id).await?.unwrap_or(user);
    Ok(Identity::from(&user))
}

/// Gives an account its API key and avatar if it still lacks them.
pub async fn ensure_profile_defaults(users: &dyn UserStore, user: &User) -> Result<(), StoreError> {
    if user.api_key.is_some() && user.image.is_some() {
        return Ok(());
    }
    let seed = user.name.as_deref().unwrap_or(&user.email);
    let image = user
        .image
        .clone()
        .unwrap_or_else(|| dicebear_avatar_url(seed));

    for attempt in 1..=API_KEY_ATTEMPTS {
        match users
            .backfill_profile(user.id, &generate_api_key(), &image)
            .await
        {
            Ok(()) => {
                debug!(user_id = %user.id, "profile defaults filled");
                return Ok(());
            }
            Err(StoreError::Conflict(UniqueField::ApiKey)) => {
                warn!(attempt, user_id = %user.id, "api key collision on backfill");
            }
            Err(e) => return Err(e),
        }
    }
    warn!(user_id = %user.id, "api key backfill gave up");
    Ok(())
}
