use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::ResetError;
use super::mailer::{dispatch_reset_mail, ResetMail};
use crate::{
    auth::{
        password::{hash_password, is_password_too_short},
        tokens::generate_reset_token,
    },
    state::AppState,
    users::UserStore,
};

pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);

pub fn reset_link(app_url: &str, token: &str) -> String {
    format!("{}/nova-senha/{}", app_url.trim_end_matches('/'), token)
}

/// Issues a reset token for `email` when an account exists and hands the
/// e-mail to the relay. Nothing is reported back: the caller answers the
/// same way whether or not the account exists.
pub async fn request_reset(state: &AppState, email: &str) {
    let user = match state.users.find_by_email(email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            debug!("password reset requested for unknown email");
            return;
        }
        Err(e) => {
            error!(error = %e, "password reset lookup failed");
            return;
        }
    };

    let token = generate_reset_token();
    let expires_at = OffsetDateTime::now_utc() + RESET_TOKEN_TTL;
    if let Err(e) = state.users.set_reset_token(user.id, &token, expires_at).await {
        error!(error = %e, user_id = %user.id, "storing reset token failed");
        return;
    }

    let mail = ResetMail {
        email: email.to_string(),
        reset_link: reset_link(&state.config.app_url, &token),
        logo_url: state.config.mail.logo_url.clone(),
        site_name: state.config.mail.site_name.clone(),
    };
    dispatch_reset_mail(state.mailer.clone(), mail);
    info!(user_id = %user.id, "password reset issued");
}

/// Exchanges an unexpired reset token for a new password. The token is
/// cleared in the same write, so it works once.
pub async fn reset_password(
    users: &dyn UserStore,
    token: &str,
    password: &str,
    now: OffsetDateTime,
) -> Result<Uuid, ResetError> {
    if token.trim().is_empty() {
        return Err(ResetError::InvalidLink);
    }
    if is_password_too_short(password) {
        return Err(ResetError::PasswordTooShort);
    }

    let hash = hash_password(password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        ResetError::Internal
    })?;

    match users.consume_reset_token(token, now, &hash).await {
        Ok(Some(user_id)) => {
            info!(%user_id, "password reset completed");
            Ok(user_id)
        }
        Ok(None) => {
            warn!("reset token unknown, used or expired");
            Err(ResetError::InvalidOrExpired)
        }
        Err(e) => {
            error!(error = %e, "consume reset token failed");
            Err(ResetError::Internal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::state::testing::Fake;
    use crate::users::{memory::MemoryUserStore, NewUser};

    async fn seed(users: &MemoryUserStore, email: &str) -> Uuid {
        users
            .insert(&NewUser {
                id: Uuid::new_v4(),
                name: None,
                email: email.into(),
                username: None,
                password_hash: Some(hash_password("old-password").unwrap()),
                api_key: Some(generate_reset_token()),
                image: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn request_reset_stores_token_and_sends_link() {
        let fake = Fake::new();
        let id = seed(&fake.users, "a@b.com").await;

        request_reset(&fake.state, "a@b.com").await;
        fake.mailer.wait_for_send().await;

        let user = fake.users.get(id).unwrap();
        let token = user.reset_token.expect("token stored");
        let expires = user.reset_token_expires_at.expect("expiry stored");
        let ttl = expires - OffsetDateTime::now_utc();
        assert!(ttl > Duration::minutes(59) && ttl <= Duration::hours(1));

        let sent = fake.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].email, "a@b.com");
        assert_eq!(sent[0].reset_link, format!("https://jukre.test/nova-senha/{token}"));
        assert_eq!(sent[0].site_name, "jukre");
    }

    #[tokio::test]
    async fn request_reset_for_unknown_email_sends_nothing() {
        let fake = Fake::new();
        request_reset(&fake.state, "ghost@b.com").await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(fake.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn consumed_token_cannot_be_reused() {
        let users = MemoryUserStore::new();
        let id = seed(&users, "a@b.com").await;
        let now = OffsetDateTime::now_utc();
        users
            .set_reset_token(id, "tok", now + RESET_TOKEN_TTL)
            .await
            .unwrap();

        assert_eq!(reset_password(&users, "tok", "new-secret", now).await.unwrap(), id);
        let hash = users.get(id).unwrap().password_hash.unwrap();
        assert!(verify_password("new-secret", &hash).unwrap());
        assert!(users.get(id).unwrap().reset_token.is_none());

        let again = reset_password(&users, "tok", "other-secret", now).await;
        assert!(matches!(again, Err(ResetError::InvalidOrExpired)));
        let hash = users.get(id).unwrap().password_hash.unwrap();
        assert!(verify_password("new-secret", &hash).unwrap());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let users = MemoryUserStore::new();
        let id = seed(&users, "a@b.com").await;
        let now = OffsetDateTime::now_utc();
        users.set_reset_token(id, "tok", now).await.unwrap();

        // expiry must be strictly in the future
        let res = reset_password(&users, "tok", "new-secret", now).await;
        assert!(matches!(res, Err(ResetError::InvalidOrExpired)));
        let res = reset_password(&users, "tok", "new-secret", now + Duration::minutes(1)).await;
        assert!(matches!(res, Err(ResetError::InvalidOrExpired)));
        assert!(users.get(id).unwrap().reset_token.is_some());
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_lookup() {
        let users = MemoryUserStore::new();
        users.break_backend();
        let now = OffsetDateTime::now_utc();
        let res = reset_password(&users, "tok", "12345", now).await;
        assert!(matches!(res, Err(ResetError::PasswordTooShort)));
        let res = reset_password(&users, "  ", "123456", now).await;
        assert!(matches!(res, Err(ResetError::InvalidLink)));
    }

    #[tokio::test]
    async fn astral_plane_password_is_long_enough() {
        let users = MemoryUserStore::new();
        let id = seed(&users, "a@b.com").await;
        let now = OffsetDateTime::now_utc();
        users
            .set_reset_token(id, "tok", now + RESET_TOKEN_TTL)
            .await
            .unwrap();

        assert_eq!(reset_password(&users, "tok", "😀😀😀", now).await.unwrap(), id);
        let hash = users.get(id).unwrap().password_hash.unwrap();
        assert!(verify_password("😀😀😀", &hash).unwrap());
    }

    #[test]
    fn reset_link_trims_trailing_slash() {
        assert_eq!(reset_link("https://x.y/", "t"), "https://x.y/nova-senha/t");
    }
}
