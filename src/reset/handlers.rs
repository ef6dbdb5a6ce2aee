use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{instrument, warn};

use super::{
    dto::{ForgotPasswordRequest, NewPasswordRequest, ResetResponse},
    error::ResetError,
    services::{request_reset, reset_password},
};
use crate::state::AppState;

pub const FORGOT_PASSWORD_MESSAGE: &str =
    "Se existir uma conta com esse e-mail, você receberá instruções para redefinir sua senha.";
pub const PASSWORD_UPDATED_MESSAGE: &str = "Senha atualizada com sucesso.";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/forgot-password", post(forgot_password))
        .route("/api/auth-password/:key", post(auth_password))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Json<ResetResponse>, ResetError> {
    let Json(body) = payload.map_err(|_| ResetError::InvalidBody)?;
    let email = body.email.as_str().unwrap_or_default().trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        warn!("forgot-password with invalid email");
        return Err(ResetError::InvalidEmail);
    }

    request_reset(&state, &email).await;
    Ok(Json(ResetResponse::ok(FORGOT_PASSWORD_MESSAGE)))
}

#[instrument(skip(state, key, payload))]
pub async fn auth_password(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<NewPasswordRequest>, JsonRejection>,
) -> Result<Json<ResetResponse>, ResetError> {
    if key.trim().is_empty() {
        return Err(ResetError::InvalidLink);
    }
    let Json(body) = payload.map_err(|_| ResetError::InvalidBody)?;
    let password = body.password.as_str().unwrap_or_default();

    reset_password(state.users.as_ref(), &key, password, OffsetDateTime::now_utc()).await?;
    Ok(Json(ResetResponse::ok(PASSWORD_UPDATED_MESSAGE)))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::password::hash_password;
    use crate::reset::mailer::testing::RecordingMailer;
    use crate::state::testing::Fake;
    use crate::users::{NewUser, UserStore};

    async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn seed(fake: &Fake, email: &str) -> Uuid {
        fake.users
            .insert(&NewUser {
                id: Uuid::new_v4(),
                name: None,
                email: email.into(),
                username: None,
                password_hash: Some(hash_password("old-password").unwrap()),
                api_key: None,
                image: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn forgot_password_answers_the_same_for_known_and_unknown_emails() {
        let fake = Fake::new();
        seed(&fake, "a@b.com").await;
        let app = routes().with_state(fake.state.clone());

        let known = post_json(app.clone(), "/api/forgot-password", r#"{"email":" A@B.com "}"#).await;
        let unknown = post_json(app, "/api/forgot-password", r#"{"email":"x@y.com"}"#).await;

        assert_eq!(known.0, StatusCode::OK);
        assert_eq!(known, unknown);
        assert_eq!(known.1, json!({ "ok": true, "message": FORGOT_PASSWORD_MESSAGE }));

        fake.mailer.wait_for_send().await;
        assert_eq!(fake.mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn forgot_password_ignores_mail_and_store_failures() {
        let fake = Fake::with_mailer(RecordingMailer::failing());
        seed(&fake, "a@b.com").await;
        let app = routes().with_state(fake.state.clone());

        let (status, body) = post_json(app.clone(), "/api/forgot-password", r#"{"email":"a@b.com"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        fake.users.break_backend();
        let (status, body) = post_json(app, "/api/forgot-password", r#"{"email":"a@b.com"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn forgot_password_rejects_malformed_input() {
        let app = routes().with_state(AppState::fake());
        let (status, body) = post_json(app.clone(), "/api/forgot-password", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Corpo da requisição inválido.");

        let (status, body) = post_json(app, "/api/forgot-password", r#"{"email":"nope"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "ok": false, "message": "Informe um e-mail válido." }));
    }

    #[tokio::test]
    async fn auth_password_consumes_token_once() {
        let fake = Fake::new();
        let id = seed(&fake, "a@b.com").await;
        let expires = OffsetDateTime::now_utc() + time::Duration::hours(1);
        fake.users.set_reset_token(id, "abc123", expires).await.unwrap();
        let app = routes().with_state(fake.state.clone());

        let (status, body) =
            post_json(app.clone(), "/api/auth-password/abc123", r#"{"password":"nova-senha"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "message": PASSWORD_UPDATED_MESSAGE }));

        let (status, body) =
            post_json(app, "/api/auth-password/abc123", r#"{"password":"outra-senha"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "ok": false, "message": "Link inválido ou expirado." }));
    }

    #[tokio::test]
    async fn auth_password_validates_password_length() {
        let app = routes().with_state(AppState::fake());
        let (status, body) =
            post_json(app, "/api/auth-password/abc123", r#"{"password":"123"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "A senha deve ter pelo menos 6 caracteres.");
    }
}
