use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info, instrument, warn};

use super::{
    dto::{
        AvailabilityQuery, AvailabilityResponse, LoginRequest, LoginResponse, OkResponse,
        RegisterRequest, RegisterResponse,
    },
    error::{AuthError, RegisterError},
    services::{authenticate, check_availability, register_account, Registration},
    session::{issue_session, SessionKeys, SessionUser},
};
use crate::state::AppState;

pub const SIGN_IN_PAGE: &str = "/auth/login";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/register/availability", get(availability))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(session))
        .route("/dashboard", get(dashboard))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), RegisterError> {
    let Json(body) = payload.map_err(|e| {
        warn!(error = %e, "register with malformed json");
        RegisterError::InvalidJson
    })?;
    let registration = Registration::try_from(body).inspect_err(|e| {
        warn!(reason = %e, "registration rejected");
    })?;

    let user_id = register_account(state.users.as_ref(), registration).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { ok: true, user_id }),
    ))
}

#[instrument(skip(state))]
pub async fn availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AuthError> {
    let res = check_availability(state.users.as_ref(), query.email, query.username).await?;
    Ok(Json(res))
}

#[instrument(skip(state, keys, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    State(keys): State<SessionKeys>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthError> {
    let Json(body) = payload.map_err(|_| AuthError::InvalidBody)?;
    let identity = authenticate(state.users.as_ref(), body.identifier, body.password).await?;

    let (token, user) = issue_session(state.users.as_ref(), &keys, &identity)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %identity.id, "issue session failed");
            AuthError::Internal
        })?;

    Ok((
        jar.add(keys.session_cookie(token)),
        Json(LoginResponse { ok: true, user }),
    ))
}

pub async fn logout(
    State(keys): State<SessionKeys>,
    jar: CookieJar,
) -> (CookieJar, Json<OkResponse>) {
    (jar.remove(keys.removal_cookie()), Json(OkResponse { ok: true }))
}

pub async fn session(user: SessionUser) -> Json<SessionUser> {
    Json(user)
}

pub async fn dashboard(user: Option<SessionUser>) -> Response {
    match user {
        Some(user) => {
            info!(user_id = %user.id, "dashboard");
            Json(user).into_response()
        }
        None => Redirect::to(SIGN_IN_PAGE).into_response(),
    }
}
