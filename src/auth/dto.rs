use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::SessionUser;

/// Request body for account registration.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub ok: bool,
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    pub email: Option<String>,
    pub username: Option<String>,
}

/// Each flag is present only when the matching query parameter was sent.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_available: Option<bool>,
}

/// Request body for credential sign-in; `identifier` is an e-mail or a username.
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    pub identifier: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub ok: bool,
    pub user: SessionUser,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}
