use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields are kept loose so that a wrong JSON type reads as "missing"
/// instead of failing the whole body.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: Value,
}

#[derive(Debug, Deserialize)]
pub struct NewPasswordRequest {
    #[serde(default)]
    pub password: Value,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub ok: bool,
    pub message: String,
}

impl ResetResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }
}
