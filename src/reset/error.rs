use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::dto::ResetResponse;

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("Corpo da requisição inválido.")]
    InvalidBody,
    #[error("Informe um e-mail válido.")]
    InvalidEmail,
    #[error("Link inválido.")]
    InvalidLink,
    #[error("A senha deve ter pelo menos 6 caracteres.")]
    PasswordTooShort,
    #[error("Link inválido ou expirado.")]
    InvalidOrExpired,
    #[error("Não foi possível redefinir a senha.")]
    Internal,
}

impl ResetError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ResetError {
    fn into_response(self) -> Response {
        let body = ResetResponse {
            ok: false,
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
