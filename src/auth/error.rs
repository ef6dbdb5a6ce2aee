use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("JSON inválido.")]
    InvalidJson,
    #[error("E-mail inválido.")]
    InvalidEmail,
    #[error("A senha deve ter pelo menos 6 caracteres.")]
    PasswordTooShort,
    #[error("O usuário deve ter pelo menos 3 caracteres.")]
    UsernameTooShort,
    #[error("E-mail já cadastrado.")]
    EmailTaken,
    #[error("Usuário já cadastrado.")]
    UsernameTaken,
    #[error("Dados já cadastrados.")]
    Duplicate,
    #[error("Não foi possível gerar uma API key.")]
    ApiKeyExhausted,
    #[error("Não foi possível criar a conta.")]
    Internal,
}

impl RegisterError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidJson
            | Self::InvalidEmail
            | Self::PasswordTooShort
            | Self::UsernameTooShort => StatusCode::BAD_REQUEST,
            Self::EmailTaken | Self::UsernameTaken | Self::Duplicate => StatusCode::CONFLICT,
            Self::ApiKeyExhausted | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegisterError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Errors of the `{ok:false, message}` family used by sign-in and lookups.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Credenciais inválidas.")]
    InvalidCredentials,
    #[error("Informe email ou username.")]
    MissingQuery,
    #[error("Corpo da requisição inválido.")]
    InvalidBody,
    #[error("Erro interno.")]
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::MissingQuery | Self::InvalidBody => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(json!({ "ok": false, "message": self.to_string() })),
        )
            .into_response()
    }
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Provedor desconhecido.")]
    UnknownProvider,
    #[error("Estado de autenticação inválido.")]
    InvalidState,
    #[error("Falha ao autenticar com o provedor.")]
    Provider(String),
    #[error("Não foi possível entrar com esta conta.")]
    Internal(#[from] anyhow::Error),
}

impl OAuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownProvider => StatusCode::NOT_FOUND,
            Self::InvalidState => StatusCode::BAD_REQUEST,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(json!({ "ok": false, "message": self.to_string() })),
        )
            .into_response()
    }
}
