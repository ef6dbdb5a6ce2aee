use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("ID de link inválido.")]
    InvalidId,
    #[error("ID de link reservado.")]
    ReservedId,
    #[error("Link não encontrado.")]
    NotFound,
    #[error("Falha ao consultar a API.")]
    Upstream { status: StatusCode },
    #[error("Resposta inválida da API.")]
    InvalidResponse,
    #[error("link api request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl LinkError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidId | Self::ReservedId => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream { status } => *status,
            Self::InvalidResponse => StatusCode::BAD_GATEWAY,
            Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let detail = match &self {
            Self::InvalidId | Self::ReservedId | Self::NotFound => self.to_string(),
            _ => "Erro ao consultar a API.".to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
