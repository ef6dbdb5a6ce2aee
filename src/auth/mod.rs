use crate::state::AppState;
use axum::Router;

mod dto;
pub mod error;
pub mod handlers;
pub mod oauth;
pub mod password;
pub mod services;
pub mod session;
pub mod tokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::routes())
        .merge(oauth::routes())
}
