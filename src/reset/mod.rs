use crate::state::AppState;
use axum::Router;

mod dto;
mod error;
pub mod handlers;
pub mod mailer;
pub mod services;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
