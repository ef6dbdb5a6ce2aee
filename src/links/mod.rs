use crate::state::AppState;
use axum::Router;

pub mod client;
pub mod device;
mod error;
pub mod handlers;

pub use client::LinkClient;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::api_routes())
        .merge(handlers::redirect_routes())
}
