use crate::state::AppState;
use axum::Router;

mod claims;
pub mod credentials;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod repo;
mod repo_types;
pub mod services;
pub mod uploads;

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::register_routes(max_upload_bytes))
        .merge(handlers::session_routes())
}
