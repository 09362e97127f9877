use crate::state::AppState;
use axum::Router;

mod dto;
pub mod error;
pub(crate) mod extractors;
pub mod handlers;
pub mod password;
pub mod providers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod session;
pub mod verification;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
