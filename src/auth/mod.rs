use crate::state::AppState;
use axum::Router;

mod dto;
pub mod events;
pub mod extractors;
pub mod handlers;
pub mod jwt;
mod password;
mod repo;
mod repo_types;
pub mod services;

pub use events::IdentityEvents;
pub use extractors::AuthUser;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
