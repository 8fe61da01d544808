pub mod dto;
pub mod handlers;
pub mod repo;
pub mod services;
pub mod status;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::dashboard_routes())
        .merge(handlers::stage1_routes())
        .merge(handlers::stage2_routes())
}
