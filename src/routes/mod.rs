pub mod api_routes;
pub mod page_routes;

use axum::http::StatusCode;

use crate::errors::AppError;
use crate::service::session::SessionRegistry;
use crate::service::session_controller::SessionController;

/// Shared handler state: the controller plus the live sessions.
#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub sessions: SessionRegistry,
}

pub fn status_for(err: &AppError) -> StatusCode {
    if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_busy() {
        StatusCode::CONFLICT
    } else if err.is_backend_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if err.is_backend_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
