use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::db;
use crate::error::AppError;
use crate::server::AppState;
use crate::types::Admin;

/// Header naming the acting admin by id
pub const ADMIN_HEADER: &str = "x-admin-id";

/// Per-request data handed to every handler: who is acting.
///
/// Resolved from the `x-admin-id` header, falling back to the configured
/// default admin. Requests with neither run anonymously; a header naming no
/// admin is rejected.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub admin: Option<Admin>,
}

impl RequestContext {
    pub fn admin_id(&self) -> Option<i64> {
        self.admin.as_ref().map(|a| a.id)
    }

    pub fn admin_name(&self) -> Option<&str> {
        self.admin.as_ref().map(|a| a.full_name.as_str())
    }
}

impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header_id = match parts.headers.get(ADMIN_HEADER) {
            Some(value) => Some(
                value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .ok_or_else(|| {
                        AppError::BadRequest(format!("{} must be a numeric admin id", ADMIN_HEADER))
                    })?,
            ),
            None => None,
        };

        let conn = state.db.lock().await;
        let admin = match header_id {
            Some(id) => Some(
                db::get_admin(&conn, id)?
                    .ok_or_else(|| AppError::BadRequest(format!("No admin with id {}", id)))?,
            ),
            None => match state.config.default_admin.as_deref() {
                Some(username) => db::find_admin_by_username(&conn, username)?,
                None => None,
            },
        };

        Ok(Self { admin })
    }
}
