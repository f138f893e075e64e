use crate::constants::SESSION_COOKIE;
use crate::db;
use crate::types::{CrashlogError, ObservedError, UserId};
use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use tower_cookies::Cookies;

/// Signed-in user resolved from the `session_user` cookie. Rejects with 401.
pub struct CurrentUser(pub UserId);

/// Like [`CurrentUser`], but anonymous requests pass through as `None`.
pub struct OptionalUser(pub Option<UserId>);

async fn resolve_session(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> crate::Result<Option<UserId>> {
    let cookies = match Cookies::from_request_parts(parts, state).await {
        Ok(c) => c,
        Err((_, msg)) => {
            tracing::warn!("Cookie layer missing: {}", msg);
            return Ok(None);
        }
    };

    let email = match cookies.get(SESSION_COOKIE) {
        Some(c) => c.value().trim().to_string(),
        None => return Ok(None),
    };
    if email.is_empty() {
        return Ok(None);
    }

    let user = db::find_user_id_by_email(&state.db, &email).await?;
    if user.is_none() {
        tracing::debug!("Session cookie does not match a known user");
    }
    Ok(user)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ObservedError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match resolve_session(parts, state).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(CrashlogError::Unauthorized.into()),
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = ObservedError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match resolve_session(parts, state).await {
            Ok(user) => Ok(OptionalUser(user)),
            Err(e) => {
                // chat keeps working anonymously when the user lookup fails
                tracing::warn!("Session lookup failed: {}", e.inner);
                Ok(OptionalUser(None))
            }
        }
    }
}
