use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tracing::debug;

use crate::{api::error::ApiError, controller::AppState};

/// Authenticated caller, identified by the configured client name
///
/// Extracting this from a request requires `Authorization: Bearer <token>`
/// with a token listed under `auth.clients`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthBearer(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthBearer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|e| {
                    debug!(error = %e, "missing or malformed bearer token");
                    ApiError::Unauthorized
                })?;

        match state.cfg.auth.client_for_token(bearer.token()) {
            Some(name) => Ok(Self(name.to_string())),
            None => {
                debug!("unknown bearer token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
