use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use crate::{
    auth::{credentials::TokenKind, handlers::ACCESS_COOKIE},
    error::AppError,
    state::AppState,
};

/// Extracts and validates the access token, returning the user ID.
///
/// The token comes from the `accessToken` cookie or an `Authorization: Bearer`
/// header; the first one that verifies as an access token wins.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = jar
            .get(ACCESS_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|t| !t.is_empty());
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .map(str::to_string);

        if cookie.is_none() && bearer.is_none() {
            return Err(AppError::Unauthorized("Unauthorized request.".into()));
        }

        let mut rejection = AppError::Unauthorized("Invalid or expired token.".into());
        for token in cookie.iter().chain(bearer.iter()) {
            match state.credentials.verify_token(token) {
                Ok(claims) if claims.kind == TokenKind::Access => return Ok(AuthUser(claims.sub)),
                Ok(_) => {
                    rejection = AppError::Unauthorized("Access token required.".into());
                }
                Err(_) => warn!("invalid or expired token"),
            }
        }
        Err(rejection)
    }
}

/// Body decoded as url-encoded form when the content type says so, JSON otherwise.
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;
            Ok(JsonOrForm(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;
            Ok(JsonOrForm(value))
        }
    }
}
