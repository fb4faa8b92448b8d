use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        credentials::TokenKind,
        dto::{LoginRequest, PublicUser, RegisterForm, TokenPair},
        repo::NewUser,
        uploads::ReceivedUploads,
    },
    error::{AppError, AppResult},
    state::AppState,
};

const ALL_FIELDS_REQUIRED: &str = "All fields are required.";

/// Trimmed value of a required text field, `None` if missing or blank.
fn required(field: Option<&str>) -> Option<&str> {
    field.map(str::trim).filter(|v| !v.is_empty())
}

/// Present in the JavaScript-truthy sense: set and not the empty string.
fn present(field: &Option<String>) -> bool {
    field.as_deref().map_or(false, |v| !v.is_empty())
}

/// Registers a user from the multipart form. The temp files in `uploads` are
/// gone when this returns, whatever the outcome.
#[instrument(skip_all)]
pub async fn register(
    st: &AppState,
    form: RegisterForm,
    uploads: ReceivedUploads,
) -> AppResult<PublicUser> {
    let outcome = register_inner(st, &form, &uploads).await;
    if let Err(e) = &outcome {
        warn!(error = %e, "registration failed");
    }
    uploads.discard().await;
    outcome
}

async fn register_inner(
    st: &AppState,
    form: &RegisterForm,
    uploads: &ReceivedUploads,
) -> AppResult<PublicUser> {
    let (Some(username), Some(email), Some(_)) = (
        required(form.username.as_deref()),
        required(form.email.as_deref()),
        required(form.password.as_deref()),
    ) else {
        return Err(AppError::Validation(ALL_FIELDS_REQUIRED.into()));
    };
    let username = username.to_lowercase();
    let password = form.password.as_deref().unwrap_or_default();

    if st
        .users
        .find_by_username_or_email(Some(&username), Some(email))
        .await?
        .is_some()
    {
        warn!(%username, %email, "user already exists");
        return Err(AppError::Conflict("User already exists".into()));
    }

    let (mut profile_photo, mut cover_photo) = (None, None);
    if let (Some(profile), Some(cover)) = (&uploads.profile_photo, &uploads.cover_photo) {
        profile_photo = st.media.upload_file(profile).await;
        cover_photo = st.media.upload_file(cover).await;
    }

    let password_hash = st.credentials.hash_password(password)?;
    let created = st
        .users
        .create(NewUser {
            username,
            email: email.to_string(),
            password_hash,
            profile_photo,
            cover_photo,
        })
        .await?;

    let user = st.users.find_by_id(created.id).await?.ok_or_else(|| {
        AppError::Internal("Something went wrong while registering the user.".into())
    })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user.into())
}

/// Signs a fresh access/refresh pair for `user_id` and stores the refresh
/// token in the user's single slot.
#[instrument(skip(st))]
pub async fn issue_tokens(st: &AppState, user_id: Uuid) -> AppResult<TokenPair> {
    let user = st
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".into()))?;

    let access_token = st.credentials.sign(user.id, TokenKind::Access)?;
    let refresh_token = st.credentials.sign(user.id, TokenKind::Refresh)?;

    if !st.users.set_refresh_token(user.id, Some(&refresh_token)).await? {
        return Err(AppError::NotFound("User not found.".into()));
    }

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[instrument(skip_all)]
pub async fn login(st: &AppState, req: LoginRequest) -> AppResult<(PublicUser, TokenPair)> {
    // Rejects only when every field is absent.
    if !present(&req.username) && !present(&req.email) && !present(&req.password) {
        return Err(AppError::Validation(ALL_FIELDS_REQUIRED.into()));
    }

    let username = req
        .username
        .as_deref()
        .map(|u| u.trim().to_lowercase())
        .filter(|u| !u.is_empty());
    let email = req.email.as_deref().map(str::trim).filter(|e| !e.is_empty());

    let user = match st
        .users
        .find_by_username_or_email(username.as_deref(), email)
        .await?
    {
        Some(u) => u,
        None => {
            warn!(username = ?username, email = ?email, "login unknown user");
            return Err(AppError::NotFound("User not found.".into()));
        }
    };

    let password = req.password.as_deref().unwrap_or_default();
    if !st.credentials.verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized("Invalid credentials.".into()));
    }

    let tokens = issue_tokens(st, user.id).await?;
    let user = st
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found.".into()))?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok((user.into(), tokens))
}

/// Exchanges the currently stored refresh token for a new pair.
#[instrument(skip_all)]
pub async fn refresh(st: &AppState, presented: &str) -> AppResult<TokenPair> {
    let claims = match st.credentials.verify_token(presented) {
        Ok(c) if c.kind == TokenKind::Refresh => c,
        Ok(_) | Err(_) => {
            warn!("invalid refresh token");
            return Err(AppError::Unauthorized("Invalid refresh token.".into()));
        }
    };

    let user = st
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token.".into()))?;

    if user.refresh_token.as_deref() != Some(presented) {
        warn!(user_id = %user.id, "refresh token reused or revoked");
        return Err(AppError::Unauthorized(
            "Refresh token is expired or used.".into(),
        ));
    }

    let tokens = issue_tokens(st, user.id).await?;
    info!(user_id = %user.id, "tokens refreshed");
    Ok(tokens)
}

#[instrument(skip(st))]
pub async fn logout(st: &AppState, user_id: Uuid) -> AppResult<()> {
    st.users.set_refresh_token(user_id, None).await?;
    info!(%user_id, "user logged out");
    Ok(())
}

pub async fn current_user(st: &AppState, user_id: Uuid) -> AppResult<PublicUser> {
    st.users
        .find_by_id(user_id)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::Unauthorized("User not found.".into()))
}
