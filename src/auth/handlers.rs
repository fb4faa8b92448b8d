use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, MessageResponse, RefreshRequest, RegisterForm, TokenPair, UserResponse},
        extractors::{AuthUser, JsonOrForm},
        services,
        uploads::{self, ReceivedUploads},
    },
    error::{AppError, AppResult},
    state::AppState,
};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Cap for JSON and url-encoded bodies.
pub const FORM_BODY_LIMIT: usize = 16 * 1024;

pub fn register_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(get_me))
        .layer(DefaultBodyLimit::max(FORM_BODY_LIMIT))
}

/// POST /register (multipart)
/// Text fields username/email/password, files profile_photo and cover_photo.
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Result<Multipart, MultipartRejection>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    let mut mp = mp.map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;
    let mut form = RegisterForm::default();
    let mut received = ReceivedUploads::default();

    if let Err(e) = read_register_form(&state, &mut mp, &mut form, &mut received).await {
        warn!(error = %e, "reading register form failed");
        received.discard().await;
        return Err(e);
    }

    let user = services::register(&state, form, received).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User registered successfully.",
            user_info: user,
        }),
    ))
}

async fn read_register_form(
    state: &AppState,
    mp: &mut Multipart,
    form: &mut RegisterForm,
    received: &mut ReceivedUploads,
) -> AppResult<()> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            let slot = received
                .slot_mut(&name)
                .ok_or_else(|| AppError::Validation(format!("Unexpected field: {}", name)))?;
            if slot.is_some() {
                return Err(AppError::Validation(format!("Unexpected field: {}", name)));
            }
            *slot = Some(uploads::save_field(&state.config.upload_dir, field).await?);
            continue;
        }

        let target = match name.as_str() {
            "username" => &mut form.username,
            "email" => &mut form.email,
            "password" => &mut form.password,
            _ => continue,
        };
        let value = field
            .text()
            .await
            .map_err(|e| AppError::from_rejection(e.status(), e.body_text()))?;
        *target = Some(value);
    }
    Ok(())
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .build()
}

fn with_session_cookies(jar: CookieJar, tokens: TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, tokens.access_token, secure))
        .add(session_cookie(REFRESH_COOKIE, tokens.refresh_token, secure))
}

/// POST /login (JSON or url-encoded)
#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonOrForm(payload): JsonOrForm<LoginRequest>,
) -> AppResult<(CookieJar, Json<UserResponse>)> {
    let (user, tokens) = services::login(&state, payload).await?;
    let jar = with_session_cookies(jar, tokens, state.config.production);
    Ok((
        jar,
        Json(UserResponse {
            message: "User logged in successfully.",
            user_info: user,
        }),
    ))
}

/// POST /refresh; token from the refreshToken cookie or the JSON body.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| body.map(|Json(b)| b.refresh_token).filter(|t| !t.is_empty()))
        .ok_or_else(|| AppError::Unauthorized("Unauthorized request.".into()))?;

    let tokens = services::refresh(&state, &presented).await?;
    let jar = with_session_cookies(jar, tokens, state.config.production);
    Ok((
        jar,
        Json(MessageResponse {
            message: "Access token refreshed.",
        }),
    ))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    services::logout(&state, user_id).await?;
    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    Ok((
        jar,
        Json(MessageResponse {
            message: "User logged out.",
        }),
    ))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<Json<UserResponse>> {
    let user = services::current_user(&state, user_id).await?;
    Ok(Json(UserResponse {
        message: "Current user fetched.",
        user_info: user,
    }))
}
