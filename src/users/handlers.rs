use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{jwt::AuthUser, password},
    error::ApiError,
    state::AppState,
    storage::PictureStorage,
    users::{
        dto::{ProfileQuery, PublicUser, RegisterRequest, UpdateUserRequest, UploadResponse},
        repo::{NewUser, User, UserPatch, UserStore},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/", post(register))
        .route("/users/me/", get(profile))
        .route("/users/me/upload-pictures/", patch(upload_pictures))
        .route("/users/atualizar/:id", patch(update_user))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }

    // Pre-check both uniqueness constraints for a precise message; a lost
    // race still comes back as the same Conflict from the insert itself.
    if state
        .store
        .find_by_username(&payload.username)
        .await?
        .is_some()
    {
        warn!(username = %payload.username, "username already registered");
        return Err(ApiError::Conflict("Username already registered".into()));
    }
    if state.store.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let password_hash = password::hash_password(&payload.password).map_err(ApiError::Internal)?;

    let user = state
        .store
        .create(NewUser {
            username: payload.username,
            email: payload.email,
            password_hash,
        })
        .await?;

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Profile of the current user. A bearer token identifies the caller; the
/// `username` query parameter is kept for clients that have not logged in
/// through the token flow yet.
#[instrument(skip(state, auth))]
pub async fn profile(
    State(state): State<AppState>,
    auth: Option<AuthUser>,
    Query(query): Query<ProfileQuery>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = match (auth, query.username) {
        (Some(AuthUser(user_id)), _) => state.store.find_by_id(user_id).await?,
        (None, Some(username)) => state.store.find_by_username(&username).await?,
        (None, None) => {
            return Err(ApiError::Unauthorized(
                "Provide a bearer token or a username".into(),
            ))
        }
    };

    let user: User = user.ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let email = match payload.email {
        Some(raw) => {
            let email = raw.trim().to_lowercase();
            if !is_valid_email(&email) {
                return Err(ApiError::BadRequest("Invalid email".into()));
            }
            Some(email)
        }
        None => None,
    };

    let password_hash = match payload.password {
        Some(plain) => Some(password::hash_password(&plain).map_err(ApiError::Internal)?),
        None => None,
    };

    let user = state
        .store
        .update(
            id,
            UserPatch {
                username: payload.username,
                email,
                password_hash,
                profile_pic_url: None,
            },
        )
        .await?;

    info!(user_id = user.id, "user updated");
    Ok(Json(user.into()))
}

/// Accepts a single multipart file and hands it to the picture storage
/// collaborator. When storage yields a URL it is persisted onto the user's
/// profile_pic_url; without configured storage the upload is only
/// acknowledged.
#[instrument(skip(state, multipart))]
pub async fn upload_pictures(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<(String, String, bytes::Bytes)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if let Some(filename) = field.file_name().map(|s| s.to_string()) {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            upload = Some((filename, content_type, data));
            break;
        }
    }

    let Some((filename, content_type, data)) = upload else {
        return Err(ApiError::BadRequest("A file field is required".into()));
    };

    let key = format!("profile/{user_id}/{filename}");
    let url = state
        .pictures
        .store(&key, data, &content_type)
        .await
        .map_err(ApiError::Internal)?;

    let message = match url {
        Some(url) => {
            state
                .store
                .update(
                    user_id,
                    UserPatch {
                        profile_pic_url: Some(url),
                        ..Default::default()
                    },
                )
                .await?;
            info!(user_id, filename = %filename, "profile picture stored");
            "Profile picture updated".to_string()
        }
        None => {
            info!(user_id, filename = %filename, "upload acknowledged without storage");
            "Upload received; no object storage configured, file not persisted".to_string()
        }
    };

    Ok(Json(UploadResponse { filename, message }))
}
