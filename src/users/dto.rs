use serde::{Deserialize, Serialize};

use crate::users::repo::User;

/// Request body for registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Partial update body; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Query parameters of the profile route, used when no bearer token is
/// presented.
#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    pub username: Option<String>,
}

/// The user as returned to clients. Never carries the credential.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub profile_pic_url: Option<String>,
    pub background_pic_url: Option<String>,
    pub admin: bool,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            profile_pic_url: user.profile_pic_url,
            background_pic_url: user.background_pic_url,
            admin: user.admin,
        }
    }
}

/// Response of the picture upload route.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub message: String,
}
