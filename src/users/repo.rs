use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, not exposed in JSON
    pub profile_pic_url: Option<String>,
    pub background_pic_url: Option<String>,
    pub admin: bool,
}

/// Fields required to insert a user. The password is hashed before it
/// reaches the store.
#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub profile_pic_url: Option<String>,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// The persistence collaborator behind every route. One implementation per
/// backend plus whatever double a test wants to inject.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Idempotent startup schema creation.
    async fn ensure_schema(&self) -> StoreResult<()>;

    async fn create(&self, new_user: NewUser) -> StoreResult<User>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>>;

    /// Applies only the supplied fields. `NotFound` when no row matches,
    /// with no write performed.
    async fn update(&self, id: i64, patch: UserPatch) -> StoreResult<User>;
}

/// Maps a driver unique-violation into the same Conflict the pre-check
/// returns, so a lost check-then-act race surfaces identically.
pub(crate) fn translate_unique_violation(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            let field = if db.message().contains("email") {
                "email"
            } else {
                "username"
            };
            return StoreError::Conflict(field.into());
        }
    }
    StoreError::Sqlx(err)
}
