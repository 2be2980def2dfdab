use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
};

use crate::config::AppConfig;
use crate::users::repo::{
    translate_unique_violation, NewUser, StoreError, StoreResult, User, UserPatch, UserStore,
};

/// Database file used when no DATABASE_URL is provided.
const LOCAL_DB_FILE: &str = "letterplay.db";

const USER_COLUMNS: &str =
    "id, username, email, password_hash, profile_pic_url, background_pic_url, admin";

// SQLite also understands the $N parameter form, so everything below the DDL
// is shared between both backends.
fn select_by_username_sql() -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1")
}

fn select_by_email_sql() -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1")
}

fn select_by_id_sql() -> String {
    format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1")
}

fn insert_sql() -> String {
    format!(
        "INSERT INTO users (username, email, password_hash) \
         VALUES ($1, $2, $3) \
         RETURNING {USER_COLUMNS}"
    )
}

fn update_sql() -> String {
    format!(
        "UPDATE users SET \
            username = COALESCE($1, username), \
            email = COALESCE($2, email), \
            password_hash = COALESCE($3, password_hash), \
            profile_pic_url = COALESCE($4, profile_pic_url) \
         WHERE id = $5 \
         RETURNING {USER_COLUMNS}"
    )
}

/// Builds the store selected by DATABASE_URL, falling back to a local
/// file-backed SQLite database when the variable is absent.
pub async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn UserStore>> {
    match config.database_url.as_deref() {
        Some(url) if url.starts_with("sqlite:") => {
            tracing::info!("connecting to sqlite database");
            Ok(Arc::new(SqliteStore::connect(url).await?))
        }
        Some(url) => {
            let url = normalize_postgres_url(url);
            tracing::info!("connecting to postgres database");
            Ok(Arc::new(PgStore::connect(&url).await?))
        }
        None => {
            tracing::info!(file = LOCAL_DB_FILE, "DATABASE_URL not set, using local sqlite file");
            Ok(Arc::new(SqliteStore::open_file(LOCAL_DB_FILE).await?))
        }
    }
}

/// Hosted providers hand out `postgres://` URLs; the driver-qualified scheme
/// is `postgresql://`.
pub fn normalize_postgres_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .context("connect to postgres")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(100) NOT NULL UNIQUE,
                email VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                profile_pic_url VARCHAR(255),
                background_pic_url VARCHAR(255),
                admin BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&insert_sql())
            .bind(new_user.username.as_str())
            .bind(new_user.email.as_str())
            .bind(new_user.password_hash.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(translate_unique_violation)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&select_by_username_sql())
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&select_by_email_sql())
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&select_by_id_sql())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&update_sql())
            .bind(patch.username.as_deref())
            .bind(patch.email.as_deref())
            .bind(patch.password_hash.as_deref())
            .bind(patch.profile_pic_url.as_deref())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(translate_unique_violation)?
            .ok_or(StoreError::NotFound)
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .context("connect to sqlite")?;
        Ok(Self { pool })
    }

    pub async fn open_file(path: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("open sqlite file")?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                profile_pic_url TEXT,
                background_pic_url TEXT,
                admin BOOLEAN NOT NULL DEFAULT FALSE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create(&self, new_user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&insert_sql())
            .bind(new_user.username.as_str())
            .bind(new_user.email.as_str())
            .bind(new_user.password_hash.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(translate_unique_violation)
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&select_by_username_sql())
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&select_by_email_sql())
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&select_by_id_sql())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&update_sql())
            .bind(patch.username.as_deref())
            .bind(patch.email.as_deref())
            .bind(patch.password_hash.as_deref())
            .bind(patch.profile_pic_url.as_deref())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(translate_unique_violation)?
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
pub(crate) async fn memory_store() -> SqliteStore {
    let store = SqliteStore::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    store.ensure_schema().await.expect("schema");
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$argon2id$test".into(),
        }
    }

    #[test]
    fn rewrites_short_postgres_scheme() {
        assert_eq!(
            normalize_postgres_url("postgres://u:p@host/db"),
            "postgresql://u:p@host/db"
        );
        assert_eq!(
            normalize_postgres_url("postgresql://u:p@host/db"),
            "postgresql://u:p@host/db"
        );
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let store = memory_store().await;
        store.ensure_schema().await.expect("second run");
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = memory_store().await;
        let alice = store.create(new_user("alice", "a@x.com")).await.unwrap();
        let bob = store.create(new_user("bob", "b@x.com")).await.unwrap();
        assert!(alice.id > 0);
        assert!(bob.id > alice.id);
        assert!(!alice.admin);
        assert_eq!(alice.profile_pic_url, None);
    }

    #[tokio::test]
    async fn duplicate_username_is_conflict() {
        let store = memory_store().await;
        store.create(new_user("alice", "a@x.com")).await.unwrap();
        let err = store
            .create(new_user("alice", "other@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref f) if f == "username"));
        // the original record is untouched
        let kept = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(kept.email, "a@x.com");
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let store = memory_store().await;
        store.create(new_user("alice", "a@x.com")).await.unwrap();
        let err = store.create(new_user("bob", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref f) if f == "email"));
    }

    #[tokio::test]
    async fn find_by_username_misses_cleanly() {
        let store = memory_store().await;
        assert!(store.find_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn partial_update_touches_only_supplied_fields() {
        let store = memory_store().await;
        let alice = store.create(new_user("alice", "a@x.com")).await.unwrap();

        let updated = store
            .update(
                alice.id,
                UserPatch {
                    email: Some("new@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.email, "new@x.com");
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.password_hash, alice.password_hash);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found() {
        let store = memory_store().await;
        let err = store
            .update(
                4242,
                UserPatch {
                    email: Some("new@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn update_into_taken_username_is_conflict() {
        let store = memory_store().await;
        store.create(new_user("alice", "a@x.com")).await.unwrap();
        let bob = store.create(new_user("bob", "b@x.com")).await.unwrap();

        let err = store
            .update(
                bob.id,
                UserPatch {
                    username: Some("alice".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
