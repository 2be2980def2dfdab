use serde::Deserialize;

/// Default browser origins allowed to call the API.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = [
    "https://anbeatrizduarte.github.io",
    "http://localhost:5173",
];

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Optional S3/MinIO settings; uploads fall back to an ephemeral
/// acknowledgement when these are not configured.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub s3: Option<S3Config>,
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| {
                tracing::warn!("JWT_SECRET not set, using a development secret");
                "letterplay-dev-secret".into()
            }),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "letterplay".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "letterplay-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
        };

        let s3 = match (
            std::env::var("S3_ENDPOINT"),
            std::env::var("S3_BUCKET"),
            std::env::var("S3_ACCESS_KEY"),
            std::env::var("S3_SECRET_KEY"),
        ) {
            (Ok(endpoint), Ok(bucket), Ok(access_key), Ok(secret_key)) => Some(S3Config {
                endpoint,
                bucket,
                access_key,
                secret_key,
            }),
            _ => None,
        };

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_else(|_| {
                DEFAULT_ALLOWED_ORIGINS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        Ok(Self {
            database_url,
            jwt,
            s3,
            allowed_origins,
        })
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
