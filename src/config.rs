use std::path::PathBuf;

use anyhow::Context;
use axum::http::HeaderValue;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Connection settings for the S3-compatible media host.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL the uploaded objects are publicly reachable under.
    /// Falls back to `{endpoint}/{bucket}` when unset.
    pub public_url: Option<String>,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Enables the `Secure` attribute on session cookies.
    pub production: bool,
    pub cors_origin: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub jwt: JwtConfig,
    pub media: MediaConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "profile-auth".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "profile-auth-users".into()),
            ttl_minutes: parse_var("JWT_TTL_MINUTES").unwrap_or(15),
            refresh_ttl_minutes: parse_var("JWT_REFRESH_TTL_MINUTES").unwrap_or(60 * 24 * 14),
        };
        let media = MediaConfig {
            endpoint: std::env::var("MEDIA_ENDPOINT").context("MEDIA_ENDPOINT is not set")?,
            bucket: std::env::var("MEDIA_BUCKET").context("MEDIA_BUCKET is not set")?,
            access_key: std::env::var("MEDIA_ACCESS_KEY").context("MEDIA_ACCESS_KEY is not set")?,
            secret_key: std::env::var("MEDIA_SECRET_KEY").context("MEDIA_SECRET_KEY is not set")?,
            region: std::env::var("MEDIA_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url: std::env::var("MEDIA_PUBLIC_URL").ok().filter(|v| !v.is_empty()),
            folder: std::env::var("MEDIA_FOLDER").unwrap_or_else(|_| "uploads".into()),
        };

        let config = Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_var("APP_PORT").unwrap_or(8080),
            production: std::env::var("APP_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
            cors_origin: std::env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./public/temp")),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES").unwrap_or(10 * 1024 * 1024),
            jwt,
            media,
        };
        config.cors_origin_header()?;
        Ok(config)
    }

    pub fn cors_origin_header(&self) -> anyhow::Result<HeaderValue> {
        HeaderValue::from_str(&self.cors_origin)
            .with_context(|| format!("invalid CORS_ORIGIN {:?}", self.cors_origin))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}
