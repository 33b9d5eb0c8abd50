use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    /// None disables file uploads.
    pub s3: Option<S3Config>,
    pub host: String,
    pub port: u16,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let backend = match var("STORE_BACKEND") {
            Some(v) => v.parse()?,
            None => StoreBackend::Postgres,
        };
        let database_url = var("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL is required for the postgres backend");
        }

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "ims".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "ims-users".into()),
            ttl_minutes: parsed_or("JWT_TTL_MINUTES", 60),
        };

        let s3 = match (
            var("S3_ENDPOINT"),
            var("S3_BUCKET"),
            var("S3_ACCESS_KEY"),
            var("S3_SECRET_KEY"),
        ) {
            (Some(endpoint), Some(bucket), Some(access_key), Some(secret_key)) => Some(S3Config {
                endpoint,
                bucket,
                access_key,
                secret_key,
                region: var("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
            }),
            _ => None,
        };

        Ok(Self {
            backend,
            database_url,
            database_max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
            jwt,
            s3,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed_or("APP_PORT", 8080),
        })
    }

    /// Settings for tests: memory backend, no blob storage.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            s3: None,
            host: "127.0.0.1".into(),
            port: 0,
        }
    }
}
