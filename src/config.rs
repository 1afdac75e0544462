use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

/// Which storage engine backs the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File(PathBuf),
    Postgres(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub jwt: JwtConfig,
    pub otp_ttl_minutes: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match var("STORE_BACKEND").as_deref().unwrap_or("memory") {
            "memory" => StoreBackend::Memory,
            "file" => StoreBackend::File(
                var("STORE_PATH")
                    .unwrap_or_else(|| "data/taskdeck.json".into())
                    .into(),
            ),
            "postgres" => StoreBackend::Postgres(
                var("DATABASE_URL")
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for the postgres store"))?,
            ),
            other => anyhow::bail!("unknown STORE_BACKEND {other:?}"),
        };

        let jwt = JwtConfig {
            secret: var("JWT_SECRET").ok_or_else(|| anyhow::anyhow!("JWT_SECRET is required"))?,
            issuer: var("JWT_ISSUER").unwrap_or_else(|| "taskdeck".into()),
            audience: var("JWT_AUDIENCE").unwrap_or_else(|| "taskdeck-users".into()),
            ttl_minutes: parse_or(&var, "JWT_TTL_MINUTES", 60 * 24 * 7),
            reset_ttl_minutes: parse_or(&var, "RESET_TOKEN_TTL_MINUTES", 15),
        };

        Ok(Self {
            store,
            jwt,
            otp_ttl_minutes: parse_or(&var, "OTP_TTL_MINUTES", 10),
        })
    }
}

fn parse_or<F, T>(var: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    var(key).and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_memory_store_and_week_long_tokens() {
        let cfg = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.jwt.ttl_minutes, 10_080);
        assert_eq!(cfg.jwt.reset_ttl_minutes, 15);
        assert_eq!(cfg.otp_ttl_minutes, 10);
        assert_eq!(cfg.jwt.issuer, "taskdeck");
    }

    #[test]
    fn requires_jwt_secret() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn postgres_store_needs_database_url() {
        let err = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "x"),
            ("STORE_BACKEND", "postgres"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));

        let cfg = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "x"),
            ("STORE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/taskdeck"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::Postgres("postgres://localhost/taskdeck".into())
        );
    }

    #[test]
    fn file_store_path_and_bad_numbers() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "x"),
            ("STORE_BACKEND", "file"),
            ("STORE_PATH", "/tmp/tasks.json"),
            ("OTP_TTL_MINUTES", "not-a-number"),
        ]))
        .unwrap();
        assert_eq!(cfg.store, StoreBackend::File("/tmp/tasks.json".into()));
        assert_eq!(cfg.otp_ttl_minutes, 10);
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "x"),
            ("STORE_BACKEND", "redis"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("redis"));
    }
}
