use anyhow::{Context, Result, bail};
use std::fmt;
use std::net::SocketAddr;
use tracing::warn;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_DB_URL: &str = "sqlite://rollcall.db?mode=rwc";
const DEFAULT_ISSUER: &str = "rollcall";
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
const DEV_JWT_SECRET: &str = "rollcall_default_jwt_secret_change_in_production";
pub const MIN_SECRET_LEN: usize = 32;

/// 全局配置，启动时读取一次
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub addr: SocketAddr,
    pub database_url: String,
    pub auth: AuthConfig,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub token_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("token_ttl", &self.token_ttl)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let addr_text = env_or("ROLLCALL_ADDR", DEFAULT_ADDR);
        let addr: SocketAddr = addr_text
            .parse()
            .with_context(|| format!("invalid ROLLCALL_ADDR: {addr_text}"))?;

        Ok(Self {
            addr,
            database_url: env_or("ROLLCALL_DB_URL", DEFAULT_DB_URL),
            auth: AuthConfig::from_env()?,
        })
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("ROLLCALL_JWT_SECRET").unwrap_or_else(|_| {
            warn!("Using default JWT secret. Set ROLLCALL_JWT_SECRET in production!");
            DEV_JWT_SECRET.to_string()
        });

        let ttl_text = env_or("ROLLCALL_TOKEN_TTL_SECS", &DEFAULT_TOKEN_TTL_SECS.to_string());
        let ttl_secs: i64 = ttl_text
            .parse()
            .with_context(|| format!("invalid ROLLCALL_TOKEN_TTL_SECS: {ttl_text}"))?;

        let cost_text = env_or("ROLLCALL_BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string());
        let bcrypt_cost: u32 = cost_text
            .parse()
            .with_context(|| format!("invalid ROLLCALL_BCRYPT_COST: {cost_text}"))?;

        Self::new(
            jwt_secret,
            env_or("ROLLCALL_JWT_ISSUER", DEFAULT_ISSUER),
            ttl_secs,
            bcrypt_cost,
        )
    }

    pub fn new(
        jwt_secret: String,
        issuer: String,
        ttl_secs: i64,
        bcrypt_cost: u32,
    ) -> Result<Self> {
        if jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT secret must be at least {MIN_SECRET_LEN} characters long");
        }
        if ttl_secs <= 0 {
            bail!("token lifetime must be positive, got {ttl_secs}s");
        }
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("bcrypt cost must be between 4 and 31, got {bcrypt_cost}");
        }

        Ok(Self {
            jwt_secret,
            issuer,
            token_ttl: chrono::Duration::seconds(ttl_secs),
            bcrypt_cost,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
