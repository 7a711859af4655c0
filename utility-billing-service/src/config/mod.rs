//! Configuration module for utility-billing-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub tables: TableNames,
    pub ticket_update_max_attempts: u32,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub enum StoreConfig {
    Memory,
    Supabase(SupabaseConfig),
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: Secret<String>,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

#[derive(Debug, Clone)]
pub enum StorageConfig {
    Local { path: PathBuf, public_url: String },
    Supabase { supabase: SupabaseConfig, bucket: String },
}

#[derive(Debug, Clone)]
pub struct TableNames {
    pub customers: String,
    pub bills: String,
    pub payments: String,
    pub tickets: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            customers: "customers_tb".to_string(),
            bills: "bills".to_string(),
            payments: "payments".to_string(),
            tickets: "tickets_tb".to_string(),
        }
    }
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_TICKET_UPDATE_MAX_ATTEMPTS: u32 = 5;

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let store = match env_or("STORE_BACKEND", "supabase").to_lowercase().as_str() {
            "memory" => StoreConfig::Memory,
            "supabase" => StoreConfig::Supabase(SupabaseConfig::from_env()?),
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown STORE_BACKEND '{}'",
                    other
                )))
            }
        };

        let storage = match env_or("STORAGE_BACKEND", "local").to_lowercase().as_str() {
            "local" => StorageConfig::Local {
                path: PathBuf::from(env_or("STORAGE_LOCAL_PATH", "./uploads")),
                public_url: env_or("STORAGE_PUBLIC_URL", "http://localhost:8080/uploads"),
            },
            "supabase" => StorageConfig::Supabase {
                supabase: SupabaseConfig::from_env()?,
                bucket: env_or("SUPABASE_STORAGE_BUCKET", "uploads"),
            },
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown STORAGE_BACKEND '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            common,
            service_name: env_or("SERVICE_NAME", "utility-billing-service"),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env_or("LOG_LEVEL", "info"),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            store,
            storage,
            tables: TableNames {
                customers: env_or("TABLE_CUSTOMERS", "customers_tb"),
                bills: env_or("TABLE_BILLS", "bills"),
                payments: env_or("TABLE_PAYMENTS", "payments"),
                tickets: env_or("TABLE_TICKETS", "tickets_tb"),
            },
            ticket_update_max_attempts: parsed_or(
                "TICKET_UPDATE_MAX_ATTEMPTS",
                DEFAULT_TICKET_UPDATE_MAX_ATTEMPTS,
            ),
            max_upload_bytes: parsed_or("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        })
    }

    /// In-memory store, local uploads under `upload_dir`. Used by tests and
    /// local development.
    pub fn in_memory(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            common: core_config::Config {
                port: 0,
                ..Default::default()
            },
            service_name: "utility-billing-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            store: StoreConfig::Memory,
            storage: StorageConfig::Local {
                path: upload_dir.into(),
                public_url: "http://localhost/uploads".to_string(),
            },
            tables: TableNames::default(),
            ticket_update_max_attempts: DEFAULT_TICKET_UPDATE_MAX_ATTEMPTS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl SupabaseConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self {
            url: env::var("SUPABASE_URL")
                .map_err(|_| AppError::ConfigError(anyhow::anyhow!("SUPABASE_URL is required")))?
                .trim_end_matches('/')
                .to_string(),
            service_role_key: Secret::new(env::var("SUPABASE_SERVICE_ROLE_KEY").map_err(
                |_| AppError::ConfigError(anyhow::anyhow!("SUPABASE_SERVICE_ROLE_KEY is required")),
            )?),
            timeout_secs: parsed_or("SUPABASE_API_TIMEOUT", 30),
            retry_attempts: parsed_or("SUPABASE_RETRY_ATTEMPTS", 3),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_in_memory_defaults() {
        let config = BillingConfig::in_memory("/tmp/uploads");
        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.tables.tickets, "tickets_tb");
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.ticket_update_max_attempts, 5);
    }

    #[test]
    fn test_secret_key_is_redacted_in_debug() {
        let supabase = SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            service_role_key: Secret::new("super-secret-key".to_string()),
            timeout_secs: 30,
            retry_attempts: 3,
        };
        assert!(!format!("{:?}", supabase).contains("super-secret-key"));
        assert_eq!(supabase.service_role_key.expose_secret(), "super-secret-key");
    }
}
