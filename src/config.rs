use crate::{
    gateway::cache::{CacheLimits, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTI_SECS},
    services::upload::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE, UploadPolicy},
};
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub public_origin: String,
    pub chunk_size: usize,
    pub max_file_size: u64,
    pub allowed_types: Vec<String>,
    pub share_on_upload: bool,
    pub cache_capacity: u64,
    pub cache_tti_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Chunked file store with share links")]
pub struct Args {
    /// Host to bind to (overrides CHUNK_SHARE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHUNK_SHARE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where chunk payloads are stored (overrides CHUNK_SHARE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides CHUNK_SHARE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Origin used to build share links (overrides CHUNK_SHARE_PUBLIC_ORIGIN)
    #[arg(long)]
    pub public_origin: Option<String>,

    /// Chunk size in bytes (overrides CHUNK_SHARE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Largest accepted upload in bytes (overrides CHUNK_SHARE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Comma-separated accepted MIME prefixes (overrides CHUNK_SHARE_ALLOWED_TYPES)
    #[arg(long)]
    pub allowed_types: Option<String>,

    /// Publish uploads right after finalizing (overrides CHUNK_SHARE_SHARE_ON_UPLOAD)
    #[arg(long)]
    pub share_on_upload: Option<bool>,

    /// Entries kept per cached lookup kind (overrides CHUNK_SHARE_CACHE_CAPACITY)
    #[arg(long)]
    pub cache_capacity: Option<u64>,

    /// Seconds an unused cache entry survives (overrides CHUNK_SHARE_CACHE_TTI_SECS)
    #[arg(long)]
    pub cache_tti_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Parse an optional environment value, failing loudly on garbage.
fn env_parsed<T>(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    key: &str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_string(
    lookup: &impl Fn(&str) -> Result<String, env::VarError>,
    key: &str,
    default: &str,
) -> String {
    lookup(key).unwrap_or_else(|_| default.into())
}

fn split_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        Self::resolve(Args::parse(), |key| env::var(key))
    }

    /// Merge CLI args over values from `lookup` over defaults.
    pub fn resolve(
        args: Args,
        lookup: impl Fn(&str) -> Result<String, env::VarError>,
    ) -> Result<(Self, bool)> {
        // --- Environment fallback ---
        let env_host = env_string(&lookup, "CHUNK_SHARE_HOST", "0.0.0.0");
        let env_port = env_parsed(&lookup, "CHUNK_SHARE_PORT", 3000u16)?;
        let env_storage = env_string(&lookup, "CHUNK_SHARE_STORAGE_DIR", "./data/chunks");
        let env_db = env_string(
            &lookup,
            "CHUNK_SHARE_DATABASE_URL",
            "sqlite://./data/meta/chunk_share.db",
        );
        let env_origin = env_string(
            &lookup,
            "CHUNK_SHARE_PUBLIC_ORIGIN",
            "http://localhost:3000",
        );
        let env_chunk = env_parsed(&lookup, "CHUNK_SHARE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_max = env_parsed(&lookup, "CHUNK_SHARE_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let env_types = env_string(&lookup, "CHUNK_SHARE_ALLOWED_TYPES", "image/,video/");
        let env_share = env_parsed(&lookup, "CHUNK_SHARE_SHARE_ON_UPLOAD", true)?;
        let env_cache =
            env_parsed(&lookup, "CHUNK_SHARE_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY)?;
        let env_tti = env_parsed(&lookup, "CHUNK_SHARE_CACHE_TTI_SECS", DEFAULT_CACHE_TTI_SECS)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_origin: args.public_origin.unwrap_or(env_origin),
            chunk_size: args.chunk_size.unwrap_or(env_chunk),
            max_file_size: args.max_file_size.unwrap_or(env_max),
            allowed_types: split_types(&args.allowed_types.unwrap_or(env_types)),
            share_on_upload: args.share_on_upload.unwrap_or(env_share),
            cache_capacity: args.cache_capacity.unwrap_or(env_cache),
            cache_tti_secs: args.cache_tti_secs.unwrap_or(env_tti),
        };

        if cfg.chunk_size == 0 {
            bail!("chunk size must be positive");
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_file_size: self.max_file_size,
            allowed_type_prefixes: self.allowed_types.clone(),
            chunk_size: self.chunk_size,
        }
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_entries: self.cache_capacity,
            time_to_idle: Duration::from_secs(self.cache_tti_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(
        vars: &[(&str, &str)],
    ) -> impl Fn(&str) -> Result<String, env::VarError> + use<> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let (cfg, migrate) = AppConfig::resolve(Args::default(), lookup_from(&[])).unwrap();
        assert!(!migrate);
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.chunk_size, 500_000);
        assert_eq!(cfg.max_file_size, 2000 * 1024);
        assert_eq!(cfg.allowed_types, vec!["image/", "video/"]);
        assert!(cfg.share_on_upload);
        assert_eq!(cfg.cache_limits(), CacheLimits::default());
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(9000),
            allowed_types: Some("image/png, ,video/".into()),
            ..Args::default()
        };
        let lookup = lookup_from(&[
            ("CHUNK_SHARE_PORT", "8000"),
            ("CHUNK_SHARE_CHUNK_SIZE", "1024"),
            ("CHUNK_SHARE_SHARE_ON_UPLOAD", "false"),
            ("CHUNK_SHARE_CACHE_CAPACITY", "64"),
        ]);
        let (cfg, _) = AppConfig::resolve(args, lookup).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.chunk_size, 1024);
        assert_eq!(cfg.allowed_types, vec!["image/png", "video/"]);
        assert!(!cfg.share_on_upload);
        assert_eq!(cfg.upload_policy().chunk_size, 1024);
        assert_eq!(cfg.cache_limits().max_entries, 64);
    }

    #[test]
    fn bad_numbers_are_errors() {
        let lookup = lookup_from(&[("CHUNK_SHARE_PORT", "eighty")]);
        let err = AppConfig::resolve(Args::default(), lookup).unwrap_err();
        assert!(err.to_string().contains("CHUNK_SHARE_PORT"));

        let zero = lookup_from(&[("CHUNK_SHARE_CHUNK_SIZE", "0")]);
        assert!(AppConfig::resolve(Args::default(), zero).is_err());
    }
}
