use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_ROOT_URL: &str = "https://blog.griddynamics.com";
const DEFAULT_DB_PATH: &str = "data/database.db";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Site root; relative hrefs are appended to it verbatim.
    pub root_url: String,
    pub database_path: PathBuf,
    /// Max fetches in flight.
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub log_level: String,
}

impl Settings {
    /// Defaults, then `grid_blog_crawl.toml` if present, then `GRID_*` env vars.
    pub fn load() -> Result<Self> {
        Self::builder()?
            .add_source(File::with_name("grid_blog_crawl").required(false))
            .add_source(Environment::with_prefix("GRID").try_parsing(true))
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("root_url", DEFAULT_ROOT_URL)?
            .set_default("database_path", DEFAULT_DB_PATH)?
            .set_default("concurrency", 8_i64)?
            .set_default("max_retries", 3_i64)?
            .set_default("backoff_ms", 2000_i64)?
            .set_default("timeout_secs", 30_i64)?
            .set_default("user_agent", concat!("grid_blog_crawl/", env!("CARGO_PKG_VERSION")))?
            .set_default("log_level", "info")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let s: Settings = Settings::builder()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.root_url, DEFAULT_ROOT_URL);
        assert_eq!(s.database_path, PathBuf::from("data/database.db"));
        assert_eq!(s.concurrency, 8);
        assert_eq!(s.max_retries, 3);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn overrides_win_over_defaults() {
        let s: Settings = Settings::builder()
            .unwrap()
            .set_override("root_url", "http://localhost:8080")
            .unwrap()
            .set_override("concurrency", 2_i64)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.root_url, "http://localhost:8080");
        assert_eq!(s.concurrency, 2);
    }
}
