use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub cache_ttl_days: i64,
    pub enrich_base_url: String,
    pub enrich_batch_size: usize,
    pub enrich_rps: u32,
    pub enrich_use_jobs: bool,
    pub enrich_poll_ms: u64,
    pub http_timeout_secs: u64,
    pub curated_path: PathBuf,
    pub curated_fallback_path: PathBuf,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port: u16 =
            std::env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().context("PORT")?;

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://letterbddy.db?mode=rwc".to_string());

        let cache_ttl_days: i64 =
            std::env::var("CACHE_TTL_DAYS").ok().and_then(|s| s.parse().ok()).unwrap_or(30);

        let enrich_base_url = std::env::var("ENRICH_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3001".to_string());

        let enrich_batch_size: usize =
            std::env::var("ENRICH_BATCH_SIZE").ok().and_then(|s| s.parse().ok()).unwrap_or(10);

        let enrich_rps: u32 =
            std::env::var("ENRICH_RPS").ok().and_then(|s| s.parse().ok()).unwrap_or(4);

        let enrich_use_jobs = std::env::var("ENRICH_USE_JOBS")
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let enrich_poll_ms: u64 =
            std::env::var("ENRICH_POLL_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(1000);

        let http_timeout_secs: u64 =
            std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|s| s.parse().ok()).unwrap_or(60);

        let curated_path = std::env::var("CURATED_PATH")
            .unwrap_or_else(|_| "public/curated-lists-enriched.json".to_string());
        let curated_fallback_path = std::env::var("CURATED_FALLBACK_PATH")
            .unwrap_or_else(|_| "public/curated-lists.json".to_string());

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            database_url,
            cache_ttl_days,
            enrich_base_url,
            enrich_batch_size: enrich_batch_size.max(1),
            enrich_rps,
            enrich_use_jobs,
            enrich_poll_ms,
            http_timeout_secs,
            curated_path: curated_path.into(),
            curated_fallback_path: curated_fallback_path.into(),
        })
    }
}
