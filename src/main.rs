mod backend;
mod cache;
mod config;
mod countries;
mod curated;
mod db;
mod double_feature;
mod entities;
mod error;
mod exports;
mod index;
mod models;
mod processor;
mod routes;
mod stats;
mod templates;
mod uri;

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    backend::EnrichmentClient, cache::CacheManager, config::Config, curated::CuratedCorpus,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: CacheManager,
    pub backend: Arc<EnrichmentClient>,
    pub curated: Arc<CuratedCorpus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,letterbddy=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("build-curated") {
        let manifest = args.next().context("usage: letterbddy build-curated <manifest.json>")?;
        curated::build_corpus_from_manifest(Path::new(&manifest), &config.curated_fallback_path)
            .await?;
        return Ok(());
    }

    let http = reqwest::Client::builder()
        .user_agent("letterbddy/0.1")
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let cache = CacheManager::new(db, config.cache_ttl_days);

    let backend = EnrichmentClient::new(
        http,
        config.enrich_base_url.clone(),
        config.enrich_rps,
        config.enrich_poll_ms,
    );

    let curated = CuratedCorpus::load(&config.curated_path, &config.curated_fallback_path).await?;

    let state = Arc::new(AppState {
        config: config.clone(),
        cache,
        backend: Arc::new(backend),
        curated: Arc::new(curated),
    });

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
