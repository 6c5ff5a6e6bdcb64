use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    backend::{EnrichmentClient, RssEntry},
    cache::CacheManager,
    error::AppResult,
    exports,
    index::FilmIndex,
    models::{BackendFilm, DiaryEntry, FilmRecord, ParsedFilm, ReviewEntry, WatchlistEntry},
    uri,
};

#[derive(Clone, Debug, Default)]
pub struct Uploads {
    pub diary: Option<String>,
    pub reviews: Option<String>,
    pub watchlist: Option<String>,
}

impl Uploads {
    fn texts(&self) -> impl Iterator<Item = &str> {
        [&self.diary, &self.reviews, &self.watchlist]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.texts().next().is_none()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub use_jobs: bool,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct EnrichmentSummary {
    pub urls: usize,
    pub cached: usize,
    pub enriched: usize,
    pub tmdb_errors: usize,
    pub batches: usize,
    pub alias_collisions: usize,
}

#[derive(Debug, Default)]
pub struct Session {
    pub index: FilmIndex,
    pub diary: Vec<DiaryEntry>,
    pub reviews: Vec<ReviewEntry>,
    pub watchlist: Vec<WatchlistEntry>,
    pub summary: EnrichmentSummary,
}

pub async fn build_session(
    backend: &EnrichmentClient,
    cache: &CacheManager,
    uploads: &Uploads,
    opts: PipelineOptions,
) -> AppResult<Session> {
    let diary = non_empty(&uploads.diary).map(exports::read_diary).transpose()?.unwrap_or_default();
    let reviews =
        non_empty(&uploads.reviews).map(exports::read_reviews).transpose()?.unwrap_or_default();
    let watchlist =
        non_empty(&uploads.watchlist).map(exports::read_watchlist).transpose()?.unwrap_or_default();

    debug!(diary = diary.len(), reviews = reviews.len(), watchlist = watchlist.len(), "read uploads");

    let (records, shortlinks, mut summary) = if opts.use_jobs {
        enrich_with_jobs(backend, cache, uploads).await?
    } else {
        let mut urls = Vec::new();
        let mut seen = HashSet::new();
        let mut films = HashMap::new();
        let mut shortlinks = HashMap::new();

        for text in uploads.texts() {
            let parsed = backend.parse_csv(text).await?;
            for url in parsed.urls {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
            shortlinks.extend(parsed.uri_map);
            films.extend(parsed.movie_index);
        }

        let (records, summary) = enrich_urls(backend, cache, &urls, &films, opts.batch_size).await?;
        (records, shortlinks, summary)
    };

    let index = FilmIndex::build(records, shortlinks);
    summary.alias_collisions = index.collisions();

    Ok(Session { index, diary, reviews, watchlist, summary })
}

/// Builds a session from the public RSS feed instead of an upload.
pub async fn build_rss_session(
    backend: &EnrichmentClient,
    cache: &CacheManager,
    username: &str,
    opts: PipelineOptions,
) -> AppResult<Session> {
    let entries = backend.fetch_rss(username).await?;
    let no_links = HashMap::new();

    let mut urls = Vec::new();
    let mut films = HashMap::new();
    for entry in &entries {
        let url = uri::canonicalize(&entry.uri, &no_links);
        if url.is_empty() || films.contains_key(&url) {
            continue;
        }
        films.insert(
            url.clone(),
            ParsedFilm { csv_name: Some(entry.name.clone()), csv_year: entry.year },
        );
        urls.push(url);
    }

    let (records, mut summary) = enrich_urls(backend, cache, &urls, &films, opts.batch_size).await?;
    let index = FilmIndex::build(records, no_links);
    summary.alias_collisions = index.collisions();

    let diary = entries.into_iter().map(rss_to_diary).collect();
    Ok(Session { index, diary, summary, ..Default::default() })
}

fn rss_to_diary(entry: RssEntry) -> DiaryEntry {
    let watched_date = entry.watched_date.as_deref().and_then(|d| d.trim().parse().ok());
    DiaryEntry {
        date: watched_date,
        name: entry.name,
        year: entry.year,
        uri: entry.uri,
        rating: entry.rating,
        rewatch: entry.rewatch,
        tags: Vec::new(),
        watched_date,
    }
}

/// Serves what it can from the cache and enriches the rest sequentially in
/// fixed-size batches. The first failed batch aborts the whole run.
pub async fn enrich_urls(
    backend: &EnrichmentClient,
    cache: &CacheManager,
    urls: &[String],
    films: &HashMap<String, ParsedFilm>,
    batch_size: usize,
) -> AppResult<(Vec<FilmRecord>, EnrichmentSummary)> {
    let cached = cache.get_records(urls).await?;
    let missing: Vec<String> = urls.iter().filter(|u| !cached.contains_key(*u)).cloned().collect();

    let mut summary =
        EnrichmentSummary { urls: urls.len(), cached: cached.len(), ..Default::default() };
    let mut records: Vec<FilmRecord> = urls.iter().filter_map(|u| cached.get(u).cloned()).collect();

    let batch_size = batch_size.max(1);
    let total_batches = missing.len().div_ceil(batch_size);
    debug!(urls = urls.len(), cached = cached.len(), missing = missing.len(), total_batches, "enriching");

    for (i, batch) in missing.chunks(batch_size).enumerate() {
        let entries = backend.enrich_batch(batch, films).await.inspect_err(|err| {
            warn!(batch = i + 1, total_batches, error = %err, "enrichment batch failed");
        })?;

        let fresh = ordered_records(batch, entries);
        let cacheable: Vec<FilmRecord> =
            fresh.iter().filter(|r| r.tmdb_error.is_none()).cloned().collect();
        cache.put_records(&cacheable).await?;

        summary.batches += 1;
        summary.enriched += fresh.len();
        summary.tmdb_errors += fresh.len() - cacheable.len();
        records.extend(fresh);

        info!(
            batch = i + 1,
            total_batches,
            done = summary.cached + summary.enriched,
            total = urls.len(),
            "enriched batch"
        );
    }

    Ok((records, summary))
}

async fn enrich_with_jobs(
    backend: &EnrichmentClient,
    cache: &CacheManager,
    uploads: &Uploads,
) -> AppResult<(Vec<FilmRecord>, HashMap<String, String>, EnrichmentSummary)> {
    let mut records = Vec::new();
    let mut shortlinks = HashMap::new();
    let mut summary = EnrichmentSummary::default();

    for text in uploads.texts() {
        let result = backend.run_job(text).await?;
        let mut keys: Vec<String> = result.movie_index.keys().cloned().collect();
        keys.sort();
        let fresh = ordered_records(&keys, result.movie_index);
        let cacheable: Vec<FilmRecord> =
            fresh.iter().filter(|r| r.tmdb_error.is_none()).cloned().collect();
        cache.put_records(&cacheable).await?;

        summary.batches += 1;
        summary.urls += fresh.len();
        summary.enriched += fresh.len();
        summary.tmdb_errors += fresh.len() - cacheable.len();
        shortlinks.extend(result.uri_map);
        records.extend(fresh);
    }

    Ok((records, shortlinks, summary))
}

fn ordered_records(order: &[String], mut entries: HashMap<String, BackendFilm>) -> Vec<FilmRecord> {
    let mut out = Vec::with_capacity(entries.len());
    for url in order {
        if let Some(entry) = entries.remove(url) {
            out.push(FilmRecord::from_backend(url.clone(), entry));
        }
    }
    let mut rest: Vec<(String, BackendFilm)> = entries.into_iter().collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    out.extend(rest.into_iter().map(|(k, e)| FilmRecord::from_backend(k, e)));
    out
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|t| !t.trim().is_empty())
}
