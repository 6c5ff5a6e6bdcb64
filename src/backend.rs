use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::models::{BackendFilm, ParsedFilm};

const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("enrichment backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("enrichment backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("enrichment job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },
}

/// Result of `POST /api/movies?parse_only=1`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ParseResponse {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, rename = "uriMap")]
    pub uri_map: HashMap<String, String>,
    #[serde(default, rename = "movieIndex")]
    pub movie_index: HashMap<String, ParsedFilm>,
}

#[derive(Debug, Serialize)]
struct EnrichRequest<'a> {
    urls: &'a [String],
    films: HashMap<&'a str, &'a ParsedFilm>,
}

#[derive(Debug, Default, Deserialize)]
struct EnrichResponse {
    #[serde(default, rename = "movieIndex")]
    movie_index: HashMap<String, BackendFilm>,
}

#[derive(Debug, Deserialize)]
struct JobStarted {
    #[serde(rename = "jobId")]
    job_id: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct JobStatus {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatus {
    fn is_done(&self) -> bool {
        matches!(self.status.as_str(), "done" | "complete" | "completed")
    }

    fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "error" | "failed")
    }
}

/// Result of a finished job: enriched entries plus the shortlink map.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct JobResult {
    #[serde(default, rename = "movieIndex")]
    pub movie_index: HashMap<String, BackendFilm>,
    #[serde(default, rename = "uriMap")]
    pub uri_map: HashMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RssEntry {
    #[serde(alias = "title")]
    pub name: String,
    #[serde(default)]
    pub year: Option<i16>,
    #[serde(alias = "link", alias = "letterboxd_uri")]
    pub uri: String,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default, alias = "watchedDate")]
    pub watched_date: Option<String>,
    #[serde(default)]
    pub rewatch: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RssResponse {
    #[serde(default)]
    entries: Vec<RssEntry>,
}

/// Client for the external enrichment service that resolves Letterboxd URIs
/// and attaches TMDb data.
pub struct EnrichmentClient {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl EnrichmentClient {
    pub fn new(client: reqwest::Client, base_url: String, rps: u32, poll_ms: u64) -> Self {
        let rps = NonZeroU32::new(rps.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(poll_ms.max(10)),
            limiter,
        }
    }

    pub async fn parse_csv(&self, csv: &str) -> Result<ParseResponse, BackendError> {
        let url = format!("{}/api/movies?parse_only=1", self.base_url);
        let req = self.client.post(url).header(CONTENT_TYPE, "text/csv").body(csv.to_string());
        let resp: ParseResponse = self.send(req).await?;
        debug!(urls = resp.urls.len(), shortlinks = resp.uri_map.len(), "parsed csv via backend");
        Ok(resp)
    }

    /// Enriches one batch of canonical URLs.
    pub async fn enrich_batch(
        &self,
        urls: &[String],
        films: &HashMap<String, ParsedFilm>,
    ) -> Result<HashMap<String, BackendFilm>, BackendError> {
        let url = format!("{}/api/movies?enrich=1", self.base_url);
        let body = EnrichRequest {
            urls,
            films: urls
                .iter()
                .filter_map(|u| films.get(u).map(|f| (u.as_str(), f)))
                .collect(),
        };
        let resp: EnrichResponse = self.send(self.client.post(url).json(&body)).await?;
        Ok(resp.movie_index)
    }

    pub async fn start_job(&self, csv: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/movies", self.base_url);
        let req = self.client.post(url).header(CONTENT_TYPE, "text/csv").body(csv.to_string());
        let started: JobStarted = self.send(req).await?;
        debug!(job_id = %started.job_id, "started enrichment job");
        Ok(started.job_id)
    }

    pub async fn job_status(&self, job_id: &str) -> Result<JobStatus, BackendError> {
        let url = format!("{}/api/movies/{}/status", self.base_url, urlencoding::encode(job_id));
        self.send(self.client.get(url)).await
    }

    pub async fn job_result(&self, job_id: &str) -> Result<JobResult, BackendError> {
        let url = format!("{}/api/movies/{}/result", self.base_url, urlencoding::encode(job_id));
        self.send(self.client.get(url)).await
    }

    /// Starts a job for the whole CSV and polls until it finishes.
    pub async fn run_job(&self, csv: &str) -> Result<JobResult, BackendError> {
        let job_id = self.start_job(csv).await?;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let status = self.job_status(&job_id).await?;
            if status.is_done() {
                break;
            }
            if status.is_failed() {
                return Err(BackendError::JobFailed {
                    job_id,
                    message: status.error.unwrap_or_else(|| "unknown error".to_string()),
                });
            }
            debug!(job_id = %job_id, status = %status.status, phase = ?status.phase, progress = ?status.progress, "job still running");
        }
        self.job_result(&job_id).await
    }

    pub async fn fetch_rss(&self, username: &str) -> Result<Vec<RssEntry>, BackendError> {
        let url = format!("{}/api/rss?username={}", self.base_url, urlencoding::encode(username));
        let resp: RssResponse = self.send(self.client.get(url)).await?;
        debug!(username = %username, entries = resp.entries.len(), "fetched rss preview");
        Ok(resp.entries)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, BackendError> {
        self.limiter.until_ready().await;

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            if body.len() > ERROR_BODY_LIMIT {
                let mut cut = ERROR_BODY_LIMIT;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(BackendError::Status { status: status.as_u16(), body });
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::{Value, json};

    /// Minimal stand-in for the enrichment service.
    #[derive(Clone, Default)]
    pub struct MockBackend {
        pub enrich_calls: Arc<AtomicUsize>,
        pub status_calls: Arc<AtomicUsize>,
        pub fail_enrich: bool,
    }

    impl MockBackend {
        pub async fn spawn(self) -> (String, Self) {
            let app = Router::new()
                .route("/api/movies", post(movies))
                .route("/api/movies/{id}/status", get(job_status))
                .route("/api/movies/{id}/result", get(job_result))
                .route("/api/rss", get(rss))
                .with_state(self.clone());
            let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
                .await
                .unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (format!("http://{addr}"), self)
        }

        pub fn enrich_calls(&self) -> usize {
            self.enrich_calls.load(Ordering::SeqCst)
        }
    }

    fn film_url(slug: &str) -> String {
        format!("https://letterboxd.com/film/{slug}/")
    }

    fn enriched(url: &str) -> Value {
        let slug = url.trim_end_matches('/').rsplit('/').next().unwrap_or_default().to_string();
        json!({
            "csv_name": slug,
            "csv_year": 1995,
            "tmdb_data": {
                "title": slug,
                "release_date": "1995-12-15",
                "runtime": 170,
                "original_language": "en",
                "genres": ["Crime"],
                "production_countries": {"codes": ["US"], "names": ["United States of America"]},
                "directors": [{"id": 1, "name": "Michael Mann", "gender": 2}],
                "writers": [{"id": 1, "name": "Michael Mann", "gender": 2, "job": "Screenplay"}]
            },
            "is_by_black_director": false,
            "is_in_criterion_collection": false
        })
    }

    async fn movies(
        State(mock): State<MockBackend>,
        Query(q): Query<std::collections::HashMap<String, String>>,
        body: String,
    ) -> Result<Json<Value>, StatusCode> {
        if q.contains_key("parse_only") {
            let mut urls = Vec::new();
            let mut uri_map = serde_json::Map::new();
            let mut index = serde_json::Map::new();
            for line in body.lines().skip(1) {
                let cols: Vec<&str> = line.split(',').collect();
                let Some(uri) = cols.get(3) else { continue };
                let slug = cols[1].to_ascii_lowercase().replace(' ', "-");
                let url = film_url(&slug);
                if uri.contains("boxd.it") {
                    uri_map.insert(uri.to_string(), json!(url));
                }
                index.insert(url.clone(), json!({"csv_name": cols[1], "csv_year": cols[2]}));
                if !urls.contains(&url) {
                    urls.push(url);
                }
            }
            return Ok(Json(json!({"urls": urls, "uriMap": uri_map, "movieIndex": index})));
        }
        if q.contains_key("enrich") {
            mock.enrich_calls.fetch_add(1, Ordering::SeqCst);
            if mock.fail_enrich {
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
            let req: Value = serde_json::from_str(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
            let mut index = serde_json::Map::new();
            for url in req["urls"].as_array().cloned().unwrap_or_default() {
                let url = url.as_str().unwrap_or_default().to_string();
                index.insert(url.clone(), enriched(&url));
            }
            return Ok(Json(json!({"movieIndex": index})));
        }
        Ok(Json(json!({"jobId": "job-1"})))
    }

    async fn job_status(State(mock): State<MockBackend>, Path(_id): Path<String>) -> Json<Value> {
        let n = mock.status_calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Json(json!({"status": "running", "progress": 0.5, "phase": "tmdb"}))
        } else {
            Json(json!({"status": "done"}))
        }
    }

    async fn job_result(Path(_id): Path<String>) -> Json<Value> {
        let url = film_url("heat");
        let mut index = serde_json::Map::new();
        index.insert(url.clone(), enriched(&url));
        Json(json!({
            "movieIndex": index,
            "uriMap": {"https://boxd.it/aaa": url}
        }))
    }

    async fn rss(Query(q): Query<std::collections::HashMap<String, String>>) -> Json<Value> {
        let user = q.get("username").cloned().unwrap_or_default();
        Json(json!({"entries": [
            {"title": "Heat", "year": 1995, "link": format!("https://letterboxd.com/{user}/film/heat/"), "rating": 4.5, "watchedDate": "2024-03-01"}
        ]}))
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::MockBackend, *};

    fn client(base: String) -> EnrichmentClient {
        EnrichmentClient::new(reqwest::Client::new(), base, 100, 10)
    }

    #[tokio::test]
    async fn parse_then_enrich() {
        let (base, _mock) = MockBackend::default().spawn().await;
        let client = client(base);

        let parsed = client
            .parse_csv("Date,Name,Year,Letterboxd URI\n2024-01-01,Heat,1995,https://boxd.it/aaa\n")
            .await
            .unwrap();
        assert_eq!(parsed.urls, vec!["https://letterboxd.com/film/heat/".to_string()]);
        assert_eq!(
            parsed.uri_map.get("https://boxd.it/aaa").map(String::as_str),
            Some("https://letterboxd.com/film/heat/")
        );
        assert_eq!(parsed.movie_index["https://letterboxd.com/film/heat/"].csv_year, Some(1995));

        let enriched = client.enrich_batch(&parsed.urls, &parsed.movie_index).await.unwrap();
        let heat = &enriched["https://letterboxd.com/film/heat/"];
        assert_eq!(heat.tmdb_data.as_ref().and_then(|t| t.runtime), Some(170));
    }

    #[tokio::test]
    async fn failed_status_is_reported() {
        let (base, _mock) = MockBackend { fail_enrich: true, ..Default::default() }.spawn().await;
        let err = client(base)
            .enrich_batch(&["https://letterboxd.com/film/x/".to_string()], &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn job_flow_polls_until_done() {
        let (base, mock) = MockBackend::default().spawn().await;
        let result = client(base).run_job("csv").await.unwrap();
        assert_eq!(result.movie_index.len(), 1);
        assert_eq!(result.uri_map.len(), 1);
        assert!(mock.status_calls.load(std::sync::atomic::Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn rss_entries_accept_feed_field_names() {
        let (base, _mock) = MockBackend::default().spawn().await;
        let entries = client(base).fetch_rss("kat").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Heat");
        assert_eq!(entries[0].uri, "https://letterboxd.com/kat/film/heat/");
        assert_eq!(entries[0].watched_date.as_deref(), Some("2024-03-01"));
    }
}
