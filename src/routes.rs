use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::{
    AppState,
    curated::{self, BuilderFilters, BuilderPick, Library},
    double_feature::{self, DoubleFeaturePair, PairMode, PairSource, PairingOptions},
    error::{AppError, AppResult},
    processor::{self, EnrichmentSummary, PipelineOptions, Session, Uploads},
    stats::{self, DiaryStats, ReviewStats, WatchlistStats},
    templates,
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/dashboard", post(dashboard))
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/double-features", post(double_features))
        .route("/api/watchlist-builder", post(watchlist_builder))
        .route("/api/curated/lists", get(curated_lists))
        .route("/api/rss", get(rss))
        .route("/api/share", post(create_share))
        .route("/api/share/{token}", get(get_share))
        .with_state(state)
}

pub async fn index() -> Html<String> {
    Html(templates::index_page())
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// CSV texts as posted by the JSON API. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UploadTexts {
    diary: Option<String>,
    reviews: Option<String>,
    watchlist: Option<String>,
}

impl From<UploadTexts> for Uploads {
    fn from(t: UploadTexts) -> Self {
        Uploads { diary: t.diary, reviews: t.reviews, watchlist: t.watchlist }
    }
}

fn pipeline_options(state: &AppState) -> PipelineOptions {
    PipelineOptions {
        batch_size: state.config.enrich_batch_size,
        use_jobs: state.config.enrich_use_jobs,
    }
}

async fn load_session(state: &AppState, uploads: &Uploads) -> AppResult<Session> {
    if uploads.is_empty() {
        return Ok(Session::default());
    }
    processor::build_session(&state.backend, &state.cache, uploads, pipeline_options(state)).await
}

fn today() -> jiff::civil::Date {
    jiff::Zoned::now().date()
}

fn fresh_seed() -> u64 {
    jiff::Timestamp::now().as_millisecond().unsigned_abs()
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(flatten)]
    uploads: UploadTexts,
    #[serde(default)]
    year: Option<i16>,
}

#[derive(Debug, Serialize)]
pub struct Analysis {
    pub summary: EnrichmentSummary,
    pub diary: DiaryStats,
    pub reviews: ReviewStats,
    pub watchlist: WatchlistStats,
}

fn analyse(session: &Session, year: Option<i16>) -> Analysis {
    Analysis {
        summary: session.summary.clone(),
        diary: stats::diary_stats(&session.diary, &session.index, year),
        reviews: stats::review_stats(&session.reviews),
        watchlist: stats::watchlist_stats(&session.watchlist, &session.index),
    }
}

pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> AppResult<Json<Analysis>> {
    let uploads: Uploads = req.uploads.into();
    if uploads.is_empty() {
        return Err(AppError::bad_request("upload at least one CSV export"));
    }

    let session = load_session(&state, &uploads).await?;
    info!(films = session.index.len(), "analysed uploads");
    Ok(Json(analyse(&session, req.year)))
}

#[derive(Debug, Deserialize)]
pub struct DoubleFeatureRequest {
    #[serde(flatten)]
    uploads: UploadTexts,
    #[serde(default)]
    mode: PairMode,
    #[serde(default)]
    source: PairSource,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default)]
    exclude_seen: bool,
}

#[derive(Debug, Serialize)]
pub struct DoubleFeatureResponse {
    pub pairs: Vec<DoubleFeaturePair>,
    pub seed: u64,
    pub message: Option<&'static str>,
}

fn double_features_for(
    state: &AppState,
    session: &Session,
    mode: PairMode,
    source: PairSource,
    seed: u64,
    exclude_seen: bool,
) -> DoubleFeatureResponse {
    let library = Library::from_session(session);
    let pool = double_feature::build_pool(
        source,
        &state.curated.films,
        &session.watchlist,
        &session.index,
        &library,
        exclude_seen,
    );
    let opts = PairingOptions { mode, source, seed, today: today() };
    let pairs = double_feature::pair_films(&pool, &opts);
    let message = pairs.is_empty().then_some(double_feature::NOT_ENOUGH_MATCHES);
    DoubleFeatureResponse { pairs, seed, message }
}

pub async fn double_features(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DoubleFeatureRequest>,
) -> AppResult<Json<DoubleFeatureResponse>> {
    let uploads: Uploads = req.uploads.into();
    let has_watchlist = uploads.watchlist.as_deref().is_some_and(|w| !w.trim().is_empty());
    if req.source == PairSource::Watchlist && !has_watchlist {
        return Err(AppError::bad_request("the watchlist source needs a watchlist export"));
    }

    let session = load_session(&state, &uploads).await?;
    let seed = req.seed.unwrap_or_else(fresh_seed);
    Ok(Json(double_features_for(&state, &session, req.mode, req.source, seed, req.exclude_seen)))
}

#[derive(Debug, Deserialize)]
pub struct WatchlistBuilderRequest {
    #[serde(flatten)]
    uploads: UploadTexts,
    #[serde(flatten)]
    filters: BuilderFilters,
}

pub async fn watchlist_builder(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchlistBuilderRequest>,
) -> AppResult<Json<Value>> {
    let session = load_session(&state, &req.uploads.into()).await?;
    let library = Library::from_session(&session);
    let films: Vec<BuilderPick> = curated::build_watchlist(&state.curated, &req.filters, &library);
    Ok(Json(json!({ "films": films })))
}

pub async fn curated_lists(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "lists": state.curated.lists,
        "films": state.curated.films.len(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RssQuery {
    username: String,
    #[serde(default)]
    year: Option<i16>,
}

fn valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub async fn rss(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RssQuery>,
) -> AppResult<Json<Value>> {
    let username = q.username.trim();
    if !valid_username(username) {
        return Err(AppError::bad_request("a valid Letterboxd username is required"));
    }

    let session =
        processor::build_rss_session(&state.backend, &state.cache, username, pipeline_options(&state))
            .await?;

    Ok(Json(json!({
        "username": username,
        "entries": session.diary.len(),
        "summary": session.summary,
        "diary": stats::diary_stats(&session.diary, &session.index, q.year),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    #[serde(default)]
    username: Option<String>,
    stats: Value,
}

pub async fn create_share(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ShareRequest>,
) -> AppResult<Json<Value>> {
    if !req.stats.is_object() {
        return Err(AppError::bad_request("stats must be a JSON object"));
    }

    let token = uuid::Uuid::new_v4().simple().to_string();
    let username = req.username.as_deref().map(str::trim).filter(|u| !u.is_empty());
    state.cache.put_share(&token, username, &req.stats).await?;
    info!(%token, "stored shared snapshot");
    Ok(Json(json!({ "token": token })))
}

pub async fn get_share(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> AppResult<Json<Value>> {
    let snapshot = state
        .cache
        .get_share(&token)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no shared stats for {token}")))?;
    Ok(Json(serde_json::to_value(snapshot)?))
}

#[derive(Debug, Default)]
struct DashboardForm {
    uploads: Uploads,
    username: Option<String>,
    mode: PairMode,
    source: PairSource,
    seed: Option<u64>,
    year: Option<i16>,
}

async fn read_dashboard_form(mut multipart: Multipart) -> AppResult<DashboardForm> {
    let mut form = DashboardForm::default();

    while let Some(field) =
        multipart.next_field().await.map_err(|e| AppError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let text = field.text().await.map_err(|e| AppError::bad_request(e.body_text()))?;
        let value = text.trim();
        if value.is_empty() {
            continue;
        }

        match name.as_str() {
            "diary" => form.uploads.diary = Some(text),
            "reviews" => form.uploads.reviews = Some(text),
            "watchlist" => form.uploads.watchlist = Some(text),
            "username" => form.username = Some(value.to_string()),
            "mode" => {
                form.mode = PairMode::from_slug(value)
                    .ok_or_else(|| AppError::bad_request(format!("unknown mode {value}")))?;
            },
            "source" if value == "watchlist" => form.source = PairSource::Watchlist,
            "seed" => form.seed = value.parse().ok(),
            "year" => form.year = value.parse().ok(),
            _ => {},
        }
    }

    Ok(form)
}

pub async fn dashboard(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let result = async {
        let form = read_dashboard_form(multipart).await?;

        let session = match (&form.username, form.uploads.is_empty()) {
            (Some(username), true) => {
                if !valid_username(username) {
                    return Err(AppError::bad_request("a valid Letterboxd username is required"));
                }
                processor::build_rss_session(
                    &state.backend,
                    &state.cache,
                    username,
                    pipeline_options(&state),
                )
                .await?
            },
            (None, true) => {
                return Err(AppError::bad_request("upload a diary export or enter a username"));
            },
            _ => load_session(&state, &form.uploads).await?,
        };

        let analysis = analyse(&session, form.year);
        let source = if session.watchlist.is_empty() { PairSource::Curated } else { form.source };
        let seed = form.seed.unwrap_or_else(fresh_seed);
        let features = double_features_for(&state, &session, form.mode, source, seed, true);

        Ok::<_, AppError>(templates::dashboard_page(&templates::Dashboard {
            username: form.username.as_deref().filter(|_| form.uploads.is_empty()),
            analysis: &analysis,
            features: &features,
            mode: form.mode,
            source,
        }))
    }
    .await;

    match result {
        Ok(html) => Html(html).into_response(),
        Err(err) => (err.status(), Html(templates::error_page(&err.to_string()))).into_response(),
    }
}
