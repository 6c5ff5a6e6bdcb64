use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{AppError, AppResult},
    models::TmdbData,
    processor::Session,
    uri,
};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;
const CRITERION_LIST: &str = "criterion";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CuratedList {
    pub name: String,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub ranked: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CuratedFilm {
    pub name: String,
    #[serde(default)]
    pub year: Option<i16>,
    pub url: String,
    #[serde(default, rename = "listCount")]
    pub list_count: usize,
    /// List key -> position on that list.
    #[serde(default)]
    pub lists: BTreeMap<String, u32>,
    #[serde(default)]
    pub tmdb_data: Option<TmdbData>,
    #[serde(default)]
    pub is_by_black_director: bool,
    #[serde(default)]
    pub tmdb_error: Option<String>,
}

impl CuratedFilm {
    pub fn runtime(&self) -> Option<u32> {
        self.tmdb_data.as_ref().and_then(|t| t.runtime)
    }

    pub fn directed_by_woman(&self) -> Option<bool> {
        let tmdb = self.tmdb_data.as_ref()?;
        tmdb.directed_by_woman.or_else(|| {
            (!tmdb.directors.is_empty()).then(|| tmdb.directors.iter().any(|d| d.is_woman()))
        })
    }

    pub fn is_american(&self) -> Option<bool> {
        let tmdb = self.tmdb_data.as_ref()?;
        tmdb.is_american.or_else(|| {
            let codes = &tmdb.production_countries.codes;
            (!codes.is_empty()).then(|| codes.iter().any(|c| c == "US"))
        })
    }

    pub fn is_english(&self) -> Option<bool> {
        let tmdb = self.tmdb_data.as_ref()?;
        tmdb.is_english.or_else(|| tmdb.original_language.as_deref().map(|l| l == "en"))
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CuratedCorpus {
    #[serde(default)]
    pub lists: BTreeMap<String, CuratedList>,
    #[serde(default)]
    pub films: Vec<CuratedFilm>,
}

impl CuratedCorpus {
    /// Reads the enriched corpus, falling back to the plain one, and finally to
    /// an empty corpus.
    pub async fn load(primary: &Path, fallback: &Path) -> AppResult<Self> {
        for path in [primary, fallback] {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    let corpus: CuratedCorpus = serde_json::from_str(&text)?;
                    info!(path = %path.display(), lists = corpus.lists.len(), films = corpus.films.len(), "loaded curated corpus");
                    return Ok(corpus);
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "curated corpus unavailable");
                },
            }
        }
        Ok(Self::default())
    }
}

/// One Letterboxd list export feeding the corpus.
#[derive(Clone, Debug, Deserialize)]
pub struct ListSource {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub ranked: bool,
    /// Relative paths resolve against the manifest's directory.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ListRow {
    #[serde(rename = "Position")]
    position: u32,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Year", default)]
    year: Option<i16>,
    #[serde(rename = "URL")]
    url: String,
}

/// Rows of a list export. The export opens with list metadata, so parsing
/// starts at the `Position,` header line.
fn read_list_export(key: &str, text: &str) -> AppResult<Vec<ListRow>> {
    let text = text.trim_start_matches('\u{feff}');
    let Some(start) = text
        .split_inclusive('\n')
        .scan(0usize, |offset, line| {
            let at = *offset;
            *offset += line.len();
            Some((at, line))
        })
        .find(|(_, line)| line.starts_with("Position,"))
        .map(|(at, _)| at)
    else {
        warn!(list = key, "list export has no Position header");
        return Ok(Vec::new());
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text[start..].as_bytes());

    let mut rows = Vec::new();
    for row in reader.deserialize::<ListRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Merges list exports into one corpus keyed by canonical film URL, sorted by
/// list count then name.
pub fn build_corpus<'a>(
    exports: impl IntoIterator<Item = (&'a ListSource, &'a str)>,
) -> AppResult<CuratedCorpus> {
    let no_links = HashMap::new();
    let mut lists = BTreeMap::new();
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let mut films: Vec<CuratedFilm> = Vec::new();

    for (source, text) in exports {
        let rows = read_list_export(&source.key, text)?;
        lists.insert(
            source.key.clone(),
            CuratedList { name: source.name.clone(), count: rows.len(), ranked: source.ranked },
        );

        for row in rows {
            let url = uri::canonicalize(&row.url, &no_links);
            if url.is_empty() {
                continue;
            }
            let idx = *by_url.entry(url.clone()).or_insert_with(|| {
                films.push(CuratedFilm {
                    name: row.name.clone(),
                    year: row.year,
                    url,
                    list_count: 0,
                    lists: BTreeMap::new(),
                    tmdb_data: None,
                    is_by_black_director: false,
                    tmdb_error: None,
                });
                films.len() - 1
            });
            films[idx].lists.insert(source.key.clone(), row.position);
        }
    }

    for film in &mut films {
        film.list_count = film.lists.len();
    }
    films.sort_by(|a, b| b.list_count.cmp(&a.list_count).then_with(|| a.name.cmp(&b.name)));

    Ok(CuratedCorpus { lists, films })
}

/// Reads a JSON manifest of [`ListSource`]s, builds the corpus and writes it
/// to `out`. Missing exports are skipped.
pub async fn build_corpus_from_manifest(manifest: &Path, out: &Path) -> AppResult<CuratedCorpus> {
    let sources: Vec<ListSource> =
        serde_json::from_str(&tokio::fs::read_to_string(manifest).await.map_err(anyhow::Error::from)?)
            .map_err(|err| AppError::bad_request(format!("invalid list manifest: {err}")))?;
    let base = manifest.parent().unwrap_or(Path::new("."));

    let mut loaded = Vec::new();
    for source in &sources {
        let path = base.join(&source.path);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => loaded.push((source, text)),
            Err(err) => warn!(list = %source.key, path = %path.display(), error = %err, "skipping list export"),
        }
    }

    let corpus = build_corpus(loaded.iter().map(|(source, text)| (*source, text.as_str())))?;
    tokio::fs::write(out, serde_json::to_string_pretty(&corpus)?)
        .await
        .map_err(anyhow::Error::from)?;
    info!(out = %out.display(), lists = corpus.lists.len(), films = corpus.films.len(), "wrote curated corpus");
    Ok(corpus)
}

/// Canonical keys of what the user has seen and wants to see.
#[derive(Clone, Debug, Default)]
pub struct Library {
    pub seen: HashSet<String>,
    pub watchlist: HashSet<String>,
}

impl Library {
    pub fn from_session(session: &Session) -> Self {
        let key = |raw: &str| {
            session
                .index
                .lookup(raw)
                .map(|r| uri::canonicalize(&r.key, session.index.shortlinks()))
                .unwrap_or_else(|| session.index.canonicalize(raw))
        };
        let seen = session
            .diary
            .iter()
            .map(|e| e.uri.as_str())
            .chain(session.reviews.iter().map(|r| r.entry.uri.as_str()))
            .map(&key)
            .collect();
        let watchlist = session.watchlist.iter().map(|e| key(&e.uri)).collect();
        Self { seen, watchlist }
    }

    pub fn has_seen(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn wants(&self, key: &str) -> bool {
        self.watchlist.contains(key)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BuilderSort {
    #[default]
    ListCount,
    Year,
    Rating,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuilderFilters {
    /// Keep films on any of these lists. Empty keeps everything.
    pub lists: Vec<String>,
    pub min_list_count: usize,
    pub decades: Vec<i16>,
    pub directed_by_woman: bool,
    pub non_american: bool,
    pub non_english: bool,
    pub black_director: bool,
    pub criterion: bool,
    pub max_runtime: Option<u32>,
    pub exclude_seen: bool,
    pub exclude_watchlist: bool,
    pub sort: BuilderSort,
    pub limit: Option<usize>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct BuilderPick {
    pub name: String,
    pub year: Option<i16>,
    pub url: String,
    pub list_count: usize,
    pub lists: Vec<String>,
    pub runtime: Option<u32>,
    pub vote_average: Option<f64>,
    pub poster_path: Option<String>,
    pub seen: bool,
    pub on_watchlist: bool,
}

pub fn build_watchlist(
    corpus: &CuratedCorpus,
    filters: &BuilderFilters,
    library: &Library,
) -> Vec<BuilderPick> {
    let mut picks: Vec<BuilderPick> = corpus
        .films
        .iter()
        .filter(|film| keep(film, filters, library))
        .map(|film| {
            let key = uri::canonicalize(&film.url, &Default::default());
            BuilderPick {
                name: film.name.clone(),
                year: film.year,
                url: key.clone(),
                list_count: film.list_count.max(film.lists.len()),
                lists: film.lists.keys().cloned().collect(),
                runtime: film.runtime(),
                vote_average: film.tmdb_data.as_ref().and_then(|t| t.vote_average),
                poster_path: film.tmdb_data.as_ref().and_then(|t| t.poster_path.clone()),
                seen: library.has_seen(&key),
                on_watchlist: library.wants(&key),
            }
        })
        .collect();

    match filters.sort {
        BuilderSort::ListCount => picks.sort_by(|a, b| {
            b.list_count.cmp(&a.list_count).then_with(|| a.name.cmp(&b.name))
        }),
        BuilderSort::Year => picks.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.name.cmp(&b.name))),
        BuilderSort::Rating => picks.sort_by(|a, b| {
            b.vote_average
                .unwrap_or(0.0)
                .total_cmp(&a.vote_average.unwrap_or(0.0))
                .then_with(|| a.name.cmp(&b.name))
        }),
    }

    picks.truncate(filters.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT));
    picks
}

fn keep(film: &CuratedFilm, f: &BuilderFilters, library: &Library) -> bool {
    if !f.lists.is_empty() && !f.lists.iter().any(|l| film.lists.contains_key(l)) {
        return false;
    }
    if film.list_count.max(film.lists.len()) < f.min_list_count {
        return false;
    }
    if !f.decades.is_empty() {
        let Some(year) = film.year else { return false };
        if !f.decades.contains(&(year - year.rem_euclid(10))) {
            return false;
        }
    }
    if f.directed_by_woman && film.directed_by_woman() != Some(true) {
        return false;
    }
    if f.non_american && film.is_american() != Some(false) {
        return false;
    }
    if f.non_english && film.is_english() != Some(false) {
        return false;
    }
    if f.black_director && !film.is_by_black_director {
        return false;
    }
    if f.criterion && !film.lists.contains_key(CRITERION_LIST) {
        return false;
    }
    if let Some(max) = f.max_runtime {
        if film.runtime().is_none_or(|r| r > max) {
            return false;
        }
    }
    if f.exclude_seen || f.exclude_watchlist {
        let key = uri::canonicalize(&film.url, &Default::default());
        if f.exclude_seen && library.has_seen(&key) {
            return false;
        }
        if f.exclude_watchlist && library.wants(&key) {
            return false;
        }
    }
    true
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const CORPUS_JSON: &str = r#"{
      "lists": {
        "criterion": {"name": "Criterion Collection", "count": 2},
        "sight-sound": {"name": "Sight & Sound Greatest Films 2022", "count": 3, "ranked": true}
      },
      "films": [
        {"name": "Jeanne Dielman", "year": 1975, "url": "https://letterboxd.com/film/jeanne-dielman-23-quai-du-commerce-1080-bruxelles/",
         "listCount": 2, "lists": {"criterion": 10, "sight-sound": 1},
         "tmdb_data": {"runtime": 202, "original_language": "fr", "release_date": "1975-05-14",
           "genres": ["Drama"], "vote_average": 7.4,
           "production_countries": {"codes": ["BE", "FR"], "names": ["Belgium", "France"]},
           "directors": [{"id": 1, "name": "Chantal Akerman", "gender": 1}]}},
        {"name": "Vertigo", "year": 1958, "url": "https://letterboxd.com/film/vertigo/",
         "listCount": 1, "lists": {"sight-sound": 2},
         "tmdb_data": {"runtime": 128, "original_language": "en", "release_date": "1958-05-09",
           "genres": ["Mystery", "Thriller"], "vote_average": 8.0,
           "production_countries": {"codes": ["US"], "names": ["United States of America"]},
           "directors": [{"id": 2, "name": "Alfred Hitchcock", "gender": 2}]}},
        {"name": "Daughters of the Dust", "year": 1991, "url": "https://letterboxd.com/film/daughters-of-the-dust/",
         "listCount": 2, "lists": {"criterion": 400, "sight-sound": 60},
         "is_by_black_director": true,
         "tmdb_data": {"runtime": 112, "original_language": "en", "release_date": "1991-01-01",
           "genres": ["Drama"], "vote_average": 6.9,
           "production_countries": {"codes": ["US"], "names": ["United States of America"]},
           "directors": [{"id": 3, "name": "Julie Dash", "gender": 1}]}}
      ]
    }"#;

    pub fn corpus() -> CuratedCorpus {
        serde_json::from_str(CORPUS_JSON).unwrap()
    }
}
