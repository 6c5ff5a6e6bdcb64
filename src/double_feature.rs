use std::collections::HashSet;

use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    countries,
    curated::{CuratedFilm, Library},
    index::FilmIndex,
    models::{TmdbData, WatchlistEntry},
    uri,
};

pub const MAX_PAIRS: usize = 10;
const MIN_PAIRS_BEFORE_BACKFILL: usize = 5;
const CANDIDATE_WINDOW: usize = 320;
const OLDEST_NEWEST_BUCKET: usize = 10;

const BASE_SCORE: i32 = 20;
const SHARED_DIRECTOR_BONUS: i32 = 30;
const SHARED_GENRE_BONUS: i32 = 15;
const SHARED_COUNTRY_BONUS: i32 = 10;
const SHARED_CONTINENT_BONUS: i32 = 8;
const SHARED_LANGUAGE_BONUS: i32 = 6;
const WATCHLIST_BONUS: i32 = 10;
const CENTURY_BONUS: i32 = 40;

const TIME_BOX_MINUTES: u32 = 240;
const SHORT_MAX_MINUTES: u32 = 95;
const LONG_MIN_MINUTES: u32 = 140;
const BALANCED_TOLERANCE_MINUTES: u32 = 10;

pub const NOT_ENOUGH_MATCHES: &str = "Not enough matches for this mode. Try another mode or shuffle.";

/// `seed = (seed * 9301 + 49297) mod 233280`
#[derive(Clone, Debug)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    const MODULUS: u64 = 233_280;

    pub fn new(seed: u64) -> Self {
        Self { state: seed % Self::MODULUS }
    }

    pub fn next_f64(&mut self) -> f64 {
        self.state = (self.state * 9301 + 49297) % Self::MODULUS;
        self.state as f64 / Self::MODULUS as f64
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = ((self.next_f64() * (i + 1) as f64).floor() as usize).min(i);
            items.swap(i, j);
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PairMode {
    TimeBox,
    ShortLong,
    Balanced,
    #[default]
    SharedThread,
    SameDirectorDiffDecade,
    SameContinentDiffLanguage,
    UsVsWorld,
    WomenDirectorsDiffCountries,
    AdjacentDecade,
    OldestNewest,
}

impl PairMode {
    pub const ALL: [PairMode; 10] = [
        PairMode::SharedThread,
        PairMode::TimeBox,
        PairMode::ShortLong,
        PairMode::Balanced,
        PairMode::SameDirectorDiffDecade,
        PairMode::SameContinentDiffLanguage,
        PairMode::UsVsWorld,
        PairMode::WomenDirectorsDiffCountries,
        PairMode::AdjacentDecade,
        PairMode::OldestNewest,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            PairMode::TimeBox => "time-box",
            PairMode::ShortLong => "short-long",
            PairMode::Balanced => "balanced",
            PairMode::SharedThread => "shared-thread",
            PairMode::SameDirectorDiffDecade => "same-director-diff-decade",
            PairMode::SameContinentDiffLanguage => "same-continent-diff-language",
            PairMode::UsVsWorld => "us-vs-world",
            PairMode::WomenDirectorsDiffCountries => "women-directors-diff-countries",
            PairMode::AdjacentDecade => "adjacent-decade",
            PairMode::OldestNewest => "oldest-newest",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PairMode::TimeBox => "Fits in four hours",
            PairMode::ShortLong => "Short + long",
            PairMode::Balanced => "Balanced runtimes",
            PairMode::SharedThread => "Shared thread",
            PairMode::SameDirectorDiffDecade => "Same director, different decades",
            PairMode::SameContinentDiffLanguage => "Same continent, different languages",
            PairMode::UsVsWorld => "US vs. the world",
            PairMode::WomenDirectorsDiffCountries => "Women directors, different countries",
            PairMode::AdjacentDecade => "Adjacent decades",
            PairMode::OldestNewest => "Oldest meets newest",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.slug() == slug)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PairSource {
    #[default]
    Curated,
    Watchlist,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct DoubleFeatureItem {
    pub key: String,
    pub name: String,
    pub year: Option<i16>,
    pub release_date: Option<Date>,
    pub runtime: Option<u32>,
    pub director_names: Vec<String>,
    pub genres: Vec<String>,
    pub countries: Vec<String>,
    pub continents: Vec<String>,
    pub language: Option<String>,
    pub is_american: Option<bool>,
    pub is_english: Option<bool>,
    pub directed_by_woman: Option<bool>,
    pub poster_path: Option<String>,
    pub seen: bool,
    pub on_watchlist: bool,
}

impl DoubleFeatureItem {
    fn from_tmdb(key: String, name: String, year: Option<i16>, tmdb: Option<&TmdbData>) -> Self {
        let mut item = Self { key, name, year, ..Default::default() };
        let Some(tmdb) = tmdb else {
            return item;
        };

        item.release_date = tmdb.release_date();
        item.year = item.year.or_else(|| tmdb.release_year());
        item.runtime = tmdb.runtime.filter(|r| *r > 0);
        item.director_names = tmdb.director_names();
        item.genres = tmdb.genres.clone();
        item.countries =
            tmdb.production_countries.codes.iter().map(|c| c.to_ascii_uppercase()).collect();
        let mut continents: Vec<String> = item
            .countries
            .iter()
            .filter_map(|c| countries::continent_of(c))
            .map(|c| c.code().to_string())
            .collect();
        continents.sort();
        continents.dedup();
        item.continents = continents;
        item.language = tmdb.original_language.clone().filter(|l| !l.is_empty());
        item.is_american = tmdb.is_american.or_else(|| {
            (!item.countries.is_empty()).then(|| item.countries.iter().any(|c| c == "US"))
        });
        item.is_english = tmdb.is_english.or_else(|| item.language.as_deref().map(|l| l == "en"));
        item.directed_by_woman = tmdb.directed_by_woman.or_else(|| {
            (!tmdb.directors.is_empty()).then(|| tmdb.directors.iter().any(|d| d.is_woman()))
        });
        item.poster_path = tmdb.poster_path.clone();
        item
    }

    fn decade(&self) -> Option<i16> {
        self.year.map(|y| y - y.rem_euclid(10))
    }

    fn is_released(&self, today: Date) -> bool {
        match (self.release_date, self.year) {
            (Some(date), _) => date <= today,
            (None, Some(year)) => year <= today.year(),
            (None, None) => false,
        }
    }
}

pub fn item_from_curated(film: &CuratedFilm, library: &Library) -> DoubleFeatureItem {
    let key = uri::canonicalize(&film.url, &Default::default());
    let mut item =
        DoubleFeatureItem::from_tmdb(key, film.name.clone(), film.year, film.tmdb_data.as_ref());
    item.seen = library.has_seen(&item.key);
    item.on_watchlist = library.wants(&item.key);
    item
}

pub fn item_from_watchlist(
    entry: &WatchlistEntry,
    index: &FilmIndex,
    library: &Library,
) -> DoubleFeatureItem {
    let record = index.lookup(&entry.uri);
    let key = record.map(|r| r.key.clone()).unwrap_or_else(|| index.canonicalize(&entry.uri));
    let name = if entry.name.trim().is_empty() {
        record.map(|r| r.title().to_string()).unwrap_or_default()
    } else {
        entry.name.clone()
    };
    let mut item = DoubleFeatureItem::from_tmdb(
        key,
        name,
        entry.year.or_else(|| record.and_then(|r| r.year)),
        record.and_then(|r| r.tmdb.as_ref()),
    );
    item.seen = library.has_seen(&item.key);
    item.on_watchlist = true;
    item
}

pub fn build_pool<'a>(
    source: PairSource,
    curated: impl IntoIterator<Item = &'a CuratedFilm>,
    watchlist: &[WatchlistEntry],
    index: &FilmIndex,
    library: &Library,
    exclude_seen: bool,
) -> Vec<DoubleFeatureItem> {
    let items: Vec<DoubleFeatureItem> = match source {
        PairSource::Curated => curated
            .into_iter()
            .map(|f| item_from_curated(f, library))
            .filter(|item| !(exclude_seen && item.seen))
            .collect(),
        PairSource::Watchlist => {
            watchlist.iter().map(|e| item_from_watchlist(e, index, library)).collect()
        },
    };

    let mut seen = HashSet::new();
    items.into_iter().filter(|item| !item.key.is_empty() && seen.insert(item.key.clone())).collect()
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DoubleFeaturePair {
    pub a: DoubleFeatureItem,
    pub b: DoubleFeatureItem,
    pub score: i32,
    pub reasons: Vec<String>,
}

#[derive(Clone, Copy, Debug)]
pub struct PairingOptions {
    pub mode: PairMode,
    pub source: PairSource,
    pub seed: u64,
    pub today: Date,
}

struct Candidate {
    a: usize,
    b: usize,
    score: i32,
    reasons: Vec<String>,
}

pub fn pair_films(pool: &[DoubleFeatureItem], opts: &PairingOptions) -> Vec<DoubleFeaturePair> {
    if pool.len() < 2 {
        return Vec::new();
    }

    let mut rng = SeededRng::new(opts.seed);

    if opts.mode == PairMode::OldestNewest {
        return oldest_newest(pool, opts.today, &mut rng);
    }

    let mut order: Vec<usize> = (0..pool.len()).collect();
    rng.shuffle(&mut order);
    order.truncate(CANDIDATE_WINDOW.min(pool.len()));

    let mut candidates = Vec::new();
    for (i, &a) in order.iter().enumerate() {
        for &b in &order[i + 1..] {
            let (x, y) = (&pool[a], &pool[b]);
            if x.key == y.key {
                continue;
            }
            if let Some((score, reasons)) = pick_pair(x, y, opts.mode, opts.source) {
                candidates.push(Candidate { a, b, score, reasons });
            }
        }
    }

    // Stable, so equal scores keep shuffle order.
    candidates.sort_by(|l, r| r.score.cmp(&l.score));

    let mut used: HashSet<&str> = HashSet::new();
    let mut chosen: Vec<usize> = Vec::new();
    for (ci, c) in candidates.iter().enumerate() {
        if chosen.len() == MAX_PAIRS {
            break;
        }
        let (ka, kb) = (pool[c.a].key.as_str(), pool[c.b].key.as_str());
        if used.contains(ka) || used.contains(kb) {
            continue;
        }
        used.insert(ka);
        used.insert(kb);
        chosen.push(ci);
    }

    if chosen.len() < MIN_PAIRS_BEFORE_BACKFILL {
        let already: HashSet<usize> = chosen.iter().copied().collect();
        for ci in 0..candidates.len() {
            if chosen.len() == MAX_PAIRS {
                break;
            }
            if !already.contains(&ci) {
                chosen.push(ci);
            }
        }
    }

    debug!(
        mode = opts.mode.slug(),
        pool = pool.len(),
        candidates = candidates.len(),
        pairs = chosen.len(),
        "built double features"
    );

    chosen
        .into_iter()
        .map(|ci| {
            let c = &candidates[ci];
            DoubleFeaturePair {
                a: pool[c.a].clone(),
                b: pool[c.b].clone(),
                score: c.score,
                reasons: c.reasons.clone(),
            }
        })
        .collect()
}

fn pick_pair(
    a: &DoubleFeatureItem,
    b: &DoubleFeatureItem,
    mode: PairMode,
    source: PairSource,
) -> Option<(i32, Vec<String>)> {
    let mut reasons = Vec::new();

    match mode {
        PairMode::TimeBox => {
            let total = a.runtime? + b.runtime?;
            if total > TIME_BOX_MINUTES {
                return None;
            }
            reasons.push(format!("Fits in four hours ({} total)", format_runtime(total)));
        },
        PairMode::ShortLong => {
            let (ra, rb) = (a.runtime?, b.runtime?);
            let (short, long) = (ra.min(rb), ra.max(rb));
            if short > SHORT_MAX_MINUTES || long < LONG_MIN_MINUTES {
                return None;
            }
            reasons.push(format!("Short + long ({short}m + {long}m)"));
        },
        PairMode::Balanced => {
            let (ra, rb) = (a.runtime?, b.runtime?);
            if ra.abs_diff(rb) > BALANCED_TOLERANCE_MINUTES {
                return None;
            }
            reasons.push(format!("Balanced runtimes ({ra}m / {rb}m)"));
        },
        PairMode::SharedThread => {},
        PairMode::SameDirectorDiffDecade => {
            if first_shared(&a.director_names, &b.director_names).is_none()
                || a.decade()? == b.decade()?
            {
                return None;
            }
            reasons.push("Same director, different decades".to_string());
        },
        PairMode::SameContinentDiffLanguage => {
            let (la, lb) = (a.language.as_deref()?, b.language.as_deref()?);
            if la == lb || first_shared(&a.continents, &b.continents).is_none() {
                return None;
            }
            reasons.push("Same continent, different languages".to_string());
        },
        PairMode::UsVsWorld => {
            if a.is_american? == b.is_american? {
                return None;
            }
            reasons.push("American vs. international".to_string());
        },
        PairMode::WomenDirectorsDiffCountries => {
            if a.directed_by_woman != Some(true) || b.directed_by_woman != Some(true) {
                return None;
            }
            if a.countries.is_empty()
                || b.countries.is_empty()
                || first_shared(&a.countries, &b.countries).is_some()
            {
                return None;
            }
            reasons.push("Women directors from different countries".to_string());
        },
        PairMode::AdjacentDecade => {
            let (da, db) = (a.decade()?, b.decade()?);
            if (da - db).abs() != 10 {
                return None;
            }
            let (lo, hi) = (da.min(db), da.max(db));
            reasons.push(format!("Adjacent decades ({lo}s → {hi}s)"));
        },
        PairMode::OldestNewest => return None,
    }

    let (overlap, overlap_reasons) = overlap(a, b);
    if mode == PairMode::SharedThread && overlap == 0 {
        return None;
    }
    reasons.extend(overlap_reasons);

    let mut score = BASE_SCORE + overlap;
    if source == PairSource::Curated && (a.on_watchlist || b.on_watchlist) {
        score += WATCHLIST_BONUS;
        reasons.push("On your watchlist".to_string());
    }

    Some((score, reasons))
}

fn overlap(a: &DoubleFeatureItem, b: &DoubleFeatureItem) -> (i32, Vec<String>) {
    let mut score = 0;
    let mut reasons = Vec::new();

    if let Some(name) = first_shared(&a.director_names, &b.director_names) {
        score += SHARED_DIRECTOR_BONUS;
        reasons.push(format!("Both directed by {name}"));
    }
    if let Some(genre) = first_shared(&a.genres, &b.genres) {
        score += SHARED_GENRE_BONUS;
        reasons.push(format!("Shared genre: {genre}"));
    }
    if let Some(country) = first_shared(&a.countries, &b.countries) {
        score += SHARED_COUNTRY_BONUS;
        reasons.push(format!("Both from {country}"));
    }
    if let Some(continent) = first_shared(&a.continents, &b.continents) {
        score += SHARED_CONTINENT_BONUS;
        let name = countries::Continent::from_code(continent).map(|c| c.name()).unwrap_or(continent);
        reasons.push(format!("Same continent: {name}"));
    }
    if let (Some(la), Some(lb)) = (&a.language, &b.language) {
        if la == lb {
            score += SHARED_LANGUAGE_BONUS;
            reasons.push(format!("Both in {la}"));
        }
    }

    (score, reasons)
}

fn first_shared<'a>(a: &'a [String], b: &[String]) -> Option<&'a str> {
    a.iter().find(|x| b.contains(x)).map(String::as_str)
}

fn oldest_newest(
    pool: &[DoubleFeatureItem],
    today: Date,
    rng: &mut SeededRng,
) -> Vec<DoubleFeaturePair> {
    let mut released: Vec<&DoubleFeatureItem> =
        pool.iter().filter(|item| item.is_released(today)).collect();
    released.sort_by_key(|item| item.year);

    // Disjoint halves, so small pools still pair every film.
    let n = released.len();
    let k = OLDEST_NEWEST_BUCKET.min(n / 2);
    let oldest: Vec<&DoubleFeatureItem> = released[..k].to_vec();
    let mut newest: Vec<&DoubleFeatureItem> =
        released[n - OLDEST_NEWEST_BUCKET.min(n - k)..].iter().rev().copied().collect();
    rng.shuffle(&mut newest);

    oldest
        .into_iter()
        .zip(newest)
        .map(|(old, new)| {
            let gap = match (old.year, new.year) {
                (Some(o), Some(n)) => i32::from(n) - i32::from(o),
                _ => 0,
            };
            let mut score = gap.max(0);
            let mut reasons = vec!["Oldest meets newest".to_string()];
            if gap == 100 {
                score += CENTURY_BONUS;
                reasons.push("100 years apart".to_string());
            } else {
                reasons.push(format!("{gap} years apart"));
            }
            DoubleFeaturePair { a: old.clone(), b: new.clone(), score, reasons }
        })
        .collect()
}

fn format_runtime(minutes: u32) -> String {
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> Date {
        jiff::civil::date(2026, 1, 1)
    }

    fn opts(mode: PairMode, seed: u64) -> PairingOptions {
        PairingOptions { mode, source: PairSource::Curated, seed, today: today() }
    }

    fn item(key: &str, year: i16) -> DoubleFeatureItem {
        DoubleFeatureItem {
            key: key.to_string(),
            name: key.to_string(),
            year: Some(year),
            ..Default::default()
        }
    }

    fn varied_pool(n: usize) -> Vec<DoubleFeatureItem> {
        let genres = ["Drama", "Comedy", "Horror", "Western"];
        let langs = ["en", "fr", "ja", "it"];
        let countries = [("US", "NA"), ("FR", "EU"), ("JP", "AS"), ("IT", "EU")];
        (0..n)
            .map(|i| {
                let mut it = item(&format!("film-{i}"), 1920 + (i as i16 * 7) % 100);
                it.runtime = Some(80 + (i as u32 * 13) % 100);
                it.genres = vec![genres[i % 4].to_string()];
                it.language = Some(langs[(i / 2) % 4].to_string());
                let (c, cont) = countries[(i / 3) % 4];
                it.countries = vec![c.to_string()];
                it.continents = vec![cont.to_string()];
                it.is_american = Some(c == "US");
                it.director_names = vec![format!("Director {}", i % 6)];
                it.directed_by_woman = Some(i % 3 == 0);
                it
            })
            .collect()
    }

    #[test]
    fn lcg_matches_reference_sequence() {
        let mut rng = SeededRng::new(1);
        let first = rng.next_f64();
        assert_eq!(first, 58598.0 / 233280.0);
        let second = rng.next_f64();
        assert_eq!(second, ((58598u64 * 9301 + 49297) % 233280) as f64 / 233280.0);
    }

    #[test]
    fn shuffle_is_a_deterministic_permutation() {
        let mut a: Vec<u32> = (0..50).collect();
        let mut b = a.clone();
        SeededRng::new(42).shuffle(&mut a);
        SeededRng::new(42).shuffle(&mut b);
        assert_eq!(a, b);

        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(a, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn same_director_different_decades() {
        let mut a = item("a", 1994);
        let mut b = item("b", 2014);
        a.director_names = vec!["Wong Kar-wai".to_string()];
        b.director_names = vec!["Wong Kar-wai".to_string()];

        let pairs = pair_films(&[a, b], &opts(PairMode::SameDirectorDiffDecade, 7));
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].reasons.iter().any(|r| r.contains("Same director, different decades")));
        assert!(pairs[0].score >= BASE_SCORE + SHARED_DIRECTOR_BONUS);
    }

    #[test]
    fn same_decade_is_rejected_for_director_mode() {
        let mut a = item("a", 1994);
        let mut b = item("b", 1997);
        a.director_names = vec!["X".to_string()];
        b.director_names = vec!["X".to_string()];
        assert!(pair_films(&[a, b], &opts(PairMode::SameDirectorDiffDecade, 7)).is_empty());
    }

    #[test]
    fn tiny_pools_give_nothing() {
        assert!(pair_films(&[], &opts(PairMode::SharedThread, 1)).is_empty());
        assert!(pair_films(&[item("a", 2000)], &opts(PairMode::OldestNewest, 1)).is_empty());
    }

    #[test]
    fn pairs_never_repeat_items_when_enough_candidates() {
        let pool = varied_pool(120);
        for mode in PairMode::ALL {
            let pairs = pair_films(&pool, &opts(mode, 1234));
            assert_eq!(pairs.len(), MAX_PAIRS, "mode {mode:?}");
            let mut keys = HashSet::new();
            for p in &pairs {
                assert_ne!(p.a.key, p.b.key, "mode {mode:?}");
                assert!(keys.insert(p.a.key.clone()), "mode {mode:?} reused {}", p.a.key);
                assert!(keys.insert(p.b.key.clone()), "mode {mode:?} reused {}", p.b.key);
            }
        }
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let pool = varied_pool(60);
        for mode in [PairMode::SharedThread, PairMode::TimeBox, PairMode::OldestNewest] {
            assert_eq!(pair_films(&pool, &opts(mode, 99)), pair_films(&pool, &opts(mode, 99)));
        }
    }

    #[test]
    fn scores_are_sorted_before_greedy_pick() {
        let pool = varied_pool(80);
        let pairs = pair_films(&pool, &opts(PairMode::SharedThread, 5));
        assert_eq!(pairs.len(), MAX_PAIRS);
        assert!(pairs.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn backfill_reuses_items_for_sparse_pools() {
        // One hub shares a director with three films that share nothing else.
        let mut hub = item("hub", 1960);
        hub.director_names = vec!["D".to_string()];
        let mut pool = vec![hub];
        for (i, year) in [1980, 1990, 2000].into_iter().enumerate() {
            let mut it = item(&format!("spoke-{i}"), year);
            it.director_names = vec!["D".to_string()];
            it.genres = vec![format!("genre-{i}")];
            pool.push(it);
        }
        let pairs = pair_films(&pool, &opts(PairMode::SameDirectorDiffDecade, 3));
        // Every spoke pairs with the hub and with each other: 6 candidates.
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn watchlist_bonus_only_for_curated_source() {
        let mut a = item("a", 1990);
        let mut b = item("b", 1995);
        a.genres = vec!["Drama".to_string()];
        b.genres = vec!["Drama".to_string()];
        a.on_watchlist = true;

        let curated = pick_pair(&a, &b, PairMode::SharedThread, PairSource::Curated).unwrap();
        let watch = pick_pair(&a, &b, PairMode::SharedThread, PairSource::Watchlist).unwrap();
        assert_eq!(curated.0, watch.0 + WATCHLIST_BONUS);
    }

    #[test]
    fn runtime_modes() {
        let mut a = item("a", 1990);
        let mut b = item("b", 1995);
        a.runtime = Some(90);
        b.runtime = Some(150);
        assert!(pick_pair(&a, &b, PairMode::TimeBox, PairSource::Watchlist).is_some());
        assert!(pick_pair(&a, &b, PairMode::ShortLong, PairSource::Watchlist).is_some());
        assert!(pick_pair(&a, &b, PairMode::Balanced, PairSource::Watchlist).is_none());

        b.runtime = Some(160);
        assert!(pick_pair(&a, &b, PairMode::TimeBox, PairSource::Watchlist).is_none());

        b.runtime = None;
        assert!(pick_pair(&a, &b, PairMode::TimeBox, PairSource::Watchlist).is_none());
    }

    #[test]
    fn contrast_modes() {
        let mut a = item("a", 1975);
        let mut b = item("b", 1984);
        a.language = Some("fr".to_string());
        b.language = Some("it".to_string());
        a.continents = vec!["EU".to_string()];
        b.continents = vec!["EU".to_string()];
        a.countries = vec!["FR".to_string()];
        b.countries = vec!["IT".to_string()];
        a.is_american = Some(false);
        b.is_american = Some(true);
        a.directed_by_woman = Some(true);
        b.directed_by_woman = Some(true);

        let src = PairSource::Watchlist;
        assert!(pick_pair(&a, &b, PairMode::SameContinentDiffLanguage, src).is_some());
        assert!(pick_pair(&a, &b, PairMode::UsVsWorld, src).is_some());
        assert!(pick_pair(&a, &b, PairMode::WomenDirectorsDiffCountries, src).is_some());
        let (_, reasons) = pick_pair(&a, &b, PairMode::AdjacentDecade, src).unwrap();
        assert_eq!(reasons[0], "Adjacent decades (1970s → 1980s)");

        b.countries = vec!["FR".to_string()];
        assert!(pick_pair(&a, &b, PairMode::WomenDirectorsDiffCountries, src).is_none());
        b.is_american = None;
        assert!(pick_pair(&a, &b, PairMode::UsVsWorld, src).is_none());
    }

    #[test]
    fn oldest_newest_draws_from_the_extremes() {
        let mut pool: Vec<DoubleFeatureItem> =
            (0..40).map(|i| item(&format!("f{i}"), 1920 + i as i16 * 2)).collect();
        pool.push(item("unreleased", 2030));
        let mut dated = item("dated-future", 2026);
        dated.release_date = Some(jiff::civil::date(2026, 6, 1));
        pool.push(dated);

        let pairs = pair_films(&pool, &opts(PairMode::OldestNewest, 11));
        assert_eq!(pairs.len(), OLDEST_NEWEST_BUCKET);

        let oldest: HashSet<String> = (0..10).map(|i| format!("f{i}")).collect();
        let newest: HashSet<String> = (30..40).map(|i| format!("f{i}")).collect();
        for p in &pairs {
            assert!(oldest.contains(&p.a.key), "{} not among oldest", p.a.key);
            assert!(newest.contains(&p.b.key), "{} not among newest", p.b.key);
        }
    }

    #[test]
    fn oldest_newest_century_bonus() {
        let pool = vec![item("old", 1920), item("new", 2020)];
        let pairs = pair_films(&pool, &opts(PairMode::OldestNewest, 1));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].score, 100 + CENTURY_BONUS);
        assert!(pairs[0].reasons.contains(&"100 years apart".to_string()));
    }

    #[test]
    fn oldest_newest_small_pools_pair_every_film() {
        for n in [2usize, 6, 10, 15] {
            let pool: Vec<DoubleFeatureItem> =
                (0..n).map(|i| item(&format!("f{i}"), 1930 + i as i16 * 5)).collect();
            let pairs = pair_films(&pool, &opts(PairMode::OldestNewest, 3));
            assert_eq!(pairs.len(), n / 2, "pool of {n}");

            let mut keys = HashSet::new();
            for p in &pairs {
                assert!(p.a.year < p.b.year, "pool of {n}");
                assert!(keys.insert(p.a.key.clone()) && keys.insert(p.b.key.clone()), "pool of {n}");
            }
            let oldest: HashSet<String> = (0..n / 2).map(|i| format!("f{i}")).collect();
            assert!(pairs.iter().all(|p| oldest.contains(&p.a.key)), "pool of {n}");
        }
    }

    #[test]
    fn pool_projection_and_dedupe() {
        let corpus = crate::curated::fixtures::corpus();
        let mut library = Library::default();
        library.seen.insert("https://letterboxd.com/film/vertigo/".to_string());

        let mut films: Vec<&CuratedFilm> = corpus.films.iter().collect();
        films.push(&corpus.films[0]);
        let index = FilmIndex::default();

        let pool = build_pool(PairSource::Curated, films.clone(), &[], &index, &library, false);
        assert_eq!(pool.len(), 3);
        let jeanne = &pool[0];
        assert_eq!(jeanne.countries, vec!["BE".to_string(), "FR".to_string()]);
        assert_eq!(jeanne.continents, vec!["EU".to_string()]);
        assert_eq!(jeanne.directed_by_woman, Some(true));
        assert_eq!(jeanne.is_american, Some(false));
        assert_eq!(jeanne.release_date, Some(jiff::civil::date(1975, 5, 14)));

        let unseen = build_pool(PairSource::Curated, films, &[], &index, &library, true);
        assert_eq!(unseen.len(), 2);
    }

    #[test]
    fn watchlist_items_without_records_keep_csv_data() {
        let entry = WatchlistEntry {
            date: None,
            name: "Stalker".to_string(),
            year: Some(1979),
            uri: "https://letterboxd.com/film/stalker/".to_string(),
        };
        let item = item_from_watchlist(&entry, &FilmIndex::default(), &Library::default());
        assert_eq!(item.key, "https://letterboxd.com/film/stalker/");
        assert_eq!(item.year, Some(1979));
        assert!(item.on_watchlist);
        assert!(item.runtime.is_none());
    }

    #[test]
    fn modes_round_trip_through_slugs() {
        for mode in PairMode::ALL {
            assert_eq!(PairMode::from_slug(mode.slug()), Some(mode));
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode.slug()));
        }
    }
}
