//! Breakdowns and chart series computed from a session.

use std::collections::{BTreeMap, HashMap, HashSet};

use jiff::civil::Date;
use serde::Serialize;

use crate::{
    index::{FilmIndex, MissingReport},
    models::{DiaryEntry, FilmRecord, ReviewEntry, WatchlistEntry},
};

const LEADERBOARD_SIZE: usize = 10;
const MIN_AFFINITY_FILMS: usize = 2;

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq)]
pub struct FlagCount {
    pub yes: usize,
    pub no: usize,
    pub unknown: usize,
}

impl FlagCount {
    fn add(&mut self, value: Option<bool>) {
        match value {
            Some(true) => self.yes += 1,
            Some(false) => self.no += 1,
            None => self.unknown += 1,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct Breakdown {
    pub films: usize,
    pub directed_by_woman: FlagCount,
    pub written_by_woman: FlagCount,
    pub american: FlagCount,
    pub english: FlagCount,
    pub criterion: FlagCount,
    pub black_director: FlagCount,
}

impl Breakdown {
    fn add(&mut self, record: &FilmRecord) {
        let f = &record.flags;
        self.films += 1;
        self.directed_by_woman.add(f.directed_by_woman);
        self.written_by_woman.add(f.written_by_woman);
        self.american.add(f.is_american);
        self.english.add(f.is_english);
        self.criterion.add(f.in_criterion_collection);
        self.black_director.add(f.by_black_director);
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NamedCount {
    pub code: String,
    pub name: String,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct RatingBucket {
    pub rating: f32,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct DayCount {
    pub date: Date,
    pub count: usize,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AffinityRow {
    pub name: String,
    pub films: usize,
    pub average_rating: f64,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct DiaryStats {
    pub total_entries: usize,
    pub unique_films: usize,
    pub rewatches: usize,
    pub rated: usize,
    pub average_rating: Option<f64>,
    pub rating_histogram: Vec<RatingBucket>,
    pub activity: Vec<DayCount>,
    pub by_year: BTreeMap<i16, usize>,
    pub by_decade: BTreeMap<i16, usize>,
    pub breakdown: Breakdown,
    pub countries: Vec<NamedCount>,
    pub languages: Vec<NamedCount>,
    pub top_directors: Vec<AffinityRow>,
    pub top_genres: Vec<AffinityRow>,
    pub missing: MissingReport,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ReviewStats {
    pub count: usize,
    pub total_words: usize,
    pub average_words: f64,
    pub average_rating: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct WatchlistStats {
    pub total: usize,
    pub unique_films: usize,
    pub total_runtime_minutes: u64,
    pub by_decade: BTreeMap<i16, usize>,
    pub breakdown: Breakdown,
    pub countries: Vec<NamedCount>,
    pub missing: MissingReport,
}

/// Diary statistics, optionally restricted to entries watched in `year`.
pub fn diary_stats(entries: &[DiaryEntry], index: &FilmIndex, year: Option<i16>) -> DiaryStats {
    let entries: Vec<&DiaryEntry> = entries
        .iter()
        .filter(|e| year.is_none_or(|y| e.day().map(|d| d.year()) == Some(y)))
        .collect();

    let mut stats = DiaryStats { total_entries: entries.len(), ..Default::default() };

    let mut histogram = [0usize; 10];
    let mut rating_sum = 0.0f64;
    let mut days: BTreeMap<Date, usize> = BTreeMap::new();
    let mut films = UniqueFilms::default();
    let mut directors = Affinity::default();
    let mut genres = Affinity::default();

    for entry in &entries {
        if entry.rewatch {
            stats.rewatches += 1;
        }
        if let Some(rating) = entry.rating {
            stats.rated += 1;
            rating_sum += f64::from(rating);
            let bucket = ((rating * 2.0).round() as usize).clamp(1, 10) - 1;
            histogram[bucket] += 1;
        }
        if let Some(day) = entry.day() {
            *days.entry(day).or_default() += 1;
            *stats.by_year.entry(day.year()).or_default() += 1;
        }

        let Some(record) = index.lookup(&entry.uri) else {
            stats.missing.record(&entry.uri);
            continue;
        };
        films.add(record);

        if let (Some(rating), Some(tmdb)) = (entry.rating, record.tmdb.as_ref()) {
            for name in tmdb.director_names() {
                directors.add(&name, &record.key, rating);
            }
            for genre in &tmdb.genres {
                genres.add(genre, &record.key, rating);
            }
        }
    }

    stats.average_rating = (stats.rated > 0).then(|| rating_sum / stats.rated as f64);
    stats.rating_histogram = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| RatingBucket { rating: (i + 1) as f32 / 2.0, count })
        .collect();
    stats.activity = days.into_iter().map(|(date, count)| DayCount { date, count }).collect();
    stats.unique_films = films.records.len();
    stats.by_decade = films.decades();
    stats.breakdown = films.breakdown();
    stats.countries = films.countries();
    stats.languages = films.languages();
    stats.top_directors = directors.leaderboard();
    stats.top_genres = genres.leaderboard();
    stats
}

pub fn review_stats(reviews: &[ReviewEntry]) -> ReviewStats {
    let written: Vec<&ReviewEntry> = reviews.iter().filter(|r| !r.review.trim().is_empty()).collect();
    let total_words: usize = written.iter().map(|r| r.review.split_whitespace().count()).sum();
    let ratings: Vec<f64> = written.iter().filter_map(|r| r.entry.rating).map(f64::from).collect();

    ReviewStats {
        count: written.len(),
        total_words,
        average_words: if written.is_empty() {
            0.0
        } else {
            total_words as f64 / written.len() as f64
        },
        average_rating: (!ratings.is_empty())
            .then(|| ratings.iter().sum::<f64>() / ratings.len() as f64),
    }
}

pub fn watchlist_stats(entries: &[WatchlistEntry], index: &FilmIndex) -> WatchlistStats {
    let mut missing = MissingReport::default();
    let mut films = UniqueFilms::default();
    for entry in entries {
        match index.lookup(&entry.uri) {
            Some(record) => films.add(record),
            None => missing.record(&entry.uri),
        }
    }

    WatchlistStats {
        total: entries.len(),
        unique_films: films.records.len(),
        total_runtime_minutes: films
            .records
            .iter()
            .filter_map(|r| r.tmdb.as_ref().and_then(|t| t.runtime))
            .map(u64::from)
            .sum(),
        by_decade: films.decades(),
        breakdown: films.breakdown(),
        countries: films.countries(),
        missing,
    }
}

#[derive(Default)]
struct UniqueFilms<'a> {
    seen: HashSet<&'a str>,
    records: Vec<&'a FilmRecord>,
}

impl<'a> UniqueFilms<'a> {
    fn add(&mut self, record: &'a FilmRecord) {
        if self.seen.insert(record.key.as_str()) {
            self.records.push(record);
        }
    }

    fn breakdown(&self) -> Breakdown {
        let mut b = Breakdown::default();
        for record in &self.records {
            b.add(record);
        }
        b
    }

    fn decades(&self) -> BTreeMap<i16, usize> {
        let mut out = BTreeMap::new();
        for record in &self.records {
            let year = record.year.or_else(|| record.tmdb.as_ref().and_then(|t| t.release_year()));
            if let Some(year) = year {
                *out.entry(year - year.rem_euclid(10)).or_default() += 1;
            }
        }
        out
    }

    fn countries(&self) -> Vec<NamedCount> {
        let mut counts: HashMap<String, (String, usize)> = HashMap::new();
        for record in &self.records {
            let Some(tmdb) = &record.tmdb else { continue };
            for (code, name) in tmdb.production_countries.entries() {
                let slot = counts.entry(code.to_string()).or_insert_with(|| (name.to_string(), 0));
                slot.1 += 1;
            }
        }
        sorted_counts(counts)
    }

    fn languages(&self) -> Vec<NamedCount> {
        let mut counts: HashMap<String, (String, usize)> = HashMap::new();
        for record in &self.records {
            let Some(tmdb) = &record.tmdb else { continue };
            let Some(code) = tmdb.original_language.as_deref().filter(|c| !c.is_empty()) else {
                continue;
            };
            let name = tmdb
                .spoken_languages
                .entries()
                .find(|(c, _)| *c == code)
                .map(|(_, n)| n)
                .unwrap_or(code);
            let slot = counts.entry(code.to_string()).or_insert_with(|| (name.to_string(), 0));
            slot.1 += 1;
        }
        sorted_counts(counts)
    }
}

fn sorted_counts(counts: HashMap<String, (String, usize)>) -> Vec<NamedCount> {
    let mut out: Vec<NamedCount> = counts
        .into_iter()
        .map(|(code, (name, count))| NamedCount { code, name, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    out
}

/// Average rating per person or genre, counting each film once.
#[derive(Default)]
struct Affinity {
    groups: HashMap<String, HashMap<String, f32>>,
}

impl Affinity {
    fn add(&mut self, name: &str, film_key: &str, rating: f32) {
        self.groups.entry(name.to_string()).or_default().insert(film_key.to_string(), rating);
    }

    fn leaderboard(self) -> Vec<AffinityRow> {
        let mut rows: Vec<AffinityRow> = self
            .groups
            .into_iter()
            .filter(|(_, films)| films.len() >= MIN_AFFINITY_FILMS)
            .map(|(name, films)| {
                let sum: f64 = films.values().map(|r| f64::from(*r)).sum();
                AffinityRow { name, films: films.len(), average_rating: sum / films.len() as f64 }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.average_rating
                .total_cmp(&a.average_rating)
                .then_with(|| b.films.cmp(&a.films))
                .then_with(|| a.name.cmp(&b.name))
        });
        rows.truncate(LEADERBOARD_SIZE);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendFilm, CodeNames, Person, TmdbData};

    fn film(slug: &str, director: &str, gender: u8, country: &str, lang: &str) -> FilmRecord {
        FilmRecord::from_backend(
            format!("https://letterboxd.com/film/{slug}/"),
            BackendFilm {
                csv_name: Some(slug.to_string()),
                csv_year: Some(1994),
                tmdb_data: Some(TmdbData {
                    original_language: Some(lang.to_string()),
                    runtime: Some(100),
                    genres: vec!["Drama".to_string()],
                    production_countries: CodeNames {
                        codes: vec![country.to_string()],
                        names: vec![],
                    },
                    directors: vec![Person {
                        name: director.to_string(),
                        gender: Some(gender),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
    }

    fn entry(slug: &str, rating: Option<f32>, day: Date) -> DiaryEntry {
        DiaryEntry {
            date: Some(day),
            name: slug.to_string(),
            year: None,
            uri: format!("https://letterboxd.com/kat/film/{slug}/"),
            rating,
            rewatch: false,
            tags: vec![],
            watched_date: Some(day),
        }
    }

    fn index() -> FilmIndex {
        FilmIndex::build(
            [
                film("a", "Agnès Varda", 1, "FR", "fr"),
                film("b", "Agnès Varda", 1, "FR", "fr"),
                film("c", "Michael Mann", 2, "US", "en"),
            ],
            HashMap::new(),
        )
    }

    #[test]
    fn diary_stats_count_unique_films_once() {
        let d = jiff::civil::date(2024, 5, 1);
        let entries = vec![
            entry("a", Some(5.0), d),
            entry("a", Some(4.0), d),
            entry("b", Some(4.0), jiff::civil::date(2023, 1, 2)),
            entry("c", Some(2.5), d),
            entry("unknown", None, d),
        ];
        let stats = diary_stats(&entries, &index(), None);

        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.unique_films, 3);
        assert_eq!(stats.rated, 4);
        assert_eq!(stats.breakdown.directed_by_woman, FlagCount { yes: 2, no: 1, unknown: 0 });
        assert_eq!(stats.breakdown.american.yes, 1);
        assert_eq!(stats.missing.count, 1);
        assert_eq!(stats.countries[0].code, "FR");
        assert_eq!(stats.countries[0].count, 2);
        assert_eq!(stats.by_year.get(&2024), Some(&4));
        assert_eq!(stats.by_decade.get(&1990), Some(&3));
        assert_eq!(stats.activity.len(), 2);
        assert_eq!(stats.rating_histogram.len(), 10);
        assert_eq!(stats.rating_histogram[9].count, 1);
        assert_eq!(stats.rating_histogram[4].count, 1);

        assert_eq!(stats.top_directors.len(), 1);
        assert_eq!(stats.top_directors[0].name, "Agnès Varda");
        assert_eq!(stats.top_directors[0].films, 2);
        assert_eq!(stats.top_genres[0].films, 3);
    }

    #[test]
    fn year_filter_uses_watched_day() {
        let entries = vec![
            entry("a", Some(5.0), jiff::civil::date(2024, 5, 1)),
            entry("b", Some(4.0), jiff::civil::date(2023, 1, 2)),
        ];
        let stats = diary_stats(&entries, &index(), Some(2023));
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.average_rating, Some(4.0));
    }

    #[test]
    fn review_stats_skip_blank_reviews() {
        let d = jiff::civil::date(2024, 5, 1);
        let reviews = vec![
            ReviewEntry { entry: entry("a", Some(4.0), d), review: "so good it hurts".to_string() },
            ReviewEntry { entry: entry("b", None, d), review: "  ".to_string() },
        ];
        let stats = review_stats(&reviews);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.total_words, 4);
        assert_eq!(stats.average_rating, Some(4.0));
    }

    #[test]
    fn watchlist_stats_sum_runtime() {
        let entries: Vec<WatchlistEntry> = ["a", "c", "zzz"]
            .iter()
            .map(|s| WatchlistEntry {
                date: None,
                name: s.to_string(),
                year: None,
                uri: format!("https://letterboxd.com/film/{s}/"),
            })
            .collect();
        let stats = watchlist_stats(&entries, &index());
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unique_films, 2);
        assert_eq!(stats.total_runtime_minutes, 200);
        assert_eq!(stats.missing.samples, vec!["https://letterboxd.com/film/zzz/".to_string()]);
    }
}
