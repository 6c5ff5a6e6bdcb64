use jiff::civil::Date;
use serde::{Deserialize, Serialize};

/// TMDb gender code for women.
pub const GENDER_FEMALE: u8 = 1;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Person {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: Option<u8>,
    #[serde(default)]
    pub profile_path: Option<String>,
    #[serde(default)]
    pub job: Option<String>,
}

impl Person {
    pub fn is_woman(&self) -> bool {
        self.gender == Some(GENDER_FEMALE)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct CodeNames {
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
}

impl CodeNames {
    /// Pairs codes with names; a missing name falls back to the code.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.codes.iter().enumerate().map(|(i, code)| {
            let name = self.names.get(i).map(String::as_str).unwrap_or(code.as_str());
            (code.as_str(), name)
        })
    }
}

/// TMDb payload attached to a film by the enrichment backend. Every field is
/// optional because partially enriched entries are common.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TmdbData {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub original_language: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<u64>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub production_countries: CodeNames,
    #[serde(default)]
    pub spoken_languages: CodeNames,
    #[serde(default)]
    pub directors: Vec<Person>,
    #[serde(default)]
    pub writers: Vec<Person>,
    #[serde(default)]
    pub is_american: Option<bool>,
    #[serde(default)]
    pub is_english: Option<bool>,
    #[serde(default)]
    pub directed_by_woman: Option<bool>,
    #[serde(default)]
    pub written_by_woman: Option<bool>,
}

impl TmdbData {
    pub fn release_date(&self) -> Option<Date> {
        self.release_date.as_deref().and_then(|s| s.trim().parse().ok())
    }

    pub fn release_year(&self) -> Option<i16> {
        self.release_date().map(|d| d.year())
    }

    pub fn director_names(&self) -> Vec<String> {
        self.directors.iter().map(|d| d.name.clone()).filter(|n| !n.is_empty()).collect()
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct FilmFlags {
    pub directed_by_woman: Option<bool>,
    pub written_by_woman: Option<bool>,
    pub is_american: Option<bool>,
    pub is_english: Option<bool>,
    pub in_criterion_collection: Option<bool>,
    pub by_black_director: Option<bool>,
}

impl FilmFlags {
    fn derive(entry: &BackendFilm) -> Self {
        let tmdb = entry.tmdb_data.as_ref();

        let directed_by_woman = tmdb.and_then(|t| {
            t.directed_by_woman
                .or_else(|| (!t.directors.is_empty()).then(|| t.directors.iter().any(Person::is_woman)))
        });
        let written_by_woman = tmdb.and_then(|t| {
            t.written_by_woman
                .or_else(|| (!t.writers.is_empty()).then(|| t.writers.iter().any(Person::is_woman)))
        });
        let is_american = tmdb.and_then(|t| {
            t.is_american.or_else(|| {
                let codes = &t.production_countries.codes;
                (!codes.is_empty()).then(|| codes.iter().any(|c| c.eq_ignore_ascii_case("US")))
            })
        });
        let is_english = tmdb.and_then(|t| {
            t.is_english.or_else(|| {
                t.original_language.as_deref().filter(|l| !l.is_empty()).map(|l| l == "en")
            })
        });

        Self {
            directed_by_woman,
            written_by_woman,
            is_american,
            is_english,
            in_criterion_collection: entry.is_in_criterion_collection,
            by_black_director: entry.is_by_black_director,
        }
    }
}

/// One `movieIndex` entry as returned by the enrichment backend.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct BackendFilm {
    #[serde(default)]
    pub csv_name: Option<String>,
    #[serde(default, deserialize_with = "de_loose_year")]
    pub csv_year: Option<i16>,
    #[serde(default)]
    pub letterboxd_url: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub shortlink: Option<String>,
    #[serde(default)]
    pub original_uri: Option<String>,
    #[serde(default)]
    pub tmdb_movie_id: Option<i64>,
    #[serde(default)]
    pub tmdb_data: Option<TmdbData>,
    #[serde(default)]
    pub tmdb_error: Option<String>,
    #[serde(default)]
    pub is_by_black_director: Option<bool>,
    #[serde(default)]
    pub is_in_criterion_collection: Option<bool>,
}

/// The enrichment-index entry for one film.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FilmRecord {
    pub key: String,
    pub letterboxd_url: Option<String>,
    pub aliases: Vec<String>,
    pub shortlink: Option<String>,
    pub original_uri: Option<String>,
    pub name: Option<String>,
    pub year: Option<i16>,
    pub tmdb_movie_id: Option<i64>,
    pub tmdb: Option<TmdbData>,
    pub tmdb_error: Option<String>,
    pub flags: FilmFlags,
}

impl FilmRecord {
    pub fn from_backend(key: impl Into<String>, entry: BackendFilm) -> Self {
        let flags = FilmFlags::derive(&entry);
        let year = entry.csv_year.or_else(|| entry.tmdb_data.as_ref().and_then(TmdbData::release_year));
        let name = entry
            .csv_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| entry.tmdb_data.as_ref().and_then(|t| t.title.clone()));
        Self {
            key: key.into(),
            letterboxd_url: entry.letterboxd_url,
            aliases: entry.aliases,
            shortlink: entry.shortlink,
            original_uri: entry.original_uri,
            name,
            year,
            tmdb_movie_id: entry.tmdb_movie_id,
            tmdb: entry.tmdb_data,
            tmdb_error: entry.tmdb_error,
            flags,
        }
    }

    pub fn title(&self) -> &str {
        self.name
            .as_deref()
            .or_else(|| self.tmdb.as_ref().and_then(|t| t.title.as_deref()))
            .unwrap_or(self.key.as_str())
    }

    pub fn is_enriched(&self) -> bool {
        self.tmdb.is_some() && self.tmdb_error.is_none()
    }
}

/// Name/year pair the backend extracted from an uploaded CSV.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ParsedFilm {
    #[serde(default)]
    pub csv_name: Option<String>,
    #[serde(default, deserialize_with = "de_loose_year")]
    pub csv_year: Option<i16>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct DiaryEntry {
    pub date: Option<Date>,
    pub name: String,
    pub year: Option<i16>,
    pub uri: String,
    pub rating: Option<f32>,
    pub rewatch: bool,
    pub tags: Vec<String>,
    pub watched_date: Option<Date>,
}

impl DiaryEntry {
    /// The day the film was watched, falling back to the logging date.
    pub fn day(&self) -> Option<Date> {
        self.watched_date.or(self.date)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ReviewEntry {
    pub entry: DiaryEntry,
    pub review: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct WatchlistEntry {
    pub date: Option<Date>,
    pub name: String,
    pub year: Option<i16>,
    pub uri: String,
}

/// Accepts a year as a number, a numeric string or an empty string.
fn de_loose_year<'de, D>(deserializer: D) -> Result<Option<i16>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|y| i16::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str, gender: u8) -> Person {
        Person { name: name.to_string(), gender: Some(gender), ..Default::default() }
    }

    #[test]
    fn flags_fall_back_to_crew_and_countries() {
        let entry = BackendFilm {
            tmdb_data: Some(TmdbData {
                original_language: Some("fr".to_string()),
                production_countries: CodeNames {
                    codes: vec!["FR".to_string(), "US".to_string()],
                    names: vec![],
                },
                directors: vec![person("Céline Sciamma", 1)],
                writers: vec![person("Someone", 2)],
                ..Default::default()
            }),
            is_in_criterion_collection: Some(true),
            ..Default::default()
        };
        let record = FilmRecord::from_backend("https://letterboxd.com/film/x/", entry);
        assert_eq!(record.flags.directed_by_woman, Some(true));
        assert_eq!(record.flags.written_by_woman, Some(false));
        assert_eq!(record.flags.is_american, Some(true));
        assert_eq!(record.flags.is_english, Some(false));
        assert_eq!(record.flags.in_criterion_collection, Some(true));
        assert_eq!(record.flags.by_black_director, None);
    }

    #[test]
    fn explicit_flags_win_and_unknown_stays_none() {
        let entry = BackendFilm {
            tmdb_data: Some(TmdbData {
                directed_by_woman: Some(false),
                directors: vec![person("A", 1)],
                ..Default::default()
            }),
            ..Default::default()
        };
        let record = FilmRecord::from_backend("k", entry);
        assert_eq!(record.flags.directed_by_woman, Some(false));
        assert_eq!(record.flags.written_by_woman, None);
        assert_eq!(record.flags.is_american, None);
        assert_eq!(record.flags.is_english, None);
    }

    #[test]
    fn backend_entry_tolerates_string_years() {
        let entry: BackendFilm =
            serde_json::from_str(r#"{"csv_name":"Heat","csv_year":"1995","tmdb_error":"No TMDb match"}"#)
                .unwrap();
        assert_eq!(entry.csv_year, Some(1995));
        let record = FilmRecord::from_backend("k", entry);
        assert_eq!(record.title(), "Heat");
        assert!(!record.is_enriched());
    }

    #[test]
    fn code_names_pair_up() {
        let c = CodeNames {
            codes: vec!["JP".to_string(), "KR".to_string()],
            names: vec!["Japan".to_string()],
        };
        let entries: Vec<_> = c.entries().collect();
        assert_eq!(entries, vec![("JP", "Japan"), ("KR", "KR")]);
    }
}
