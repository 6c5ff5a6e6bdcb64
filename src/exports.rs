//! Readers for the Letterboxd account export CSVs.

use jiff::civil::Date;
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    models::{DiaryEntry, ReviewEntry, WatchlistEntry},
};

const URI_HEADER: &str = "Letterboxd URI";

#[derive(Debug, Deserialize)]
struct DiaryRow {
    #[serde(rename = "Date", default)]
    date: Option<String>,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Year", default)]
    year: Option<String>,
    #[serde(rename = "Letterboxd URI", default)]
    uri: String,
    #[serde(rename = "Rating", default)]
    rating: Option<String>,
    #[serde(rename = "Rewatch", default)]
    rewatch: Option<String>,
    #[serde(rename = "Tags", default)]
    tags: Option<String>,
    #[serde(rename = "Watched Date", default)]
    watched_date: Option<String>,
    #[serde(rename = "Review", default)]
    review: Option<String>,
}

impl DiaryRow {
    fn into_entry(self) -> DiaryEntry {
        DiaryEntry {
            date: parse_date(self.date.as_deref()),
            name: self.name,
            year: parse_year(self.year.as_deref()),
            uri: self.uri,
            rating: parse_rating(self.rating.as_deref()),
            rewatch: self.rewatch.as_deref().is_some_and(|r| r.eq_ignore_ascii_case("yes")),
            tags: self
                .tags
                .as_deref()
                .map(|t| {
                    t.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
                })
                .unwrap_or_default(),
            watched_date: parse_date(self.watched_date.as_deref()),
        }
    }
}

pub fn read_diary(text: &str) -> AppResult<Vec<DiaryEntry>> {
    Ok(read_rows(text, "diary")?.into_iter().map(DiaryRow::into_entry).collect())
}

pub fn read_reviews(text: &str) -> AppResult<Vec<ReviewEntry>> {
    Ok(read_rows(text, "reviews")?
        .into_iter()
        .map(|mut row| {
            let review = row.review.take().unwrap_or_default();
            ReviewEntry { entry: row.into_entry(), review }
        })
        .collect())
}

pub fn read_watchlist(text: &str) -> AppResult<Vec<WatchlistEntry>> {
    Ok(read_rows(text, "watchlist")?
        .into_iter()
        .map(|row| WatchlistEntry {
            date: parse_date(row.date.as_deref()),
            name: row.name,
            year: parse_year(row.year.as_deref()),
            uri: row.uri,
        })
        .collect())
}

fn read_rows(text: &str, kind: &str) -> AppResult<Vec<DiaryRow>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if !headers.iter().any(|h| h == URI_HEADER) {
        return Err(AppError::bad_request(format!(
            "{kind} export is missing the \"{URI_HEADER}\" column"
        )));
    }

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<DiaryRow>() {
        let row = row?;
        if row.uri.trim().is_empty() {
            skipped += 1;
            continue;
        }
        out.push(row);
    }

    debug!(kind = kind, rows = out.len(), skipped = skipped, "read export");
    Ok(out)
}

fn parse_date(raw: Option<&str>) -> Option<Date> {
    raw.map(str::trim).filter(|s| !s.is_empty()).and_then(|s| s.parse().ok())
}

fn parse_year(raw: Option<&str>) -> Option<i16> {
    raw.map(str::trim).filter(|s| !s.is_empty()).and_then(|s| s.parse().ok())
}

/// Letterboxd ratings are half stars between 0.5 and 5.
fn parse_rating(raw: Option<&str>) -> Option<f32> {
    let value: f32 = raw.map(str::trim).filter(|s| !s.is_empty())?.parse().ok()?;
    (0.5..=5.0).contains(&value).then(|| (value * 2.0).round() / 2.0)
}
