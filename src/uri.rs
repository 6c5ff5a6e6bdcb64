use std::{
    collections::{HashMap, HashSet},
    sync::LazyLock,
};

use regex::Regex;

static FILM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.)?letterboxd\.com/(?:[^/]+/)?film/([^/?#]+)/?$")
        .expect("valid regex")
});

static SHORTLINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:https?://)?boxd\.it/[A-Za-z0-9]+$").expect("valid regex")
});

pub fn canonical_film_url(slug: &str) -> String {
    format!("https://letterboxd.com/film/{slug}/")
}

fn strip(raw: &str) -> &str {
    raw.trim().trim_end_matches('/')
}

pub fn is_shortlink(raw: &str) -> bool {
    SHORTLINK_RE.is_match(strip(raw))
}

pub fn film_slug(raw: &str) -> Option<&str> {
    FILM_RE.captures(strip(raw)).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Shortlinks resolve through `shortlinks` until they reach a non-shortlink,
/// an unmapped shortlink or a cycle, so the result is a fixed point.
pub fn canonicalize(raw: &str, shortlinks: &HashMap<String, String>) -> String {
    let mut current = strip(raw).to_string();
    let mut visited = HashSet::new();

    while SHORTLINK_RE.is_match(&current) && visited.insert(current.clone()) {
        let resolved = shortlinks
            .get(&current)
            .or_else(|| shortlinks.get(&format!("{current}/")))
            .or_else(|| if visited.len() == 1 { shortlinks.get(raw.trim()) } else { None });
        match resolved {
            Some(target) => current = strip(target).to_string(),
            None => return current,
        }
    }

    canonicalize_film(&current)
}

fn canonicalize_film(raw: &str) -> String {
    let stripped = strip(raw);
    match film_slug(stripped) {
        Some(slug) => canonical_film_url(slug),
        None => stripped.to_string(),
    }
}
