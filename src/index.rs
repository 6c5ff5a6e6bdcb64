use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{models::FilmRecord, uri};

const MISSING_SAMPLE_LIMIT: usize = 10;

/// A later record claiming an alias replaces the earlier one; collisions are
/// counted.
#[derive(Clone, Debug, Default)]
pub struct FilmIndex {
    by_alias: HashMap<String, Arc<FilmRecord>>,
    shortlinks: HashMap<String, String>,
    records: Vec<Arc<FilmRecord>>,
    collisions: usize,
}

impl FilmIndex {
    pub fn new(shortlinks: HashMap<String, String>) -> Self {
        Self { shortlinks, ..Default::default() }
    }

    pub fn build(
        records: impl IntoIterator<Item = FilmRecord>,
        shortlinks: HashMap<String, String>,
    ) -> Self {
        let mut index = Self::new(shortlinks);
        for record in records {
            index.insert(record);
        }
        if index.collisions > 0 {
            warn!(collisions = index.collisions, "aliases claimed by more than one film");
        }
        index
    }

    pub fn insert(&mut self, record: FilmRecord) {
        let record = Arc::new(record);

        let mut aliases: Vec<String> = vec![record.key.clone()];
        aliases.extend(record.letterboxd_url.iter().cloned());
        aliases.extend(record.aliases.iter().cloned());
        aliases.extend(record.shortlink.iter().cloned());
        aliases.extend(record.original_uri.iter().cloned());

        let canonical: Vec<String> =
            aliases.iter().map(|a| uri::canonicalize(a, &self.shortlinks)).collect();
        let own_key = uri::canonicalize(&record.key, &self.shortlinks);

        // Shortlinks the backend resolved to this film also point at it.
        let reverse: Vec<String> = self
            .shortlinks
            .iter()
            .filter(|(_, target)| uri::canonicalize(target, &HashMap::new()) == own_key)
            .map(|(short, _)| short.clone())
            .collect();

        let mut seen = HashSet::new();
        for alias in aliases.into_iter().chain(canonical).chain(reverse) {
            let alias = alias.trim().to_string();
            if alias.is_empty() || !seen.insert(alias.clone()) {
                continue;
            }
            if let Some(previous) = self.by_alias.insert(alias.clone(), record.clone()) {
                if previous.key != record.key {
                    self.collisions += 1;
                    debug!(alias = %alias, previous = %previous.key, current = %record.key, "alias collision, last write wins");
                }
            }
        }

        self.records.retain(|r| r.key != record.key);
        self.records.push(record);
    }

    pub fn canonicalize(&self, raw: &str) -> String {
        uri::canonicalize(raw, &self.shortlinks)
    }

    pub fn lookup(&self, raw: &str) -> Option<&Arc<FilmRecord>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.by_alias.get(trimmed).or_else(|| self.by_alias.get(&self.canonicalize(trimmed)))
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<FilmRecord>> {
        self.records.iter()
    }

    pub fn shortlinks(&self) -> &HashMap<String, String> {
        &self.shortlinks
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn collisions(&self) -> usize {
        self.collisions
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct MissingReport {
    pub count: usize,
    pub samples: Vec<String>,
}

impl MissingReport {
    pub fn record(&mut self, raw: &str) {
        self.count += 1;
        if self.samples.len() < MISSING_SAMPLE_LIMIT {
            self.samples.push(raw.to_string());
        }
    }
}
