use std::collections::HashMap;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use tracing::warn;

use crate::{
    entities::{film_record_cache, share_snapshot},
    error::AppResult,
    models::FilmRecord,
};

/// Server-side store for enriched film records and shared snapshots.
#[derive(Clone)]
pub struct CacheManager {
    db: DatabaseConnection,
    ttl_seconds: i64,
}

impl CacheManager {
    pub fn new(db: DatabaseConnection, ttl_days: i64) -> Self {
        Self { db, ttl_seconds: ttl_days * 86_400 }
    }

    /// Fresh cached records for the given canonical URLs, keyed by URL.
    pub async fn get_records(&self, urls: &[String]) -> AppResult<HashMap<String, FilmRecord>> {
        let mut out = HashMap::new();
        if urls.is_empty() {
            return Ok(out);
        }

        for chunk in urls.chunks(500) {
            let rows = film_record_cache::Entity::find()
                .filter(film_record_cache::Column::CanonicalUrl.is_in(chunk.iter().cloned()))
                .all(&self.db)
                .await?;

            for row in rows {
                if !self.is_fresh(row.updated_at) {
                    continue;
                }
                match serde_json::from_str::<FilmRecord>(&row.payload) {
                    Ok(record) => {
                        out.insert(row.canonical_url, record);
                    },
                    Err(err) => {
                        warn!(url = %row.canonical_url, error = %err, "discarding unreadable cached record");
                    },
                }
            }
        }

        Ok(out)
    }

    pub async fn put_records(&self, records: &[FilmRecord]) -> AppResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let now = now_sec();
        let txn = self.db.begin().await?;

        for record in records {
            let model = film_record_cache::ActiveModel {
                canonical_url: Set(record.key.clone()),
                title: Set(record.name.clone()),
                tmdb_id: Set(record.tmdb_movie_id.and_then(|id| i32::try_from(id).ok())),
                payload: Set(serde_json::to_string(record)?),
                updated_at: Set(now),
            };

            film_record_cache::Entity::insert(model)
                .on_conflict(
                    sea_orm::sea_query::OnConflict::column(film_record_cache::Column::CanonicalUrl)
                        .update_columns([
                            film_record_cache::Column::Title,
                            film_record_cache::Column::TmdbId,
                            film_record_cache::Column::Payload,
                            film_record_cache::Column::UpdatedAt,
                        ])
                        .to_owned(),
                )
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    pub async fn put_share(
        &self,
        token: &str,
        username: Option<&str>,
        payload: &serde_json::Value,
    ) -> AppResult<()> {
        let model = share_snapshot::ActiveModel {
            token: Set(token.to_string()),
            username: Set(username.map(str::to_string)),
            payload: Set(serde_json::to_string(payload)?),
            created_at: Set(now_sec()),
        };
        share_snapshot::Entity::insert(model).exec(&self.db).await?;
        Ok(())
    }

    pub async fn get_share(&self, token: &str) -> AppResult<Option<SharedSnapshot>> {
        let Some(row) = share_snapshot::Entity::find_by_id(token.to_string()).one(&self.db).await?
        else {
            return Ok(None);
        };
        Ok(Some(SharedSnapshot {
            token: row.token,
            username: row.username,
            payload: serde_json::from_str(&row.payload)?,
            created_at: row.created_at,
        }))
    }

    fn is_fresh(&self, cached_at: i64) -> bool {
        now_sec().saturating_sub(cached_at) <= self.ttl_seconds
    }
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SharedSnapshot {
    pub token: String,
    pub username: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}
