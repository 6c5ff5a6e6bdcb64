use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FilmRecordCache::Table)
                    .if_not_exists()
                    .col(string(FilmRecordCache::CanonicalUrl).primary_key())
                    .col(string_null(FilmRecordCache::Title))
                    .col(integer_null(FilmRecordCache::TmdbId))
                    .col(text(FilmRecordCache::Payload))
                    .col(big_integer(FilmRecordCache::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_record_cache_updated_at")
                    .table(FilmRecordCache::Table)
                    .col(FilmRecordCache::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(FilmRecordCache::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum FilmRecordCache {
    Table,
    CanonicalUrl,
    Title,
    TmdbId,
    Payload,
    UpdatedAt,
}
