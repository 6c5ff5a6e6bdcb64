use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ShareSnapshot::Table)
                    .if_not_exists()
                    .col(string(ShareSnapshot::Token).primary_key())
                    .col(string_null(ShareSnapshot::Username))
                    .col(text(ShareSnapshot::Payload))
                    .col(big_integer(ShareSnapshot::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_share_snapshot_created_at")
                    .table(ShareSnapshot::Table)
                    .col(ShareSnapshot::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ShareSnapshot::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ShareSnapshot {
    Table,
    Token,
    Username,
    Payload,
    CreatedAt,
}
