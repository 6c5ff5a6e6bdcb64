use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "film_record_cache")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub canonical_url: String,
    pub title: Option<String>,
    pub tmdb_id: Option<i32>,
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
