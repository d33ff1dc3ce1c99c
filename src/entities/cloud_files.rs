use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Metadata for an object stored through one of the tenant's providers.
/// `id` is the snowflake id that also served as the upload id.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cloud_files")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    /// Original file name without its extension.
    pub name: String,
    pub category: String,
    pub size: i64,
    /// Destination path inside the provider's bucket.
    pub object_key: String,
    pub provider_id: i64,
    pub tag_id: Option<i64>,
    pub user_id: String,
    pub tenant_id: i64,
    #[sea_orm(default_expr = "Expr::value(true)")]
    pub state: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::storage_providers::Entity",
        from = "Column::ProviderId",
        to = "super::storage_providers::Column::Id"
    )]
    StorageProvider,
}

impl Related<super::storage_providers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StorageProvider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
