use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A tenant-scoped storage backend: bucket, endpoint and credentials.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_providers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub name: String,
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub secret_id: String,
    pub secret_key: String,
    pub folder: Option<String>,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub is_default: bool,
    #[sea_orm(default_expr = "Expr::value(false)")]
    pub use_cdn: bool,
    pub cdn_url: Option<String>,
    #[sea_orm(default_expr = "Expr::value(true)")]
    pub state: bool,
    pub tenant_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cloud_files::Entity")]
    CloudFiles,
}

impl Related<super::cloud_files::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CloudFiles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
