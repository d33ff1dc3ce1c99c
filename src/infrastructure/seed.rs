use crate::entities::{prelude::*, storage_providers};
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use sea_orm::DatabaseConnection;
use std::env;
use tracing::info;

/// Seeds one provider row from the environment when the table is
/// empty, so a fresh instance pointed at MinIO works without manual
/// setup. A populated table is left untouched.
pub async fn seed_default_provider(db: &DatabaseConnection) -> anyhow::Result<()> {
    if StorageProviders::find().count(db).await? > 0 {
        return Ok(());
    }

    let endpoint = match env::var("S3_ENDPOINT") {
        Ok(v) => v,
        Err(_) => {
            info!("🌱 No providers configured and S3_ENDPOINT unset, skipping provider seed");
            return Ok(());
        }
    };

    let bucket = env::var("S3_BUCKET").unwrap_or_else(|_| "uploads".to_string());
    info!("🌱 Seeding default storage provider: {} ({})", endpoint, bucket);

    let provider = storage_providers::ActiveModel {
        id: Set(1),
        name: Set(env::var("S3_PROVIDER_NAME").unwrap_or_else(|_| "default".to_string())),
        bucket: Set(bucket),
        endpoint: Set(endpoint),
        region: Set(env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string())),
        secret_id: Set(env::var("S3_ACCESS_KEY").unwrap_or_default()),
        secret_key: Set(env::var("S3_SECRET_KEY").unwrap_or_default()),
        folder: Set(env::var("S3_FOLDER").ok().filter(|f| !f.is_empty())),
        is_default: Set(true),
        use_cdn: Set(false),
        cdn_url: Set(None),
        state: Set(true),
        tenant_id: Set(env::var("DEFAULT_TENANT_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)),
    };
    provider.insert(db).await?;

    Ok(())
}
