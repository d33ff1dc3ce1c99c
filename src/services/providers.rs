use crate::entities::{prelude::*, storage_providers};
use crate::services::storage::{ObjectStorage, S3ObjectStorage};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no active storage provider configured for tenant {0}")]
    NoProviders(i64),

    #[error("failed to load provider configuration: {0}")]
    LoadFailed(#[from] sea_orm::DbErr),
}

/// Read-only descriptor captured from a provider row. Credentials stay
/// inside the built client; this carries what the coordinator and URL
/// signing need.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub id: i64,
    pub name: String,
    pub bucket: String,
    /// Optional key prefix inside the bucket.
    pub folder: Option<String>,
    pub use_cdn: bool,
    pub cdn_url: Option<String>,
}

/// One tenant's provider set: name → client and name → descriptor
/// tables plus the default provider name. Immutable once built, shared
/// by `Arc`; an in-flight upload keeps its clone and never observes a
/// reload.
pub struct TenantProviders {
    clients: HashMap<String, Arc<dyn ObjectStorage>>,
    descriptors: HashMap<String, ProviderDescriptor>,
    default_provider: String,
}

impl TenantProviders {
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            descriptors: HashMap::new(),
            default_provider: String::new(),
        }
    }

    pub fn insert(
        &mut self,
        descriptor: ProviderDescriptor,
        client: Arc<dyn ObjectStorage>,
        is_default: bool,
    ) {
        if is_default || self.default_provider.is_empty() {
            self.default_provider = descriptor.name.clone();
        }
        self.clients.insert(descriptor.name.clone(), client);
        self.descriptors.insert(descriptor.name.clone(), descriptor);
    }

    /// Resolves a requested provider name, falling back to the tenant
    /// default when the request names nothing or something unknown.
    pub fn resolve(
        &self,
        requested: Option<&str>,
    ) -> Option<(ProviderDescriptor, Arc<dyn ObjectStorage>)> {
        let name = match requested {
            Some(name) if self.clients.contains_key(name) => name,
            _ => self.default_provider.as_str(),
        };
        let descriptor = self.descriptors.get(name)?.clone();
        let client = self.clients.get(name)?.clone();
        Some((descriptor, client))
    }

    pub fn by_id(&self, provider_id: i64) -> Option<(ProviderDescriptor, Arc<dyn ObjectStorage>)> {
        let descriptor = self
            .descriptors
            .values()
            .find(|d| d.id == provider_id)?
            .clone();
        let client = self.clients.get(&descriptor.name)?.clone();
        Some((descriptor, client))
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for TenantProviders {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-tenant cache of storage clients, lazily loaded from the
/// `storage_providers` table on the first request for a tenant.
/// Read-only during uploads; a reload swaps the whole `Arc`.
pub struct ProviderRegistry {
    db: DatabaseConnection,
    tenants: RwLock<HashMap<i64, Arc<TenantProviders>>>,
}

impl ProviderRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the tenant's provider set, loading it from the database
    /// if this tenant has not been seen yet.
    pub async fn tenant(&self, tenant_id: i64) -> Result<Arc<TenantProviders>, ProviderError> {
        if let Some(existing) = self.tenants.read().await.get(&tenant_id) {
            return Ok(existing.clone());
        }
        self.load_tenant(tenant_id).await
    }

    pub async fn load_tenant(&self, tenant_id: i64) -> Result<Arc<TenantProviders>, ProviderError> {
        let rows = StorageProviders::find()
            .filter(storage_providers::Column::TenantId.eq(tenant_id))
            .filter(storage_providers::Column::State.eq(true))
            .all(&self.db)
            .await
            .map_err(|e| {
                error!(tenant_id, error = %e, "failed to load provider config from database");
                ProviderError::LoadFailed(e)
            })?;

        if rows.is_empty() {
            return Err(ProviderError::NoProviders(tenant_id));
        }

        let mut providers = TenantProviders::new();
        for row in &rows {
            let client = Arc::new(S3ObjectStorage::for_provider(row).await);
            providers.insert(
                ProviderDescriptor {
                    id: row.id,
                    name: row.name.clone(),
                    bucket: row.bucket.clone(),
                    folder: row.folder.clone(),
                    use_cdn: row.use_cdn,
                    cdn_url: row.cdn_url.clone(),
                },
                client,
                row.is_default,
            );
        }

        info!(tenant_id, providers = rows.len(), "☁️  Loaded tenant provider set");

        let providers = Arc::new(providers);
        self.tenants
            .write()
            .await
            .insert(tenant_id, providers.clone());
        Ok(providers)
    }

    /// Installs a pre-built provider set, bypassing the database.
    /// Used by tests and by seeding.
    pub async fn insert_tenant(&self, tenant_id: i64, providers: TenantProviders) {
        self.tenants
            .write()
            .await
            .insert(tenant_id, Arc::new(providers));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{CompletedPartInfo, StorageError};
    use async_trait::async_trait;
    use std::time::Duration;

    struct NullStorage;

    #[async_trait]
    impl ObjectStorage for NullStorage {
        async fn put_object(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), StorageError> {
            Ok(())
        }
        async fn create_multipart_upload(&self, _: &str, _: &str) -> Result<String, StorageError> {
            Ok("session".into())
        }
        async fn upload_part(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: i32,
            _: Vec<u8>,
        ) -> Result<String, StorageError> {
            Ok("etag".into())
        }
        async fn complete_multipart_upload(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Vec<CompletedPartInfo>,
        ) -> Result<(), StorageError> {
            Ok(())
        }
        async fn abort_multipart_upload(&self, _: &str, _: &str, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
        async fn presigned_url(
            &self,
            _: &str,
            _: &str,
            _: Duration,
        ) -> Result<String, StorageError> {
            Ok("https://example.test/signed".into())
        }
    }

    fn descriptor(id: i64, name: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id,
            name: name.to_string(),
            bucket: "bucket".into(),
            folder: None,
            use_cdn: false,
            cdn_url: None,
        }
    }

    #[test]
    fn resolve_falls_back_to_default() {
        let mut providers = TenantProviders::new();
        providers.insert(descriptor(1, "minio"), Arc::new(NullStorage), false);
        providers.insert(descriptor(2, "aws_s3"), Arc::new(NullStorage), true);

        let (by_name, _) = providers.resolve(Some("minio")).unwrap();
        assert_eq!(by_name.name, "minio");

        let (unknown, _) = providers.resolve(Some("does-not-exist")).unwrap();
        assert_eq!(unknown.name, "aws_s3");

        let (none_requested, _) = providers.resolve(None).unwrap();
        assert_eq!(none_requested.name, "aws_s3");
    }

    #[test]
    fn first_insert_is_default_until_marked() {
        let mut providers = TenantProviders::new();
        providers.insert(descriptor(1, "first"), Arc::new(NullStorage), false);
        let (resolved, _) = providers.resolve(None).unwrap();
        assert_eq!(resolved.name, "first");
    }

    #[test]
    fn lookup_by_id() {
        let mut providers = TenantProviders::new();
        providers.insert(descriptor(7, "minio"), Arc::new(NullStorage), true);
        assert_eq!(providers.by_id(7).unwrap().0.name, "minio");
        assert!(providers.by_id(8).is_none());
    }
}
