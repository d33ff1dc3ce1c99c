use crate::config::UploadConfig;
use crate::entities::cloud_files;
use crate::services::progress::{ProgressTracker, UploadProgress, UploadStatus, total_parts_for};
use crate::services::providers::{ProviderError, ProviderRegistry};
use crate::services::uploader::{UploadError, Uploader};
use crate::utils::filetype::{FileCategory, format_size, split_extension};
use crate::utils::idgen::IdGenerator;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde::Serialize;
use std::io::SeekFrom;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncSeekExt;
use tracing::{info, warn};
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum UploadServiceError {
    #[error("file name has no extension")]
    MissingExtension,

    #[error("{category} file too large: {size} exceeds the {limit} limit")]
    FileTooLarge {
        category: &'static str,
        size: String,
        limit: String,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Transfer(#[from] UploadError),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("file not found")]
    FileNotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// An accepted upload, validated and ready to transfer. The source is
/// a spooled temporary file so the chunked path can stream it without
/// holding the payload in memory.
pub struct UploadRequest {
    pub file_name: String,
    pub size: i64,
    pub source: tokio::fs::File,
    pub provider: Option<String>,
    pub tag_id: Option<i64>,
    pub tenant_id: i64,
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    #[serde(with = "crate::utils::idgen::string_id")]
    #[schema(value_type = String)]
    pub id: u64,
    pub name: String,
    pub category: FileCategory,
    pub size: i64,
    pub url: String,
}

/// End-to-end upload orchestration: validation, provider resolution,
/// id and key assignment, dispatch to the single-shot or chunked
/// transfer path, progress lifecycle, and the metadata row.
pub struct UploadService {
    db: DatabaseConnection,
    providers: Arc<ProviderRegistry>,
    tracker: Arc<ProgressTracker>,
    uploader: Uploader,
    ids: IdGenerator,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        db: DatabaseConnection,
        providers: Arc<ProviderRegistry>,
        tracker: Arc<ProgressTracker>,
        config: UploadConfig,
    ) -> anyhow::Result<Self> {
        let uploader = Uploader::new(
            Arc::clone(&tracker),
            config.chunk_size,
            config.single_upload_timeout,
        );
        let ids = IdGenerator::new(config.id_worker)?;
        Ok(Self {
            db,
            providers,
            tracker,
            uploader,
            ids,
            config,
        })
    }

    /// Runs one upload to completion. Returns the upload id alongside
    /// the stored file so callers can hand it out for progress polling.
    pub async fn process_upload(
        &self,
        mut request: UploadRequest,
    ) -> Result<UploadedFile, UploadServiceError> {
        let (base_name, ext) =
            split_extension(&request.file_name).ok_or(UploadServiceError::MissingExtension)?;
        let category = FileCategory::from_extension(ext);

        let limit = self.config.max_size_for(category);
        if request.size > limit {
            return Err(UploadServiceError::FileTooLarge {
                category: category.as_str(),
                size: format_size(request.size),
                limit: format_size(limit),
            });
        }

        let tenant = self.providers.tenant(request.tenant_id).await?;
        let (descriptor, storage) = tenant
            .resolve(request.provider.as_deref())
            .ok_or_else(|| ProviderError::NoProviders(request.tenant_id))?;

        let file_id = self.ids.next_id();
        let key = object_key(
            descriptor.folder.as_deref(),
            request.tenant_id,
            category,
            file_id,
            ext,
        );

        self.tracker.create(UploadProgress::new(
            file_id,
            request.file_name.clone(),
            request.size,
            total_parts_for(request.size, self.config.chunk_size as i64),
            request.user_id.clone(),
            descriptor.name.clone(),
            descriptor.bucket.clone(),
            key.clone(),
        ));
        self.tracker.set_status(file_id, UploadStatus::Uploading);

        info!(
            upload_id = file_id,
            file_name = %request.file_name,
            size = %format_size(request.size),
            provider = %descriptor.name,
            key = %key,
            "upload accepted"
        );

        request
            .source
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|e| UploadServiceError::Internal(e.into()))?;

        let transfer = if request.size < self.config.small_file_threshold {
            self.uploader
                .upload_single(
                    Arc::clone(&storage),
                    request.source,
                    &descriptor.bucket,
                    &key,
                    file_id,
                )
                .await
        } else {
            self.uploader
                .upload_chunked(
                    Arc::clone(&storage),
                    request.source,
                    &descriptor.bucket,
                    &key,
                    file_id,
                    request.size,
                )
                .await
        };

        if let Err(err) = transfer {
            warn!(upload_id = file_id, error = %err, "upload failed");
            self.tracker.set_status(file_id, UploadStatus::Failed);
            self.tracker.schedule_removal(file_id, self.config.progress_grace);
            return Err(err.into());
        }

        self.tracker.set_status(file_id, UploadStatus::Completed);
        self.tracker.schedule_removal(file_id, self.config.progress_grace);

        let record = cloud_files::ActiveModel {
            id: Set(file_id as i64),
            name: Set(base_name.to_string()),
            category: Set(category.as_str().to_string()),
            size: Set(request.size),
            object_key: Set(key.clone()),
            provider_id: Set(descriptor.id),
            tag_id: Set(request.tag_id),
            user_id: Set(request.user_id.clone()),
            tenant_id: Set(request.tenant_id),
            state: Set(true),
            created_at: Set(Utc::now()),
        };
        record.insert(&self.db).await?;

        let url = self
            .signed_url(&descriptor, &*storage, &key)
            .await
            .map_err(UploadError::from)?;

        info!(upload_id = file_id, key = %key, "upload stored");

        Ok(UploadedFile {
            id: file_id,
            name: base_name.to_string(),
            category,
            size: request.size,
            url,
        })
    }

    /// Download URL for a previously stored file: the provider's CDN
    /// prefix when one is configured, otherwise a presigned link.
    pub async fn download_url(
        &self,
        tenant_id: i64,
        file_id: i64,
    ) -> Result<String, UploadServiceError> {
        let record = cloud_files::Entity::find_by_id(file_id)
            .one(&self.db)
            .await?
            .filter(|f| f.tenant_id == tenant_id && f.state)
            .ok_or(UploadServiceError::FileNotFound)?;

        let tenant = self.providers.tenant(tenant_id).await?;
        let (descriptor, storage) = tenant
            .by_id(record.provider_id)
            .ok_or_else(|| ProviderError::NoProviders(tenant_id))?;

        let url = self
            .signed_url(&descriptor, &*storage, &record.object_key)
            .await
            .map_err(UploadError::from)?;
        Ok(url)
    }

    async fn signed_url(
        &self,
        descriptor: &crate::services::providers::ProviderDescriptor,
        storage: &dyn crate::services::storage::ObjectStorage,
        key: &str,
    ) -> Result<String, crate::services::storage::StorageError> {
        if descriptor.use_cdn {
            if let Some(cdn) = &descriptor.cdn_url {
                return Ok(format!("{}/{}", cdn.trim_end_matches('/'), key));
            }
        }
        storage
            .presigned_url(&descriptor.bucket, key, self.config.signed_url_ttl)
            .await
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }
}

/// Destination path inside the bucket:
/// `[folder/]YYYY-MM-DD/{tenant}/{category}/{id}.{ext}`.
fn object_key(
    folder: Option<&str>,
    tenant_id: i64,
    category: FileCategory,
    file_id: u64,
    ext: &str,
) -> String {
    let key = format!(
        "{}/{}/{}/{}.{}",
        Utc::now().format("%Y-%m-%d"),
        tenant_id,
        category.as_str(),
        file_id,
        ext
    );
    match folder {
        Some(folder) if !folder.is_empty() => format!("{}/{}", folder.trim_matches('/'), key),
        _ => key,
    }
}
