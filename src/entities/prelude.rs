pub use super::cloud_files::Entity as CloudFiles;
pub use super::storage_providers::Entity as StorageProviders;
