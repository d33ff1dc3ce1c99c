pub mod prelude;

pub mod cloud_files;
pub mod storage_providers;
