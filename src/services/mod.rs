pub mod progress;
pub mod providers;
pub mod storage;
pub mod upload_service;
pub mod uploader;
