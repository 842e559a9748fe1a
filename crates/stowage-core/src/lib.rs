pub mod azure;
pub mod config;
pub mod delete;
pub mod error;
pub mod keys;
pub mod media;
pub mod memory;
pub mod mirror;
pub mod s3;
pub mod storage;
pub mod upload;
pub mod utils;

pub use delete::{delete_subtree, DeletionResult};
pub use error::{Error, Result};
pub use mirror::{delete, upload, DeleteRequest, UploadRequest};
pub use storage::{ListPage, StorageClient};
pub use upload::{upload_tree, UploadSummary, UploadTarget};
