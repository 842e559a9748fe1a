use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to walk directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Failed to upload {}: {source}", path.display())]
    Upload {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to delete {key} ({deleted_so_far} objects deleted before failure): {source}")]
    Deletion {
        key: String,
        deleted_so_far: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("No video stream found in {}", .0.display())]
    NoVideoStream(PathBuf),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// アップロード失敗としてローカルパスを付与してラップ
    pub(crate) fn upload(path: impl Into<PathBuf>, source: Error) -> Self {
        Error::Upload {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// 削除失敗としてキーと途中までの削除件数を付与してラップ
    pub(crate) fn deletion(key: impl Into<String>, deleted_so_far: u64, source: Error) -> Self {
        Error::Deletion {
            key: key.into(),
            deleted_so_far,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
