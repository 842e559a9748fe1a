//! アップロード・削除のエントリポイント
//!
//! 入力を検証し、ローカルパスやキーの形に応じて単一オブジェクト操作か
//! ツリー操作に振り分ける。

use std::fs;
use std::path::PathBuf;

use crate::delete::{delete_subtree, DeletionResult};
use crate::keys::{as_directory_prefix, looks_like_object_key};
use crate::storage::StorageClient;
use crate::upload::{upload_tree, UploadSummary, UploadTarget};
use crate::{Error, Result};

/// アップロード要求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// ローカルのファイルまたはディレクトリ
    pub local_path: PathBuf,
    /// ファイルならそのキー、ディレクトリなら prefix
    pub destination_key: String,
    pub bucket: String,
    pub access_level: Option<String>,
}

impl UploadRequest {
    fn validate(&self) -> Result<()> {
        if self.local_path.as_os_str().is_empty() {
            return Err(Error::Validation("local path is required".into()));
        }
        if self.destination_key.is_empty() {
            return Err(Error::Validation("destination key is required".into()));
        }
        if self.bucket.is_empty() {
            return Err(Error::Validation("bucket is required".into()));
        }
        if !self.local_path.exists() {
            return Err(Error::Validation(format!(
                "{} not found, please provide an absolute path",
                self.local_path.display()
            )));
        }
        Ok(())
    }
}

/// 削除要求
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub key: String,
    pub bucket: String,
}

/// ファイルまたはディレクトリをアップロード
pub fn upload(client: &dyn StorageClient, request: &UploadRequest) -> Result<UploadSummary> {
    request.validate()?;

    if request.local_path.is_dir() {
        if !client.supports_directory_upload() {
            return Err(Error::UnsupportedOperation(format!(
                "directory upload is not supported by the {} backend",
                client.name()
            )));
        }

        let target = UploadTarget {
            bucket: request.bucket.clone(),
            destination_prefix: request.destination_key.clone(),
            local_root: request.local_path.clone(),
            access_level: request.access_level.clone(),
        };
        return upload_tree(client, &target);
    }

    let content =
        fs::read(&request.local_path).map_err(|e| Error::upload(&request.local_path, e.into()))?;

    client
        .put(
            &request.bucket,
            &request.destination_key,
            &content,
            request.access_level.as_deref(),
        )
        .map_err(|e| Error::upload(&request.local_path, e))?;

    tracing::info!(
        backend = client.name(),
        bucket = %request.bucket,
        key = %request.destination_key,
        size_bytes = content.len(),
        "uploaded object"
    );

    let mut summary = UploadSummary::default();
    summary.record(request.destination_key.clone(), content.len());
    Ok(summary)
}

/// キーまたは prefix を削除
///
/// 最後のセグメントに `.` を含むキーは単一オブジェクトとして削除し、
/// 存在しなかった場合の件数は 0 になる。
/// それ以外は末尾に `/` を付けて prefix 配下をすべて削除する。
/// `reports/2024.q1` のようなディレクトリ名はオブジェクト扱いになる点に注意。
pub fn delete(client: &dyn StorageClient, request: &DeleteRequest) -> Result<DeletionResult> {
    if request.key.is_empty() {
        return Err(Error::Validation("key is required".into()));
    }
    if request.bucket.is_empty() {
        return Err(Error::Validation("bucket is required".into()));
    }

    if looks_like_object_key(&request.key) {
        let existed = client
            .delete_one(&request.bucket, &request.key)
            .map_err(|e| Error::deletion(&request.key, 0, e))?;

        tracing::info!(
            backend = client.name(),
            bucket = %request.bucket,
            key = %request.key,
            existed,
            "deleted object"
        );
        return Ok(DeletionResult {
            deleted_count: u64::from(existed),
        });
    }

    delete_subtree(client, &request.bucket, &as_directory_prefix(&request.key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Call, MemoryClient};
    use tempfile::TempDir;

    fn request(local_path: PathBuf, key: &str) -> UploadRequest {
        UploadRequest {
            local_path,
            destination_key: key.to_string(),
            bucket: "assets".to_string(),
            access_level: Some("private".to_string()),
        }
    }

    #[test]
    fn test_upload_single_file() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("report.pdf");
        fs::write(&file, b"%PDF").unwrap();

        let client = MemoryClient::new();
        let summary = upload(&client, &request(file, "reports/summary.pdf"))?;

        assert_eq!(summary.keys, vec!["reports/summary.pdf"]);
        assert_eq!(summary.bytes, 4);
        assert_eq!(client.get("assets", "reports/summary.pdf"), Some(b"%PDF".to_vec()));
        Ok(())
    }

    #[test]
    fn test_upload_directory_dispatches_to_tree() -> Result<()> {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.html"), b"hi").unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("css/app.css"), b"").unwrap();

        let client = MemoryClient::new();
        upload(&client, &request(temp.path().to_path_buf(), "v1/"))?;

        assert_eq!(client.keys("assets"), vec!["v1/css/app.css", "v1/index.html"]);
        Ok(())
    }

    #[test]
    fn test_upload_directory_unsupported_backend() {
        let temp = TempDir::new().unwrap();
        let client = MemoryClient::new().without_directory_upload();

        let result = upload(&client, &request(temp.path().to_path_buf(), "v1/"));

        assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_upload_validation() {
        let client = MemoryClient::new();

        let missing = request(PathBuf::from("/no/such/file.txt"), "k.txt");
        assert!(matches!(upload(&client, &missing), Err(Error::Validation(_))));

        let temp = TempDir::new().unwrap();
        let mut no_bucket = request(temp.path().to_path_buf(), "k/");
        no_bucket.bucket.clear();
        assert!(matches!(upload(&client, &no_bucket), Err(Error::Validation(_))));

        let no_key = request(temp.path().to_path_buf(), "");
        assert!(matches!(upload(&client, &no_key), Err(Error::Validation(_))));
    }

    #[test]
    fn test_single_file_put_failure_names_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        let client = MemoryClient::new().fail_put("a.txt");

        let err = upload(&client, &request(file.clone(), "a.txt")).unwrap_err();

        assert!(matches!(err, Error::Upload { ref path, .. } if *path == file));
    }

    #[test]
    fn test_delete_dotted_key_is_single_object() -> Result<()> {
        let client = MemoryClient::new();
        client.insert("assets", "reports/summary.pdf", b"x");
        client.insert("assets", "reports/summary.pdf.bak", b"x");

        let result = delete(
            &client,
            &DeleteRequest {
                key: "reports/summary.pdf".into(),
                bucket: "assets".into(),
            },
        )?;

        assert_eq!(result.deleted_count, 1);
        assert_eq!(client.list_calls(), 0);
        assert_eq!(client.keys("assets"), vec!["reports/summary.pdf.bak"]);
        Ok(())
    }

    #[test]
    fn test_delete_missing_dotted_key_counts_zero() -> Result<()> {
        let client = MemoryClient::new();

        let result = delete(
            &client,
            &DeleteRequest {
                key: "reports/missing.pdf".into(),
                bucket: "assets".into(),
            },
        )?;

        assert_eq!(result.deleted_count, 0);
        assert_eq!(client.delete_one_calls(), 1);
        assert_eq!(client.list_calls(), 0);
        Ok(())
    }

    #[test]
    fn test_delete_directory_key_appends_separator() -> Result<()> {
        let client = MemoryClient::new();
        client.insert("assets", "v1/index.html", b"x");
        client.insert("assets", "v1/css/app.css", b"x");
        client.insert("assets", "v10/keep.txt", b"x");

        let result = delete(
            &client,
            &DeleteRequest {
                key: "v1".into(),
                bucket: "assets".into(),
            },
        )?;

        assert_eq!(result.deleted_count, 2);
        assert_eq!(client.keys("assets"), vec!["v10/keep.txt"]);
        assert!(client.calls().iter().any(|c| matches!(
            c,
            Call::List { prefix, .. } if prefix == "v1/"
        )));
        Ok(())
    }

    #[test]
    fn test_delete_nonexistent_prefix() -> Result<()> {
        let client = MemoryClient::new();

        let result = delete(
            &client,
            &DeleteRequest {
                key: "nothing/here/".into(),
                bucket: "assets".into(),
            },
        )?;

        assert_eq!(result.deleted_count, 0);
        Ok(())
    }
}
