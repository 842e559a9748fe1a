use std::fs;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::keys::map_key;
use crate::storage::StorageClient;
use crate::{Error, Result};

/// ディレクトリアップロードの対象
#[derive(Debug, Clone)]
pub struct UploadTarget {
    /// バケット名（Azure の場合はコンテナ名）
    pub bucket: String,
    /// アップロード先の prefix
    pub destination_prefix: String,
    /// アップロード元ディレクトリ
    pub local_root: PathBuf,
    /// S3 の ACL などのアクセスレベル
    pub access_level: Option<String>,
}

impl UploadTarget {
    pub fn new(
        bucket: impl Into<String>,
        destination_prefix: impl Into<String>,
        local_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            destination_prefix: destination_prefix.into(),
            local_root: local_root.into(),
            access_level: None,
        }
    }

    pub fn with_access_level(mut self, access_level: impl Into<String>) -> Self {
        self.access_level = Some(access_level.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(Error::Validation("bucket is required".into()));
        }
        if self.destination_prefix.is_empty() {
            return Err(Error::Validation("destination prefix is required".into()));
        }
        if !self.local_root.is_dir() {
            return Err(Error::Validation(format!(
                "{} is not a directory",
                self.local_root.display()
            )));
        }
        Ok(())
    }
}

/// アップロード結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// 書き込んだキー（走査順）
    pub keys: Vec<String>,
    /// 転送したバイト数
    pub bytes: u64,
}

impl UploadSummary {
    pub(crate) fn record(&mut self, key: String, size: usize) {
        self.keys.push(key);
        self.bytes += size as u64;
    }
}

/// ディレクトリを再帰的にアップロード
///
/// 通常ファイルのみを対象とし、シンボリックリンクは辿らずスキップする。
/// 途中で失敗した場合、それまでに書き込んだオブジェクトは残る（ロールバックしない）。
pub fn upload_tree(client: &dyn StorageClient, target: &UploadTarget) -> Result<UploadSummary> {
    target.validate()?;

    let mut summary = UploadSummary::default();

    for entry in WalkDir::new(&target.local_root)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "skipping symbolic link");
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let local_path = entry.path();
        let key = map_key(&target.local_root, &target.destination_prefix, local_path)?;
        let content = fs::read(local_path).map_err(|e| Error::upload(local_path, e.into()))?;

        client
            .put(
                &target.bucket,
                &key,
                &content,
                target.access_level.as_deref(),
            )
            .map_err(|e| Error::upload(local_path, e))?;

        tracing::debug!(
            backend = client.name(),
            bucket = %target.bucket,
            key = %key,
            size_bytes = content.len(),
            "uploaded object"
        );
        summary.record(key, content.len());
    }

    tracing::info!(
        backend = client.name(),
        bucket = %target.bucket,
        prefix = %target.destination_prefix,
        objects = summary.keys.len(),
        size_bytes = summary.bytes,
        "directory upload finished"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Call, MemoryClient};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("index.html"), b"<html></html>").unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("css").join("app.css"), b"body {}").unwrap();
        temp
    }

    #[test]
    fn test_upload_site_scenario() -> Result<()> {
        let temp = site();
        let client = MemoryClient::new();
        let target = UploadTarget::new("assets", "v1/", temp.path());

        let summary = upload_tree(&client, &target)?;

        assert_eq!(client.keys("assets"), vec!["v1/css/app.css", "v1/index.html"]);
        assert_eq!(summary.keys.len(), 2);
        assert_eq!(summary.bytes, 20);
        assert_eq!(
            client.get("assets", "v1/css/app.css"),
            Some(b"body {}".to_vec())
        );
        Ok(())
    }

    #[test]
    fn test_uploaded_keys_match_file_set() -> Result<()> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join("empty/nested")).unwrap();
        fs::write(root.join("top.txt"), b"1").unwrap();
        fs::write(root.join("a/one.txt"), b"22").unwrap();
        fs::write(root.join("a/b/two.bin"), b"333").unwrap();
        fs::write(root.join("a/b/c/three"), b"").unwrap();

        let client = MemoryClient::new();
        let summary = upload_tree(&client, &UploadTarget::new("bucket", "p", root))?;

        let expected: BTreeSet<String> = ["p/top.txt", "p/a/one.txt", "p/a/b/two.bin", "p/a/b/c/three"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let uploaded: BTreeSet<String> = summary.keys.iter().cloned().collect();

        assert_eq!(uploaded, expected);
        assert_eq!(summary.keys.len(), expected.len());
        Ok(())
    }

    #[test]
    fn test_zero_byte_file_becomes_empty_object() -> Result<()> {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("empty.txt"), b"").unwrap();

        let client = MemoryClient::new();
        upload_tree(&client, &UploadTarget::new("b", "x/", temp.path()))?;

        assert_eq!(client.get("b", "x/empty.txt"), Some(Vec::new()));
        Ok(())
    }

    #[test]
    fn test_empty_directories_produce_no_objects() -> Result<()> {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();

        let client = MemoryClient::new();
        let summary = upload_tree(&client, &UploadTarget::new("b", "x/", temp.path()))?;

        assert!(summary.keys.is_empty());
        assert!(client.calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_access_level_is_passed_through() -> Result<()> {
        let temp = site();
        let client = MemoryClient::new();
        let target = UploadTarget::new("assets", "v1/", temp.path()).with_access_level("public-read");

        upload_tree(&client, &target)?;

        assert!(client.calls().iter().all(|c| matches!(
            c,
            Call::Put { access_level: Some(acl), .. } if acl == "public-read"
        )));
        Ok(())
    }

    #[test]
    fn test_put_failure_aborts_walk_and_names_path() {
        let temp = site();
        // ファイル名順なので css/app.css が先に処理される
        let client = MemoryClient::new().fail_put("v1/css/app.css");

        let err = upload_tree(&client, &UploadTarget::new("assets", "v1/", temp.path()))
            .unwrap_err();

        match err {
            Error::Upload { path, source } => {
                assert!(path.ends_with("css/app.css"));
                assert!(matches!(*source, Error::Backend(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(client.get("assets", "v1/index.html").is_none());
    }

    #[test]
    fn test_put_failure_keeps_earlier_objects() {
        let temp = site();
        let client = MemoryClient::new().fail_put("v1/index.html");

        let err = upload_tree(&client, &UploadTarget::new("assets", "v1/", temp.path()))
            .unwrap_err();

        assert!(matches!(err, Error::Upload { ref path, .. } if path.ends_with("index.html")));
        // ロールバックしないので先に書き込んだ分は残る
        assert_eq!(client.keys("assets"), vec!["v1/css/app.css"]);
    }

    #[test]
    fn test_rejects_missing_root() {
        let client = MemoryClient::new();
        let target = UploadTarget::new("b", "x/", "/definitely/not/here");

        assert!(matches!(
            upload_tree(&client, &target),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_empty_bucket_and_prefix() {
        let temp = site();
        let client = MemoryClient::new();

        assert!(upload_tree(&client, &UploadTarget::new("", "x/", temp.path())).is_err());
        assert!(upload_tree(&client, &UploadTarget::new("b", "", temp.path())).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() -> Result<()> {
        let temp = site();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.txt"), b"nope").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("linked_dir")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.txt"),
            temp.path().join("linked.txt"),
        )
        .unwrap();

        let client = MemoryClient::new();
        let summary = upload_tree(&client, &UploadTarget::new("assets", "v1/", temp.path()))?;

        assert_eq!(summary.keys, vec!["v1/css/app.css", "v1/index.html"]);
        Ok(())
    }
}
