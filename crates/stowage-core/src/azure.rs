use std::ffi::OsString;
use std::io::Write;
use std::process::Command;

use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::storage::{ListPage, StorageClient};
use crate::utils::{is_tool_installed, run_tool};
use crate::{Error, Result};

/// 1回の一覧取得で要求する件数
const LIST_PAGE_SIZE: usize = 1000;

/// `delete_many` 1回で受け付けるキー数（1件ずつ削除するので進捗ログの粒度になる）
const MAX_BATCH_DELETE: usize = 256;

/// `az storage blob` CLI のラッパー
///
/// バケットはコンテナ名として扱う。認証は `az login` か
/// `AZURE_STORAGE_*` 環境変数に任せる。
#[derive(Debug, Clone, Default)]
pub struct AzureBlobClient {
    account_name: Option<String>,
    auth_mode: Option<String>,
}

/// `--show-next-marker` 付きの一覧は末尾に marker だけの要素が付く
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BlobListEntry {
    Blob {
        name: String,
    },
    Marker {
        #[serde(rename = "nextMarker")]
        next_marker: Option<String>,
    },
}

impl AzureBlobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account_name(mut self, account_name: impl Into<String>) -> Self {
        self.account_name = Some(account_name.into());
        self
    }

    /// `login` または `key`
    pub fn with_auth_mode(mut self, auth_mode: impl Into<String>) -> Self {
        self.auth_mode = Some(auth_mode.into());
        self
    }

    /// Azure CLI がインストールされているか確認
    pub fn is_installed() -> bool {
        is_tool_installed("az", "version")
    }

    /// `az storage blob <operation>` の引数を構築
    fn build_args(&self, operation: &str, container: &str, args: Vec<OsString>) -> Vec<OsString> {
        let mut full: Vec<OsString> = vec![
            "storage".into(),
            "blob".into(),
            operation.into(),
            "--container-name".into(),
            container.into(),
        ];
        full.extend(args);

        if let Some(account_name) = &self.account_name {
            full.push("--account-name".into());
            full.push(account_name.into());
        }
        if let Some(auth_mode) = &self.auth_mode {
            full.push("--auth-mode".into());
            full.push(auth_mode.into());
        }

        full.push("--only-show-errors".into());
        full.push("--output".into());
        full.push("json".into());
        full
    }

    fn run(&self, operation: &str, container: &str, args: Vec<OsString>) -> Result<Vec<u8>> {
        let mut command = Command::new("az");
        command.args(self.build_args(operation, container, args));
        run_tool(&mut command, operation)
    }

    /// 存在しない blob の削除は成功扱いにし、削除できたかどうかを返す
    fn delete_blob(&self, container: &str, key: &str) -> Result<bool> {
        match self.run("delete", container, vec!["--name".into(), key.into()]) {
            Ok(_) => Ok(true),
            Err(Error::Backend(message)) if is_not_found(&message) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn is_not_found(message: &str) -> bool {
    message.contains("BlobNotFound") || message.contains("The specified blob does not exist")
}

/// `az storage blob list --show-next-marker` の出力を解析
fn parse_list_output(stdout: &[u8]) -> Result<ListPage> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(ListPage::default());
    }

    let entries: Vec<BlobListEntry> = serde_json::from_slice(stdout)?;
    let mut page = ListPage::default();

    for entry in entries {
        match entry {
            BlobListEntry::Blob { name } => page.keys.push(name),
            BlobListEntry::Marker { next_marker } => {
                page.continuation = next_marker.filter(|m| !m.is_empty());
            }
        }
    }

    Ok(page)
}

impl StorageClient for AzureBlobClient {
    fn name(&self) -> &str {
        "azure"
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        content: &[u8],
        access_level: Option<&str>,
    ) -> Result<()> {
        if let Some(level) = access_level {
            // アクセスレベルはコンテナ単位の設定で、blob ごとには指定できない
            tracing::debug!(container = %bucket, key = %key, access_level = %level, "ignoring per-object access level");
        }

        let mut file = NamedTempFile::new()?;
        file.write_all(content)?;
        file.flush()?;

        self.run(
            "upload",
            bucket,
            vec![
                "--name".into(),
                key.into(),
                "--file".into(),
                file.path().into(),
                "--overwrite".into(),
            ],
        )?;
        Ok(())
    }

    fn list(&self, bucket: &str, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let mut args: Vec<OsString> = vec![
            "--prefix".into(),
            prefix.into(),
            "--num-results".into(),
            LIST_PAGE_SIZE.to_string().into(),
            "--show-next-marker".into(),
        ];
        if let Some(marker) = continuation {
            args.push("--marker".into());
            args.push(marker.into());
        }

        let stdout = self.run("list", bucket, args)?;
        parse_list_output(&stdout)
    }

    fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>> {
        // delete-batch はパターン指定のみでキー列を受け取れないので1件ずつ削除する
        let mut deleted = Vec::with_capacity(keys.len());
        for key in keys {
            if self.delete_blob(bucket, key)? {
                deleted.push(key.clone());
            }
        }
        Ok(deleted)
    }

    fn delete_one(&self, bucket: &str, key: &str) -> Result<bool> {
        self.delete_blob(bucket, key)
    }

    fn max_batch_delete(&self) -> usize {
        MAX_BATCH_DELETE
    }

    fn supports_directory_upload(&self) -> bool {
        false
    }
}
