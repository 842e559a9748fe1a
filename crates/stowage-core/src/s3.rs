use std::ffi::OsString;
use std::io::Write;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::storage::{ListPage, StorageClient};
use crate::utils::{is_tool_installed, run_tool};
use crate::{Error, Result};

/// list-objects-v2 の1ページあたりの件数
const LIST_PAGE_SIZE: usize = 1000;

/// `aws s3api` CLI のラッパー
///
/// 認証は AWS CLI の設定（プロファイル・環境変数）に任せる。
#[derive(Debug, Clone, Default)]
pub struct S3Client {
    profile: Option<String>,
    region: Option<String>,
    endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct S3Object {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListObjectsOutput {
    #[serde(default)]
    contents: Vec<S3Object>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteObjectsError {
    key: String,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteObjectsOutput {
    #[serde(default)]
    deleted: Vec<S3Object>,
    #[serde(default)]
    errors: Vec<DeleteObjectsError>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectIdentifier<'a> {
    key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteDocument<'a> {
    objects: Vec<ObjectIdentifier<'a>>,
    quiet: bool,
}

impl S3Client {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    /// AWS CLI がインストールされているか確認
    pub fn is_installed() -> bool {
        is_tool_installed("aws", "--version")
    }

    /// `aws s3api <operation>` の引数を構築
    fn build_args(&self, operation: &str, args: Vec<OsString>) -> Vec<OsString> {
        let mut full: Vec<OsString> = vec!["s3api".into(), operation.into()];
        full.extend(args);

        if let Some(profile) = &self.profile {
            full.push("--profile".into());
            full.push(profile.into());
        }
        if let Some(region) = &self.region {
            full.push("--region".into());
            full.push(region.into());
        }
        if let Some(endpoint_url) = &self.endpoint_url {
            full.push("--endpoint-url".into());
            full.push(endpoint_url.into());
        }

        full.push("--output".into());
        full.push("json".into());
        full
    }

    fn run(&self, operation: &str, args: Vec<OsString>) -> Result<Vec<u8>> {
        let mut command = Command::new("aws");
        command.args(self.build_args(operation, args));
        run_tool(&mut command, operation)
    }
}

/// list-objects-v2 の出力を解析（結果なしの場合 stdout は空になりうる）
fn parse_list_output(stdout: &[u8]) -> Result<ListPage> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(ListPage::default());
    }

    let output: ListObjectsOutput = serde_json::from_slice(stdout)?;
    Ok(ListPage::new(
        output.contents.into_iter().map(|o| o.key).collect(),
        output.next_token.filter(|t| !t.is_empty()),
    ))
}

/// delete-objects の出力を解析し、削除できたキーを返す
fn parse_delete_output(stdout: &[u8]) -> Result<Vec<String>> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let output: DeleteObjectsOutput = serde_json::from_slice(stdout)?;
    for error in &output.errors {
        tracing::warn!(
            key = %error.key,
            code = error.code.as_deref().unwrap_or("unknown"),
            message = error.message.as_deref().unwrap_or(""),
            "S3 refused to delete object"
        );
    }

    Ok(output.deleted.into_iter().map(|o| o.key).collect())
}

/// head-object の 404 応答か
fn is_not_found(message: &str) -> bool {
    message.contains("(404)") || message.contains("Not Found")
}

/// `--delete` に渡す JSON ドキュメント
fn delete_document(keys: &[String]) -> Result<String> {
    let document = DeleteDocument {
        objects: keys.iter().map(|k| ObjectIdentifier { key: k }).collect(),
        quiet: false,
    };
    Ok(serde_json::to_string(&document)?)
}

impl StorageClient for S3Client {
    fn name(&self) -> &str {
        "s3"
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        content: &[u8],
        access_level: Option<&str>,
    ) -> Result<()> {
        // CLI は本文をファイルパスで受け取るので一時ファイルを経由する
        let mut body = NamedTempFile::new()?;
        body.write_all(content)?;
        body.flush()?;

        let mut args: Vec<OsString> = vec![
            "--bucket".into(),
            bucket.into(),
            "--key".into(),
            key.into(),
            "--body".into(),
            body.path().into(),
        ];
        if let Some(acl) = access_level {
            args.push("--acl".into());
            args.push(acl.into());
        }

        self.run("put-object", args)?;
        Ok(())
    }

    fn list(&self, bucket: &str, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let mut args: Vec<OsString> = vec![
            "--bucket".into(),
            bucket.into(),
            "--prefix".into(),
            prefix.into(),
            "--max-items".into(),
            LIST_PAGE_SIZE.to_string().into(),
        ];
        if let Some(token) = continuation {
            args.push("--starting-token".into());
            args.push(token.into());
        }

        let stdout = self.run("list-objects-v2", args)?;
        parse_list_output(&stdout)
    }

    fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        if keys.len() > self.max_batch_delete() {
            return Err(Error::Validation(format!(
                "S3 accepts at most {} keys per delete-objects call, got {}",
                self.max_batch_delete(),
                keys.len()
            )));
        }

        // 1000 キー分の JSON はコマンドライン長を超えうるので file:// で渡す
        let mut document = NamedTempFile::new()?;
        document.write_all(delete_document(keys)?.as_bytes())?;
        document.flush()?;

        let mut file_arg = OsString::from("file://");
        file_arg.push(document.path());

        let stdout = self.run(
            "delete-objects",
            vec!["--bucket".into(), bucket.into(), "--delete".into(), file_arg],
        )?;
        parse_delete_output(&stdout)
    }

    fn delete_one(&self, bucket: &str, key: &str) -> Result<bool> {
        // delete-object は存在しないキーでも成功するので、先に head-object で確認する
        let head = self.run(
            "head-object",
            vec!["--bucket".into(), bucket.into(), "--key".into(), key.into()],
        );
        match head {
            Ok(_) => {}
            Err(Error::Backend(message)) if is_not_found(&message) => return Ok(false),
            Err(e) => return Err(e),
        }

        self.run(
            "delete-object",
            vec!["--bucket".into(), bucket.into(), "--key".into(), key.into()],
        )?;
        Ok(true)
    }
}
