use crate::Result;

/// S3 の DeleteObjects が一度に受け付けるキー数の上限
pub const DEFAULT_MAX_BATCH_DELETE: usize = 1000;

/// 一覧取得の1ページ分
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// このページに含まれるキー
    pub keys: Vec<String>,
    /// 続きがある場合の継続トークン
    pub continuation: Option<String>,
}

impl ListPage {
    pub fn new(keys: Vec<String>, continuation: Option<String>) -> Self {
        Self { keys, continuation }
    }
}

/// オブジェクトストレージクライアントの共通インターフェース
///
/// クライアントの生成・認証は呼び出し側の責務。コアは1回の呼び出しの間だけ借用する。
pub trait StorageClient {
    /// バックエンド名（ログ・表示用）
    fn name(&self) -> &str;

    /// オブジェクトを書き込む
    fn put(
        &self,
        bucket: &str,
        key: &str,
        content: &[u8],
        access_level: Option<&str>,
    ) -> Result<()>;

    /// prefix 配下のキーを1ページ分取得
    fn list(&self, bucket: &str, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    /// 複数キーをまとめて削除し、実際に削除されたキーを返す
    fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>>;

    /// 単一キーを削除し、オブジェクトが存在したかを返す（存在しなくてもエラーにしない）
    fn delete_one(&self, bucket: &str, key: &str) -> Result<bool>;

    /// `delete_many` 1回あたりの最大キー数
    fn max_batch_delete(&self) -> usize {
        DEFAULT_MAX_BATCH_DELETE
    }

    /// ディレクトリのアップロードに対応しているか
    fn supports_directory_upload(&self) -> bool {
        true
    }
}

/// 継続トークンをたどって prefix 配下の全キーを取得
pub fn list_all(client: &dyn StorageClient, bucket: &str, prefix: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = client.list(bucket, prefix, continuation.as_deref())?;
        keys.extend(page.keys);

        match page.continuation {
            Some(token) if !token.is_empty() => continuation = Some(token),
            _ => break,
        }
    }

    Ok(keys)
}
