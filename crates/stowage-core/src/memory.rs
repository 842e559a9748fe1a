use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};

use crate::storage::{ListPage, StorageClient, DEFAULT_MAX_BATCH_DELETE};
use crate::{Error, Result};

/// MemoryClient に対して発行された呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put {
        bucket: String,
        key: String,
        access_level: Option<String>,
    },
    List {
        bucket: String,
        prefix: String,
        continuation: Option<String>,
    },
    DeleteMany {
        bucket: String,
        keys: Vec<String>,
    },
    DeleteOne {
        bucket: String,
        key: String,
    },
}

/// プロセス内のオブジェクトストア
///
/// ページサイズ・バッチ上限・失敗注入を設定でき、発行された呼び出しを記録する。
#[derive(Debug)]
pub struct MemoryClient {
    objects: RefCell<BTreeMap<(String, String), Vec<u8>>>,
    calls: RefCell<Vec<Call>>,
    page_size: usize,
    batch_size: usize,
    directory_upload: bool,
    failing_puts: HashSet<String>,
    fail_list: bool,
    fail_delete_one: bool,
    delete_many_budget: Cell<Option<usize>>,
    stalled_deletes: bool,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            objects: RefCell::new(BTreeMap::new()),
            calls: RefCell::new(Vec::new()),
            page_size: 1000,
            batch_size: DEFAULT_MAX_BATCH_DELETE,
            directory_upload: true,
            failing_puts: HashSet::new(),
            fail_list: false,
            fail_delete_one: false,
            delete_many_budget: Cell::new(None),
            stalled_deletes: false,
        }
    }

    /// 1ページあたりのキー数
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// `delete_many` 1回あたりのキー数上限
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// ディレクトリアップロード非対応のストアとして振る舞う
    pub fn without_directory_upload(mut self) -> Self {
        self.directory_upload = false;
        self
    }

    /// 指定キーへの put を失敗させる
    pub fn fail_put(mut self, key: &str) -> Self {
        self.failing_puts.insert(key.to_string());
        self
    }

    /// すべての list を失敗させる
    pub fn fail_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// すべての `delete_one` を失敗させる
    pub fn fail_delete_one(mut self) -> Self {
        self.fail_delete_one = true;
        self
    }

    /// `delete_many` を n 回成功させた後に失敗させる
    pub fn fail_delete_many_after(self, n: usize) -> Self {
        self.delete_many_budget.set(Some(n));
        self
    }

    /// `delete_many` が何も削除しないストア
    pub fn with_stalled_deletes(mut self) -> Self {
        self.stalled_deletes = true;
        self
    }

    /// 呼び出しを記録せずにオブジェクトを直接配置
    pub fn insert(&self, bucket: &str, key: &str, content: &[u8]) {
        self.objects
            .borrow_mut()
            .insert((bucket.to_string(), key.to_string()), content.to_vec());
    }

    /// オブジェクトの内容を取得
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .borrow()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// バケット内の全キー（昇順）
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .borrow()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// 記録された呼び出し
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::List { .. }))
    }

    pub fn delete_many_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::DeleteMany { .. }))
    }

    pub fn delete_one_calls(&self) -> usize {
        self.count_calls(|c| matches!(c, Call::DeleteOne { .. }))
    }

    fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl StorageClient for MemoryClient {
    fn name(&self) -> &str {
        "memory"
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        content: &[u8],
        access_level: Option<&str>,
    ) -> Result<()> {
        self.record(Call::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
            access_level: access_level.map(str::to_string),
        });

        if self.failing_puts.contains(key) {
            return Err(Error::Backend(format!("put rejected for {}", key)));
        }

        self.insert(bucket, key, content);
        Ok(())
    }

    fn list(&self, bucket: &str, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        self.record(Call::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            continuation: continuation.map(str::to_string),
        });

        if self.fail_list {
            return Err(Error::Backend(format!("list rejected for {}", prefix)));
        }

        let offset = match continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::Backend(format!("invalid continuation token: {}", token)))?,
            None => 0,
        };

        let matching: Vec<String> = self
            .keys(bucket)
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let keys = matching.get(offset..end).unwrap_or_default().to_vec();
        let continuation = (end < matching.len()).then(|| end.to_string());

        Ok(ListPage::new(keys, continuation))
    }

    fn delete_many(&self, bucket: &str, keys: &[String]) -> Result<Vec<String>> {
        self.record(Call::DeleteMany {
            bucket: bucket.to_string(),
            keys: keys.to_vec(),
        });

        if keys.len() > self.batch_size {
            return Err(Error::Backend(format!(
                "batch of {} keys exceeds limit of {}",
                keys.len(),
                self.batch_size
            )));
        }

        if let Some(remaining) = self.delete_many_budget.get() {
            if remaining == 0 {
                return Err(Error::Backend("delete rejected".into()));
            }
            self.delete_many_budget.set(Some(remaining - 1));
        }

        if self.stalled_deletes {
            return Ok(Vec::new());
        }

        let mut objects = self.objects.borrow_mut();
        let deleted = keys
            .iter()
            .filter(|k| objects.remove(&(bucket.to_string(), k.to_string())).is_some())
            .cloned()
            .collect();

        Ok(deleted)
    }

    fn delete_one(&self, bucket: &str, key: &str) -> Result<bool> {
        self.record(Call::DeleteOne {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });

        if self.fail_delete_one {
            return Err(Error::Backend(format!("delete rejected for {}", key)));
        }

        let existed = self
            .objects
            .borrow_mut()
            .remove(&(bucket.to_string(), key.to_string()))
            .is_some();
        Ok(existed)
    }

    fn max_batch_delete(&self) -> usize {
        self.batch_size
    }

    fn supports_directory_upload(&self) -> bool {
        self.directory_upload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_paginates_by_offset() -> Result<()> {
        let client = MemoryClient::new().with_page_size(2);
        for key in ["a/1", "a/2", "a/3"] {
            client.insert("b", key, b"");
        }

        let first = client.list("b", "a/", None)?;
        assert_eq!(first.keys, vec!["a/1", "a/2"]);
        assert_eq!(first.continuation.as_deref(), Some("2"));

        let second = client.list("b", "a/", first.continuation.as_deref())?;
        assert_eq!(second.keys, vec!["a/3"]);
        assert!(second.continuation.is_none());
        Ok(())
    }

    #[test]
    fn test_buckets_are_isolated() -> Result<()> {
        let client = MemoryClient::new();
        client.insert("one", "k", b"1");
        client.insert("two", "k", b"2");

        assert!(client.delete_one("one", "k")?);
        assert!(!client.delete_one("one", "k")?);

        assert!(client.get("one", "k").is_none());
        assert_eq!(client.get("two", "k"), Some(b"2".to_vec()));
        Ok(())
    }

    #[test]
    fn test_delete_many_rejects_oversized_batch() {
        let client = MemoryClient::new().with_batch_size(1);
        let keys = vec!["a".to_string(), "b".to_string()];

        assert!(client.delete_many("b", &keys).is_err());
    }
}
