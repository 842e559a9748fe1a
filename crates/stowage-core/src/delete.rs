use crate::storage::{list_all, StorageClient};
use crate::{Error, Result};

/// 削除結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionResult {
    pub deleted_count: u64,
}

/// prefix 配下のオブジェクトをすべて削除
///
/// 一覧（全ページ）→ バッチ削除を、一覧が空になるまで繰り返す。
/// 一覧が空になった時点で prefix と同名のキーも削除を試みるが、その結果は問わない。
/// 失敗時は `Error::Deletion` にそれまでの削除件数を載せて返す。
pub fn delete_subtree(
    client: &dyn StorageClient,
    bucket: &str,
    key_prefix: &str,
) -> Result<DeletionResult> {
    if bucket.is_empty() {
        return Err(Error::Validation("bucket is required".into()));
    }
    if key_prefix.is_empty() {
        return Err(Error::Validation("key prefix is required".into()));
    }

    let batch_size = client.max_batch_delete().max(1);
    let mut result = DeletionResult::default();
    let mut round = 0usize;

    loop {
        round += 1;

        let keys = list_all(client, bucket, key_prefix)
            .map_err(|e| Error::deletion(key_prefix, result.deleted_count, e))?;

        if keys.is_empty() {
            if let Err(e) = client.delete_one(bucket, key_prefix) {
                tracing::warn!(
                    backend = client.name(),
                    bucket = %bucket,
                    key = %key_prefix,
                    error = %e,
                    "failed to delete prefix marker object"
                );
            }
            break;
        }

        let mut deleted_this_round = 0u64;
        for batch in keys.chunks(batch_size) {
            let deleted = client
                .delete_many(bucket, batch)
                .map_err(|e| Error::deletion(key_prefix, result.deleted_count, e))?;

            tracing::debug!(
                backend = client.name(),
                bucket = %bucket,
                prefix = %key_prefix,
                requested = batch.len(),
                deleted = deleted.len(),
                "deleted batch"
            );

            deleted_this_round += deleted.len() as u64;
            result.deleted_count += deleted.len() as u64;
        }

        if deleted_this_round == 0 {
            return Err(Error::deletion(
                key_prefix,
                result.deleted_count,
                Error::Backend(format!(
                    "{} objects listed but none were deleted in round {}",
                    keys.len(),
                    round
                )),
            ));
        }
    }

    tracing::info!(
        backend = client.name(),
        bucket = %bucket,
        prefix = %key_prefix,
        deleted = result.deleted_count,
        rounds = round,
        "prefix deleted"
    );

    Ok(result)
}
