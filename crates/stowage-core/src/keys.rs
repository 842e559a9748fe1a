//! ローカルパスからオブジェクトキーへの変換
//!
//! キーの区切り文字は OS に関係なく常に `/`。

use std::path::{Component, Path};

use crate::{Error, Result};

/// オブジェクトストアのキー区切り文字
pub const KEY_SEPARATOR: char = '/';

/// `local_root` 配下の `file_path` を `destination_prefix` 配下のキーに変換
///
/// prefix が空なら相対パスそのもの、`/` で終わっていればそのまま連結、
/// それ以外は `/` を1つ挟んで連結する。
pub fn map_key(local_root: &Path, destination_prefix: &str, file_path: &Path) -> Result<String> {
    let relative = file_path.strip_prefix(local_root).map_err(|_| {
        Error::InvalidPath(format!(
            "{} is not under {}",
            file_path.display(),
            local_root.display()
        ))
    })?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| {
                    Error::InvalidPath(format!(
                        "{} contains a non UTF-8 component",
                        file_path.display()
                    ))
                })?;
                segments.push(name);
            }
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidPath(format!(
                    "{} escapes {}",
                    file_path.display(),
                    local_root.display()
                )))
            }
        }
    }

    if segments.is_empty() {
        return Err(Error::InvalidPath(format!(
            "{} is the root itself, not a file under it",
            file_path.display()
        )));
    }

    Ok(join_key(destination_prefix, &segments.join("/")))
}

/// prefix と相対キーを区切り文字1つで連結
pub fn join_key(prefix: &str, relative: &str) -> String {
    if prefix.is_empty() {
        relative.to_string()
    } else if prefix.ends_with(KEY_SEPARATOR) {
        format!("{}{}", prefix, relative)
    } else {
        format!("{}{}{}", prefix, KEY_SEPARATOR, relative)
    }
}

/// 末尾に区切り文字を付けてディレクトリ扱いの prefix にする
pub fn as_directory_prefix(key: &str) -> String {
    if key.ends_with(KEY_SEPARATOR) {
        key.to_string()
    } else {
        format!("{}{}", key, KEY_SEPARATOR)
    }
}

/// キーの最後のセグメントに `.` を含むか（拡張子付きの単一オブジェクトとみなす）
pub fn looks_like_object_key(key: &str) -> bool {
    key.rsplit(KEY_SEPARATOR)
        .next()
        .map(|name| name.contains('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[test]
    fn test_map_key_with_trailing_separator() -> Result<()> {
        let root = Path::new("/tmp/site");
        assert_eq!(
            map_key(root, "v1/", &root.join("index.html"))?,
            "v1/index.html"
        );
        assert_eq!(
            map_key(root, "v1/", &root.join("css").join("app.css"))?,
            "v1/css/app.css"
        );
        Ok(())
    }

    #[test]
    fn test_map_key_inserts_single_separator() -> Result<()> {
        let root = Path::new("/tmp/site");
        assert_eq!(map_key(root, "v1", &root.join("a.txt"))?, "v1/a.txt");
        assert_eq!(map_key(root, "", &root.join("a.txt"))?, "a.txt");
        Ok(())
    }

    #[test]
    fn test_map_key_rejects_outside_root() {
        let result = map_key(Path::new("/tmp/site"), "v1/", Path::new("/tmp/other/a.txt"));
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_map_key_rejects_sibling_with_shared_prefix() {
        // "/tmp/site2" は文字列としては "/tmp/site" で始まるが配下ではない
        let result = map_key(Path::new("/tmp/site"), "v1/", Path::new("/tmp/site2/a.txt"));
        assert!(matches!(result, Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_map_key_rejects_root_itself() {
        let root = Path::new("/tmp/site");
        assert!(map_key(root, "v1/", root).is_err());
    }

    #[test]
    fn test_map_key_is_injective() -> Result<()> {
        let root = PathBuf::from("/data");
        let files = [
            root.join("a"),
            root.join("a.txt"),
            root.join("b").join("a.txt"),
            root.join("b").join("c").join("a.txt"),
            root.join("b.c").join("a.txt"),
        ];

        let keys: HashSet<String> = files
            .iter()
            .map(|f| map_key(&root, "p/", f))
            .collect::<Result<_>>()?;

        assert_eq!(keys.len(), files.len());
        Ok(())
    }

    #[test]
    fn test_looks_like_object_key() {
        assert!(looks_like_object_key("reports/summary.pdf"));
        assert!(looks_like_object_key("summary.pdf"));
        assert!(!looks_like_object_key("reports/2024"));
        assert!(!looks_like_object_key("v1.2/assets"));
        assert!(!looks_like_object_key("v1/"));
    }

    #[test]
    fn test_as_directory_prefix() {
        assert_eq!(as_directory_prefix("v1"), "v1/");
        assert_eq!(as_directory_prefix("v1/"), "v1/");
    }
}
