use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::azure::AzureBlobClient;
use crate::s3::S3Client;
use crate::storage::StorageClient;
use crate::Result;

/// 設定ファイルのパスを上書きする環境変数
pub const CONFIG_PATH_ENV: &str = "STOWAGE_CONFIG";

/// Stowage 設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub storage: Option<StorageConfig>,
    pub s3: Option<S3Config>,
    pub azure: Option<AzureConfig>,
}

/// Storage 設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// ストレージバックエンド ("s3" or "azure")
    #[serde(default = "default_backend")]
    pub backend: String,
}

/// S3 設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3Config {
    /// デフォルトのバケット名
    pub bucket: String,
    /// デフォルトの ACL（例: "public-read"）
    pub acl: Option<String>,
    /// AWS プロファイル（環境変数 AWS_PROFILE 優先）
    pub profile: Option<String>,
    /// リージョン（環境変数 AWS_REGION 優先）
    pub region: Option<String>,
    /// S3 互換ストレージのエンドポイント
    pub endpoint_url: Option<String>,
}

/// Azure Blob 設定
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AzureConfig {
    /// デフォルトのコンテナ名
    pub container: String,
    /// ストレージアカウント名（環境変数 AZURE_STORAGE_ACCOUNT 優先）
    pub account_name: Option<String>,
    /// 認証モード ("login" or "key")
    pub auth_mode: Option<String>,
}

fn default_backend() -> String {
    "s3".to_string()
}

impl Config {
    /// 設定ファイルのパスを取得
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        let home = env::var("HOME")
            .map_err(|_| crate::Error::Config("HOME environment variable not set".into()))?;
        Ok(PathBuf::from(home).join(".stowage").join("config.toml"))
    }

    /// 設定を読み込み
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            crate::Error::Config(format!("Failed to read config file: {}", e))
        })?;

        Self::from_toml(&content)
    }

    /// TOML 文字列から設定を解析
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config file: {}", e)))
    }

    /// 設定を保存
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;

        // ディレクトリを作成
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                crate::Error::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        fs::write(&path, self.to_toml()?).map_err(|e| {
            crate::Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(path)
    }

    /// TOML 文字列に変換
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))
    }

    /// ストレージバックエンド名を取得
    pub fn get_storage_backend(&self) -> String {
        self.storage
            .as_ref()
            .map(|s| s.backend.clone())
            .unwrap_or_else(default_backend)
    }

    /// バックエンドに応じたデフォルトのバケット（コンテナ）名を取得
    pub fn get_bucket(&self) -> Result<String> {
        let bucket = match self.get_storage_backend().as_str() {
            "azure" => self.azure.as_ref().map(|a| a.container.clone()),
            _ => self.s3.as_ref().map(|s| s.bucket.clone()),
        };

        bucket
            .filter(|b| !b.is_empty())
            .ok_or_else(|| crate::Error::Config("bucket not configured".into()))
    }

    /// デフォルトの ACL を取得（S3 のみ）
    pub fn get_acl(&self) -> Option<String> {
        match self.get_storage_backend().as_str() {
            "s3" => self.s3.as_ref().and_then(|s| s.acl.clone()),
            _ => None,
        }
    }

    /// StorageClient を作成
    pub fn create_storage_client(&self) -> Result<Box<dyn StorageClient>> {
        let backend = self.get_storage_backend();

        match backend.as_str() {
            "s3" => {
                let s3 = self.s3.clone().unwrap_or_default();
                let mut client = S3Client::new();

                if let Some(profile) = env_or("AWS_PROFILE", s3.profile) {
                    client = client.with_profile(profile);
                }
                if let Some(region) = env_or("AWS_REGION", s3.region) {
                    client = client.with_region(region);
                }
                if let Some(endpoint_url) = s3.endpoint_url {
                    client = client.with_endpoint_url(endpoint_url);
                }
                Ok(Box::new(client))
            }
            "azure" => {
                let azure = self.azure.clone().unwrap_or_default();
                let mut client = AzureBlobClient::new();

                if let Some(account_name) = env_or("AZURE_STORAGE_ACCOUNT", azure.account_name) {
                    client = client.with_account_name(account_name);
                }
                if let Some(auth_mode) = azure.auth_mode {
                    client = client.with_auth_mode(auth_mode);
                }
                Ok(Box::new(client))
            }
            _ => Err(crate::Error::Config(format!(
                "Unknown storage backend: {}",
                backend
            ))),
        }
    }
}

/// 環境変数を優先し、なければ設定値を使う
fn env_or(var: &str, configured: Option<String>) -> Option<String> {
    env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .or(configured)
}
