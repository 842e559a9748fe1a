use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use stowage_core::config::{AzureConfig, Config, StorageConfig};
use stowage_core::{media, utils, DeleteRequest, StorageClient, UploadRequest};

#[derive(Parser)]
#[command(name = "stowage")]
#[command(author, version, about = "オブジェクトストレージへのアップロード・削除ツール", long_about = None)]
struct Cli {
    /// 詳細ログを表示（RUST_LOG が優先）
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// ファイルまたはディレクトリをアップロード
    Upload {
        /// アップロードするファイル・ディレクトリ
        local_path: PathBuf,

        /// アップロード先のキー（ディレクトリの場合は prefix）
        key: String,

        /// バケット名（デフォルト: 設定ファイル）
        #[arg(short, long)]
        bucket: Option<String>,

        /// ACL（デフォルト: 設定ファイル）
        #[arg(short, long)]
        acl: Option<String>,
    },

    /// キーまたは prefix 配下を削除
    Delete {
        /// 削除するキー（拡張子がなければ prefix として扱う）
        key: String,

        /// バケット名（デフォルト: 設定ファイル）
        #[arg(short, long)]
        bucket: Option<String>,

        /// インタラクティブモード（削除前に確認）
        #[arg(short, long)]
        interactive: bool,
    },

    /// メディアファイルのメタデータを表示
    Probe {
        /// 対象のメディアファイル
        file: PathBuf,

        /// 音声ファイルとして扱う
        #[arg(long)]
        audio: bool,

        /// JSON で出力
        #[arg(long)]
        json: bool,
    },

    /// 設定ファイルの管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// シェル補完スクリプトを出力
    Completions {
        /// 対象シェル
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 現在の設定を表示
    Show,

    /// 設定ファイルのパスを表示
    Path,

    /// 設定ファイルを作成
    Init {
        /// ストレージバックエンド (s3 / azure)
        #[arg(long, default_value = "s3")]
        backend: String,

        /// バケット名（Azure の場合はコンテナ名）
        #[arg(long)]
        bucket: String,

        /// デフォルトの ACL（S3 のみ）
        #[arg(long)]
        acl: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Upload {
            local_path,
            key,
            bucket,
            acl,
        } => upload(&local_path, key, bucket, acl)?,
        Commands::Delete {
            key,
            bucket,
            interactive,
        } => delete(key, bucket, interactive)?,
        Commands::Probe { file, audio, json } => probe(&file, audio, json)?,
        Commands::Config { action } => config(action)?,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "stowage", &mut io::stdout());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

/// クライアントとバケットを設定（と引数）から解決
fn resolve_client(bucket: Option<String>) -> Result<(Config, Box<dyn StorageClient>, String)> {
    let config = Config::load()?;
    let client = config.create_storage_client()?;
    let bucket = match bucket {
        Some(bucket) => bucket,
        None => config
            .get_bucket()
            .context("--bucket を指定するか stowage config init で設定してください")?,
    };
    Ok((config, client, bucket))
}

fn upload(local_path: &Path, key: String, bucket: Option<String>, acl: Option<String>) -> Result<()> {
    let (config, client, bucket) = resolve_client(bucket)?;
    let access_level = acl.or_else(|| config.get_acl());

    let size = if local_path.is_dir() {
        utils::calculate_dir_size(local_path)?
    } else {
        std::fs::metadata(local_path).map(|m| m.len()).unwrap_or(0)
    };

    println!(
        "{} {} → {}:{}/{} ({})",
        "⬆".cyan().bold(),
        local_path.display().to_string().bright_blue(),
        client.name().dimmed(),
        bucket.yellow(),
        key.yellow(),
        utils::format_size(size).dimmed()
    );

    let request = UploadRequest {
        local_path: local_path.to_path_buf(),
        destination_key: key,
        bucket,
        access_level,
    };

    let spinner = spinner("アップロード中...");
    let result = stowage_core::upload(client.as_ref(), &request);
    spinner.finish_and_clear();

    let summary = result?;

    for key in &summary.keys {
        println!("  {} {}", "✓".green(), key.dimmed());
    }

    println!(
        "\n{} {} 件のオブジェクトをアップロードしました ({})",
        "✅".green(),
        summary.keys.len().to_string().green().bold(),
        utils::format_size(summary.bytes).green().bold()
    );

    Ok(())
}

fn delete(key: String, bucket: Option<String>, interactive: bool) -> Result<()> {
    let (_, client, bucket) = resolve_client(bucket)?;

    let target = if stowage_core::keys::looks_like_object_key(&key) {
        "オブジェクト"
    } else {
        "prefix 配下のすべてのオブジェクト"
    };

    println!(
        "{} {}:{}/{} ({})",
        "🗑️ ".red().bold(),
        client.name().dimmed(),
        bucket.yellow(),
        key.yellow(),
        target.dimmed()
    );

    // インタラクティブモード
    if interactive {
        print!("\n{} 本当に削除しますか? (y/N): ", "⚠".yellow().bold());
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("{}", "キャンセルされました".yellow());
            return Ok(());
        }
    }

    let request = DeleteRequest { key, bucket };

    let spinner = spinner("削除中...");
    let result = stowage_core::delete(client.as_ref(), &request);
    spinner.finish_and_clear();

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            if let stowage_core::Error::Deletion { deleted_so_far, .. } = &e {
                if *deleted_so_far > 0 {
                    println!(
                        "{} 失敗するまでに {} 件を削除しました",
                        "⚠".yellow().bold(),
                        deleted_so_far.to_string().yellow()
                    );
                }
            }
            return Err(e.into());
        }
    };

    if result.deleted_count == 0 {
        println!("{}", "✨ 削除対象のオブジェクトはありませんでした".green());
        return Ok(());
    }

    println!(
        "\n{} {} 件のオブジェクトを削除しました",
        "✅".green(),
        result.deleted_count.to_string().green().bold()
    );

    Ok(())
}

fn probe(file: &Path, audio: bool, json: bool) -> Result<()> {
    if !media::is_installed() {
        println!("{}", "❌ ffprobe がインストールされていません".red());
        return Ok(());
    }

    if audio {
        let meta = media::audio_metadata(file)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&meta)?);
        } else {
            println!("{} {}", "🎵".cyan(), file.display().to_string().bright_blue());
            println!("  フォーマット: {}", meta.container_format.yellow());
            println!("  再生時間:     {:.2} 秒", meta.duration_seconds);
            println!("  サイズ:       {}", utils::format_size(meta.size_bytes).yellow());
        }
        return Ok(());
    }

    let meta = media::video_metadata(file)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
    } else {
        println!("{} {}", "🎬".cyan(), file.display().to_string().bright_blue());
        println!(
            "  解像度:       {}",
            format!("{}x{}", meta.width, meta.height).yellow().bold()
        );
        println!("  フォーマット: {}", meta.container_format.yellow());
        println!("  再生時間:     {:.2} 秒", meta.duration_seconds);
        println!("  サイズ:       {}", utils::format_size(meta.size_bytes).yellow());
    }

    Ok(())
}

fn config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path()?.display());
        }
        ConfigAction::Init {
            backend,
            bucket,
            acl,
        } => {
            let mut config = Config::load()?;
            match backend.as_str() {
                "s3" => {
                    let mut s3 = config.s3.take().unwrap_or_default();
                    s3.bucket = bucket;
                    if acl.is_some() {
                        s3.acl = acl;
                    }
                    config.s3 = Some(s3);
                }
                "azure" => {
                    let mut azure: AzureConfig = config.azure.take().unwrap_or_default();
                    azure.container = bucket;
                    config.azure = Some(azure);
                }
                other => anyhow::bail!("未対応のバックエンドです: {}", other),
            }
            config.storage = Some(StorageConfig { backend });

            let path = config.save()?;
            println!(
                "{} 設定を保存しました: {}",
                "✅".green(),
                path.display().to_string().bright_blue()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let cli = Cli::try_parse_from([
            "stowage", "upload", "/tmp/site", "v1/", "--bucket", "assets", "--acl", "public-read",
        ])
        .unwrap();

        match cli.command {
            Commands::Upload {
                local_path,
                key,
                bucket,
                acl,
            } => {
                assert_eq!(local_path, PathBuf::from("/tmp/site"));
                assert_eq!(key, "v1/");
                assert_eq!(bucket.as_deref(), Some("assets"));
                assert_eq!(acl.as_deref(), Some("public-read"));
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn test_parse_delete_interactive() {
        let cli = Cli::try_parse_from(["stowage", "-v", "delete", "v1", "-i"]).unwrap();

        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Delete { interactive: true, bucket: None, .. }
        ));
    }
}
