use std::path::Path;
use std::process::{Command, Stdio};
use walkdir::WalkDir;

use crate::{Error, Result};

/// ディレクトリのサイズを再帰的に計算（シンボリックリンクは辿らない）
pub fn calculate_dir_size(path: &Path) -> Result<u64> {
    let mut total_size = 0u64;

    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            if let Ok(metadata) = entry.metadata() {
                total_size += metadata.len();
            }
        }
    }

    Ok(total_size)
}

/// バイトサイズを人間が読みやすい形式に変換
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let unit_index = (bytes_f64.log10() / 1024_f64.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f64 / 1024_f64.powi(unit_index as i32);

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// 外部コマンドがインストールされているか確認
pub fn is_tool_installed(program: &str, version_arg: &str) -> bool {
    Command::new(program)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// 外部コマンドを実行して stdout を返す。失敗時は stderr を載せて `Error::Backend`
pub fn run_tool(command: &mut Command, action: &str) -> Result<Vec<u8>> {
    let program = command.get_program().to_string_lossy().to_string();
    tracing::trace!(program = %program, action, "running external tool");

    let output = command
        .output()
        .map_err(|e| Error::Backend(format!("Failed to run {} ({}): {}", program, action, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Backend(format!(
            "{} failed ({}): {}",
            program,
            action,
            stderr.trim()
        )));
    }

    Ok(output.stdout)
}
