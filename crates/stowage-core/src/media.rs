//! ffprobe によるメディアメタデータ取得

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::utils::{is_tool_installed, run_tool};
use crate::{Error, Result};

/// 動画ファイルのメタデータ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub container_format: String,
    pub size_bytes: u64,
}

/// 音声ファイルのメタデータ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioMetadata {
    pub duration_seconds: f64,
    pub container_format: String,
    pub size_bytes: u64,
}

/// `ffprobe -print_format json -show_format -show_streams` の出力
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
    #[serde(default)]
    pub format: ProbeFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// ffprobe は duration と size を文字列で出力する
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub size: Option<String>,
}

/// 解像度比較に使う映像ストリームの寸法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl ProbeStream {
    fn is_video(&self) -> bool {
        self.codec_type.as_deref() == Some("video")
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width.unwrap_or(0),
            height: self.height.unwrap_or(0),
        }
    }
}

impl ProbeFormat {
    fn container_format(&self) -> Result<String> {
        self.format_name
            .clone()
            .ok_or_else(|| Error::Probe("format_name missing from ffprobe output".into()))
    }

    fn duration_seconds(&self) -> Result<f64> {
        self.duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| Error::Probe("Could not parse duration".into()))
    }

    fn size_bytes(&self) -> Result<u64> {
        self.size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::Probe("Could not parse size".into()))
    }
}

/// ffprobe がインストールされているか確認
pub fn is_installed() -> bool {
    is_tool_installed("ffprobe", "-version")
}

/// ファイルを ffprobe にかけて出力を解析
pub fn probe(path: &Path) -> Result<ProbeOutput> {
    if !path.is_file() {
        return Err(Error::Validation(format!("{} not found", path.display())));
    }

    let mut command = Command::new("ffprobe");
    command
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);

    let stdout = run_tool(&mut command, "probe").map_err(|e| Error::Probe(e.to_string()))?;
    Ok(serde_json::from_slice(&stdout)?)
}

/// 最大解像度の映像ストリームを選ぶ
///
/// 候補 `b` が横長なら高さ、そうでなければ幅だけを現在の `a` と比べる。
/// 面積による比較ではないため、ストリームの順序によって結果が変わる。
pub fn select_max_resolution(streams: &[Dimensions]) -> Option<Dimensions> {
    streams.iter().copied().reduce(|a, b| {
        if b.width > b.height {
            if b.height > a.height {
                b
            } else {
                a
            }
        } else if b.width > a.width {
            b
        } else {
            a
        }
    })
}

/// 解析済みの ffprobe 出力から動画メタデータを組み立てる
pub fn video_metadata_from(probe: &ProbeOutput, path: &Path) -> Result<VideoMetadata> {
    let streams: Vec<Dimensions> = probe
        .streams
        .iter()
        .filter(|s| s.is_video())
        .map(ProbeStream::dimensions)
        .collect();

    let best =
        select_max_resolution(&streams).ok_or_else(|| Error::NoVideoStream(path.to_path_buf()))?;

    Ok(VideoMetadata {
        width: best.width,
        height: best.height,
        duration_seconds: probe.format.duration_seconds()?,
        container_format: probe.format.container_format()?,
        size_bytes: probe.format.size_bytes()?,
    })
}

/// 解析済みの ffprobe 出力から音声メタデータを組み立てる
pub fn audio_metadata_from(probe: &ProbeOutput) -> Result<AudioMetadata> {
    Ok(AudioMetadata {
        duration_seconds: probe.format.duration_seconds()?,
        container_format: probe.format.container_format()?,
        size_bytes: probe.format.size_bytes()?,
    })
}

/// 動画ファイルのメタデータを取得
pub fn video_metadata(path: &Path) -> Result<VideoMetadata> {
    let output = probe(path)?;
    let metadata = video_metadata_from(&output, path)?;

    tracing::info!(
        path = %path.display(),
        width = metadata.width,
        height = metadata.height,
        duration_seconds = metadata.duration_seconds,
        "video probe completed"
    );
    Ok(metadata)
}

/// 音声ファイルのメタデータを取得
pub fn audio_metadata(path: &Path) -> Result<AudioMetadata> {
    let output = probe(path)?;
    let metadata = audio_metadata_from(&output)?;

    tracing::info!(
        path = %path.display(),
        duration_seconds = metadata.duration_seconds,
        "audio probe completed"
    );
    Ok(metadata)
}
