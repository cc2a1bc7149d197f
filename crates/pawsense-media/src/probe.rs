//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Media file information needed for decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate, 0 when unknown
    pub fps: f64,
    /// Native sample rate of the first audio stream
    pub audio_sample_rate: Option<u32>,
    /// Display rotation in degrees, normalized to [0, 360)
    #[serde(default)]
    pub rotation: i32,
}

impl MediaInfo {
    /// Frame size FFmpeg decodes to once it applies the rotation metadata.
    ///
    /// Quarter turns swap width and height.
    pub fn display_dimensions(&self) -> (u32, u32) {
        if self.rotation.rem_euclid(180) == 90 {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    sample_rate: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

/// Older muxers store rotation as a `rotate` tag.
#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

/// Newer ffprobe reports the display matrix rotation as side data.
#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::unreadable_at(path, "file not found"));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::unreadable_at(
            path,
            format!(
                "FFprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    parse_probe_output(&output.stdout).map_err(|e| match e {
        MediaError::SourceUnreadable { message, .. } => MediaError::unreadable_at(path, message),
        other => other,
    })
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::unreadable("No video stream found"))?;

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MediaError::unreadable("Video stream has no dimensions"));
    }

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    // "0/0" is how ffprobe reports an unknown rate
    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let rotation = video_stream
        .side_data_list
        .iter()
        .find_map(|d| d.rotation)
        .or_else(|| {
            video_stream
                .tags
                .rotate
                .as_deref()
                .and_then(|r| r.trim().parse::<f64>().ok())
        })
        .filter(|r| r.is_finite())
        .map(|r| (r.round() as i32).rem_euclid(360))
        .unwrap_or(0);

    let audio_sample_rate = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "audio")
        .and_then(|s| s.sample_rate.as_ref())
        .and_then(|r| r.parse::<u32>().ok())
        .filter(|r| *r > 0);

    Ok(MediaInfo {
        duration,
        width,
        height,
        fps,
        audio_sample_rate,
        rotation,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
